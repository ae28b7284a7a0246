use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dasp_graph::Buffer;
use klangnetz::nodes::{Delay, DelayLine, SpectralMonitor, Supersaw};
use klangnetz::{AudioContext, QUANTUM};

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("DelayLine.process()", |b| {
        let mut line = DelayLine::new(48_000.0, 1.0).unwrap();
        let input = [0.5f32; QUANTUM];
        let times = [0.0123f32; QUANTUM];
        let mut output = [0.0f32; QUANTUM];

        b.iter(|| line.process(black_box(&input), &times, &mut output))
    });

    c.bench_function("render_quantum(supersaw x16 -> delay)", |b| {
        let ctx = AudioContext::new(48_000);
        {
            let mut g = ctx.graph_lock();
            let mut saw = g.add(Supersaw::new(110.0).with_saw_count(16).with_detune(30.0));
            let delay = Delay::new(48_000, 1.0).unwrap();
            delay.delay_time().set_value(0.3);
            let delay = g.add(delay);
            g.connect(saw.id(), delay.id()).unwrap();
            g.connect(delay.id(), ctx.destination()).unwrap();
            saw.note_on().unwrap();
        }
        let mut out = vec![Buffer::SILENT; ctx.channels()];

        b.iter(|| ctx.render_quantum(black_box(&mut out)))
    });

    c.bench_function("SpectralProbe.spectral_mag(2048)", |b| {
        let monitor = SpectralMonitor::new(2048).unwrap();
        let probe = monitor.probe();
        let mut mags = Vec::new();

        b.iter(|| probe.spectral_mag(black_box(&mut mags)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

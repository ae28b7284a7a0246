//! Plays a detuned supersaw chord through a delay on the default output device,
//! printing the loudest spectral bin once a second.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use klangnetz::device::CpalDevice;
use klangnetz::nodes::{Adsr, Delay, Gain, SpectralMonitor, Supersaw};
use klangnetz::AudioContext;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let device = CpalDevice::default_output().ok_or("no output device")?;
    let sample_rate = device.sample_rate();
    let ctx = Arc::new(AudioContext::new(sample_rate).with_channels(device.channels() as usize));

    let monitor = SpectralMonitor::new(2048)?;
    let probe = monitor.probe();
    let delay = Delay::new(sample_rate, 1.0)?.with_channels(2);
    delay.delay_time().set_value(0.375);

    let mut voices = Vec::new();
    {
        let mut g = ctx.graph_lock();
        let bus = g.add(Gain::new(0.3));
        let delay = g.add(delay);
        let monitor = g.add(monitor);

        // A minor: A2, C3, E3
        for frequency in [110.0, 130.81, 164.81] {
            let saw = Supersaw::new(frequency)
                .with_saw_count(7)
                .with_detune(18.0)
                .with_adsr(Adsr {
                    attack: 0.8,
                    decay: 0.5,
                    sustain: 0.7,
                    release: 2.0,
                });
            let saw = g.add(saw);
            g.connect(saw.id(), bus.id())?;
            voices.push(saw);
        }

        g.connect(bus.id(), ctx.destination())?;
        g.connect(bus.id(), delay.id())?;
        g.connect(delay.id(), ctx.destination())?;
        g.connect(bus.id(), monitor.id())?;
        g.add_automatic_pull(monitor.id())?;
    }

    let _stream = device.start(ctx.clone())?;
    println!("playing on {} ({} Hz, {} ch)", device.name(), sample_rate, device.channels());

    for voice in &mut voices {
        voice.note_on().ok();
    }

    let mut mags = Vec::new();
    for second in 0..8 {
        sleep(Duration::from_secs(1));
        probe.spectral_mag(&mut mags);
        let (bin, _) = mags
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });
        let hz = bin as f32 * sample_rate as f32 / probe.window_size() as f32;
        println!("t={second}s peak ~{hz:.0} Hz");

        if second == 5 {
            for voice in &mut voices {
                voice.note_off().ok();
            }
        }
    }

    Ok(())
}

//! Detuned multi-voice sawtooth with an ADSR envelope.

use dasp_graph::{Buffer, Input};

use super::envelope::{Adsr, Envelope, EnvelopeState};
use crate::graph::Handle;
use crate::lock::RenderLock;
use crate::node::{AudioNode, ProcessContext};
use crate::param::AudioParam;

/// Largest number of saw voices a [`Supersaw`] can run.
pub const MAX_SAW_COUNT: usize = 64;

/// Messages to control a Supersaw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupersawMessage {
    NoteOn,
    NoteOff,
}

impl Handle<SupersawMessage> {
    /// Start (or retrigger) the envelope next quantum.
    pub fn note_on(&mut self) -> Result<(), SupersawMessage> {
        self.send(SupersawMessage::NoteOn)
    }

    /// Release the envelope next quantum.
    pub fn note_off(&mut self) -> Result<(), SupersawMessage> {
        self.send(SupersawMessage::NoteOff)
    }
}

/// A bank of `saw_count` sawtooth voices spread over `detune` cents.
///
/// Each voice `i` of `N` runs at
/// `frequency * 2^(detune * (2i / (N - 1) - 1) / 1200)`, so the spread is
/// symmetric around `frequency`. The voices are summed, divided by `N`, and
/// shaped by one shared envelope.
///
/// Changing `saw_count` takes effect at the start of the next quantum; the
/// voice bank is resized in place, new voices starting at phase zero.
pub struct Supersaw {
    attack: AudioParam,
    decay: AudioParam,
    sustain: AudioParam,
    release: AudioParam,
    saw_count: AudioParam,
    frequency: AudioParam,
    detune: AudioParam,

    phases: Vec<f32>,
    envelope: Envelope,
}

impl Supersaw {
    pub fn new(frequency: f32) -> Self {
        let adsr = Adsr::default();
        let mut phases = Vec::with_capacity(MAX_SAW_COUNT);
        phases.resize(1, 0.0);

        Self {
            attack: AudioParam::new("attack", adsr.attack, 0.0, 60.0),
            decay: AudioParam::new("decay", adsr.decay, 0.0, 60.0),
            sustain: AudioParam::new("sustain", adsr.sustain, 0.0, 1.0),
            release: AudioParam::new("release", adsr.release, 0.0, 60.0),
            saw_count: AudioParam::new("saw_count", 1.0, 1.0, MAX_SAW_COUNT as f32),
            frequency: AudioParam::new("frequency", frequency, 0.0, 96_000.0),
            detune: AudioParam::new("detune", 0.0, 0.0, 1_200.0),
            phases,
            envelope: Envelope::new(),
        }
    }

    pub fn with_saw_count(self, count: usize) -> Self {
        self.saw_count.set_value(count as f32);
        self
    }

    pub fn with_detune(self, cents: f32) -> Self {
        self.detune.set_value(cents);
        self
    }

    pub fn with_adsr(self, adsr: Adsr) -> Self {
        self.attack.set_value(adsr.attack);
        self.decay.set_value(adsr.decay);
        self.sustain.set_value(adsr.sustain);
        self.release.set_value(adsr.release);
        self
    }

    pub fn attack(&self) -> &AudioParam {
        &self.attack
    }

    pub fn decay(&self) -> &AudioParam {
        &self.decay
    }

    pub fn sustain(&self) -> &AudioParam {
        &self.sustain
    }

    pub fn release(&self) -> &AudioParam {
        &self.release
    }

    /// Rounded to the nearest integer when read.
    pub fn saw_count(&self) -> &AudioParam {
        &self.saw_count
    }

    pub fn frequency(&self) -> &AudioParam {
        &self.frequency
    }

    /// Total spread in cents.
    pub fn detune(&self) -> &AudioParam {
        &self.detune
    }

    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    /// Voices currently allocated.
    pub fn voices(&self) -> usize {
        self.phases.len()
    }

    pub fn note_on(&mut self, _r: &RenderLock) {
        self.envelope.note_on();
    }

    pub fn note_off(&mut self, _r: &RenderLock) {
        self.envelope.note_off();
    }

    fn adsr(&self) -> Adsr {
        Adsr {
            attack: self.attack.value(),
            decay: self.decay.value(),
            sustain: self.sustain.value(),
            release: self.release.value(),
        }
    }

    /// Match the voice bank to `saw_count`. Stays within the reserved capacity.
    fn update_voices(&mut self) {
        let count = (self.saw_count.value().round() as usize).clamp(1, MAX_SAW_COUNT);
        if count != self.phases.len() {
            self.phases.resize(count, 0.0);
        }
    }
}

/// Detune of voice `i` of `count`, in cents.
#[inline]
fn voice_cents(i: usize, count: usize, detune: f32) -> f32 {
    if count < 2 {
        return 0.0;
    }
    detune * (2.0 * i as f32 / (count - 1) as f32 - 1.0)
}

impl AudioNode for Supersaw {
    type Message = SupersawMessage;

    fn process(
        &mut self,
        r: &RenderLock,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = SupersawMessage>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                SupersawMessage::NoteOn => self.note_on(r),
                SupersawMessage::NoteOff => self.note_off(r),
            }
        }

        // One comparison per quantum in the common case.
        self.update_voices();

        let Some((first, rest)) = outputs.split_first_mut() else {
            return;
        };

        let sample_rate = ctx.sample_rate as f32;
        let adsr = self.adsr();
        let frequency = self.frequency.value();
        let detune = self.detune.value();
        let count = self.phases.len();

        let mut increments = [0.0f32; MAX_SAW_COUNT];
        for (i, inc) in increments.iter_mut().take(count).enumerate() {
            let factor = (voice_cents(i, count, detune) / 1200.0).exp2();
            *inc = frequency * factor / sample_rate;
        }
        let norm = 1.0 / count as f32;

        for sample in first.iter_mut() {
            let mut sum = 0.0;
            for (phase, &inc) in self.phases.iter_mut().zip(increments.iter()) {
                sum += 2.0 * *phase - 1.0;
                *phase += inc;
                *phase -= phase.floor();
            }
            *sample = self.envelope.advance(&adsr, sample_rate) * sum * norm;
        }

        for buffer in rest.iter_mut() {
            buffer.copy_from_slice(first);
        }
    }

    fn reset(&mut self, _r: &RenderLock) {
        self.envelope.reset();
        self.phases.iter_mut().for_each(|p| *p = 0.0);
    }

    fn propagates_silence(&self, _r: &RenderLock) -> bool {
        self.envelope.is_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::QUANTUM;

    fn ctx() -> ProcessContext {
        ProcessContext {
            sample_rate: 48_000,
            buffer_size: QUANTUM,
        }
    }

    fn render(saw: &mut Supersaw, messages: &[SupersawMessage]) -> Buffer {
        let r = RenderLock::mint();
        let mut out = [Buffer::SILENT];
        saw.process(&r, &ctx(), messages.iter().copied(), &[], &mut out);
        out[0].clone()
    }

    #[test]
    fn detune_is_symmetric() {
        assert_eq!(voice_cents(0, 1, 50.0), 0.0);
        assert_eq!(voice_cents(0, 3, 50.0), -50.0);
        assert_eq!(voice_cents(1, 3, 50.0), 0.0);
        assert_eq!(voice_cents(2, 3, 50.0), 50.0);
        assert_eq!(voice_cents(0, 4, 30.0), -voice_cents(3, 4, 30.0));
    }

    #[test]
    fn silent_until_note_on() {
        let mut saw = Supersaw::new(220.0);
        assert!(render(&mut saw, &[]).iter().all(|&s| s == 0.0));
        assert!(saw.propagates_silence(&RenderLock::mint()));

        let out = render(&mut saw, &[SupersawMessage::NoteOn]);
        assert_eq!(saw.envelope_state(), EnvelopeState::Attack);
        assert!(out.iter().any(|&s| s != 0.0));
        assert!(!saw.propagates_silence(&RenderLock::mint()));
    }

    #[test]
    fn output_never_exceeds_unity() {
        let mut saw = Supersaw::new(1_000.0)
            .with_saw_count(7)
            .with_detune(0.0)
            .with_adsr(Adsr {
                attack: 0.0,
                decay: 0.0,
                sustain: 1.0,
                release: 1.0,
            });
        // All voices in phase: the worst case for constructive summing.
        let mut out = render(&mut saw, &[SupersawMessage::NoteOn]);
        for _ in 0..64 {
            assert!(out.iter().all(|s| s.abs() <= 1.0));
            out = render(&mut saw, &[]);
        }
    }

    #[test]
    fn voice_bank_follows_saw_count_lazily() {
        let mut saw = Supersaw::new(440.0);
        let capacity = saw.phases.capacity();
        saw.saw_count().set_value(5.4);
        assert_eq!(saw.voices(), 1);

        render(&mut saw, &[]);
        assert_eq!(saw.voices(), 5);

        saw.saw_count().set_value(3.0);
        render(&mut saw, &[]);
        assert_eq!(saw.voices(), 3);
        assert_eq!(saw.phases.capacity(), capacity);
    }

    #[test]
    fn note_off_releases_to_idle() {
        let mut saw = Supersaw::new(440.0).with_adsr(Adsr {
            attack: 0.0,
            decay: 0.0,
            sustain: 0.5,
            release: 0.001,
        });
        render(&mut saw, &[SupersawMessage::NoteOn]);
        assert_eq!(saw.envelope_state(), EnvelopeState::Sustain);

        render(&mut saw, &[SupersawMessage::NoteOff]);
        assert_eq!(saw.envelope_state(), EnvelopeState::Idle);
        assert!(render(&mut saw, &[]).iter().all(|&s| s == 0.0));
    }
}

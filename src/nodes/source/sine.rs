//! Sine wave oscillator

use dasp_graph::{Buffer, Input};

use crate::lock::RenderLock;
use crate::node::{AudioNode, ProcessContext};
use crate::param::AudioParam;

/// A sine wave oscillator (mono source)
///
/// Frequency and amplitude are [`AudioParam`]s, read once per quantum.
pub struct Sine {
    frequency: AudioParam,
    amplitude: AudioParam,
    phase: f32,
}

impl Sine {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency: AudioParam::new("frequency", frequency, 0.0, 96_000.0),
            amplitude: AudioParam::new("amplitude", 0.25, 0.0, 1.0), // -12dB, safe default
            phase: 0.0,
        }
    }

    pub fn with_amplitude(self, amplitude: f32) -> Self {
        self.amplitude.set_value(amplitude);
        self
    }

    #[inline]
    pub fn frequency(&self) -> &AudioParam {
        &self.frequency
    }

    #[inline]
    pub fn amplitude(&self) -> &AudioParam {
        &self.amplitude
    }
}

impl AudioNode for Sine {
    type Message = ();

    fn process(
        &mut self,
        _r: &RenderLock,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let Some((first, rest)) = outputs.split_first_mut() else {
            return;
        };

        let phase_inc = self.frequency.value() / ctx.sample_rate as f32;
        let amplitude = self.amplitude.value();

        for sample in first.iter_mut() {
            *sample = (self.phase * core::f32::consts::TAU).sin() * amplitude;

            self.phase += phase_inc;
            self.phase -= self.phase.floor();
        }

        // Copy to remaining output channels (if any)
        for buffer in rest.iter_mut() {
            buffer.copy_from_slice(first);
        }
    }

    fn reset(&mut self, _r: &RenderLock) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amplitude_bounds_output() {
        let r = RenderLock::mint();
        let ctx = ProcessContext {
            sample_rate: 48_000,
            buffer_size: crate::QUANTUM,
        };
        let mut sine = Sine::new(1_000.0).with_amplitude(0.5);
        let mut out = [Buffer::SILENT];
        for _ in 0..16 {
            sine.process(&r, &ctx, core::iter::empty(), &[], &mut out);
            assert!(out[0].iter().all(|s| s.abs() <= 0.5 + 1e-6));
        }
        assert!(out[0].iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn param_changes_apply_next_quantum() {
        let r = RenderLock::mint();
        let ctx = ProcessContext {
            sample_rate: 48_000,
            buffer_size: crate::QUANTUM,
        };
        let mut sine = Sine::new(1_000.0);
        let amplitude = sine.amplitude().clone();
        amplitude.set_value(0.0);

        let mut out = [Buffer::SILENT];
        sine.process(&r, &ctx, core::iter::empty(), &[], &mut out);
        assert!(out[0].iter().all(|&s| s == 0.0));
    }
}

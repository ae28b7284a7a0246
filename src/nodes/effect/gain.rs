//! Gain/volume control effect

use dasp_graph::{Buffer, Input};

use crate::bus;
use crate::lock::RenderLock;
use crate::node::{AudioNode, ProcessContext};
use crate::param::AudioParam;

/// A gain (volume) control that passes audio through with amplitude scaling
///
/// The gain param is read per sample and smoothed so rapid changes don't click.
pub struct Gain {
    gain: AudioParam,
    channels: usize,
    /// Smoothing to prevent clicks on rapid gain changes
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
    scratch: Vec<Buffer>,
}

impl Gain {
    /// Create a new stereo gain node with the specified gain value
    pub fn new(gain: f32) -> Self {
        let gain = AudioParam::new("gain", gain, 0.0, 16.0);
        Self {
            smoothed_gain: gain.value(),
            gain,
            channels: 2,
            smooth_coeff: 0.995, // ~7ms at 48kHz
            scratch: vec![Buffer::SILENT; 2],
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self.scratch = vec![Buffer::SILENT; self.channels];
        self
    }

    /// Set the smoothing time in milliseconds
    pub fn with_smoothing_ms(mut self, ms: f32, sample_rate: u32) -> Self {
        // Time constant: after `ms` milliseconds, we've reached ~63% of target
        let samples = (ms / 1000.0) * sample_rate as f32;
        self.smooth_coeff = (-1.0 / samples).exp();
        self
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }

    #[inline]
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }
}

impl AudioNode for Gain {
    type Message = ();

    fn process(
        &mut self,
        _r: &RenderLock,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let Some(input) = bus::summed(inputs, &mut self.scratch) else {
            bus::silence(outputs);
            return;
        };

        let smooth_coeff = self.smooth_coeff;
        let target_gain = self.gain.value();
        let mut current_gain = self.smoothed_gain;

        for (ch, (out_buffer, in_buffer)) in outputs.iter_mut().zip(input).enumerate() {
            // Every channel follows the same gain curve
            let mut gain = self.smoothed_gain;

            for (out_sample, &in_sample) in out_buffer.iter_mut().zip(in_buffer.iter()) {
                gain = target_gain + smooth_coeff * (gain - target_gain);
                *out_sample = in_sample * gain;
            }

            if ch == 0 {
                current_gain = gain;
            }
        }

        self.smoothed_gain = current_gain;
    }

    fn reset(&mut self, _r: &RenderLock) {
        self.smoothed_gain = self.gain.value();
    }

    fn propagates_silence(&self, _r: &RenderLock) -> bool {
        true
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}

//! Fractional delay line and the delay effect built on it.

use dasp_graph::{Buffer, Input};
use itertools::izip;

use crate::bus::{self, QUANTUM};
use crate::error::{Error, Result};
use crate::lock::RenderLock;
use crate::node::{AudioNode, ProcessContext};
use crate::param::AudioParam;

/// Upper bound (exclusive) on `max_delay_time`, in seconds.
///
/// Bounds the memory a single delay node may hold.
pub const MAX_DELAY_TIME: f64 = 180.0;

/// A circular buffer read at a fractional offset behind its write cursor.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
    sample_rate: f64,
    max_delay_time: f64,
}

impl DelayLine {
    /// Allocate a line able to hold `max_delay_time` seconds of history.
    ///
    /// Fails with [`Error::DelayTimeOutOfRange`] unless
    /// `0 < max_delay_time < 180`.
    pub fn new(sample_rate: f64, max_delay_time: f64) -> Result<Self> {
        if !(max_delay_time > 0.0 && max_delay_time < MAX_DELAY_TIME) {
            return Err(Error::DelayTimeOutOfRange(max_delay_time));
        }
        let len = (max_delay_time * sample_rate).ceil() as usize + 1;
        Ok(Self {
            buffer: vec![0.0; len],
            write: 0,
            sample_rate,
            max_delay_time,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[inline]
    pub fn max_delay_time(&self) -> f64 {
        self.max_delay_time
    }

    /// Push one sample and read the history `delay_time` seconds back.
    ///
    /// `delay_time` is clamped to `[0, max_delay_time]`; NaN reads as 0.
    #[inline]
    pub fn process_sample(&mut self, input: f32, delay_time: f64) -> f32 {
        let len = self.buffer.len();
        self.buffer[self.write] = input;

        let delay_time = if delay_time.is_nan() {
            0.0
        } else {
            delay_time.clamp(0.0, self.max_delay_time)
        };

        // Reads between the last and first slot interpolate across the wrap.
        let read = (self.write as f64 - delay_time * self.sample_rate).rem_euclid(len as f64);
        let i0 = (read as usize).min(len - 1);
        let i1 = (i0 + 1) % len;
        let frac = (read - i0 as f64) as f32;
        let output = (1.0 - frac) * self.buffer[i0] + frac * self.buffer[i1];

        self.write += 1;
        if self.write == len {
            self.write = 0;
        }
        output
    }

    /// Run a whole block, reading one delay time per sample.
    pub fn process(&mut self, input: &[f32], delay_times: &[f32], output: &mut [f32]) {
        for (out, &sample, &delay) in izip!(output.iter_mut(), input, delay_times) {
            *out = self.process_sample(sample, delay as f64);
        }
    }

    /// Clear the history and rewind the write cursor.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

/// Delays its input by a sample-accurate, fractional amount.
///
/// One [`DelayLine`] per channel; the `delay_time` param (seconds) is read
/// once per sample.
///
/// ```
/// use klangnetz::nodes::Delay;
///
/// let delay = Delay::new(48_000, 0.5).unwrap();
/// delay.delay_time().set_value(0.25);
///
/// assert!(Delay::new(48_000, 180.0).is_err());
/// ```
pub struct Delay {
    lines: Vec<DelayLine>,
    delay_time: AudioParam,
    delay_times: [f32; QUANTUM],
    scratch: Vec<Buffer>,
}

impl Delay {
    /// Create a mono delay holding up to `max_delay_time` seconds.
    pub fn new(sample_rate: u32, max_delay_time: f64) -> Result<Self> {
        let line = DelayLine::new(sample_rate as f64, max_delay_time)?;
        Ok(Self {
            lines: vec![line],
            delay_time: AudioParam::new("delay_time", 0.0, 0.0, max_delay_time as f32),
            delay_times: [0.0; QUANTUM],
            scratch: vec![Buffer::SILENT],
        })
    }

    /// Delay `channels` independent channels.
    pub fn with_channels(mut self, channels: usize) -> Self {
        let channels = channels.max(1);
        self.lines.resize(channels, self.lines[0].clone());
        self.lines.iter_mut().for_each(DelayLine::reset);
        self.scratch = vec![Buffer::SILENT; channels];
        self
    }

    #[inline]
    pub fn delay_time(&self) -> &AudioParam {
        &self.delay_time
    }

    #[inline]
    pub fn max_delay_time(&self) -> f64 {
        self.lines[0].max_delay_time()
    }
}

impl AudioNode for Delay {
    type Message = ();

    fn process(
        &mut self,
        _r: &RenderLock,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        self.delay_time.fill(&mut self.delay_times);

        // Disconnected input still drains the line: it is fed silence.
        bus::mix_inputs(inputs, &mut self.scratch);

        for (line, input, output) in izip!(self.lines.iter_mut(), self.scratch.iter(), outputs.iter_mut()) {
            line.process(input, &self.delay_times, output);
        }
    }

    fn reset(&mut self, _r: &RenderLock) {
        self.lines.iter_mut().for_each(DelayLine::reset);
    }

    fn tail_time(&self) -> f64 {
        self.max_delay_time()
    }

    fn propagates_silence(&self, _r: &RenderLock) -> bool {
        true
    }

    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    fn num_outputs(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_delay_time_bounds() {
        assert_eq!(DelayLine::new(44_100.0, 0.0).unwrap_err(), Error::DelayTimeOutOfRange(0.0));
        assert_eq!(
            DelayLine::new(44_100.0, 180.0).unwrap_err(),
            Error::DelayTimeOutOfRange(180.0)
        );
        assert!(DelayLine::new(44_100.0, -1.0).is_err());
        assert!(DelayLine::new(44_100.0, f64::NAN).is_err());
        assert!(DelayLine::new(44_100.0, 179.9).is_ok());
        assert!(Delay::new(44_100, 0.0).is_err());
    }

    #[test]
    fn buffer_holds_max_delay_plus_one() {
        let line = DelayLine::new(48_000.0, 1.0).unwrap();
        assert_eq!(line.len(), 48_001);
        let line = DelayLine::new(10.0, 0.25).unwrap();
        assert_eq!(line.len(), 4);
    }

    #[test]
    fn integer_delay_shifts_input() {
        let mut line = DelayLine::new(8.0, 2.0).unwrap();
        let out: Vec<f32> = (1..=8).map(|i| line.process_sample(i as f32, 0.375)).collect();
        assert_eq!(out, [0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn fractional_delay_interpolates_linearly() {
        // Input x[t] = t, delayed by 2.5 samples, should read t - 2.5.
        let mut line = DelayLine::new(1_000.0, 0.01).unwrap();
        for t in 0..40 {
            let out = line.process_sample(t as f32, 0.0025);
            if t >= 3 {
                assert!((out - (t as f32 - 2.5)).abs() < 1e-4, "t={t} out={out}");
            }
        }
    }

    #[test]
    fn fractional_read_interpolates_across_the_wrap() {
        // 11 slots: every lap puts one read between slot 10 and slot 0.
        let mut line = DelayLine::new(1_000.0, 0.01).unwrap();
        assert_eq!(line.len(), 11);
        for t in 0..5 * line.len() {
            let out = line.process_sample(t as f32, 0.0025);
            if t % line.len() == 2 && t > 2 {
                assert!((out - (t as f32 - 2.5)).abs() < 1e-4, "t={t} out={out}");
            }
        }
    }

    #[test]
    fn f32_delay_time_keeps_an_impulse() {
        // 0.1f32 is slightly above 0.1, so the read lands just short of the wrap.
        let mut line = DelayLine::new(1_000.0, 1.0).unwrap();
        let out: Vec<f32> = (0..200)
            .map(|t| line.process_sample(if t == 0 { 1.0 } else { 0.0 }, 0.1f32 as f64))
            .collect();
        assert!(out[..100].iter().all(|&s| s == 0.0));
        assert!((out[100] - 1.0).abs() < 1e-4);
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_delay_is_identity() {
        let mut line = DelayLine::new(1_000.0, 0.01).unwrap();
        for t in 0..30 {
            assert_eq!(line.process_sample(t as f32, 0.0), t as f32);
        }
    }

    #[test]
    fn delay_time_is_clamped_to_max() {
        let mut a = DelayLine::new(100.0, 0.05).unwrap();
        let mut b = DelayLine::new(100.0, 0.05).unwrap();
        for t in 0..50 {
            let x = (t as f32 * 0.37).sin();
            assert_eq!(a.process_sample(x, 10.0), b.process_sample(x, 0.05));
        }
    }

    #[test]
    fn reset_clears_history() {
        let mut line = DelayLine::new(1_000.0, 0.01).unwrap();
        for t in 0..5 {
            line.process_sample(t as f32 + 1.0, 0.002);
        }
        line.reset();
        assert_eq!(line.process_sample(0.0, 0.002), 0.0);
        assert_eq!(line.process_sample(0.0, 0.002), 0.0);
    }

    #[test]
    fn disconnected_node_outputs_silence() {
        let r = RenderLock::mint();
        let ctx = ProcessContext {
            sample_rate: 1_000,
            buffer_size: QUANTUM,
        };
        let mut delay = Delay::new(1_000, 0.1).unwrap().with_channels(2);
        delay.delay_time().set_value(0.004);

        let mut out = vec![Buffer::SILENT; 2];
        delay.process(&r, &ctx, core::iter::empty(), &[], &mut out);
        assert!(out.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
        assert_eq!(delay.tail_time(), 0.1);
    }
}

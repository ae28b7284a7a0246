//! Windowed FFT analyzer that passes its input through unchanged.
//!
//! The render thread accumulates into an [`AnalysisWindow`] guarded by a
//! mutex; control threads swap the window out through a [`SpectralProbe`]
//! and run the FFT on their own time. The mutex is the only lock the render
//! thread shares with control threads, and both sides hold it for a bounded
//! copy or swap only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dasp_graph::{Buffer, Input};
use delegate::delegate;
use tracing::debug;

use super::fft::{blackman, RealFft};
use crate::bus;
use crate::error::{Error, Result};
use crate::lock::RenderLock;
use crate::node::{AudioNode, ProcessContext};

pub const DEFAULT_WINDOW_SIZE: usize = 512;

/// The accumulation buffer: `window_size` samples, a cursor, and the
/// transform sized to match.
#[derive(Debug)]
pub struct AnalysisWindow {
    buffer: Vec<f32>,
    cursor: usize,
    fft: RealFft,
}

impl AnalysisWindow {
    pub fn new(window_size: usize) -> Result<Self> {
        validate(window_size)?;
        Ok(Self {
            buffer: vec![0.0; window_size],
            cursor: 0,
            fft: RealFft::new(window_size),
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
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Add `frames` samples of every channel, summed, at the cursor.
    ///
    /// Non-overlapping windows: a quantum running past the end of the window
    /// only fills what is left and the rest is dropped. A window shorter than
    /// the quantum restarts at 0 and takes the first `len` frames.
    pub fn accumulate<'a>(&mut self, frames: usize, channels: impl IntoIterator<Item = &'a [f32]>) {
        let size = self.buffer.len();
        let mut frames = frames;
        if size < frames {
            self.cursor = 0;
            frames = size;
        }
        frames = frames.min(size - self.cursor);

        let window = &mut self.buffer[self.cursor..self.cursor + frames];
        window.fill(0.0);
        for channel in channels {
            for (w, &s) in window.iter_mut().zip(channel) {
                *w += s;
            }
        }

        self.cursor += frames;
        if self.cursor >= size {
            self.cursor = 0;
        }
    }

    /// Swap `fresh` in as the new (empty) window and return the old one.
    fn swap_out(&mut self, mut fresh: Vec<f32>) -> Vec<f32> {
        fresh.clear();
        fresh.resize(self.buffer.len(), 0.0);
        std::mem::swap(&mut fresh, &mut self.buffer);
        self.cursor = 0;
        fresh
    }

    fn replace(&mut self, buffer: Vec<f32>, fft: RealFft) {
        self.buffer = buffer;
        self.fft = fft;
        self.cursor = 0;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.cursor = 0;
    }
}

fn validate(window_size: usize) -> Result<()> {
    if window_size < 2 || window_size % 2 != 0 {
        return Err(Error::InvalidWindowSize(window_size));
    }
    Ok(())
}

struct Shared {
    window: Mutex<AnalysisWindow>,
    // Written under `window`'s lock, read without it.
    window_size: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AnalysisWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe query handle for a [`SpectralMonitor`].
///
/// Obtain one with [`SpectralMonitor::probe`] before adding the monitor to a
/// graph; clones share the same window.
#[derive(Clone)]
pub struct SpectralProbe {
    shared: Arc<Shared>,
}

impl SpectralProbe {
    /// Take the current window and compute its magnitude spectrum into `result`.
    ///
    /// `result` is replaced with `window_size / 2` magnitudes, one per bin,
    /// bin `k` centred on `k * sample_rate / window_size` Hz. The window is
    /// reset, so the next call analyses only samples arriving after this one.
    /// Runs the FFT outside the lock; allocates.
    pub fn spectral_mag(&self, result: &mut Vec<f32>) {
        let fresh = vec![0.0; self.window_size()];
        let (mut window, fft) = {
            let mut shared = self.shared.lock();
            let window = shared.swap_out(fresh);
            (window, shared.fft.clone())
        };

        blackman(&mut window);
        fft.forward(&mut window);

        // Index 1 holds the Nyquist term in the packed layout.
        window[1] = 0.0;

        let bins = window.len() / 2;
        for k in 0..bins {
            let re = window[2 * k];
            let im = window[2 * k + 1];
            window[k] = (re * re + im * im).sqrt();
        }
        window.truncate(bins);

        *result = window;
    }

    /// Samples per analysis window.
    pub fn window_size(&self) -> usize {
        self.shared.window_size.load(Ordering::Acquire)
    }

    /// Resize the window, discarding whatever was partially accumulated.
    pub fn set_window_size(&self, window_size: usize) -> Result<()> {
        validate(window_size)?;
        let fft = RealFft::new(window_size);
        let buffer = vec![0.0; window_size];

        let mut shared = self.shared.lock();
        shared.replace(buffer, fft);
        self.shared.window_size.store(window_size, Ordering::Release);
        drop(shared);

        debug!(window_size, "spectral monitor window resized");
        Ok(())
    }

    /// Next write position inside the current window.
    pub fn cursor(&self) -> usize {
        self.shared.lock().cursor()
    }
}

/// A pass-through node feeding a windowed FFT analyzer.
///
/// Output is a copy of the input (up- or down-mixed to the monitor's channel
/// count), or silence while nothing is connected. If the monitor isn't routed
/// to the destination, register it with
/// [`GraphLock::add_automatic_pull`](crate::GraphLock::add_automatic_pull) so
/// it keeps analysing.
///
/// ```
/// use klangnetz::nodes::SpectralMonitor;
///
/// let monitor = SpectralMonitor::new(1024).unwrap();
/// let probe = monitor.probe();
/// assert_eq!(probe.window_size(), 1024);
///
/// let mut mags = Vec::new();
/// probe.spectral_mag(&mut mags);
/// assert_eq!(mags.len(), 512);
/// ```
pub struct SpectralMonitor {
    probe: SpectralProbe,
    channels: usize,
}

impl SpectralMonitor {
    pub fn new(window_size: usize) -> Result<Self> {
        let window = AnalysisWindow::new(window_size)?;
        Ok(Self {
            probe: SpectralProbe {
                shared: Arc::new(Shared {
                    window: Mutex::new(window),
                    window_size: AtomicUsize::new(window_size),
                }),
            },
            channels: 2,
        })
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// A handle for querying this monitor from any thread.
    pub fn probe(&self) -> SpectralProbe {
        self.probe.clone()
    }

    delegate! {
        to self.probe {
            pub fn spectral_mag(&self, result: &mut Vec<f32>);
            pub fn window_size(&self) -> usize;
            pub fn set_window_size(&self, window_size: usize) -> Result<()>;
            pub fn cursor(&self) -> usize;
        }
    }
}

impl AudioNode for SpectralMonitor {
    type Message = ();

    fn process(
        &mut self,
        _r: &RenderLock,
        ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        if !bus::is_connected(inputs) {
            bus::silence(outputs);
            return;
        }

        {
            let channels = inputs
                .iter()
                .flat_map(|input| input.buffers())
                .map(|buffer| &buffer[..]);
            self.probe.shared.lock().accumulate(ctx.buffer_size, channels);
        }

        bus::mix_inputs(inputs, outputs);
    }

    fn reset(&mut self, _r: &RenderLock) {
        self.probe.shared.lock().clear();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::QUANTUM;
    use std::f32::consts::TAU;

    fn sine(frequency: f32, sample_rate: f32, start: usize, len: usize) -> Vec<f32> {
        (start..start + len)
            .map(|i| (TAU * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn window_size_must_be_even_and_at_least_two() {
        assert_eq!(AnalysisWindow::new(0).unwrap_err(), Error::InvalidWindowSize(0));
        assert_eq!(AnalysisWindow::new(1).unwrap_err(), Error::InvalidWindowSize(1));
        assert_eq!(AnalysisWindow::new(511).unwrap_err(), Error::InvalidWindowSize(511));
        assert!(AnalysisWindow::new(2).is_ok());

        let monitor = SpectralMonitor::new(256).unwrap();
        assert!(monitor.set_window_size(3).is_err());
        assert_eq!(monitor.window_size(), 256);
    }

    #[test]
    fn window_fills_in_ceil_size_over_quantum_steps() {
        for size in [64, 128, 200, 512, 1000] {
            let mut window = AnalysisWindow::new(size).unwrap();
            let ones = [1.0f32; QUANTUM];
            let steps = size.div_ceil(QUANTUM);
            for step in 1..=steps {
                window.accumulate(QUANTUM, [&ones[..]]);
                if step < steps {
                    assert_eq!(window.cursor(), step * QUANTUM);
                }
            }
            assert_eq!(window.cursor(), 0, "size {size}");
            assert!(window.buffer.iter().all(|&s| s == 1.0), "size {size}");
        }
    }

    #[test]
    fn overflow_is_dropped_not_carried() {
        let mut window = AnalysisWindow::new(100).unwrap();
        let ones = [1.0f32; QUANTUM];
        window.accumulate(QUANTUM, [&ones[..]]);
        window.accumulate(QUANTUM, [&ones[..]]);
        assert_eq!(window.cursor(), 0);

        let twos = [2.0f32; QUANTUM];
        window.accumulate(QUANTUM, [&twos[..]]);
        assert_eq!(window.cursor(), QUANTUM);
        assert!(window.buffer[..QUANTUM].iter().all(|&s| s == 2.0));
        assert!(window.buffer[QUANTUM..].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn window_shorter_than_quantum_takes_a_chunk() {
        let mut window = AnalysisWindow::new(16).unwrap();
        let ramp: Vec<f32> = (0..QUANTUM).map(|i| i as f32).collect();
        window.accumulate(QUANTUM, [&ramp[..]]);
        assert_eq!(window.cursor(), 0);
        assert_eq!(window.buffer, ramp[..16]);
    }

    #[test]
    fn channels_are_summed() {
        let mut window = AnalysisWindow::new(QUANTUM).unwrap();
        let a = [0.25f32; QUANTUM];
        let b = [0.5f32; QUANTUM];
        window.accumulate(QUANTUM, [&a[..], &b[..]]);
        assert!(window.buffer.iter().all(|&s| s == 0.75));
    }

    #[test]
    fn resize_discards_partial_window() {
        let monitor = SpectralMonitor::new(512).unwrap();
        let ones = [1.0f32; QUANTUM];
        monitor.probe.shared.lock().accumulate(QUANTUM, [&ones[..]]);
        assert_eq!(monitor.cursor(), QUANTUM);

        monitor.set_window_size(256).unwrap();
        assert_eq!(monitor.cursor(), 0);
        assert_eq!(monitor.window_size(), 256);

        let mut mags = Vec::new();
        monitor.spectral_mag(&mut mags);
        assert_eq!(mags.len(), 128);
        assert!(mags.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let (size, sample_rate) = (512, 48_000.0);
        // 1875 Hz = bin 20 of a 512-point window at 48 kHz.
        let signal = sine(1_875.0, sample_rate, 0, size);

        let monitor = SpectralMonitor::new(size).unwrap();
        for chunk in signal.chunks(QUANTUM) {
            monitor.probe.shared.lock().accumulate(QUANTUM, [chunk]);
        }

        let mut mags = Vec::new();
        monitor.spectral_mag(&mut mags);
        assert_eq!(mags.len(), size / 2);

        let (peak_bin, &peak) = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_eq!(peak_bin, 20);
        for (bin, &mag) in mags.iter().enumerate() {
            if bin.abs_diff(peak_bin) > 4 {
                assert!(mag < peak * 0.01, "bin {bin}: {mag} vs peak {peak}");
            }
        }
    }

    #[test]
    fn spectral_mag_resets_the_window() {
        let monitor = SpectralMonitor::new(128).unwrap();
        let signal = sine(3_000.0, 48_000.0, 0, QUANTUM);
        monitor.probe.shared.lock().accumulate(QUANTUM, [&signal[..]]);

        let mut mags = Vec::new();
        monitor.spectral_mag(&mut mags);
        assert!(mags.iter().any(|&m| m > 0.0));
        assert_eq!(monitor.cursor(), 0);

        monitor.spectral_mag(&mut mags);
        assert!(mags.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn passes_input_through_and_silences_when_disconnected() {
        let r = RenderLock::mint();
        let ctx = ProcessContext {
            sample_rate: 48_000,
            buffer_size: QUANTUM,
        };
        let mut monitor = SpectralMonitor::new(256).unwrap();
        let mut out = vec![Buffer::SILENT; 2];
        out[0].iter_mut().for_each(|s| *s = 1.0);

        monitor.process(&r, &ctx, core::iter::empty(), &[], &mut out);
        assert!(out.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
        assert_eq!(monitor.cursor(), 0);
    }
}

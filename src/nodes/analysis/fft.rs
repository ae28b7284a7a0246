//! Real-input FFT with a packed in-place layout, and the Blackman window.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Multiply `buffer` by a Blackman window of the same length.
pub fn blackman(buffer: &mut [f32]) {
    let n = buffer.len() as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let x = 2.0 * PI * i as f32 / n;
        let w = 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos();
        *sample *= w;
    }
}

/// Forward FFT over real samples, written back in packed form.
///
/// For a transform of even length `n` the output layout is:
///
/// | index        | value               |
/// |--------------|---------------------|
/// | `0`          | `Re X[0]` (DC)      |
/// | `1`          | `Re X[n/2]` (Nyquist) |
/// | `2k`, `2k+1` | `Re X[k]`, `Im X[k]` for `0 < k < n/2` |
///
/// DC and Nyquist are purely real, so their imaginary parts are not stored.
/// Cloning shares the underlying plan.
#[derive(Clone)]
pub struct RealFft {
    fft: Arc<dyn rustfft::Fft<f32>>,
    size: usize,
}

impl RealFft {
    /// Plan a transform of `size` samples. Allocates.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(size),
            size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Transform `data` in place. Allocates a complex scratch buffer.
    ///
    /// `data` must be exactly [`len`](Self::len) samples long; anything else
    /// is left untouched.
    pub fn forward(&self, data: &mut [f32]) {
        let n = self.size;
        if data.len() != n || n < 2 {
            return;
        }

        let mut spectrum: Vec<Complex<f32>> = data.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.fft.process(&mut spectrum);

        data[0] = spectrum[0].re;
        data[1] = spectrum[n / 2].re;
        for k in 1..n / 2 {
            data[2 * k] = spectrum[k].re;
            data[2 * k + 1] = spectrum[k].im;
        }
    }
}

impl fmt::Debug for RealFft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealFft").field("size", &self.size).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_dc_and_nyquist_into_first_pair() {
        // 1, -1, 1, -1, ... is all Nyquist; add a DC offset of 0.5.
        let mut data: Vec<f32> = (0..8).map(|i| if i % 2 == 0 { 1.5 } else { -0.5 }).collect();
        RealFft::new(8).forward(&mut data);
        assert!((data[0] - 4.0).abs() < 1e-4);
        assert!((data[1] - 8.0).abs() < 1e-4);
        assert!(data[2..].iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn cosine_lands_in_its_bin() {
        let n = 16;
        let mut data: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 3.0 * i as f32 / n as f32).cos())
            .collect();
        RealFft::new(n).forward(&mut data);
        assert!((data[6] - 8.0).abs() < 1e-3);
        assert!(data[7].abs() < 1e-3);
    }

    #[test]
    fn wrong_length_is_ignored() {
        let mut data = vec![1.0; 6];
        RealFft::new(8).forward(&mut data);
        assert_eq!(data, vec![1.0; 6]);
    }

    #[test]
    fn blackman_tapers_edges() {
        let mut w = vec![1.0; 64];
        blackman(&mut w);
        assert!(w[0].abs() < 1e-6);
        assert!((w[32] - 1.0).abs() < 1e-5);
        assert!(w.iter().all(|&v| (-1e-6..=1.0 + 1e-6).contains(&v)));
    }
}

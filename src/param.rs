//! Automatable scalar parameters.

use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A shared, automatable scalar control.
///
/// Cloning an `AudioParam` clones the handle, not the value: the owning node
/// and every controller holding a clone see the same value, and the storage
/// lives as long as the longest holder.
///
/// The owning node reads the value once per quantum with [`value`](Self::value)
/// or once per sample with [`fill`](Self::fill). An external automation
/// scheduler drives a param simply by calling [`set_value`](Self::set_value)
/// ahead of each quantum.
///
/// ```
/// use klangnetz::AudioParam;
///
/// let gain = AudioParam::new("gain", 1.0, 0.0, 2.0);
/// let controller = gain.clone();
/// controller.set_value(0.5);
/// assert_eq!(gain.value(), 0.5);
///
/// // Values are clamped to the param's range.
/// controller.set_value(10.0);
/// assert_eq!(gain.value(), 2.0);
/// ```
#[derive(Clone)]
pub struct AudioParam {
    inner: Arc<Inner>,
}

struct Inner {
    name: &'static str,
    default: f32,
    min: f32,
    max: f32,
    // f32 bits; the render thread only ever does a relaxed load
    value: AtomicU32,
}

impl AudioParam {
    /// Create a param. `default` is clamped into `[min, max]`.
    ///
    /// Swapped bounds are reordered and a NaN bound leaves that side
    /// unbounded. A NaN `default` falls back to `min`.
    pub fn new(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        let min = if min.is_nan() { f32::NEG_INFINITY } else { min };
        let max = if max.is_nan() { f32::INFINITY } else { max };
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let default = if default.is_nan() { min } else { default.clamp(min, max) };
        Self {
            inner: Arc::new(Inner {
                name,
                default,
                min,
                max,
                value: AtomicU32::new(default.to_bits()),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The value the controller last set.
    #[inline]
    pub fn value(&self) -> f32 {
        f32::from_bits(self.inner.value.load(Ordering::Relaxed))
    }

    /// Set the value, clamped to the param's range. NaN is ignored.
    pub fn set_value(&self, value: f32) {
        if value.is_nan() {
            return;
        }
        let value = value.clamp(self.inner.min, self.inner.max);
        self.inner.value.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn default_value(&self) -> f32 {
        self.inner.default
    }

    #[inline]
    pub fn min_value(&self) -> f32 {
        self.inner.min
    }

    #[inline]
    pub fn max_value(&self) -> f32 {
        self.inner.max
    }

    pub fn reset_to_default(&self) {
        self.set_value(self.inner.default);
    }

    /// Per-sample read for sample-accurate kernels.
    ///
    /// Without an automation curve every sample of the quantum carries the
    /// same value, but kernels that take the slice stay sample accurate once
    /// a scheduler writes ramps here.
    #[inline]
    pub fn fill(&self, values: &mut [f32]) {
        values.fill(self.value());
    }

    /// Whether two handles share the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AudioParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioParam")
            .field("name", &self.inner.name)
            .field("value", &self.value())
            .field("range", &(self.inner.min..=self.inner.max))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let a = AudioParam::new("frequency", 440.0, 0.0, 20_000.0);
        let b = a.clone();
        b.set_value(220.0);
        assert_eq!(a.value(), 220.0);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn default_is_clamped_and_restorable() {
        let p = AudioParam::new("sustain", 2.0, 0.0, 1.0);
        assert_eq!(p.default_value(), 1.0);
        p.set_value(0.25);
        p.reset_to_default();
        assert_eq!(p.value(), 1.0);
    }

    #[test]
    fn bad_ranges_do_not_panic() {
        let p = AudioParam::new("gain", 0.5, 1.0, 0.0);
        assert_eq!((p.min_value(), p.max_value()), (0.0, 1.0));
        assert_eq!(p.value(), 0.5);

        let p = AudioParam::new("gain", 3.0, f32::NAN, 2.0);
        assert_eq!(p.max_value(), 2.0);
        assert_eq!(p.value(), 2.0);
        p.set_value(-5.0);
        assert_eq!(p.value(), -5.0);

        let p = AudioParam::new("gain", 1.0, f32::NAN, f32::NAN);
        assert_eq!(p.value(), 1.0);
    }

    #[test]
    fn nan_is_ignored() {
        let p = AudioParam::new("detune", 10.0, 0.0, 100.0);
        p.set_value(f32::NAN);
        assert_eq!(p.value(), 10.0);
    }

    #[test]
    fn fill_writes_every_sample() {
        let p = AudioParam::new("delayTime", 0.5, 0.0, 1.0);
        let mut values = [0.0; 16];
        p.fill(&mut values);
        assert!(values.iter().all(|&v| v == 0.5));
    }
}

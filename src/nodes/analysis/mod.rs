//! Analysis nodes (pass audio through unchanged while measuring it)

mod fft;
mod spectral_monitor;

pub use fft::{blackman, RealFft};
pub use spectral_monitor::{AnalysisWindow, SpectralMonitor, SpectralProbe, DEFAULT_WINDOW_SIZE};

//! Driving a context from an audio device callback.
//!
//! Device callbacks ask for however many frames the driver feels like.
//! [`Renderer`] re-blocks those requests into whole quanta, calling
//! [`AudioContext::render_quantum`] each time its buffered quantum runs out.
//!
//! With the `cpal_sink` feature, [`CpalDevice`] discovers output devices
//! and runs a [`Renderer`] inside the cpal stream callback.
//!
//! # Example: List and Select a Device
//!
//! ```no_run
//! # #[cfg(feature = "cpal_sink")]
//! # fn main() -> Result<(), klangnetz::device::DeviceError> {
//! use std::sync::Arc;
//! use klangnetz::AudioContext;
//! use klangnetz::device::CpalDevice;
//!
//! for (i, device) in CpalDevice::list_outputs().iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)", i, device.name(), device.sample_rate(), device.channels());
//! }
//!
//! let device = CpalDevice::default_output().expect("no output device");
//! let ctx = Arc::new(AudioContext::new(device.sample_rate()).with_channels(device.channels() as usize));
//! let _stream = device.start(ctx.clone())?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "cpal_sink"))]
//! # fn main() {}
//! ```

use std::sync::Arc;

use dasp_graph::Buffer;

use crate::bus::QUANTUM;
use crate::context::AudioContext;

/// Fills interleaved device buffers from fixed-size render quanta.
pub struct Renderer {
    context: Arc<AudioContext>,
    quantum: Vec<Buffer>,
    position: usize,
}

impl Renderer {
    /// Render `channels` interleaved channels from `context`.
    pub fn new(context: Arc<AudioContext>, channels: usize) -> Self {
        Self {
            context,
            quantum: vec![Buffer::SILENT; channels.max(1)],
            position: QUANTUM,
        }
    }

    #[inline]
    pub fn context(&self) -> &Arc<AudioContext> {
        &self.context
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.quantum.len()
    }

    /// Fill `data` with interleaved frames, rendering new quanta as needed.
    ///
    /// Frames left over from one call are handed out first on the next, so the
    /// context always renders whole quanta regardless of the callback size.
    pub fn render_interleaved(&mut self, data: &mut [f32]) {
        let channels = self.quantum.len();
        for frame in data.chunks_mut(channels) {
            if self.position == QUANTUM {
                self.context.render_quantum(&mut self.quantum);
                self.position = 0;
            }
            for (sample, buffer) in frame.iter_mut().zip(&self.quantum) {
                *sample = buffer[self.position];
            }
            self.position += 1;
        }
    }
}

#[cfg(feature = "cpal_sink")]
pub use self::cpal_device::{CpalDevice, DeviceError};

#[cfg(feature = "cpal_sink")]
mod cpal_device {
    use std::sync::Arc;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, SupportedStreamConfig};
    use thiserror::Error;
    use tracing::{error, info, warn};

    use super::Renderer;
    use crate::context::AudioContext;

    #[derive(Debug, Error)]
    pub enum DeviceError {
        #[error("failed to build output stream")]
        Build(#[from] cpal::BuildStreamError),

        #[error("failed to start output stream")]
        Play(#[from] cpal::PlayStreamError),

        #[error("unsupported sample format {0:?}")]
        UnsupportedFormat(SampleFormat),
    }

    /// A discovered audio output device.
    ///
    /// Use [`CpalDevice::default_output`] to get the system default, or
    /// [`CpalDevice::list_outputs`] to enumerate all available devices.
    pub struct CpalDevice {
        device: cpal::Device,
        config: SupportedStreamConfig,

        name: String,
        sample_rate: u32,
        channels: u16,
    }

    impl CpalDevice {
        fn from_device(device: cpal::Device) -> Option<Self> {
            let config = device.default_output_config().ok()?;
            let name = device.name().unwrap_or_else(|_| "Unknown".into());
            Some(Self {
                sample_rate: config.sample_rate().0,
                channels: config.channels(),
                name,
                device,
                config,
            })
        }

        /// Get the system's default output device.
        ///
        /// Returns `None` if no audio device is available.
        pub fn default_output() -> Option<Self> {
            cpal::default_host()
                .default_output_device()
                .and_then(Self::from_device)
        }

        /// List all available output devices
        pub fn list_outputs() -> Vec<Self> {
            cpal::default_host()
                .output_devices()
                .map(|devices| devices.filter_map(Self::from_device).collect())
                .unwrap_or_default()
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        pub fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        pub fn channels(&self) -> u16 {
            self.channels
        }

        /// Open a stream rendering `context` and start it.
        ///
        /// Audio plays for as long as the returned stream is alive.
        pub fn start(&self, context: Arc<AudioContext>) -> Result<cpal::Stream, DeviceError> {
            if context.sample_rate() != self.sample_rate {
                warn!(
                    context = context.sample_rate(),
                    device = self.sample_rate,
                    "context and device sample rates differ, no resampling is done"
                );
            }

            let renderer = Renderer::new(context, self.channels as usize);
            let stream = match self.config.sample_format() {
                SampleFormat::F32 => self.build::<f32>(renderer, |s| s)?,
                SampleFormat::I16 => self.build::<i16>(renderer, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?,
                SampleFormat::U16 => {
                    self.build::<u16>(renderer, |s| ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16)?
                }
                format => return Err(DeviceError::UnsupportedFormat(format)),
            };
            stream.play()?;

            info!(device = %self.name, sample_rate = self.sample_rate, channels = self.channels, "output stream started");
            Ok(stream)
        }

        fn build<T>(&self, mut renderer: Renderer, convert: fn(f32) -> T) -> Result<cpal::Stream, DeviceError>
        where
            T: cpal::SizedSample,
        {
            // Grows to the largest callback size once, then stays put.
            let mut scratch: Vec<f32> = Vec::new();
            let stream = self.device.build_output_stream(
                &self.config.config(),
                move |data: &mut [T], _| {
                    scratch.resize(data.len(), 0.0);
                    renderer.render_interleaved(&mut scratch);
                    for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                        *out = convert(s);
                    }
                },
                |err| error!(%err, "output stream error"),
                None,
            )?;
            Ok(stream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::Sine;

    #[test]
    fn renders_whole_quanta_across_odd_callback_sizes() {
        let ctx = Arc::new(AudioContext::new(48_000));
        let mut renderer = Renderer::new(ctx.clone(), 2);

        let mut data = vec![0.0; 2 * 50];
        renderer.render_interleaved(&mut data);
        assert_eq!(ctx.current_frame(), QUANTUM as u64);
        assert_eq!(QUANTUM - renderer.position, 14);

        // 14 buffered + 64 + 6 frames: two more quanta.
        let mut data = vec![0.0; 2 * (QUANTUM + 20)];
        renderer.render_interleaved(&mut data);
        assert_eq!(ctx.current_frame(), 3 * QUANTUM as u64);
        assert_eq!(QUANTUM - renderer.position, QUANTUM - 6);
    }

    #[test]
    fn interleaves_every_channel() {
        let ctx = Arc::new(AudioContext::new(48_000));
        {
            let mut g = ctx.graph_lock();
            let sine = g.add(Sine::new(1_000.0));
            g.connect(sine.id(), ctx.destination()).unwrap();
        }
        let mut renderer = Renderer::new(ctx, 2);
        let mut data = vec![0.0; 2 * QUANTUM];
        renderer.render_interleaved(&mut data);

        assert!(data.iter().any(|&s| s != 0.0));
        for frame in data.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }
}

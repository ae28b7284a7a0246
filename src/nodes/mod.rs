//! Built-in audio nodes.
//!
//! ## Sources ([`source`])
//!
//! - [`Sine`] - Sine oscillator with frequency/amplitude params
//! - [`Supersaw`] - Detuned saw bank shaped by an ADSR [`Envelope`]
//!
//! ## Effects ([`effect`])
//!
//! - [`Gain`] - Smoothed volume control
//! - [`Delay`] - Fractional delay built on [`DelayLine`]
//!
//! ## Analysis ([`analysis`])
//!
//! - [`SpectralMonitor`] - Pass-through FFT analyzer, queried through a [`SpectralProbe`]
//!
//! ## Sinks ([`sink`])
//!
//! - [`Destination`] - The context's output bus
//!
//! Continuous controls are [`AudioParam`](crate::AudioParam)s exposed by
//! accessor methods; nodes with discrete commands take messages through
//! their [`Handle`](crate::Handle) (see [`SupersawMessage`]).

pub mod analysis;
pub mod effect;
pub mod sink;
pub mod source;

pub use analysis::{SpectralMonitor, SpectralProbe};
pub use effect::{Delay, DelayLine, Gain};
pub use sink::Destination;
pub use source::{Adsr, Envelope, EnvelopeState, Sine, Supersaw, SupersawMessage};

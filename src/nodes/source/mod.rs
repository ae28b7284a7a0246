//! Audio sources (generate audio, no inputs)

pub mod envelope;
mod sine;
mod supersaw;

pub use envelope::{Adsr, Envelope, EnvelopeState};
pub use sine::Sine;
pub use supersaw::{Supersaw, SupersawMessage, MAX_SAW_COUNT};

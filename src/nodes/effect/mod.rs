//! Audio effects (process audio: inputs → outputs)

mod delay;
mod gain;

pub use delay::{Delay, DelayLine, MAX_DELAY_TIME};
pub use gain::Gain;

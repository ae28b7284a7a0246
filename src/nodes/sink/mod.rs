//! Audio sinks (consume audio, no outputs visible to the user)

mod destination;

pub use destination::Destination;
pub(crate) use destination::RenderRoot;

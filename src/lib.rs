//! Klangnetz - Web-Audio-style node graph with a graph/render lock discipline
//!
//! An [`AudioContext`] owns a graph of [`AudioNode`]s and renders it one
//! fixed-size quantum ([`QUANTUM`] frames) at a time, typically from a
//! device callback (see [`device::Renderer`]).
//!
//! Two execution domains share a context:
//!
//! - the **control domain** edits topology through a [`GraphLock`], writes
//!   [`AudioParam`]s and sends messages through node [`Handle`]s;
//! - the **render domain** holds a [`RenderLock`] for the duration of one
//!   quantum and is the only writer of audio state.
//!
//! Topology edits requested while a quantum is rendering are queued and
//! applied as soon as it finishes, so control threads never stall the
//! device callback.
//!
//! # Quick Start
//!
//! ```
//! use dasp_graph::Buffer;
//! use klangnetz::nodes::{Delay, SpectralMonitor, Supersaw};
//! use klangnetz::AudioContext;
//!
//! let ctx = AudioContext::new(48_000);
//!
//! let saw = Supersaw::new(110.0).with_saw_count(7).with_detune(25.0);
//! let delay = Delay::new(48_000, 1.0)?;
//! delay.delay_time().set_value(0.25);
//! let monitor = SpectralMonitor::new(1024)?;
//! let probe = monitor.probe();
//!
//! let mut g = ctx.graph_lock();
//! let mut saw = g.add(saw);
//! let delay = g.add(delay);
//! let monitor = g.add(monitor);
//! g.connect(saw.id(), delay.id())?;
//! g.connect(delay.id(), ctx.destination())?;
//! g.connect(saw.id(), monitor.id())?;
//! g.add_automatic_pull(monitor.id())?;
//! drop(g);
//!
//! saw.note_on().ok();
//!
//! let mut out = vec![Buffer::SILENT; ctx.channels()];
//! for _ in 0..16 {
//!     ctx.render_quantum(&mut out);
//! }
//!
//! let mut magnitudes = Vec::new();
//! probe.spectral_mag(&mut magnitudes);
//! assert_eq!(magnitudes.len(), 512);
//! # Ok::<(), klangnetz::Error>(())
//! ```

mod bus;
mod context;
mod error;
mod graph;
mod lock;
mod node;
mod param;

pub mod device;
pub mod nodes;

pub use bus::QUANTUM;
pub use context::AudioContext;
pub use error::{Error, Result};
pub use graph::Handle;
pub use lock::{GraphLock, RenderLock, DEFAULT_QUEUE_SIZE};
pub use node::{AudioNode, NodeId, ProcessContext};
pub use param::AudioParam;

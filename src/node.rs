//! Core node trait and context types.

use dasp_graph::{Buffer, Input};

use crate::lock::RenderLock;

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Frames to write into each output channel this call (always [`QUANTUM`](crate::QUANTUM))
    pub buffer_size: usize,
}

/// Unique identifier for a node within a graph.
///
/// Ids are weak references: holding one does not keep the node alive, and
/// using one after the node was removed yields
/// [`Error::InvalidNode`](crate::Error::InvalidNode).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// The processing contract every unit in the graph satisfies.
///
/// Nodes can be:
/// - **Sources**: Generate audio (0 inputs, 1+ outputs) - oscillators
/// - **Effects**: Process audio (1+ inputs, 1+ outputs) - gain, delays, analyzers
/// - **Sinks**: Consume audio (1+ inputs, 0 outputs) - the destination
///
/// # Real-time rules
///
/// [`process`](Self::process) and [`reset`](Self::reset) run on the render
/// thread under a hard per-quantum deadline. They must not block
/// indefinitely, allocate, or take unbounded locks. Invalid input (nothing
/// connected, unexpected channel count) is answered with silence, never an
/// error or a panic.
///
/// # Parameters and messages
///
/// Continuous controls are [`AudioParam`](crate::AudioParam)s the node reads
/// each quantum. Discrete commands (note on, note off, ...) arrive as
/// messages through a lock-free queue and are drained at the start of each
/// `process` call. Nodes without commands use `()`:
///
/// ```
/// use dasp_graph::{Buffer, Input};
/// use klangnetz::{AudioNode, AudioParam, ProcessContext, RenderLock};
///
/// struct Dc {
///     level: AudioParam,
/// }
///
/// impl AudioNode for Dc {
///     type Message = ();
///
///     fn process(
///         &mut self,
///         _r: &RenderLock,
///         _ctx: &ProcessContext,
///         _messages: impl Iterator<Item = ()>,
///         _inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         let level = self.level.value();
///         for buffer in outputs.iter_mut() {
///             buffer.iter_mut().for_each(|s| *s = level);
///         }
///     }
///
///     fn reset(&mut self, _r: &RenderLock) {}
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Message type for discrete commands (use `()` if none needed).
    type Message: Send + 'static;

    /// Process one quantum.
    ///
    /// 1. Drain and handle all pending messages
    /// 2. Read params and inputs
    /// 3. Write `ctx.buffer_size` samples into every output channel
    fn process(
        &mut self,
        r: &RenderLock,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Restore internal state as if freshly constructed.
    fn reset(&mut self, r: &RenderLock);

    /// Seconds of output the node can still produce after its input falls silent.
    fn tail_time(&self) -> f64 {
        0.0
    }

    /// Seconds of look-ahead the node needs.
    fn latency_time(&self) -> f64 {
        0.0
    }

    /// Whether silent input guarantees silent output once the tail has passed.
    ///
    /// The graph only skips a node when this holds *and* its inputs have been
    /// silent for longer than `tail_time + latency_time`. Sources have no
    /// inputs, so for them this alone decides whether the quantum is skipped.
    fn propagates_silence(&self, _r: &RenderLock) -> bool {
        false
    }

    /// Number of audio input connections accepted (0 for sources).
    fn num_inputs(&self) -> usize {
        0
    }

    /// Number of output channels.
    fn num_outputs(&self) -> usize {
        1
    }
}

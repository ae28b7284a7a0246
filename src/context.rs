//! The audio context: owns the graph, mints lock tokens, renders quanta.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use dasp_graph::Buffer;
use tracing::{info, warn};

use crate::bus::QUANTUM;
use crate::graph::{AudioGraph, GraphEdit};
use crate::lock::{GraphLock, RenderLock};
use crate::node::NodeId;

const ROOT: NodeId = NodeId(0);
const DESTINATION: NodeId = NodeId(1);

/// Owner of an audio node graph.
///
/// An `AudioContext` is shared (typically in an `Arc`) between a render
/// thread, which calls [`render_quantum`](Self::render_quantum) once per
/// quantum from the device callback, and any number of control threads,
/// which edit the topology through [`graph_lock`](Self::graph_lock) and
/// steer nodes through params and message handles.
///
/// # Example
///
/// ```
/// use dasp_graph::Buffer;
/// use klangnetz::AudioContext;
/// use klangnetz::nodes::{Gain, Sine};
///
/// let ctx = AudioContext::new(48_000);
///
/// let mut g = ctx.graph_lock();
/// let sine = g.add(Sine::new(440.0));
/// let gain = g.add(Gain::new(0.5));
/// g.connect(sine.id(), gain.id()).unwrap();
/// g.connect(gain.id(), ctx.destination()).unwrap();
/// drop(g);
///
/// let mut out = vec![Buffer::SILENT; ctx.channels()];
/// ctx.render_quantum(&mut out);
/// assert!(out[0].iter().any(|&s| s != 0.0));
/// ```
pub struct AudioContext {
    graph: Mutex<AudioGraph>,
    pending: Mutex<Vec<GraphEdit>>,
    rendering: AtomicBool,

    sample_rate: u32,
    channels: usize,

    next_node_id: AtomicU32,
    frames_rendered: AtomicU64,
}

impl AudioContext {
    /// Create a context rendering stereo at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        info!(sample_rate, quantum = QUANTUM, "creating audio context");
        Self {
            graph: Mutex::new(AudioGraph::new(sample_rate, 2, ROOT, DESTINATION)),
            pending: Mutex::new(Vec::new()),
            rendering: AtomicBool::new(false),
            sample_rate,
            channels: 2,
            next_node_id: AtomicU32::new(DESTINATION.0 + 1),
            frames_rendered: AtomicU64::new(0),
        }
    }

    /// Set the number of destination channels (builder pattern).
    ///
    /// Rebuilds the (still empty) graph, so call this before adding nodes.
    pub fn with_channels(mut self, channels: usize) -> Self {
        let channels = channels.max(1);
        self.channels = channels;
        self.graph = Mutex::new(AudioGraph::new(self.sample_rate, channels, ROOT, DESTINATION));
        self.next_node_id = AtomicU32::new(DESTINATION.0 + 1);
        self
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the destination bus.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The node everything audible ends up in.
    #[inline]
    pub fn destination(&self) -> NodeId {
        DESTINATION
    }

    /// Frames rendered since creation (or the last [`reset`](Self::reset)).
    pub fn current_frame(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// [`current_frame`](Self::current_frame) in seconds.
    pub fn current_time(&self) -> f64 {
        self.current_frame() as f64 / self.sample_rate as f64
    }

    /// Acquire the right to edit the topology.
    ///
    /// Never waits on a render pass: if one is running, the returned lock is
    /// deferred and its edits are applied when the pass releases its token.
    /// Waits briefly if another control thread holds the graph.
    pub fn graph_lock(&self) -> GraphLock<'_> {
        match self.graph.try_lock() {
            Ok(graph) => GraphLock::immediate(self, graph),
            Err(TryLockError::Poisoned(poisoned)) => GraphLock::immediate(self, poisoned.into_inner()),
            Err(TryLockError::WouldBlock) if self.rendering.load(Ordering::Acquire) => {
                GraphLock::deferred(self)
            }
            Err(TryLockError::WouldBlock) => GraphLock::immediate(self, self.lock_graph()),
        }
    }

    /// Render one quantum into `output`.
    ///
    /// Acquires the render token, walks the graph in dependency order,
    /// copies the destination bus into `output` (up- or down-mixing to
    /// `output.len()` channels), then applies edits that were deferred while
    /// the token was held.
    pub fn render_quantum(&self, output: &mut [Buffer]) {
        self.rendering.store(true, Ordering::Release);
        let mut graph = self.lock_graph();

        {
            let r = RenderLock::mint();
            graph.process(&r);
            graph.read_destination(output);
        }

        // Control threads queue edits with a blocking lock; never wait on them here.
        if let Ok(mut pending) = self.pending.try_lock() {
            apply_all(&mut graph, &mut pending);
        }

        self.frames_rendered.fetch_add(QUANTUM as u64, Ordering::Release);
        drop(graph);
        self.rendering.store(false, Ordering::Release);
    }

    /// Reset every node as if freshly constructed and rewind the clock.
    pub fn reset(&self) {
        let mut graph = self.lock_graph();
        let r = RenderLock::mint();
        graph.reset(&r);
        self.frames_rendered.store(0, Ordering::Release);
    }

    /// Whether `id` refers to a live node. Waits for any render pass to finish.
    ///
    /// Blocks on the graph mutex, so calling this (or [`is_connected`](Self::is_connected)
    /// and [`node_count`](Self::node_count)) while the same thread holds an
    /// immediate [`GraphLock`] deadlocks. Ask the lock instead, see
    /// [`GraphLock::contains`].
    pub fn contains(&self, id: NodeId) -> bool {
        self.lock_graph().contains(id)
    }

    /// Whether `from` is routed into `to`. Same caveat as [`contains`](Self::contains).
    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.lock_graph().is_connected(from, to)
    }

    /// Number of nodes, including the destination. Same caveat as [`contains`](Self::contains).
    pub fn node_count(&self) -> usize {
        self.lock_graph().node_count()
    }

    /// Number of edits waiting for the current render pass to end.
    pub fn pending_edits(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn defer(&self, edit: GraphEdit) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(edit);
    }

    pub(crate) fn drain_pending(&self, graph: &mut AudioGraph) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        apply_all(graph, &mut pending);
    }

    fn lock_graph(&self) -> MutexGuard<'_, AudioGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_all(graph: &mut AudioGraph, pending: &mut Vec<GraphEdit>) {
    for edit in pending.drain(..) {
        if let Err(err) = graph.apply(edit) {
            warn!(%err, "dropping deferred graph edit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::Sine;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn context_is_shareable_across_threads() {
        assert_send_sync::<AudioContext>();
    }

    #[test]
    fn graph_lock_answers_queries_mid_edit() {
        let ctx = AudioContext::new(48_000);
        let mut g = ctx.graph_lock();
        let sine = g.add(Sine::new(440.0));
        g.connect(sine.id(), ctx.destination()).unwrap();

        assert!(g.contains(sine.id()));
        assert!(g.is_connected(sine.id(), ctx.destination()));
        assert_eq!(g.node_count(), 2);
        drop(g);

        assert_eq!(ctx.node_count(), 2);
    }
}

//! Capability tokens for the two execution domains.
//!
//! A [`GraphLock`] authorizes topology edits, a [`RenderLock`] authorizes
//! per-quantum processing. Both are only minted inside this crate, by the
//! [`AudioContext`] and the graph it owns, so holding one is proof that the
//! matching domain is active.
//!
//! The render domain is the sole writer of audio state and the control
//! domain is the sole writer of topology. When a control thread asks for a
//! [`GraphLock`] while a quantum is being rendered it does not wait: the lock
//! comes back in *deferred* mode and every edit made through it is queued,
//! then applied by the render thread as soon as its token is released.
//!
//! [`AudioContext`]: crate::AudioContext

use std::marker::PhantomData;
use std::sync::MutexGuard;

use tracing::{debug, trace};

use crate::context::AudioContext;
use crate::error::Result;
use crate::graph::{AudioGraph, GraphEdit, Handle, NodeWrapper};
use crate::node::{AudioNode, NodeId};

/// Message queue length used by [`GraphLock::add`].
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Proof that the caller is inside a render pass.
///
/// Zero-sized, neither `Send` nor `Sync`, and only constructible inside the
/// crate while the render side of the graph is held.
pub struct RenderLock {
    _not_send: PhantomData<*const ()>,
}

impl RenderLock {
    /// Only call this while holding the graph mutex on the render path.
    pub(crate) fn mint() -> Self {
        Self {
            _not_send: PhantomData,
        }
    }
}

enum Mode<'a> {
    Immediate(MutexGuard<'a, AudioGraph>),
    Deferred,
}

/// Exclusive right to edit the topology of an [`AudioContext`].
///
/// While a `GraphLock` is held in immediate mode no render pass can begin.
/// In deferred mode (a render pass was running when the lock was requested)
/// edits are queued and validated when they are applied; a rejected edit is
/// logged rather than returned.
pub struct GraphLock<'a> {
    ctx: &'a AudioContext,
    mode: Mode<'a>,
}

impl<'a> GraphLock<'a> {
    pub(crate) fn immediate(ctx: &'a AudioContext, mut graph: MutexGuard<'a, AudioGraph>) -> Self {
        // Anything queued while rendering goes in first, so edits keep their order.
        ctx.drain_pending(&mut graph);
        Self {
            ctx,
            mode: Mode::Immediate(graph),
        }
    }

    pub(crate) fn deferred(ctx: &'a AudioContext) -> Self {
        trace!("render pass in progress, graph edits will be deferred");
        Self {
            ctx,
            mode: Mode::Deferred,
        }
    }

    /// Whether edits made through this lock are queued behind a render pass.
    pub fn is_deferred(&self) -> bool {
        matches!(self.mode, Mode::Deferred)
    }

    /// Add a node to the graph, returning a handle for connections and messages.
    pub fn add<N: AudioNode>(&mut self, node: N) -> Handle<N::Message> {
        self.add_with_queue_size(node, DEFAULT_QUEUE_SIZE)
    }

    /// Add a node with a custom message queue size.
    pub fn add_with_queue_size<N: AudioNode>(
        &mut self,
        node: N,
        queue_size: usize,
    ) -> Handle<N::Message> {
        let id = self.ctx.next_node_id();
        let num_outputs = node.num_outputs();
        let (sender, wrapper) = NodeWrapper::boxed(node, queue_size);

        debug!(?id, num_outputs, node = core::any::type_name::<N>(), "adding node");
        self.submit(GraphEdit::Add {
            id,
            node: wrapper,
            num_outputs,
        })
        // Adding a fresh id cannot fail.
        .ok();

        Handle { id, sender }
    }

    /// Route the output of `from` into the input of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        debug!(?from, ?to, "connect");
        self.submit(GraphEdit::Connect(from, to))
    }

    /// Remove the connection from `from` to `to`.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        debug!(?from, ?to, "disconnect");
        self.submit(GraphEdit::Disconnect(from, to))
    }

    /// Remove a node and every connection touching it.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        debug!(?id, "removing node");
        self.submit(GraphEdit::Remove(id))
    }

    /// Render `id` every quantum even if nothing downstream reaches the destination.
    pub fn add_automatic_pull(&mut self, id: NodeId) -> Result<()> {
        debug!(?id, "adding automatic pull node");
        self.submit(GraphEdit::AutomaticPull(id, true))
    }

    pub fn remove_automatic_pull(&mut self, id: NodeId) -> Result<()> {
        debug!(?id, "removing automatic pull node");
        self.submit(GraphEdit::AutomaticPull(id, false))
    }

    /// Whether `id` refers to a live node.
    ///
    /// A deferred lock waits for the running render pass and does not see
    /// its own queued edits.
    pub fn contains(&self, id: NodeId) -> bool {
        match &self.mode {
            Mode::Immediate(graph) => graph.contains(id),
            Mode::Deferred => self.ctx.contains(id),
        }
    }

    /// Whether `from` is routed into `to`. Same caveat as [`contains`](Self::contains).
    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        match &self.mode {
            Mode::Immediate(graph) => graph.is_connected(from, to),
            Mode::Deferred => self.ctx.is_connected(from, to),
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.mode {
            Mode::Immediate(graph) => graph.node_count(),
            Mode::Deferred => self.ctx.node_count(),
        }
    }

    fn submit(&mut self, edit: GraphEdit) -> Result<()> {
        match &mut self.mode {
            Mode::Immediate(graph) => graph.apply(edit),
            Mode::Deferred => {
                self.ctx.defer(edit);
                Ok(())
            }
        }
    }
}

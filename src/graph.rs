//! Audio graph - owns nodes and message queues
//!
//! This is the render-domain half of an [`AudioContext`](crate::AudioContext).
//! It is only ever touched while the context's graph mutex is held, either by
//! the render thread (with a [`RenderLock`]) or by a control thread holding an
//! immediate [`GraphLock`](crate::GraphLock).

use dasp_graph::{Buffer, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::graph::NodeIndex;
use petgraph::{algo, Direction};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::bus;
use crate::error::{Error, Result};
use crate::lock::RenderLock;
use crate::node::{AudioNode, NodeId, ProcessContext};
use crate::nodes::sink::{Destination, RenderRoot};

/// A handle to a node in an [`AudioContext`](crate::AudioContext).
///
/// Returned by [`GraphLock::add`](crate::GraphLock::add). Use [`id`](Self::id)
/// to make connections and [`send`](Self::send) to deliver commands.
///
/// Messages are buffered in a lock-free ring buffer and handled at the start
/// of the node's next quantum. If the buffer is full, `send` returns
/// `Err(msg)` with the message that couldn't be sent.
pub struct Handle<M: Send + 'static> {
    pub(crate) id: NodeId,
    pub(crate) sender: Producer<M>,
}

impl<M: Send + 'static> Handle<M> {
    /// Send a message to the node (applied next quantum).
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

// Type-erased wrapper so we can store heterogeneous nodes
pub(crate) trait ErasedNode: Send {
    fn process_erased(
        &mut self,
        r: &RenderLock,
        ctx: &ProcessContext,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );
    fn reset_erased(&mut self, r: &RenderLock);
    fn has_messages(&self) -> bool;
    fn tail_time(&self) -> f64;
    fn latency_time(&self) -> f64;
    fn propagates_silence(&self, r: &RenderLock) -> bool;
    fn num_inputs(&self) -> usize;
}

pub(crate) struct NodeWrapper<N: AudioNode> {
    node: N,
    receiver: Consumer<N::Message>,
}

impl<N: AudioNode> NodeWrapper<N> {
    pub(crate) fn boxed(node: N, queue_size: usize) -> (Producer<N::Message>, Box<dyn ErasedNode>) {
        let (producer, consumer) = RingBuffer::new(queue_size);
        let wrapper = Self {
            node,
            receiver: consumer,
        };
        (producer, Box::new(wrapper))
    }
}

impl<N: AudioNode> ErasedNode for NodeWrapper<N> {
    fn process_erased(
        &mut self,
        r: &RenderLock,
        ctx: &ProcessContext,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        // Split borrow to avoid conflict between receiver and node
        let receiver = &mut self.receiver;
        let node = &mut self.node;

        // Create a draining iterator directly from the consumer - no allocation!
        let messages = core::iter::from_fn(|| receiver.pop().ok());
        node.process(r, ctx, messages, inputs, outputs);

        // Whatever the node left unread is stale by next quantum.
        while self.receiver.pop().is_ok() {}
    }

    fn reset_erased(&mut self, r: &RenderLock) {
        self.node.reset(r);
    }

    fn has_messages(&self) -> bool {
        !self.receiver.is_empty()
    }

    fn tail_time(&self) -> f64 {
        self.node.tail_time()
    }

    fn latency_time(&self) -> f64 {
        self.node.latency_time()
    }

    fn propagates_silence(&self, r: &RenderLock) -> bool {
        self.node.propagates_silence(r)
    }

    fn num_inputs(&self) -> usize {
        self.node.num_inputs()
    }
}

// Adapter for dasp_graph
pub(crate) struct DaspAdapter {
    node: Box<dyn ErasedNode>,
    ctx: ProcessContext,
    /// Consecutive frames of all-zero input, including the current quantum.
    silent_frames: u64,
}

impl DaspAdapter {
    fn can_skip(&self, r: &RenderLock) -> bool {
        if self.silent_frames == 0 || self.node.has_messages() || !self.node.propagates_silence(r) {
            return false;
        }
        let horizon = (self.node.tail_time() + self.node.latency_time()) * self.ctx.sample_rate as f64;
        // Silence already pushed through the node before this quantum.
        let settled = self.silent_frames - self.ctx.buffer_size as u64;
        settled as f64 > horizon.ceil()
    }
}

impl dasp_graph::Node for DaspAdapter {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        // dasp_graph only calls into nodes from `AudioGraph::process`, which
        // runs with the graph mutex held on the render path.
        let r = RenderLock::mint();

        if bus::is_silent(inputs) {
            self.silent_frames = self.silent_frames.saturating_add(self.ctx.buffer_size as u64);
        } else {
            self.silent_frames = 0;
        }

        if self.can_skip(&r) {
            bus::silence(outputs);
            return;
        }
        self.node.process_erased(&r, &self.ctx, inputs, outputs);
    }
}

/// A structural edit, applied immediately or queued behind a render pass.
pub(crate) enum GraphEdit {
    Add {
        id: NodeId,
        node: Box<dyn ErasedNode>,
        num_outputs: usize,
    },
    Connect(NodeId, NodeId),
    Disconnect(NodeId, NodeId),
    Remove(NodeId),
    AutomaticPull(NodeId, bool),
}

type InnerGraph = petgraph::graph::Graph<NodeData<DaspAdapter>, ()>;

/// An audio processing graph at a fixed sample rate
pub(crate) struct AudioGraph {
    graph: InnerGraph,
    processor: Processor<InnerGraph>,
    ctx: ProcessContext,

    node_indices: HashMap<NodeId, NodeIndex>,

    // Everything that gets rendered feeds `root`: the destination plus any
    // automatic pull nodes.
    root: NodeId,
    destination: NodeId,
}

impl AudioGraph {
    /// Create a new graph with the given sample rate and destination layout.
    pub fn new(sample_rate: u32, channels: usize, root: NodeId, destination: NodeId) -> Self {
        let mut graph = Self {
            graph: InnerGraph::with_capacity(64, 64),
            processor: Processor::with_capacity(64),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: bus::QUANTUM,
            },
            node_indices: HashMap::new(),
            root,
            destination,
        };

        let (_, node) = NodeWrapper::boxed(RenderRoot, 1);
        graph.add_node(root, node, 0);
        let (_, node) = NodeWrapper::boxed(Destination::new(channels), 1);
        graph.add_node(destination, node, channels);

        let destination = graph.node_indices[&destination];
        let root = graph.node_indices[&root];
        graph.graph.add_edge(destination, root, ());
        graph
    }

    pub fn apply(&mut self, edit: GraphEdit) -> Result<()> {
        match edit {
            GraphEdit::Add {
                id,
                node,
                num_outputs,
            } => {
                self.add_node(id, node, num_outputs);
                Ok(())
            }
            GraphEdit::Connect(from, to) => self.connect(from, to),
            GraphEdit::Disconnect(from, to) => self.disconnect(from, to),
            GraphEdit::Remove(id) => self.remove(id),
            GraphEdit::AutomaticPull(id, enabled) => self.set_automatic_pull(id, enabled),
        }
    }

    fn add_node(&mut self, id: NodeId, node: Box<dyn ErasedNode>, num_outputs: usize) {
        let adapter = DaspAdapter {
            node,
            ctx: self.ctx,
            silent_frames: 0,
        };

        let node_data = match num_outputs {
            // 0 outputs = sink, but dasp_graph still needs a buffer for inputs
            0 => NodeData::new1(adapter),
            n => NodeData::new(adapter, vec![Buffer::SILENT; n]),
        };

        let idx = self.graph.add_node(node_data);
        self.node_indices.insert(id, idx);
    }

    fn index(&self, id: NodeId) -> Result<NodeIndex> {
        if id == self.root {
            return Err(Error::InvalidNode(id));
        }
        self.node_indices.get(&id).copied().ok_or(Error::InvalidNode(id))
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let from_idx = self.index(from)?;
        let to_idx = self.index(to)?;

        if self.graph.find_edge(from_idx, to_idx).is_some() {
            return Err(Error::AlreadyConnected);
        }

        let connected = self.graph.neighbors_directed(to_idx, Direction::Incoming).count();
        if connected >= self.graph[to_idx].node.node.num_inputs() {
            return Err(Error::InputUnavailable(to));
        }

        if from_idx == to_idx || algo::has_path_connecting(&self.graph, to_idx, from_idx, None) {
            return Err(Error::CycleDetected);
        }

        self.graph.add_edge(from_idx, to_idx, ());
        Ok(())
    }

    fn disconnect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let from_idx = self.index(from)?;
        let to_idx = self.index(to)?;
        let edge = self
            .graph
            .find_edge(from_idx, to_idx)
            .ok_or(Error::NotConnected)?;
        self.graph.remove_edge(edge);
        Ok(())
    }

    fn remove(&mut self, id: NodeId) -> Result<()> {
        if id == self.destination || id == self.root {
            return Err(Error::ProtectedNode(id));
        }
        let idx = self.index(id)?;

        self.graph.remove_node(idx);
        self.node_indices.remove(&id);

        // petgraph moves the last node into the freed slot.
        let moved = NodeIndex::new(self.graph.node_count());
        if moved != idx {
            if let Some(slot) = self.node_indices.values_mut().find(|slot| **slot == moved) {
                *slot = idx;
            }
        }
        Ok(())
    }

    fn set_automatic_pull(&mut self, id: NodeId, enabled: bool) -> Result<()> {
        let idx = self.index(id)?;
        if id == self.destination {
            return Ok(());
        }
        let root = self.node_indices[&self.root];
        match (enabled, self.graph.find_edge(idx, root)) {
            (true, None) => {
                self.graph.add_edge(idx, root, ());
            }
            (false, Some(edge)) => {
                self.graph.remove_edge(edge);
            }
            _ => (),
        }
        Ok(())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id != self.root && self.node_indices.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        // root is internal
        self.graph.node_count() - 1
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        match (self.index(from), self.index(to)) {
            (Ok(from), Ok(to)) => self.graph.find_edge(from, to).is_some(),
            _ => false,
        }
    }

    /// Render one quantum, walking every node that feeds the root in dependency order.
    pub fn process(&mut self, _r: &RenderLock) {
        if let Some(&root) = self.node_indices.get(&self.root) {
            self.processor.process(&mut self.graph, root);
        }
    }

    /// Copy the destination's output bus into `output`.
    pub fn read_destination(&self, output: &mut [Buffer]) {
        match self.node_indices.get(&self.destination) {
            Some(&idx) => bus::copy_into(&self.graph[idx].buffers, output),
            None => bus::silence(output),
        }
    }

    pub fn reset(&mut self, r: &RenderLock) {
        for idx in self.graph.node_indices() {
            let data = &mut self.graph[idx];
            data.node.node.reset_erased(r);
            data.node.silent_frames = 0;
            bus::silence(&mut data.buffers);
        }
    }
}

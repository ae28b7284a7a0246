//! The context's final mix bus.

use dasp_graph::{Buffer, Input};

use crate::bus;
use crate::lock::RenderLock;
use crate::node::{AudioNode, ProcessContext};

/// Sums everything connected to it into the context's channel layout.
///
/// Every [`AudioContext`](crate::AudioContext) owns exactly one of these,
/// reachable through [`AudioContext::destination`](crate::AudioContext::destination).
/// It cannot be removed.
pub struct Destination {
    channels: usize,
}

impl Destination {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
        }
    }
}

impl AudioNode for Destination {
    type Message = ();

    fn process(
        &mut self,
        _r: &RenderLock,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        bus::mix_inputs(inputs, outputs);
    }

    fn reset(&mut self, _r: &RenderLock) {}

    fn propagates_silence(&self, _r: &RenderLock) -> bool {
        true
    }

    #[inline]
    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    #[inline]
    fn num_outputs(&self) -> usize {
        self.channels
    }
}

/// Internal terminal node pulled by the processor each quantum.
///
/// The destination and every automatic pull node feed it, so a single
/// traversal from here visits everything that must be rendered.
pub(crate) struct RenderRoot;

impl AudioNode for RenderRoot {
    type Message = ();

    fn process(
        &mut self,
        _r: &RenderLock,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
    }

    fn reset(&mut self, _r: &RenderLock) {}

    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    fn num_outputs(&self) -> usize {
        0
    }
}

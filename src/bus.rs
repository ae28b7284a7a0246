//! Port plumbing: turning the set of connections feeding a node into a bus.
//!
//! A node has one input port. Every connection into it arrives as a separate
//! [`Input`] whose buffers are the source node's output bus. Those are summed
//! into the channel layout the node wants:
//!
//! - equal channel counts map channel to channel;
//! - a mono source is copied into every destination channel (upmix);
//! - a multi-channel source feeding a mono bus is averaged (downmix);
//! - otherwise channels are matched discretely, extras dropped or left silent.
//!
//! When a node has exactly one connection whose layout already matches,
//! [`summed`] hands back the source buffers directly instead of copying.

use dasp_graph::{Buffer, Input};

/// Frames per render call. Fixed for the life of every context.
pub const QUANTUM: usize = Buffer::LEN;

/// Zero every channel of a bus.
#[inline]
pub fn silence(bus: &mut [Buffer]) {
    for buffer in bus.iter_mut() {
        buffer.iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Whether every sample of every connection is zero.
pub fn is_silent(inputs: &[Input]) -> bool {
    inputs
        .iter()
        .flat_map(|input| input.buffers())
        .all(|buffer| buffer.iter().all(|&s| s == 0.0))
}

/// Whether any connection actually carries channels.
#[inline]
pub fn is_connected(inputs: &[Input]) -> bool {
    inputs.iter().any(|input| !input.buffers().is_empty())
}

/// Add `src` into `dst`, converting the channel layout.
pub fn mix_into(src: &[Buffer], dst: &mut [Buffer]) {
    if src.is_empty() || dst.is_empty() {
        return;
    }

    if dst.len() == 1 && src.len() > 1 {
        let scale = 1.0 / src.len() as f32;
        for channel in src {
            for (out, &s) in dst[0].iter_mut().zip(channel.iter()) {
                *out += s * scale;
            }
        }
        return;
    }

    for (ch, out) in dst.iter_mut().enumerate() {
        let channel = if src.len() == 1 {
            &src[0]
        } else if let Some(channel) = src.get(ch) {
            channel
        } else {
            continue;
        };
        for (o, &s) in out.iter_mut().zip(channel.iter()) {
            *o += s;
        }
    }
}

/// Sum every connection into `dst`, overwriting it.
///
/// Returns `false` (with `dst` silenced) when nothing is connected.
pub fn mix_inputs(inputs: &[Input], dst: &mut [Buffer]) -> bool {
    silence(dst);
    let mut connected = false;
    for input in inputs {
        let buffers = input.buffers();
        if buffers.is_empty() {
            continue;
        }
        connected = true;
        mix_into(buffers, dst);
    }
    connected
}

/// The node's input bus with `scratch.len()` channels.
///
/// Aliases the source buffers when a single connection already has the right
/// channel count, otherwise mixes into `scratch`. `None` when disconnected.
pub fn summed<'a>(inputs: &'a [Input], scratch: &'a mut [Buffer]) -> Option<&'a [Buffer]> {
    let mut connected = inputs.iter().filter(|input| !input.buffers().is_empty());
    let first = connected.next()?;
    if connected.next().is_none() && first.buffers().len() == scratch.len() {
        return Some(first.buffers());
    }

    mix_inputs(inputs, scratch);
    Some(scratch)
}

/// Copy `src` over `dst`, converting the channel layout.
pub fn copy_into(src: &[Buffer], dst: &mut [Buffer]) {
    silence(dst);
    mix_into(src, dst);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(value: f32) -> Buffer {
        let mut buffer = Buffer::SILENT;
        buffer.iter_mut().for_each(|s| *s = value);
        buffer
    }

    #[test]
    fn mono_is_upmixed_to_every_channel() {
        let src = [filled(0.5)];
        let mut dst = vec![Buffer::SILENT; 2];
        copy_into(&src, &mut dst);
        assert!(dst.iter().all(|ch| ch.iter().all(|&s| s == 0.5)));
    }

    #[test]
    fn stereo_is_averaged_into_mono() {
        let src = [filled(1.0), filled(0.0)];
        let mut dst = vec![Buffer::SILENT; 1];
        copy_into(&src, &mut dst);
        assert!(dst[0].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn matching_layouts_map_channel_to_channel() {
        let src = [filled(0.25), filled(-0.25)];
        let mut dst = vec![Buffer::SILENT; 2];
        copy_into(&src, &mut dst);
        assert!(dst[0].iter().all(|&s| s == 0.25));
        assert!(dst[1].iter().all(|&s| s == -0.25));
    }

    #[test]
    fn extra_destination_channels_stay_silent() {
        let src = [filled(1.0), filled(1.0)];
        let mut dst = vec![filled(9.0); 4];
        copy_into(&src, &mut dst);
        assert!(dst[2].iter().chain(dst[3].iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn disconnected_input_yields_none() {
        let mut scratch = vec![Buffer::SILENT; 2];
        assert!(summed(&[], &mut scratch).is_none());
        assert!(!is_connected(&[]));
        assert!(is_silent(&[]));
    }
}

//! Point-to-point transport between ranks.
//!
//! The engine assumes a reliable transport with FIFO delivery per
//! sender-receiver channel and sees it only through the [`Transport`]
//! trait. The provided implementation is an in-process mesh of crossbeam
//! channels: each rank owns one receiver, and cloned senders to every
//! peer. Nothing else is shared: ranks exchange only serialized words.

use crate::message::{Message, MessageTag};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Primitive send/receive of tagged word buffers.
pub trait Transport {
    /// This rank's identifier.
    fn rank(&self) -> u16;

    /// Number of ranks in the world.
    fn world_size(&self) -> u16;

    /// Deliver a message to `destination` (which may be this rank).
    fn send(&self, destination: u16, tag: MessageTag, payload: Vec<u64>);

    /// Take the next delivered message, if one is already waiting.
    fn try_receive(&self) -> Option<Message>;

    /// Wait up to `timeout` for the next delivered message.
    fn receive_timeout(&self, timeout: Duration) -> Option<Message>;
}

/// Crossbeam-channel mesh transport for in-process multi-rank runs.
pub struct ChannelTransport {
    rank: u16,
    peers: Vec<Sender<Message>>,
    inbox: Receiver<Message>,
}

/// Build a fully connected mesh: one transport per rank.
#[must_use]
pub fn channel_mesh(world_size: u16) -> Vec<ChannelTransport> {
    let mut senders = Vec::with_capacity(world_size as usize);
    let mut inboxes = Vec::with_capacity(world_size as usize);
    for _ in 0..world_size {
        let (sender, receiver) = unbounded();
        senders.push(sender);
        inboxes.push(receiver);
    }
    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelTransport {
            rank: rank as u16,
            peers: senders.clone(),
            inbox,
        })
        .collect()
}

impl Transport for ChannelTransport {
    fn rank(&self) -> u16 {
        self.rank
    }

    fn world_size(&self) -> u16 {
        self.peers.len() as u16
    }

    fn send(&self, destination: u16, tag: MessageTag, payload: Vec<u64>) {
        let message = Message { source: self.rank, tag, payload };
        if self.peers[destination as usize].send(message).is_err() {
            // The peer already shut down; only possible after Kill.
            log::debug!("rank {}: dropped {tag:?} to departed rank {destination}", self.rank);
        }
    }

    fn try_receive(&self) -> Option<Message> {
        self.inbox.try_recv().ok()
    }

    fn receive_timeout(&self, timeout: Duration) -> Option<Message> {
        match self.inbox.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_routes_between_ranks() {
        let mut mesh = channel_mesh(3);
        let third = mesh.pop().unwrap();
        let second = mesh.pop().unwrap();
        let first = mesh.pop().unwrap();
        assert_eq!(first.rank(), 0);
        assert_eq!(first.world_size(), 3);

        first.send(2, MessageTag::KmerBatch, vec![1, 2, 3]);
        let message = third.receive_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(message.source, 0);
        assert_eq!(message.tag, MessageTag::KmerBatch);
        assert_eq!(message.payload, vec![1, 2, 3]);
        assert!(second.try_receive().is_none());
    }

    #[test]
    fn self_delivery_works() {
        let mesh = channel_mesh(1);
        mesh[0].send(0, MessageTag::PhaseDone, Vec::new());
        let message = mesh[0].try_receive().unwrap();
        assert_eq!(message.source, 0);
        assert_eq!(message.tag, MessageTag::PhaseDone);
    }

    #[test]
    fn per_channel_order_is_fifo() {
        let mut mesh = channel_mesh(2);
        let receiver = mesh.pop().unwrap();
        let sender = mesh.pop().unwrap();
        for value in 0..100u64 {
            sender.send(1, MessageTag::CoverageBatch, vec![value]);
        }
        for value in 0..100u64 {
            let message = receiver.receive_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(message.payload, vec![value]);
        }
    }
}

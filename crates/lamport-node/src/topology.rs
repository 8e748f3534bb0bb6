//! Physical mesh: one directed byte stream per ordered pair of processes.
//!
//! Every stream is one end of a Unix socket pair. The sending process owns
//! the write end, the receiving process owns the read end, and the unused
//! direction is shut down at construction. Each [`Mesh`] owns exactly the
//! endpoints of one process; dropping it closes them once.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
    net::Shutdown,
    os::{fd::AsRawFd, unix::net::UnixStream},
};

use bytes::BytesMut;
use lamport_core::Topology;
use lamport_proto::{Message, ProcessId};
use tracing::debug;

use crate::{
    abort::AbortFlag,
    channel::{self, Poll},
    error::ChannelError,
};

/// Builds the endpoints of every process of a mesh.
#[derive(Debug)]
pub struct EndpointTable;

impl EndpointTable {
    /// Create one socket pair per ordered pair `(i, j)`, `i != j`, and split
    /// the ends into one [`Mesh`] per process, indexed by id. Writes one
    /// line per channel to `pipes_log`.
    pub fn build(
        topology: Topology,
        abort: &AbortFlag,
        pipes_log: &mut impl Write,
    ) -> io::Result<Vec<Mesh>> {
        let mut meshes: Vec<Mesh> =
            topology.processes().map(|id| Mesh::new(id, abort.clone())).collect();

        for src in topology.processes() {
            for dst in topology.peers_of(src) {
                let (writer, reader) = UnixStream::pair()?;
                reader.shutdown(Shutdown::Write)?;
                writer.set_nonblocking(true)?;
                reader.set_nonblocking(true)?;

                writeln!(
                    pipes_log,
                    "Initiating channel {src} -> {dst}: write fd {}, read fd {}",
                    writer.as_raw_fd(),
                    reader.as_raw_fd()
                )?;
                meshes[usize::from(src)].outbound.insert(dst, writer);
                meshes[usize::from(dst)].inbound.insert(src, reader);
            }
        }
        Ok(meshes)
    }
}

/// Endpoints owned by one process.
#[derive(Debug)]
pub struct Mesh {
    id: ProcessId,
    outbound: BTreeMap<ProcessId, UnixStream>,
    inbound: BTreeMap<ProcessId, UnixStream>,
    closed: BTreeSet<ProcessId>,
    abort: AbortFlag,
}

impl Mesh {
    fn new(id: ProcessId, abort: AbortFlag) -> Self {
        Self {
            id,
            outbound: BTreeMap::new(),
            inbound: BTreeMap::new(),
            closed: BTreeSet::new(),
            abort,
        }
    }

    /// Owning process.
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Peers this process can send to, ascending.
    pub fn peers(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.outbound.keys().copied()
    }

    /// Send `message` to `to`.
    pub fn send(&mut self, to: ProcessId, message: &Message) -> Result<(), ChannelError> {
        let stream = self.outbound.get_mut(&to).ok_or(ChannelError::UnknownPeer(to))?;
        debug!(from = self.id, to, timestamp = message.timestamp(), "send");
        channel::send(stream, message, &self.abort)
    }

    /// Send byte-identical copies of `message` to every peer, ascending id.
    pub fn send_multicast(&mut self, message: &Message) -> Result<(), ChannelError> {
        let mut frame = BytesMut::with_capacity(message.encoded_len());
        message.encode(&mut frame);

        debug!(from = self.id, timestamp = message.timestamp(), "multicast");
        for stream in self.outbound.values_mut() {
            channel::write_all(stream, &frame, &self.abort)?;
        }
        Ok(())
    }

    /// Wait for the next frame from `from`. End-of-stream is an error.
    pub fn receive(&mut self, from: ProcessId) -> Result<Message, ChannelError> {
        let stream = self.inbound.get_mut(&from).ok_or(ChannelError::UnknownPeer(from))?;
        channel::receive(stream, &self.abort)
    }

    /// Wait for the next frame from any peer.
    ///
    /// Scans open inbound endpoints in ascending id order and returns the
    /// first complete frame together with its sender. An endpoint found at
    /// end-of-stream is dropped from the scan.
    ///
    /// # Errors
    ///
    /// `AllClosed` once no inbound endpoint is open.
    pub fn receive_any(&mut self) -> Result<(ProcessId, Message), ChannelError> {
        loop {
            let mut open = 0usize;
            for (peer, stream) in &mut self.inbound {
                if self.closed.contains(peer) {
                    continue;
                }
                match channel::try_receive(stream, &self.abort)? {
                    Poll::Ready(message) => return Ok((*peer, message)),
                    Poll::Idle => open += 1,
                    Poll::Closed => {
                        debug!(id = self.id, peer, "inbound channel closed");
                        self.closed.insert(*peer);
                    },
                }
            }

            if open == 0 {
                return Err(ChannelError::AllClosed);
            }
            channel::yield_or_abort(&self.abort)?;
        }
    }

    /// Close every endpoint.
    pub fn close(self) {
        debug!(
            id = self.id,
            outbound = self.outbound.len(),
            inbound = self.inbound.len(),
            "closing endpoints"
        );
    }
}

#[cfg(test)]
mod tests {
    use lamport_proto::Payload;

    use super::*;

    fn mesh(workers: usize) -> Vec<Mesh> {
        let topology = Topology::new(workers).unwrap();
        EndpointTable::build(topology, &AbortFlag::new(), &mut io::sink()).unwrap()
    }

    #[test]
    fn full_mesh_without_self_loops() {
        let meshes = mesh(3);

        assert_eq!(meshes.len(), 4);
        for mesh in &meshes {
            let peers: Vec<_> = mesh.peers().collect();
            assert_eq!(peers.len(), 3);
            assert!(!peers.contains(&mesh.id()));
            assert_eq!(mesh.inbound.len(), 3);
        }
    }

    #[test]
    fn pipe_log_has_one_line_per_channel() {
        let mut log = Vec::new();
        EndpointTable::build(Topology::new(2).unwrap(), &AbortFlag::new(), &mut log).unwrap();

        let log = String::from_utf8(log).unwrap();
        assert_eq!(log.lines().count(), 6);
        assert!(log.lines().next().unwrap().starts_with("Initiating channel 0 -> 1"));
    }

    #[test]
    fn targeted_send_and_receive() {
        let mut meshes = mesh(2);
        let message = Message::new(&Payload::Ack, 3).unwrap();

        meshes[2].send(0, &message).unwrap();
        assert_eq!(meshes[0].receive(2).unwrap(), message);
        assert!(matches!(meshes[0].send(0, &message), Err(ChannelError::UnknownPeer(0))));
    }

    #[test]
    fn multicast_reaches_every_peer_identically() {
        let mut meshes = mesh(2);
        let message = Message::new(&Payload::Stop, 9).unwrap();

        meshes[0].send_multicast(&message).unwrap();

        assert_eq!(meshes[1].receive(0).unwrap(), message);
        assert_eq!(meshes[2].receive(0).unwrap(), message);
    }

    #[test]
    fn receive_any_scans_in_id_order() {
        let mut meshes = mesh(3);
        let late = Message::new(&Payload::CsReply, 5).unwrap();
        let early = Message::new(&Payload::CsReply, 8).unwrap();

        meshes[3].send(1, &late).unwrap();
        meshes[2].send(1, &early).unwrap();

        assert_eq!(meshes[1].receive_any().unwrap(), (2, early));
        assert_eq!(meshes[1].receive_any().unwrap(), (3, late));
    }

    #[test]
    fn receive_any_skips_closed_peers() {
        let mut meshes = mesh(2);
        let message = Message::new(&Payload::Ack, 4).unwrap();

        meshes[2].send(0, &message).unwrap();
        meshes.remove(1).close();

        // Peer 1 is gone, peer 2 still has a frame queued.
        assert_eq!(meshes[0].receive_any().unwrap(), (2, message));

        meshes.remove(1).close();
        assert!(matches!(meshes[0].receive_any(), Err(ChannelError::AllClosed)));
    }

    #[test]
    fn receive_any_fails_when_everyone_left() {
        let mut meshes = mesh(1);
        let worker = meshes.pop().unwrap();
        worker.close();

        assert!(matches!(meshes[0].receive_any(), Err(ChannelError::AllClosed)));
    }

    #[test]
    fn targeted_receive_fails_on_closed_peer() {
        let mut meshes = mesh(1);
        let worker = meshes.pop().unwrap();
        worker.close();

        assert!(matches!(meshes[0].receive(1), Err(ChannelError::UnexpectedEof { .. })));
    }
}

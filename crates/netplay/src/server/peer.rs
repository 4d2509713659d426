use std::net::SocketAddr;

use crate::net::codec::{FrameReader, PlayerName};
use crate::net::protocol::{Packet, PacketRegistry, PeerId};
use crate::net::transport::{NetResult, NetSocket, Readiness};

#[derive(Debug)]
pub struct Peer {
    pub(crate) id: PeerId,
    pub(crate) name: PlayerName,
    pub(crate) socket: NetSocket,
    pub(crate) reader: FrameReader,
    pub(crate) addr: SocketAddr,
    pub(crate) connected: bool,
    pub(crate) accepted: bool,
    pub(crate) readiness: Readiness,
}

impl Peer {
    pub(crate) fn new(id: PeerId, socket: NetSocket, addr: SocketAddr) -> Self {
        Self {
            id,
            name: PlayerName::default(),
            socket,
            reader: FrameReader::new(),
            addr,
            connected: true,
            accepted: false,
            readiness: Readiness::empty(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub(crate) fn receive(&mut self, registry: &PacketRegistry) -> NetResult<Option<Packet>> {
        self.reader.read_packet(&mut self.socket, registry)
    }
}

/// Smallest non-negative id not held by any connected peer.
pub fn lowest_free_id(peers: &[Peer]) -> PeerId {
    lowest_free(peers.iter().filter(|p| p.connected).map(|p| p.id))
}

fn lowest_free(taken: impl Iterator<Item = PeerId>) -> PeerId {
    let mut taken: Vec<PeerId> = taken.collect();
    taken.sort_unstable();

    let mut candidate = 0;
    for id in taken {
        if id == candidate {
            candidate += 1;
        } else if id > candidate {
            break;
        }
    }
    candidate
}

use log::{info, warn};

use crate::client::{Client, ConnectionState};
use crate::net::codec::{PayloadReader, PayloadWriter, PlayerName};
use crate::net::packets::PlayerJoin;
use crate::net::protocol::{
    DisconnectReason, Packet, PacketError, PacketType, Payload, PeerId, UNASSIGNED_ID,
};
use crate::server::Server;

/// Handshake. Sent by a client with an unassigned id, echoed back by the
/// server carrying the id it assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub name: PlayerName,
    pub id: PeerId,
}

impl Connect {
    pub fn new(name: &str, id: PeerId) -> Self {
        Self {
            name: PlayerName::new(name),
            id,
        }
    }

    pub fn request(name: &str) -> Self {
        Self::new(name, UNASSIGNED_ID)
    }

    pub(crate) fn handle_client(&self, client: &mut Client) {
        if client.state != ConnectionState::Connecting {
            warn!("Ignoring connect echo while {}", client.state);
            return;
        }

        client.id = Some(self.id);
        client.state = ConnectionState::Ready;
        client.players.insert(self.id, self.name.to_string());
        info!("Connected to {} as player {}", client.server_addr, self.id);
    }

    pub(crate) fn handle_server(&self, server: &mut Server, peer_id: PeerId) {
        if self.id != UNASSIGNED_ID {
            warn!(
                "Peer {} tried to connect with preset id {}, rejecting",
                peer_id, self.id
            );
            server.remove_client(peer_id, DisconnectReason::Kick, false);
            return;
        }

        let Some(peer) = server.peer_mut(peer_id) else {
            return;
        };
        if peer.accepted {
            warn!("Peer {} sent a second handshake, ignoring", peer_id);
            return;
        }

        peer.name = self.name.clone();
        let name = self.name.clone();

        if let Err(e) = server.send_to(peer_id, &Connect::new(name.as_str(), peer_id).into()) {
            warn!("Failed to acknowledge peer {}: {}", peer_id, e);
            server.remove_client(peer_id, DisconnectReason::Kick, false);
            return;
        }
        if let Some(peer) = server.peer_mut(peer_id) {
            peer.accepted = true;
        }
        info!("{} joined as player {}", name, peer_id);

        let existing: Vec<Packet> = server
            .peers()
            .iter()
            .filter(|p| p.accepted && p.id != peer_id)
            .map(|p| PlayerJoin::new(p.name.as_str(), false, DisconnectReason::Left, p.id).into())
            .collect();
        for packet in &existing {
            if let Err(e) = server.send_to(peer_id, packet) {
                warn!("Failed to send roster to player {}: {}", peer_id, e);
                server.remove_client(peer_id, DisconnectReason::Kick, false);
                return;
            }
        }

        let announcement = PlayerJoin::new(name.as_str(), true, DisconnectReason::Left, peer_id);
        server.broadcast_filtered(&announcement.into(), |p| p.accepted && p.id != peer_id);
    }
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            name: PlayerName::default(),
            id: UNASSIGNED_ID,
        }
    }
}

impl Payload for Connect {
    const TYPE: PacketType = PacketType::Connect;
    const SIZE: usize = 25 + 4;

    fn write(&self, out: &mut PayloadWriter) {
        out.put_fixed(&self.name);
        out.put_i32(self.id);
    }

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        self.name = input.get_fixed()?;
        self.id = input.get_i32()?;
        Ok(())
    }
}

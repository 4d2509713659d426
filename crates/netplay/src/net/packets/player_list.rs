use log::{debug, info, warn};

use crate::client::Client;
use crate::net::codec::{PayloadReader, PayloadWriter, PlayerName};
use crate::net::protocol::{Packet, PacketError, PacketType, Payload, PeerId, UNASSIGNED_ID};
use crate::server::Server;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerListRequest;

impl PlayerListRequest {
    pub(crate) fn handle_client(&self, _client: &mut Client) {
        debug!("Ignoring player list request from server");
    }

    pub(crate) fn handle_server(&self, server: &mut Server, peer_id: PeerId) {
        let mut reply: Vec<Packet> = server
            .peers()
            .iter()
            .filter(|p| p.accepted)
            .map(|p| PlayerListEntry::new(p.name.as_str(), p.id).into())
            .collect();
        let count = u16::try_from(reply.len()).unwrap_or(u16::MAX);
        reply.insert(0, PlayerListHeader::new(count).into());

        for packet in &reply {
            if let Err(e) = server.send_to(peer_id, packet) {
                warn!("Failed to send player list to player {}: {}", peer_id, e);
                break;
            }
        }
    }
}

impl Payload for PlayerListRequest {
    const TYPE: PacketType = PacketType::PlayerListRequest;
    const SIZE: usize = 0;

    fn write(&self, _out: &mut PayloadWriter) {}

    fn read(&mut self, _input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerListHeader {
    pub count: u16,
}

impl PlayerListHeader {
    pub fn new(count: u16) -> Self {
        Self { count }
    }

    pub(crate) fn handle_client(&self, client: &mut Client) {
        client.players.clear();
        info!("{} player(s) online:", self.count);
    }

    pub(crate) fn handle_server(&self, _server: &mut Server, peer_id: PeerId) {
        debug!("Ignoring player list header from peer {}", peer_id);
    }
}

impl Payload for PlayerListHeader {
    const TYPE: PacketType = PacketType::PlayerListHeader;
    const SIZE: usize = 2;

    fn write(&self, out: &mut PayloadWriter) {
        out.put_u16(self.count);
    }

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        self.count = input.get_u16()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerListEntry {
    pub name: PlayerName,
    pub id: PeerId,
}

impl PlayerListEntry {
    pub fn new(name: &str, id: PeerId) -> Self {
        Self {
            name: PlayerName::new(name),
            id,
        }
    }

    pub(crate) fn handle_client(&self, client: &mut Client) {
        client.players.insert(self.id, self.name.to_string());
        if client.id == Some(self.id) {
            info!("  [{}] {} (you)", self.id, self.name);
        } else {
            info!("  [{}] {}", self.id, self.name);
        }
    }

    pub(crate) fn handle_server(&self, _server: &mut Server, peer_id: PeerId) {
        debug!("Ignoring player list entry from peer {}", peer_id);
    }
}

impl Default for PlayerListEntry {
    fn default() -> Self {
        Self {
            name: PlayerName::default(),
            id: UNASSIGNED_ID,
        }
    }
}

impl Payload for PlayerListEntry {
    const TYPE: PacketType = PacketType::PlayerListEntry;
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

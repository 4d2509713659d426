use log::info;

use crate::client::Client;
use crate::net::codec::{PayloadReader, PayloadWriter};
use crate::net::protocol::{
    DisconnectReason, PacketError, PacketType, Payload, PeerId, UNASSIGNED_ID,
};
use crate::server::Server;

/// With `id == UNASSIGNED_ID` the message concerns its receiver: from the
/// server it means "you are out", from a client it means "I am leaving".
/// Any other id reports the departure of that player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDisconnect {
    pub announce: bool,
    pub reason: DisconnectReason,
    pub id: PeerId,
}

impl PlayerDisconnect {
    pub fn new(announce: bool, reason: DisconnectReason, id: PeerId) -> Self {
        Self {
            announce,
            reason,
            id,
        }
    }

    pub fn leaving() -> Self {
        Self::new(false, DisconnectReason::Left, UNASSIGNED_ID)
    }

    pub(crate) fn handle_client(&self, client: &mut Client) {
        if self.id == UNASSIGNED_ID || client.id == Some(self.id) {
            info!("Disconnected from server ({})", self.reason);
            client.mark_left();
            return;
        }

        let name = client
            .players
            .remove(&self.id)
            .unwrap_or_else(|| format!("player {}", self.id));
        if self.announce {
            info!("{} {}", name, self.reason);
        }
    }

    pub(crate) fn handle_server(&self, server: &mut Server, peer_id: PeerId) {
        server.remove_client(peer_id, DisconnectReason::Left, true);
    }
}

impl Default for PlayerDisconnect {
    fn default() -> Self {
        Self::leaving()
    }
}

impl Payload for PlayerDisconnect {
    const TYPE: PacketType = PacketType::Disconnect;
    const SIZE: usize = 1 + 1 + 4;

    fn write(&self, out: &mut PayloadWriter) {
        out.put_bool(self.announce);
        out.put_u8(self.reason as u8);
        out.put_i32(self.id);
    }

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        self.announce = input.get_bool()?;
        self.reason = DisconnectReason::try_from(input.get_u8()?)?;
        self.id = input.get_i32()?;
        Ok(())
    }
}

use log::{debug, info};

use crate::client::Client;
use crate::net::codec::{PayloadReader, PayloadWriter, PlayerName};
use crate::net::protocol::{DisconnectReason, PacketError, PacketType, Payload, PeerId};
use crate::server::Server;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerJoin {
    pub name: PlayerName,
    pub announce: bool,
    pub reason: DisconnectReason,
    pub id: PeerId,
}

impl PlayerJoin {
    pub fn new(name: &str, announce: bool, reason: DisconnectReason, id: PeerId) -> Self {
        Self {
            name: PlayerName::new(name),
            announce,
            reason,
            id,
        }
    }

    pub(crate) fn handle_client(&self, client: &mut Client) {
        if client.id == Some(self.id) {
            return;
        }

        client.players.insert(self.id, self.name.to_string());
        if self.announce {
            info!("{} joined the game (player {})", self.name, self.id);
        } else {
            info!("{} is in the game (player {})", self.name, self.id);
        }
    }

    pub(crate) fn handle_server(&self, _server: &mut Server, peer_id: PeerId) {
        debug!("Ignoring join notice from peer {}", peer_id);
    }
}

impl Payload for PlayerJoin {
    const TYPE: PacketType = PacketType::Join;
    const SIZE: usize = 25 + 1 + 1 + 4;

    fn write(&self, out: &mut PayloadWriter) {
        out.put_fixed(&self.name);
        out.put_bool(self.announce);
        out.put_u8(self.reason as u8);
        out.put_i32(self.id);
    }

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        self.name = input.get_fixed()?;
        self.announce = input.get_bool()?;
        self.reason = DisconnectReason::try_from(input.get_u8()?)?;
        self.id = input.get_i32()?;
        Ok(())
    }
}

use glam::IVec2;
use log::trace;

use crate::client::Client;
use crate::net::codec::{PayloadReader, PayloadWriter};
use crate::net::protocol::{PacketError, PacketType, Payload, PeerId, UNASSIGNED_ID};
use crate::server::Server;

/// Position sync. Neither side acts on it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerUpdate {
    pub id: PeerId,
    pub position: IVec2,
}

impl PlayerUpdate {
    pub fn new(id: PeerId, position: IVec2) -> Self {
        Self { id, position }
    }

    pub(crate) fn handle_client(&self, _client: &mut Client) {
        trace!("Player {} at {}", self.id, self.position);
    }

    pub(crate) fn handle_server(&self, _server: &mut Server, peer_id: PeerId) {
        trace!("Player {} reports {}", peer_id, self.position);
    }
}

impl Default for PlayerUpdate {
    fn default() -> Self {
        Self::new(UNASSIGNED_ID, IVec2::ZERO)
    }
}

impl Payload for PlayerUpdate {
    const TYPE: PacketType = PacketType::PlayerUpdate;
    const SIZE: usize = 4 + 4 + 4;

    fn write(&self, out: &mut PayloadWriter) {
        out.put_i32(self.id);
        out.put_i32(self.position.x);
        out.put_i32(self.position.y);
    }

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        self.id = input.get_i32()?;
        self.position = IVec2::new(input.get_i32()?, input.get_i32()?);
        Ok(())
    }
}

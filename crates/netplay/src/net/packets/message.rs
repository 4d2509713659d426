use log::info;

use crate::client::Client;
use crate::net::codec::{ChatText, PayloadReader, PayloadWriter};
use crate::net::protocol::{PacketError, PacketType, Payload, PeerId, UNASSIGNED_ID};
use crate::server::Server;

/// Chat line. The id a client puts here is ignored; the server stamps the
/// sender's id before relaying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: PeerId,
    pub text: ChatText,
}

impl ChatMessage {
    pub fn new(id: PeerId, text: &str) -> Self {
        Self {
            id,
            text: ChatText::new(text),
        }
    }

    pub(crate) fn handle_client(&self, client: &mut Client) {
        match client.players.get(&self.id) {
            Some(name) => info!("<{}> {}", name, self.text),
            None => info!("<player {}> {}", self.id, self.text),
        }
    }

    pub(crate) fn handle_server(&self, server: &mut Server, peer_id: PeerId) {
        let relay = ChatMessage {
            id: peer_id,
            text: self.text.clone(),
        };
        server.broadcast(&relay.into());
    }
}

impl Default for ChatMessage {
    fn default() -> Self {
        Self {
            id: UNASSIGNED_ID,
            text: ChatText::default(),
        }
    }
}

impl Payload for ChatMessage {
    const TYPE: PacketType = PacketType::Message;
    const SIZE: usize = 4 + 50;

    fn write(&self, out: &mut PayloadWriter) {
        out.put_i32(self.id);
        out.put_fixed(&self.text);
    }

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError> {
        self.id = input.get_i32()?;
        self.text = input.get_fixed()?;
        Ok(())
    }
}

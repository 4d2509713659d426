use std::collections::HashMap;
use std::fmt;

use log::{trace, warn};

use super::codec::{PayloadReader, PayloadWriter};
use super::packets::{
    ChatMessage, Connect, PlayerDisconnect, PlayerJoin, PlayerListEntry, PlayerListHeader,
    PlayerListRequest, PlayerUpdate,
};
use crate::client::Client;
use crate::server::Server;

pub const DEFAULT_PORT: u16 = 7777;

pub type PeerId = i32;

/// Id carried by a client before the server assigns one, and by a Disconnect
/// addressed to its receiver.
pub const UNASSIGNED_ID: PeerId = -1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Nothing = 0,
    Connect = 1,
    Join = 2,
    Disconnect = 3,
    PlayerUpdate = 4,
    PlayerListRequest = 5,
    PlayerListHeader = 6,
    PlayerListEntry = 7,
    Message = 8,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectReason {
    #[default]
    Left = 0,
    Kick = 1,
    Timeout = 2,
    Close = 3,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Left => "left",
            DisconnectReason::Kick => "kicked",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Close => "server closed",
        }
    }
}

impl TryFrom<u8> for DisconnectReason {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DisconnectReason::Left),
            1 => Ok(DisconnectReason::Kick),
            2 => Ok(DisconnectReason::Timeout),
            3 => Ok(DisconnectReason::Close),
            other => Err(PacketError::UnknownReason(other)),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),
    #[error("{kind:?} payload must be {expected} bytes, got {actual}")]
    LengthMismatch {
        kind: PacketType,
        expected: usize,
        actual: usize,
    },
    #[error("unknown disconnect reason {0}")]
    UnknownReason(u8),
    #[error("payload ended early")]
    Truncated,
    #[error("text field is not valid UTF-8")]
    InvalidText,
    #[error("packet type {0} is already registered")]
    DuplicateRegistration(u8),
}

/// Fixed-size body of one packet kind.
pub trait Payload: Default + Into<Packet> {
    const TYPE: PacketType;
    const SIZE: usize;

    fn write(&self, out: &mut PayloadWriter);

    fn read(&mut self, input: &mut PayloadReader<'_>) -> Result<(), PacketError>;

    fn encode(&self) -> Vec<u8> {
        let mut out = PayloadWriter::with_capacity(Self::SIZE);
        self.write(&mut out);
        out.into_inner()
    }

    fn decode(&mut self, payload: &[u8]) -> Result<(), PacketError> {
        if payload.len() != Self::SIZE {
            return Err(PacketError::LengthMismatch {
                kind: Self::TYPE,
                expected: Self::SIZE,
                actual: payload.len(),
            });
        }
        self.read(&mut PayloadReader::new(payload))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    Join(PlayerJoin),
    Disconnect(PlayerDisconnect),
    Update(PlayerUpdate),
    ListRequest(PlayerListRequest),
    ListHeader(PlayerListHeader),
    ListEntry(PlayerListEntry),
    Message(ChatMessage),
}

macro_rules! each_packet {
    ($packet:expr, $inner:ident => $body:expr) => {
        match $packet {
            Packet::Connect($inner) => $body,
            Packet::Join($inner) => $body,
            Packet::Disconnect($inner) => $body,
            Packet::Update($inner) => $body,
            Packet::ListRequest($inner) => $body,
            Packet::ListHeader($inner) => $body,
            Packet::ListEntry($inner) => $body,
            Packet::Message($inner) => $body,
        }
    };
}

fn payload_type<P: Payload>(_: &P) -> PacketType {
    P::TYPE
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        each_packet!(self, p => payload_type(p))
    }

    pub fn serialize(&self) -> Vec<u8> {
        each_packet!(self, p => p.encode())
    }

    pub fn deserialize(&mut self, payload: &[u8]) -> Result<(), PacketError> {
        each_packet!(self, p => p.decode(payload))
    }

    /// Only the handshake and a voluntary leave are meaningful from a peer
    /// that has not completed the handshake.
    pub fn requires_acceptance(&self) -> bool {
        !matches!(self, Packet::Connect(_) | Packet::Disconnect(_))
    }

    pub fn handle_client(&self, client: &mut Client) {
        each_packet!(self, p => p.handle_client(client))
    }

    pub fn handle_server(&self, server: &mut Server, peer: PeerId) {
        trace!("peer {} sent {:?}", peer, self.packet_type());
        each_packet!(self, p => p.handle_server(server, peer))
    }
}

macro_rules! impl_into_packet {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Packet {
                fn from(value: $ty) -> Self {
                    Packet::$variant(value)
                }
            }
        )*
    };
}

impl_into_packet! {
    Connect => Connect,
    PlayerJoin => Join,
    PlayerDisconnect => Disconnect,
    PlayerUpdate => Update,
    PlayerListRequest => ListRequest,
    PlayerListHeader => ListHeader,
    PlayerListEntry => ListEntry,
    ChatMessage => Message,
}

pub type PacketFactory = fn() -> Packet;

fn empty_packet<P: Payload>() -> Packet {
    P::default().into()
}

/// Maps a wire tag to a constructor for an empty packet of that kind. Built
/// once at start-up and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct PacketRegistry {
    factories: HashMap<u8, PacketFactory>,
}

impl PacketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog() -> Self {
        let catalog: [(PacketType, PacketFactory); 8] = [
            (Connect::TYPE, empty_packet::<Connect>),
            (PlayerJoin::TYPE, empty_packet::<PlayerJoin>),
            (PlayerDisconnect::TYPE, empty_packet::<PlayerDisconnect>),
            (PlayerUpdate::TYPE, empty_packet::<PlayerUpdate>),
            (PlayerListRequest::TYPE, empty_packet::<PlayerListRequest>),
            (PlayerListHeader::TYPE, empty_packet::<PlayerListHeader>),
            (PlayerListEntry::TYPE, empty_packet::<PlayerListEntry>),
            (ChatMessage::TYPE, empty_packet::<ChatMessage>),
        ];

        let mut registry = Self::new();
        for (kind, factory) in catalog {
            if let Err(e) = registry.register_factory(kind as u8, factory) {
                warn!("{}", e);
            }
        }
        registry
    }

    pub fn register_factory(&mut self, tag: u8, factory: PacketFactory) -> Result<(), PacketError> {
        if self.factories.contains_key(&tag) {
            return Err(PacketError::DuplicateRegistration(tag));
        }
        self.factories.insert(tag, factory);
        Ok(())
    }

    pub fn register<P: Payload>(&mut self) -> Result<(), PacketError> {
        self.register_factory(P::TYPE as u8, empty_packet::<P>)
    }

    pub fn create(&self, tag: u8) -> Option<Packet> {
        self.factories.get(&tag).map(|factory| factory())
    }

    pub fn is_registered(&self, tag: u8) -> bool {
        self.factories.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

pub mod client;
pub mod command;
pub mod manager;
pub mod net;
pub mod server;

pub use client::{Client, ConnectionState};
pub use command::{Command, CommandError};
pub use manager::NetworkManager;
pub use net::{
    DEFAULT_PORT, DisconnectReason, NetError, NetResult, Packet, PacketError, PacketRegistry,
    PacketType, PeerId, UNASSIGNED_ID,
};
pub use server::{Peer, Server, ServerConfig, ServerHandle, TickPacing};

pub mod codec;
pub mod packets;
pub mod protocol;
pub mod transport;

pub use codec::{
    ChatText, FixedStr, FrameReader, PlayerName, encode_frame, frame_bytes, send_frame,
    send_packet,
};
pub use packets::{
    ChatMessage, Connect, PlayerDisconnect, PlayerJoin, PlayerListEntry, PlayerListHeader,
    PlayerListRequest, PlayerUpdate,
};
pub use protocol::{
    DEFAULT_PORT, DisconnectReason, Packet, PacketError, PacketRegistry, PacketType, Payload,
    PeerId, UNASSIGNED_ID,
};
pub use transport::{
    NetError, NetResult, NetSocket, Protocol, Readiness, parse_port, poll, resolve_address,
};

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::net::codec::{FrameReader, PlayerName, send_packet};
use crate::net::packets::{ChatMessage, Connect, PlayerDisconnect, PlayerListRequest};
use crate::net::protocol::{Packet, PacketRegistry, PeerId, UNASSIGNED_ID};
use crate::net::transport::{self, NetError, NetResult, NetSocket, Protocol};

const MAX_FRAMES_PER_UPDATE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Ready,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting…",
            ConnectionState::Ready => "ready",
        })
    }
}

/// One outbound connection to a server. Never blocks: [`Client::update`] is
/// meant to be called once per host frame.
pub struct Client {
    pub(crate) server_addr: SocketAddr,
    name: PlayerName,
    registry: Arc<PacketRegistry>,
    socket: Option<NetSocket>,
    reader: FrameReader,
    pub(crate) state: ConnectionState,
    pub(crate) id: Option<PeerId>,
    handshake_sent: bool,
    left: bool,
    pub(crate) players: BTreeMap<PeerId, String>,
}

impl Client {
    pub fn new(server_addr: SocketAddr, name: &str, registry: Arc<PacketRegistry>) -> Self {
        Self {
            server_addr,
            name: PlayerName::new(name),
            registry,
            socket: None,
            reader: FrameReader::new(),
            state: ConnectionState::Idle,
            id: None,
            handshake_sent: false,
            left: false,
            players: BTreeMap::new(),
        }
    }

    pub fn connect(&mut self) -> NetResult<()> {
        if self.state != ConnectionState::Idle {
            return Ok(());
        }

        match self.open_socket() {
            Ok(socket) => {
                info!("Connecting to {} as {}", self.server_addr, self.name);
                self.socket = Some(socket);
                self.state = ConnectionState::Connecting;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.server_addr, e);
                self.state = ConnectionState::Idle;
                Err(e)
            }
        }
    }

    fn open_socket(&self) -> NetResult<NetSocket> {
        let socket = NetSocket::create(Protocol::Tcp, true)?;
        match socket.connect(self.server_addr) {
            Ok(()) | Err(NetError::WouldBlock) => Ok(socket),
            Err(e) => Err(e),
        }
    }

    pub fn update(&mut self) {
        if self.state == ConnectionState::Idle || self.left {
            return;
        }
        let Some(socket) = &self.socket else {
            return;
        };

        let readiness = match transport::poll(&[socket], Duration::ZERO) {
            Ok(readiness) => readiness[0],
            Err(e) => {
                warn!("Polling the server connection failed: {}", e);
                return;
            }
        };

        if self.state == ConnectionState::Connecting
            && !self.handshake_sent
            && readiness.is_writable()
        {
            self.send_handshake();
        }

        if readiness.is_readable() || self.reader.has_frame() {
            self.drain();
        }
    }

    fn send_handshake(&mut self) {
        let request = Connect::request(self.name.as_str()).into();
        match self.send_packet(&request) {
            Ok(()) => {
                debug!("Handshake sent to {}", self.server_addr);
                self.handshake_sent = true;
            }
            Err(NetError::WouldBlock) => {}
            Err(e) => {
                warn!("Could not reach {}: {}", self.server_addr, e);
                self.mark_left();
            }
        }
    }

    fn drain(&mut self) {
        for _ in 0..MAX_FRAMES_PER_UPDATE {
            let Some(socket) = self.socket.as_mut() else {
                return;
            };

            match self.reader.read_packet(socket, &self.registry) {
                Ok(Some(packet)) => {
                    packet.handle_client(self);
                    if self.left {
                        return;
                    }
                }
                Ok(None) => {}
                Err(NetError::WouldBlock) => return,
                Err(NetError::Disconnected) => {
                    info!("Server {} closed the connection", self.server_addr);
                    self.mark_left();
                    return;
                }
                Err(NetError::Packet(e)) => warn!("Malformed packet from server: {}", e),
                Err(e) => {
                    warn!("Connection to {} failed: {}", self.server_addr, e);
                    self.mark_left();
                    return;
                }
            }
        }
    }

    pub(crate) fn mark_left(&mut self) {
        self.left = true;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
    }

    /// A failure that leaves part of a frame on the wire ends the connection.
    pub fn send_packet(&mut self, packet: &Packet) -> NetResult<()> {
        let socket = self.socket.as_mut().ok_or(NetError::Disconnected)?;

        let result = send_packet(socket, packet);
        if let Err(e) = &result {
            if e.breaks_stream() {
                warn!("Connection to {} failed: {}", self.server_addr, e);
                self.mark_left();
            }
        }
        result
    }

    pub fn request_player_list(&mut self) -> NetResult<()> {
        self.send_packet(&PlayerListRequest.into())
    }

    pub fn send_message(&mut self, text: &str) -> NetResult<()> {
        let id = self.id.unwrap_or(UNASSIGNED_ID);
        self.send_packet(&ChatMessage::new(id, text).into())
    }

    /// Best-effort leave notice, then closes the socket. Send failures are
    /// swallowed.
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.as_mut() {
            if let Err(e) = send_packet(socket, &PlayerDisconnect::leaving().into()) {
                debug!("Leave notice to {} not sent: {}", self.server_addr, e);
            }
        }
        self.mark_left();
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready && !self.left
    }

    pub fn id(&self) -> Option<PeerId> {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    pub fn players(&self) -> &BTreeMap<PeerId, String> {
        &self.players
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packets::{PlayerJoin, PlayerListEntry, PlayerListHeader};
    use crate::net::protocol::DisconnectReason;
    use std::net::Ipv4Addr;

    fn idle_client() -> Client {
        Client::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 9)),
            "Ann",
            Arc::new(PacketRegistry::with_catalog()),
        )
    }

    #[test]
    fn test_update_is_noop_while_idle() {
        let mut client = idle_client();
        client.update();
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.has_left());
        assert!(client.send_packet(&PlayerListRequest.into()).is_err());
    }

    #[test]
    fn test_connect_echo_makes_ready() {
        let mut client = idle_client();
        client.state = ConnectionState::Connecting;

        Packet::from(Connect::new("Ann", 0)).handle_client(&mut client);
        assert_eq!(client.state(), ConnectionState::Ready);
        assert_eq!(client.id(), Some(0));
        assert_eq!(client.players().get(&0).map(String::as_str), Some("Ann"));
    }

    #[test]
    fn test_roster_tracks_joins_and_leaves() {
        let mut client = idle_client();
        client.state = ConnectionState::Connecting;
        Packet::from(Connect::new("Ann", 1)).handle_client(&mut client);

        Packet::from(PlayerJoin::new("Bob", false, DisconnectReason::Left, 0)).handle_client(&mut client);
        Packet::from(PlayerJoin::new("Ann", true, DisconnectReason::Left, 1)).handle_client(&mut client);
        assert_eq!(client.players().len(), 2);

        Packet::from(PlayerDisconnect::new(true, DisconnectReason::Timeout, 0)).handle_client(&mut client);
        assert_eq!(client.players().len(), 1);
        assert!(!client.has_left());

        Packet::from(PlayerListHeader::new(2)).handle_client(&mut client);
        assert!(client.players().is_empty());
        Packet::from(PlayerListEntry::new("Ann", 1)).handle_client(&mut client);
        Packet::from(PlayerListEntry::new("Cid", 2)).handle_client(&mut client);
        assert_eq!(
            client.players().values().cloned().collect::<Vec<_>>(),
            vec!["Ann".to_string(), "Cid".to_string()]
        );
    }

    #[test]
    fn test_disconnect_addressed_to_self() {
        let mut client = idle_client();
        client.state = ConnectionState::Ready;
        Packet::from(PlayerDisconnect::new(false, DisconnectReason::Kick, UNASSIGNED_ID))
            .handle_client(&mut client);
        assert!(client.has_left());
        assert!(!client.is_ready());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting…");
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
    }
}

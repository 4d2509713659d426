mod config;
mod peer;
mod tick;

pub use config::{DEFAULT_MAX_CLIENTS, DEFAULT_TICK_RATE, ServerConfig};
pub use peer::{Peer, lowest_free_id};
pub use tick::TickPacing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::net::codec::{encode_frame, write_frame};
use crate::net::packets::PlayerDisconnect;
use crate::net::protocol::{DisconnectReason, Packet, PacketRegistry, PeerId, UNASSIGNED_ID};
use crate::net::transport::{self, NetError, NetResult, NetSocket, Protocol};

pub struct Server {
    listener: Option<NetSocket>,
    local_addr: SocketAddr,
    peers: Vec<Peer>,
    registry: Arc<PacketRegistry>,
    config: ServerConfig,
    tick: u64,
    running: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(
        addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<PacketRegistry>,
    ) -> NetResult<Self> {
        let listener = match Self::open_listener(addr, &config) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start server on {}: {}", addr, e);
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;

        info!(
            "Server listening on {} (max {} players, {} Hz)",
            local_addr, config.max_clients, config.tick_rate
        );

        Ok(Self {
            listener: Some(listener),
            local_addr,
            peers: Vec::with_capacity(config.max_clients),
            registry,
            config,
            tick: 0,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    fn open_listener(addr: SocketAddr, config: &ServerConfig) -> NetResult<NetSocket> {
        let listener = NetSocket::create(Protocol::Tcp, true)?;
        listener.set_reuse_address(true)?;
        listener.bind(addr)?;
        listener.listen(config.listen_backlog())?;
        Ok(listener)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_running(&self) -> bool {
        self.listener.is_some() && self.running.load(Ordering::SeqCst)
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub(crate) fn peer_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.id == id)
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn accepted_count(&self) -> usize {
        self.peers.iter().filter(|p| p.accepted).count()
    }

    pub fn run(&mut self) {
        let budget = self.config.tick_duration();

        while self.running.load(Ordering::SeqCst) {
            let start = Instant::now();
            self.tick_once();

            match TickPacing::evaluate(start.elapsed(), budget) {
                TickPacing::Sleep(remaining) => thread::sleep(remaining),
                TickPacing::Behind { skipped } => {
                    warn!(
                        "Tick {} overran its {:?} budget, skipped {} tick(s)",
                        self.tick, budget, skipped
                    );
                }
            }
        }

        self.shutdown();
    }

    pub fn spawn(self) -> NetResult<ServerHandle> {
        let local_addr = self.local_addr;
        let running = self.running();
        let mut server = self;

        let thread = thread::Builder::new()
            .name("netplay-server".into())
            .spawn(move || server.run())
            .map_err(NetError::Io)?;

        Ok(ServerHandle {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    /// One pass of the loop: accept, poll every peer once, drain the readable
    /// ones. Does not sleep.
    pub fn tick_once(&mut self) {
        self.accept_pending();

        if !self.peers.is_empty() {
            let sockets: Vec<&NetSocket> = self.peers.iter().map(|p| &p.socket).collect();
            match transport::poll(&sockets, Duration::ZERO) {
                Ok(readiness) => {
                    for (peer, ready) in self.peers.iter_mut().zip(readiness) {
                        peer.readiness = ready;
                    }
                }
                Err(e) => warn!("Polling peers failed: {}", e),
            }
        }

        let ready: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|p| p.readiness.is_readable() || p.reader.has_frame())
            .map(|p| p.id)
            .collect();
        for id in ready {
            self.drain_peer(id);
        }

        self.tick += 1;
    }

    fn accept_pending(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };

        while self.peers.len() < self.config.max_clients {
            match listener.accept() {
                Ok((socket, addr)) => {
                    if let Err(e) = socket.set_nonblocking(true) {
                        warn!("Dropping connection from {}: {}", addr, e);
                        continue;
                    }
                    let id = lowest_free_id(&self.peers);
                    info!("Accepted connection from {} as peer {}", addr, id);
                    self.peers.push(Peer::new(id, socket, addr));
                }
                Err(NetError::WouldBlock) => break,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn drain_peer(&mut self, id: PeerId) {
        let registry = Arc::clone(&self.registry);

        for _ in 0..self.config.max_frames_per_tick {
            let Some(peer) = self.peer_mut(id) else {
                return;
            };
            let result = peer.receive(&registry);

            match result {
                Ok(Some(packet)) => self.dispatch(id, packet),
                Ok(None) => {}
                Err(NetError::WouldBlock) => return,
                Err(NetError::Disconnected) => {
                    self.hang_up(id);
                    self.remove_client(id, DisconnectReason::Left, true);
                    return;
                }
                Err(NetError::Packet(e)) => {
                    warn!("Malformed packet from peer {}: {}", id, e);
                    self.remove_client(id, DisconnectReason::Kick, true);
                    return;
                }
                Err(e) => {
                    warn!("Connection to peer {} failed: {}", id, e);
                    self.drop_broken(id);
                    return;
                }
            }
        }

        debug!(
            "Peer {} hit the {} frame limit this tick",
            id, self.config.max_frames_per_tick
        );
    }

    fn dispatch(&mut self, id: PeerId, packet: Packet) {
        let accepted = self.peer(id).is_some_and(|p| p.accepted);
        if !accepted && packet.requires_acceptance() {
            warn!(
                "Ignoring {:?} from peer {} before its handshake",
                packet.packet_type(),
                id
            );
            return;
        }
        packet.handle_server(self, id);
    }

    fn hang_up(&mut self, id: PeerId) {
        if let Some(peer) = self.peer_mut(id) {
            peer.connected = false;
        }
    }

    fn drop_broken(&mut self, id: PeerId) {
        self.hang_up(id);
        self.remove_client(id, DisconnectReason::Timeout, true);
    }

    /// Drops a peer from the roster. The peer itself is told first if its
    /// socket is still usable; the remaining accepted peers hear about it only
    /// when `announce` is set and the peer had completed its handshake.
    pub fn remove_client(&mut self, id: PeerId, reason: DisconnectReason, announce: bool) -> bool {
        let Some(index) = self.peers.iter().position(|p| p.id == id) else {
            return false;
        };
        let mut peer = self.peers.remove(index);
        let was_accepted = peer.accepted;

        if peer.connected {
            let notice = PlayerDisconnect::new(false, reason, UNASSIGNED_ID).into();
            if let Err(e) = Self::write_packet(&mut peer.socket, &notice) {
                debug!("Could not notify peer {} of removal: {}", id, e);
            }
        }
        peer.connected = false;
        peer.accepted = false;
        peer.socket.close();

        if was_accepted {
            info!("Player {} ({}) removed: {}", id, peer.name, reason);
        } else {
            info!("Peer {} from {} dropped: {}", id, peer.addr, reason);
        }

        if announce && was_accepted {
            self.broadcast(&PlayerDisconnect::new(true, reason, id).into());
        }
        true
    }

    fn write_packet(socket: &mut NetSocket, packet: &Packet) -> NetResult<()> {
        let frame = encode_frame(packet)?;
        write_frame(socket, &frame)
    }

    /// A failure that leaves part of a frame on the wire removes the peer
    /// before the error is returned.
    pub fn send_to(&mut self, id: PeerId, packet: &Packet) -> NetResult<()> {
        let peer = self
            .peer_mut(id)
            .filter(|p| p.connected)
            .ok_or(NetError::Disconnected)?;

        let result = Self::write_packet(&mut peer.socket, packet);
        if let Err(e) = &result {
            if e.breaks_stream() {
                warn!("Send to peer {} failed: {}", id, e);
                self.drop_broken(id);
            }
        }
        result
    }

    /// Sends to every accepted peer.
    pub fn broadcast(&mut self, packet: &Packet) -> usize {
        self.broadcast_filtered(packet, |p| p.accepted)
    }

    /// Sends to each connected peer matching `filter`. A failed send to one
    /// peer does not stop the rest; returns how many sends succeeded. Peers
    /// whose stream broke mid-frame are removed afterwards.
    pub fn broadcast_filtered<F>(&mut self, packet: &Packet, filter: F) -> usize
    where
        F: Fn(&Peer) -> bool,
    {
        let frame = match encode_frame(packet) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Cannot broadcast {:?}: {}", packet.packet_type(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut broken = Vec::new();
        for peer in self.peers.iter_mut().filter(|p| p.connected && filter(p)) {
            match write_frame(&mut peer.socket, &frame) {
                Ok(()) => delivered += 1,
                Err(e) if e.breaks_stream() => {
                    warn!("Broadcast to peer {} failed: {}", peer.id, e);
                    broken.push(peer.id);
                }
                Err(e) => debug!("Broadcast to peer {} skipped: {}", peer.id, e),
            }
        }

        for id in broken {
            self.drop_broken(id);
        }
        delivered
    }

    /// Removes every accepted peer with reason `Close` and no announcement,
    /// drops the rest and closes the listener. Safe to call twice.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        let Some(listener) = self.listener.take() else {
            return;
        };

        let accepted: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|p| p.accepted)
            .map(|p| p.id)
            .collect();
        for id in accepted {
            self.remove_client(id, DisconnectReason::Close, false);
        }
        self.peers.clear();
        listener.close();

        info!("Server on {} stopped after {} ticks", self.local_addr, self.tick);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Owns the thread a spawned [`Server`] runs on.
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Asks the loop to stop and waits for it to finish shutting down.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Server thread on {} panicked", self.local_addr);
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

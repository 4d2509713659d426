use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use bitflags::bitflags;
use socket2::{Domain, Socket, Type};

use super::protocol::PacketError;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("operation would block")]
    WouldBlock,
    #[error("peer closed the connection")]
    Disconnected,
    #[error("frame stalled after {written} of {total} bytes")]
    PartialWrite { written: usize, total: usize },
    #[error("socket error: {0}")]
    Io(#[source] io::Error),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

impl NetError {
    pub fn is_would_block(&self) -> bool {
        matches!(self, NetError::WouldBlock)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, NetError::Disconnected)
    }

    /// True when the connection can no longer carry whole frames. A send that
    /// would block before its first byte, or a packet rejected before any
    /// write, leaves the stream intact.
    pub fn breaks_stream(&self) -> bool {
        !matches!(self, NetError::WouldBlock | NetError::Packet(_))
    }
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => NetError::WouldBlock,
            _ => NetError::Io(err),
        }
    }
}

/// Maps a raw read result onto the transport taxonomy. A zero-length read on a
/// non-empty buffer means the peer closed its end.
pub(crate) fn classify_read(result: io::Result<usize>, requested: usize) -> NetResult<usize> {
    match result {
        Ok(0) if requested > 0 => Err(NetError::Disconnected),
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(NetError::WouldBlock),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Readiness: u8 {
        const READABLE = 1 << 0;
        const WRITABLE = 1 << 1;
    }
}

impl Readiness {
    pub fn is_readable(self) -> bool {
        self.contains(Readiness::READABLE)
    }

    pub fn is_writable(self) -> bool {
        self.contains(Readiness::WRITABLE)
    }
}

/// Owned IPv4 socket handle. Dropping it (or calling [`NetSocket::close`])
/// closes the underlying descriptor exactly once.
#[derive(Debug)]
pub struct NetSocket {
    inner: Socket,
}

impl NetSocket {
    pub fn create(protocol: Protocol, nonblocking: bool) -> NetResult<Self> {
        let (ty, proto) = match protocol {
            Protocol::Tcp => (Type::STREAM, socket2::Protocol::TCP),
            Protocol::Udp => (Type::DGRAM, socket2::Protocol::UDP),
        };

        let inner = Socket::new(Domain::IPV4, ty, Some(proto)).map_err(NetError::Io)?;
        inner.set_nonblocking(nonblocking).map_err(NetError::Io)?;

        Ok(Self { inner })
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> NetResult<()> {
        self.inner.set_nonblocking(nonblocking).map_err(NetError::Io)
    }

    pub fn set_reuse_address(&self, reuse: bool) -> NetResult<()> {
        self.inner.set_reuse_address(reuse).map_err(NetError::Io)
    }

    pub fn bind(&self, addr: SocketAddr) -> NetResult<()> {
        self.inner.bind(&addr.into()).map_err(NetError::Io)
    }

    pub fn listen(&self, backlog: i32) -> NetResult<()> {
        self.inner.listen(backlog).map_err(NetError::Io)
    }

    /// On a non-blocking socket an in-progress handshake is reported as
    /// `WouldBlock`, which callers must not treat as a failure.
    pub fn connect(&self, addr: SocketAddr) -> NetResult<()> {
        match self.inner.connect(&addr.into()) {
            Ok(()) => Ok(()),
            Err(e) if connect_in_progress(&e) => Err(NetError::WouldBlock),
            Err(e) => Err(NetError::Io(e)),
        }
    }

    pub fn accept(&self) -> NetResult<(NetSocket, SocketAddr)> {
        let (socket, addr) = self.inner.accept()?;
        let addr = addr.as_socket().ok_or_else(|| {
            NetError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "accepted a non-inet peer",
            ))
        })?;

        Ok((NetSocket { inner: socket }, addr))
    }

    pub fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        classify_read(self.inner.read(buf), buf.len())
    }

    pub fn send(&mut self, buf: &[u8]) -> NetResult<usize> {
        match self.inner.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(NetError::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        let addr = self.inner.local_addr().map_err(NetError::Io)?;
        addr.as_socket().ok_or_else(|| {
            NetError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "socket is not bound to an inet address",
            ))
        })
    }

    pub fn close(self) {
        drop(self);
    }

    #[cfg(not(unix))]
    fn peek_readiness(&self) -> Readiness {
        use std::mem::MaybeUninit;

        let mut byte = [MaybeUninit::<u8>::uninit(); 1];
        match self.inner.peek(&mut byte) {
            Ok(_) => Readiness::READABLE | Readiness::WRITABLE,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Readiness::WRITABLE,
            Err(_) => Readiness::READABLE | Readiness::WRITABLE,
        }
    }
}

impl Read for NetSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for NetSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn connect_in_progress(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    #[cfg(unix)]
    {
        err.raw_os_error() == Some(libc::EINPROGRESS)
    }

    #[cfg(not(unix))]
    {
        false
    }
}

/// Polls every handle once, waiting at most `timeout` for any of them to
/// become ready. A zero timeout is a non-blocking check. Hang-ups and socket
/// errors are reported as readable so the next read surfaces them.
#[cfg(unix)]
pub fn poll(sockets: &[&NetSocket], timeout: Duration) -> NetResult<Vec<Readiness>> {
    use std::os::fd::AsRawFd;

    if sockets.is_empty() {
        return Ok(Vec::new());
    }

    let mut fds: Vec<libc::pollfd> = sockets
        .iter()
        .map(|s| libc::pollfd {
            fd: s.inner.as_raw_fd(),
            events: libc::POLLIN | libc::POLLOUT,
            revents: 0,
        })
        .collect();

    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: `fds` is a live, correctly sized buffer of pollfd entries for the
    // duration of the call.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(vec![Readiness::empty(); sockets.len()]);
        }
        return Err(NetError::Io(err));
    }

    Ok(fds
        .iter()
        .map(|fd| {
            let mut readiness = Readiness::empty();
            if fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                readiness |= Readiness::READABLE;
            }
            if fd.revents & libc::POLLOUT != 0 {
                readiness |= Readiness::WRITABLE;
            }
            readiness
        })
        .collect())
}

#[cfg(not(unix))]
pub fn poll(sockets: &[&NetSocket], timeout: Duration) -> NetResult<Vec<Readiness>> {
    let deadline = std::time::Instant::now() + timeout;

    loop {
        let ready: Vec<Readiness> = sockets.iter().map(|s| s.peek_readiness()).collect();
        if ready.iter().any(|r| r.is_readable()) || std::time::Instant::now() >= deadline {
            return Ok(ready);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub fn resolve_address(host: &str, port: u16) -> NetResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(NetError::Io)?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| {
            NetError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no IPv4 address for {}", host),
            ))
        })
}

pub fn parse_port(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

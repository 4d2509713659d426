use std::fmt;
use std::io::{self, Read, Write};

use log::warn;

use super::protocol::{Packet, PacketError, PacketRegistry};
use super::transport::{NetError, NetResult, classify_read};

pub const FRAME_HEADER_LEN: usize = 3;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

pub const NAME_LEN: usize = 25;
pub const MESSAGE_LEN: usize = 50;

const READ_CHUNK: usize = 4096;
const PARTIAL_WRITE_RETRIES: u32 = 1000;

/// A string that always occupies exactly `N` bytes on the wire. Longer input
/// is cut at the last UTF-8 boundary that fits; shorter input is zero-padded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize> {
    text: String,
}

pub type PlayerName = FixedStr<NAME_LEN>;
pub type ChatText = FixedStr<MESSAGE_LEN>;

impl<const N: usize> FixedStr<N> {
    pub const CAPACITY: usize = N;

    pub fn new(text: &str) -> Self {
        let text = text.split('\0').next().unwrap_or_default();
        let mut end = text.len().min(N);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self {
            text: text[..end].to_owned(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn to_wire(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        bytes[..self.text.len()].copy_from_slice(self.text.as_bytes());
        bytes
    }

    /// Reads up to the first NUL. Text that is not valid UTF-8 is rejected
    /// rather than repaired.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, PacketError> {
        let bytes = &bytes[..bytes.len().min(N)];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let text = std::str::from_utf8(&bytes[..end]).map_err(|_| PacketError::InvalidText)?;
        Ok(Self::new(text))
    }
}

impl<const N: usize> From<&str> for FixedStr<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl<const N: usize> AsRef<str> for FixedStr<N> {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Default)]
pub struct PayloadWriter {
    bytes: Vec<u8>,
}

impl PayloadWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.bytes.push(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_fixed<const N: usize>(&mut self, value: &FixedStr<N>) {
        self.bytes.extend_from_slice(&value.to_wire());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug)]
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        let end = self.pos + len;
        let slice = self.bytes.get(self.pos..end).ok_or(PacketError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16, PacketError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_i32(&mut self) -> Result<i32, PacketError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_fixed<const N: usize>(&mut self) -> Result<FixedStr<N>, PacketError> {
        FixedStr::from_wire(self.take(N)?)
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Builds one complete frame. Oversized payloads are rejected here, before
/// anything reaches a socket.
pub fn frame_bytes(tag: u8, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(PacketError::PayloadTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.push(tag);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, PacketError> {
    frame_bytes(packet.packet_type() as u8, &packet.serialize())
}

/// Writes a whole frame to a possibly non-blocking sink. If the sink is not
/// ready before the first byte this reports `WouldBlock` and nothing was
/// sent. Once some bytes are out the rest must follow; if they cannot, the
/// result is `PartialWrite` and the stream is no longer usable.
pub fn write_frame<W: Write>(dst: &mut W, frame: &[u8]) -> NetResult<()> {
    let mut written = 0;
    let mut retries = 0;

    while written < frame.len() {
        match dst.write(&frame[written..]) {
            Ok(0) => return Err(NetError::Disconnected),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if written == 0 {
                    return Err(NetError::WouldBlock);
                }
                retries += 1;
                if retries > PARTIAL_WRITE_RETRIES {
                    return Err(NetError::PartialWrite {
                        written,
                        total: frame.len(),
                    });
                }
                std::thread::yield_now();
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

pub fn send_frame<W: Write>(dst: &mut W, tag: u8, payload: &[u8]) -> NetResult<()> {
    let frame = frame_bytes(tag, payload)?;
    write_frame(dst, &frame)
}

pub fn send_packet<W: Write>(dst: &mut W, packet: &Packet) -> NetResult<()> {
    let frame = encode_frame(packet)?;
    write_frame(dst, &frame)
}

/// Per-connection receive buffer. Bytes are pulled from the socket until one
/// full frame (header plus payload) is available, so a frame split across
/// reads never desynchronizes the stream.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn frame_len(&self) -> Option<usize> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return None;
        }
        let payload_len = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
        Some(FRAME_HEADER_LEN + payload_len)
    }

    pub fn has_frame(&self) -> bool {
        self.frame_len()
            .is_some_and(|len| self.buffer.len() >= len)
    }

    fn fill<R: Read>(&mut self, src: &mut R) -> NetResult<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = classify_read(src.read(&mut chunk), chunk.len())?;
        self.buffer.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// Returns `Ok(None)` for a frame whose tag is not registered; its bytes
    /// are consumed and the next call continues with the following frame.
    pub fn read_packet<R: Read>(
        &mut self,
        src: &mut R,
        registry: &PacketRegistry,
    ) -> NetResult<Option<Packet>> {
        while !self.has_frame() {
            self.fill(src)?;
        }

        let frame_len = self.frame_len().unwrap_or(FRAME_HEADER_LEN);
        let frame: Vec<u8> = self.buffer.drain(..frame_len).collect();
        let tag = frame[0];
        let payload = &frame[FRAME_HEADER_LEN..];

        let Some(mut packet) = registry.create(tag) else {
            warn!(
                "Skipping frame with unknown packet type {} ({} byte payload)",
                tag,
                payload.len()
            );
            return Ok(None);
        };

        packet.deserialize(payload)?;
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packets::{Connect, PlayerDisconnect};
    use crate::net::protocol::{DisconnectReason, UNASSIGNED_ID};
    use std::io::Cursor;

    #[test]
    fn test_fixed_str_truncates_on_char_boundary() {
        let name = PlayerName::new("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(name.as_str(), "abcdefghijklmnopqrstuvwxy");
        assert_eq!(name.len(), NAME_LEN);

        // 'é' is two bytes; 13 of them would be 26 bytes.
        let name = PlayerName::new(&"é".repeat(13));
        assert_eq!(name.len(), 24);
        assert_eq!(name.as_str(), "é".repeat(12));
    }

    #[test]
    fn test_fixed_str_wire_padding() {
        let name = PlayerName::new("Ann");
        let wire = name.to_wire();
        assert_eq!(&wire[..3], b"Ann");
        assert!(wire[3..].iter().all(|&b| b == 0));
        assert_eq!(PlayerName::from_wire(&wire).unwrap(), name);

        let full = PlayerName::new(&"x".repeat(NAME_LEN));
        assert_eq!(PlayerName::from_wire(&full.to_wire()).unwrap(), full);

        assert_eq!(
            PlayerName::from_wire(&[0u8; NAME_LEN]).unwrap(),
            PlayerName::default()
        );
    }

    #[test]
    fn test_fixed_str_rejects_invalid_utf8() {
        let mut wire = [0u8; NAME_LEN];
        wire[..4].copy_from_slice(&[b'A', 0xff, 0xfe, b'n']);
        assert_eq!(PlayerName::from_wire(&wire), Err(PacketError::InvalidText));

        let registry = PacketRegistry::with_catalog();
        let mut payload = wire.to_vec();
        payload.extend_from_slice(&(-1i32).to_be_bytes());
        let mut src = Cursor::new(frame_bytes(1, &payload).unwrap());
        let err = FrameReader::new().read_packet(&mut src, &registry).unwrap_err();
        assert!(matches!(err, NetError::Packet(PacketError::InvalidText)));
    }

    struct StallingSink {
        accepted: usize,
        limit: usize,
    }

    impl Write for StallingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit - self.accepted;
            if room == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = room.min(buf.len());
            self.accepted += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_full_sink_before_first_byte_would_block() {
        let mut sink = StallingSink { accepted: 0, limit: 0 };
        let err = send_frame(&mut sink, 8, &[0; 54]).unwrap_err();
        assert!(err.is_would_block());
        assert!(!err.breaks_stream());
    }

    #[test]
    fn test_stalled_frame_breaks_stream() {
        let mut sink = StallingSink { accepted: 0, limit: 40 };
        let err = send_frame(&mut sink, 8, &[0; 54]).unwrap_err();
        assert!(matches!(
            err,
            NetError::PartialWrite { written: 40, total: 57 }
        ));
        assert!(err.breaks_stream());
    }

    #[test]
    fn test_frame_layout() {
        let frame = frame_bytes(3, &[9, 8, 7]).unwrap();
        assert_eq!(frame, vec![3, 0, 3, 9, 8, 7]);

        let frame = frame_bytes(5, &[]).unwrap();
        assert_eq!(frame, vec![5, 0, 0]);
    }

    #[test]
    fn test_oversized_payload_writes_nothing() {
        let mut sink: Vec<u8> = Vec::new();
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];

        let err = send_frame(&mut sink, 1, &payload).unwrap_err();
        assert!(matches!(
            err,
            NetError::Packet(PacketError::PayloadTooLarge(65536))
        ));
        assert!(sink.is_empty());

        assert!(send_frame(&mut sink, 1, &payload[..MAX_PAYLOAD_LEN]).is_ok());
        assert_eq!(sink.len(), FRAME_HEADER_LEN + MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_unknown_tag_is_skipped() {
        let registry = PacketRegistry::with_catalog();
        let mut stream = frame_bytes(200, &[1, 2, 3, 4, 5]).unwrap();
        let follow_up: Packet = PlayerDisconnect::new(true, DisconnectReason::Left, 3).into();
        stream.extend(encode_frame(&follow_up).unwrap());

        let mut src = Cursor::new(stream);
        let mut reader = FrameReader::new();

        assert!(reader.read_packet(&mut src, &registry).unwrap().is_none());
        assert_eq!(reader.buffered(), FRAME_HEADER_LEN + 6);

        let packet = reader.read_packet(&mut src, &registry).unwrap();
        assert_eq!(packet, Some(follow_up));
        assert_eq!(reader.buffered(), 0);

        assert!(
            reader
                .read_packet(&mut src, &registry)
                .unwrap_err()
                .is_disconnected()
        );
    }

    #[test]
    fn test_split_frame_waits_for_payload() {
        struct Trickle {
            chunks: Vec<Vec<u8>>,
        }

        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.chunks.is_empty() {
                    return Err(io::ErrorKind::WouldBlock.into());
                }
                let chunk = self.chunks.remove(0);
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
        }

        let registry = PacketRegistry::with_catalog();
        let packet: Packet = Connect::new("Ann", UNASSIGNED_ID).into();
        let frame = encode_frame(&packet).unwrap();

        let mut src = Trickle {
            chunks: vec![frame[..2].to_vec(), frame[2..10].to_vec()],
        };
        let mut reader = FrameReader::new();

        assert!(
            reader
                .read_packet(&mut src, &registry)
                .unwrap_err()
                .is_would_block()
        );
        assert!(!reader.has_frame());

        src.chunks.push(frame[10..].to_vec());
        assert_eq!(reader.read_packet(&mut src, &registry).unwrap(), Some(packet));
    }

    #[test]
    fn test_wrong_payload_length_is_error() {
        let registry = PacketRegistry::with_catalog();
        let mut src = Cursor::new(frame_bytes(3, &[1, 0]).unwrap());
        let mut reader = FrameReader::new();

        let err = reader.read_packet(&mut src, &registry).unwrap_err();
        assert!(matches!(
            err,
            NetError::Packet(PacketError::LengthMismatch { expected: 6, actual: 2, .. })
        ));
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_payload_reader_truncation() {
        let mut reader = PayloadReader::new(&[0, 1, 2]);
        assert_eq!(reader.get_u16().unwrap(), 1);
        assert_eq!(reader.get_i32(), Err(PacketError::Truncated));
        assert_eq!(reader.remaining(), 1);
    }
}

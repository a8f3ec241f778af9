//! HPMQ Frame Codec (C1)
//!
//! Wire layout, big-endian throughout:
//!
//! ```text
//! Frame         := FrameHeader PayloadHeader Payload
//! FrameHeader   := size:u16 doff:u16 frameType:u16
//! PayloadHeader := size:u16                    (always the constant 2: its own encoded length)
//! ID            := length:u32 utf8-bytes
//! String        := length:u32 utf8-bytes
//! ByteArray     := length:u32 raw-bytes
//! Map<S,S>      := count:u32 (key:String value:String){count}
//! ```
//!
//! `FrameHeader.size` covers everything after the frame header: the
//! `PayloadHeader`'s own 2 bytes plus the payload fields, so
//! `payload_len == FrameHeader.size - 2`.
//!
//! Grounded in `monocoque-zmtp/src/codec.rs`'s `ZmtpDecoder`: a stateful
//! decoder that reads against a `SegmentedBuffer`, a zero-allocation fast
//! path when the whole frame is already buffered, and an
//! `encode`/`encode_into` split mirroring that file's owned-`Bytes`
//! convenience vs. buffer-reuse hot path.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hashbrown::HashMap;
use hoppermq_core::buffer::SegmentedBuffer;
use hoppermq_core::error::{HopperError, Result};
use hoppermq_core::id::Id;

/// Frame header is always 6 bytes: size(2) + doff(2) + frameType(2).
const FRAME_HEADER_LEN: usize = 6;
/// `PayloadHeader` is always 2 bytes and its encoded value is always 2.
const PAYLOAD_HEADER_LEN: usize = 2;
const PAYLOAD_HEADER_VALUE: u16 = 2;

/// Default data-offset hint used when encoding. DOFF is preserved but not
/// otherwise interpreted (§4.1, §9).
pub const DEFAULT_DOFF: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Control,
    Message,
    Error,
}

/// Classify a frame-type tag by range, used by the router to dispatch
/// without needing to know the specific variant (§4.1 "Range semantics").
#[must_use]
pub fn classify(tag: u16) -> FrameClass {
    if tag >= 0xF0 {
        FrameClass::Error
    } else if (0x10..=0x1F).contains(&tag) {
        FrameClass::Message
    } else {
        FrameClass::Control
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    Open = 0x01,
    OpenRcvd = 0x02,
    Close = 0x03,
    Connect = 0x04,
    Subscribe = 0x05,
    Unsubscribe = 0x06,
    Auth = 0x07,
    Begin = 0x08,
    Message = 0x1F,
    Error = 0xF0,
}

impl FrameType {
    fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            0x01 => Self::Open,
            0x02 => Self::OpenRcvd,
            0x03 => Self::Close,
            0x04 => Self::Connect,
            0x05 => Self::Subscribe,
            0x06 => Self::Unsubscribe,
            0x07 => Self::Auth,
            0x08 => Self::Begin,
            0x1F => Self::Message,
            0xF0 => Self::Error,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub size: u16,
    pub doff: u16,
    pub frame_type: u16,
}

impl FrameHeader {
    /// `type != 0 && doff ∈ {2,3,4}` (§4.1).
    fn validate(self) -> Result<()> {
        if self.frame_type == 0 {
            return Err(HopperError::invalid_header("frame type tag is zero"));
        }
        if !matches!(self.doff, 2 | 3 | 4) {
            return Err(HopperError::invalid_header(format!(
                "doff {} not in {{2,3,4}}",
                self.doff
            )));
        }
        Ok(())
    }
}

/// A decoded HPMQ frame. One variant per frame type; the set is closed.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open {
        source_id: Id,
        assigned_container_id: Id,
    },
    OpenRcvd {
        source_id: Id,
    },
    Close {
        reason: String,
        code: u16,
    },
    Connect {
        source_id: Id,
        client_version: String,
        keep_alive: u16,
    },
    Subscribe {
        topic: String,
        qos: u8,
        routing_key: String,
    },
    Unsubscribe {
        topic: String,
    },
    /// Unspecified per §9; round-trips as an opaque byte payload.
    Auth {
        payload: Bytes,
    },
    Begin {
        source_id: Id,
        container_id: Id,
        remote_channel: u16,
        next_outgoing_id: u32,
        incoming_window: u32,
        outgoing_window: u32,
    },
    Message {
        topic: String,
        message_id: Id,
        content: Bytes,
        headers: HashMap<String, String>,
    },
    Error {
        error_code: u16,
        error_message: String,
        details: HashMap<String, String>,
    },
}

impl Frame {
    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self {
            Self::Open { .. } => FrameType::Open,
            Self::OpenRcvd { .. } => FrameType::OpenRcvd,
            Self::Close { .. } => FrameType::Close,
            Self::Connect { .. } => FrameType::Connect,
            Self::Subscribe { .. } => FrameType::Subscribe,
            Self::Unsubscribe { .. } => FrameType::Unsubscribe,
            Self::Auth { .. } => FrameType::Auth,
            Self::Begin { .. } => FrameType::Begin,
            Self::Message { .. } => FrameType::Message,
            Self::Error { .. } => FrameType::Error,
        }
    }

    /// Encode this frame with the default DOFF, returning an owned `Bytes`.
    ///
    /// Convenience wrapper; the hot path should prefer [`Frame::encode_into`].
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Encode this frame into a caller-owned, reusable buffer.
    ///
    /// Fills the frame header's `size` field with the encoded payload
    /// length before writing the header bytes, per §4.1's contract. Callers
    /// must not retain references to `buf`'s contents past this call if
    /// they intend to reuse it for the next frame (pooled-buffer
    /// discipline, §4.1/§5).
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let mut payload = BytesMut::new();
        encode_payload(self, &mut payload);

        let header = FrameHeader {
            size: PAYLOAD_HEADER_VALUE + payload.len() as u16,
            doff: DEFAULT_DOFF,
            frame_type: self.frame_type() as u16,
        };

        buf.put_u16(header.size);
        buf.put_u16(header.doff);
        buf.put_u16(header.frame_type);
        buf.put_u16(PAYLOAD_HEADER_VALUE);
        buf.extend_from_slice(&payload);
    }
}

fn write_id(buf: &mut BytesMut, id: &Id) {
    write_string_bytes(buf, id.as_bytes());
}

fn write_string(buf: &mut BytesMut, s: &str) {
    write_string_bytes(buf, s.as_bytes());
}

fn write_string_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn write_bytearray(buf: &mut BytesMut, bytes: &Bytes) {
    buf.put_u32(bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn write_map(buf: &mut BytesMut, map: &HashMap<String, String>) {
    buf.put_u32(map.len() as u32);
    for (k, v) in map {
        write_string(buf, k);
        write_string(buf, v);
    }
}

fn encode_payload(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::Open {
            source_id,
            assigned_container_id,
        } => {
            write_id(buf, source_id);
            write_id(buf, assigned_container_id);
        }
        Frame::OpenRcvd { source_id } => write_id(buf, source_id),
        Frame::Close { reason, code } => {
            write_string(buf, reason);
            buf.put_u16(*code);
        }
        Frame::Connect {
            source_id,
            client_version,
            keep_alive,
        } => {
            write_id(buf, source_id);
            write_string(buf, client_version);
            buf.put_u16(*keep_alive);
        }
        Frame::Subscribe {
            topic,
            qos,
            routing_key,
        } => {
            write_string(buf, topic);
            buf.put_u8(*qos);
            write_string(buf, routing_key);
        }
        Frame::Unsubscribe { topic } => write_string(buf, topic),
        Frame::Auth { payload } => buf.extend_from_slice(payload),
        Frame::Begin {
            source_id,
            container_id,
            remote_channel,
            next_outgoing_id,
            incoming_window,
            outgoing_window,
        } => {
            write_id(buf, source_id);
            write_id(buf, container_id);
            buf.put_u16(*remote_channel);
            buf.put_u32(*next_outgoing_id);
            buf.put_u32(*incoming_window);
            buf.put_u32(*outgoing_window);
        }
        Frame::Message {
            topic,
            message_id,
            content,
            headers,
        } => {
            write_string(buf, topic);
            write_id(buf, message_id);
            write_bytearray(buf, content);
            write_map(buf, headers);
        }
        Frame::Error {
            error_code,
            error_message,
            details,
        } => {
            buf.put_u16(*error_code);
            write_string(buf, error_message);
            write_map(buf, details);
        }
    }
}

struct PayloadCursor<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.len() < n {
            return Err(HopperError::invalid_payload("truncated field"));
        }
        Ok(())
    }

    fn read_id(&mut self) -> Result<Id> {
        Ok(Id::new(self.read_bytes_field()?))
    }

    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes_field()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HopperError::invalid_payload("field is not valid utf-8"))
    }

    fn read_bytearray(&mut self) -> Result<Bytes> {
        self.read_bytes_field()
    }

    fn read_bytes_field(&mut self) -> Result<Bytes> {
        self.need(4)?;
        let len = self.buf.get_u32() as usize;
        self.need(len)?;
        let bytes = Bytes::copy_from_slice(&self.buf[..len]);
        self.buf.advance(len);
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn read_map(&mut self) -> Result<HashMap<String, String>> {
        let count = self.read_u32()?;
        let mut map = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let k = self.read_string()?;
            let v = self.read_string()?;
            map.insert(k, v);
        }
        Ok(map)
    }

    fn finish(&self) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(HopperError::invalid_payload("trailing bytes in payload"));
        }
        Ok(())
    }
}

fn decode_payload(frame_type: FrameType, bytes: &[u8]) -> Result<Frame> {
    let mut c = PayloadCursor::new(bytes);
    let frame = match frame_type {
        FrameType::Open => Frame::Open {
            source_id: c.read_id()?,
            assigned_container_id: c.read_id()?,
        },
        FrameType::OpenRcvd => Frame::OpenRcvd {
            source_id: c.read_id()?,
        },
        FrameType::Close => Frame::Close {
            reason: c.read_string()?,
            code: c.read_u16()?,
        },
        FrameType::Connect => Frame::Connect {
            source_id: c.read_id()?,
            client_version: c.read_string()?,
            keep_alive: c.read_u16()?,
        },
        FrameType::Subscribe => Frame::Subscribe {
            topic: c.read_string()?,
            qos: c.read_u8()?,
            routing_key: c.read_string()?,
        },
        FrameType::Unsubscribe => Frame::Unsubscribe {
            topic: c.read_string()?,
        },
        FrameType::Auth => {
            return Ok(Frame::Auth {
                payload: Bytes::copy_from_slice(bytes),
            });
        }
        FrameType::Begin => Frame::Begin {
            source_id: c.read_id()?,
            container_id: c.read_id()?,
            remote_channel: c.read_u16()?,
            next_outgoing_id: c.read_u32()?,
            incoming_window: c.read_u32()?,
            outgoing_window: c.read_u32()?,
        },
        FrameType::Message => Frame::Message {
            topic: c.read_string()?,
            message_id: c.read_id()?,
            content: c.read_bytearray()?,
            headers: c.read_map()?,
        },
        FrameType::Error => Frame::Error {
            error_code: c.read_u16()?,
            error_message: c.read_string()?,
            details: c.read_map()?,
        },
    };

    // Auth already returned above (opaque, no trailing-bytes check applies).
    c.finish()?;
    Ok(frame)
}

/// One-shot decode of a single frame from an in-memory buffer.
///
/// `SHORT_READ` is surfaced as an error here (unlike the streaming
/// decoder's `Ok(None)`) because there is no way to ask for more bytes.
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(HopperError::ShortRead {
            needed: FRAME_HEADER_LEN,
            available: bytes.len(),
        });
    }

    let mut cur = bytes;
    let header = FrameHeader {
        size: cur.get_u16(),
        doff: cur.get_u16(),
        frame_type: cur.get_u16(),
    };
    header.validate()?;

    let total_len = FRAME_HEADER_LEN + header.size as usize;
    if bytes.len() < total_len {
        return Err(HopperError::ShortRead {
            needed: total_len,
            available: bytes.len(),
        });
    }

    decode_body(header, &bytes[FRAME_HEADER_LEN..total_len])
}

fn decode_body(header: FrameHeader, body: &[u8]) -> Result<Frame> {
    if body.len() < PAYLOAD_HEADER_LEN {
        return Err(HopperError::invalid_payload("missing payload header"));
    }
    let payload_header_size = (&body[..2]).get_u16();
    if payload_header_size != PAYLOAD_HEADER_VALUE {
        return Err(HopperError::invalid_payload(format!(
            "payload header size {payload_header_size} != {PAYLOAD_HEADER_VALUE}"
        )));
    }

    let Some(frame_type) = FrameType::from_tag(header.frame_type) else {
        return Err(HopperError::UnsupportedFrameType(header.frame_type));
    };

    decode_payload(frame_type, &body[PAYLOAD_HEADER_LEN..])
}

/// Determine whether a complete frame sits at the front of `src`, without
/// decoding its payload.
///
/// Used by the transport listener to delimit "one framed message" (§4.2) on
/// the wire: the transport only needs the frame's total byte length, not
/// its parsed contents, so it can stay protocol-agnostic and hand raw bytes
/// to the router for the real `decode`. Returns the total length (header +
/// payload) once it is fully buffered, `None` if more bytes are needed, and
/// an error (consuming nothing) if the header itself is malformed; at that
/// point the stream can no longer be delimited and the caller should treat
/// it like a connection error rather than try to resync.
pub fn next_frame_len(src: &SegmentedBuffer) -> Result<Option<usize>> {
    if src.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }

    let mut hdr_bytes = [0u8; FRAME_HEADER_LEN];
    assert!(src.copy_prefix(FRAME_HEADER_LEN, &mut hdr_bytes));
    let mut cur = &hdr_bytes[..];
    let header = FrameHeader {
        size: cur.get_u16(),
        doff: cur.get_u16(),
        frame_type: cur.get_u16(),
    };
    header.validate()?;

    let total_len = FRAME_HEADER_LEN + header.size as usize;
    if src.len() < total_len {
        return Ok(None);
    }
    Ok(Some(total_len))
}

/// Stateful streaming decoder, for use against a [`SegmentedBuffer`] fed by
/// successive TCP reads. A single read that delivers several frames, or one
/// frame split across two reads, are both handled without extra copies on
/// the fast path (entire frame already buffered).
#[derive(Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns:
    /// - `Ok(Some(frame))`: a frame was decoded and consumed from `src`.
    /// - `Ok(None)`: not enough bytes buffered yet; nothing was consumed.
    /// - `Err(_)`: protocol violation; nothing was consumed ("must
    ///   not consume partial bytes from the stream on that error path").
    pub fn decode(&mut self, src: &mut SegmentedBuffer) -> Result<Option<Frame>> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut hdr_bytes = [0u8; FRAME_HEADER_LEN];
        assert!(src.copy_prefix(FRAME_HEADER_LEN, &mut hdr_bytes));
        let mut cur = &hdr_bytes[..];
        let header = FrameHeader {
            size: cur.get_u16(),
            doff: cur.get_u16(),
            frame_type: cur.get_u16(),
        };
        header.validate()?;

        let total_len = FRAME_HEADER_LEN + header.size as usize;
        if src.len() < total_len {
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        let body = src
            .take_bytes(header.size as usize)
            .expect("length checked above");

        decode_body(header, &body).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_frame_matches_worked_example() {
        let frame = Frame::Open {
            source_id: Id::from("P1"),
            assigned_container_id: Id::from("K1"),
        };
        let bytes = frame.encode();

        // size=14, doff=0x0004, type=0x0001
        assert_eq!(&bytes[0..6], &[0x00, 0x0E, 0x00, 0x04, 0x00, 0x01]);
        // PayloadHeader size=2
        assert_eq!(&bytes[6..8], &[0x00, 0x02]);
        // ID("P1") as 0x00000002 "P1"
        assert_eq!(&bytes[8..14], &[0x00, 0x00, 0x00, 0x02, b'P', b'1']);
        // ID("K1")
        assert_eq!(&bytes[14..20], &[0x00, 0x00, 0x00, 0x02, b'K', b'1']);

        assert_eq!(decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn round_trip_every_known_frame_type() {
        let frames = vec![
            Frame::Open {
                source_id: Id::from("P1"),
                assigned_container_id: Id::from("K1"),
            },
            Frame::OpenRcvd {
                source_id: Id::from("P1"),
            },
            Frame::Close {
                reason: "bye".into(),
                code: 0,
            },
            Frame::Connect {
                source_id: Id::from("P1"),
                client_version: "1.0.0".into(),
                keep_alive: 30,
            },
            Frame::Subscribe {
                topic: "news".into(),
                qos: 0,
                routing_key: String::new(),
            },
            Frame::Unsubscribe {
                topic: "news".into(),
            },
            Frame::Auth {
                payload: Bytes::from_static(b"\x01\x02opaque"),
            },
            Frame::Begin {
                source_id: Id::from("P1"),
                container_id: Id::from("K1"),
                remote_channel: 0,
                next_outgoing_id: 0,
                incoming_window: 1000,
                outgoing_window: 1000,
            },
            Frame::Message {
                topic: "news".into(),
                message_id: Id::from("M1"),
                content: Bytes::from_static(b"hi"),
                headers: HashMap::new(),
            },
            Frame::Error {
                error_code: 1,
                error_message: "bad state".into(),
                details: HashMap::new(),
            },
        ];

        for frame in frames {
            let bytes = frame.encode();
            assert_eq!(decode(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn short_read_on_truncated_header() {
        let err = decode(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, HopperError::ShortRead { .. }));
    }

    #[test]
    fn invalid_header_on_zero_type() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_u16(4);
        buf.put_u16(0); // frame type 0
        buf.put_u16(2);
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, HopperError::InvalidHeader(_)));
    }

    #[test]
    fn invalid_header_on_bad_doff() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_u16(9); // doff not in {2,3,4}
        buf.put_u16(1);
        buf.put_u16(2);
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, HopperError::InvalidHeader(_)));
    }

    #[test]
    fn unsupported_frame_type_on_unknown_tag() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_u16(4);
        buf.put_u16(0x09); // well-formed header, unknown tag
        buf.put_u16(2);
        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, HopperError::UnsupportedFrameType(0x09)));
    }

    #[test]
    fn next_frame_len_delimits_without_decoding_payload() {
        let frame = Frame::Unsubscribe {
            topic: "t1".into(),
        };
        let bytes = frame.encode();

        let mut src = SegmentedBuffer::new();
        assert_eq!(next_frame_len(&src).unwrap(), None);

        src.push(bytes.slice(0..4));
        assert_eq!(next_frame_len(&src).unwrap(), None);

        src.push(bytes.slice(4..));
        assert_eq!(next_frame_len(&src).unwrap(), Some(bytes.len()));

        let raw = src.take_bytes(bytes.len()).unwrap();
        assert_eq!(decode(&raw).unwrap(), frame);
    }

    #[test]
    fn streaming_decoder_waits_for_full_frame_across_two_pushes() {
        let frame = Frame::Unsubscribe {
            topic: "t1".into(),
        };
        let bytes = frame.encode();

        let mut src = SegmentedBuffer::new();
        let mut decoder = FrameDecoder::new();

        src.push(bytes.slice(0..4));
        assert!(decoder.decode(&mut src).unwrap().is_none());

        src.push(bytes.slice(4..));
        assert_eq!(decoder.decode(&mut src).unwrap(), Some(frame));
    }
}

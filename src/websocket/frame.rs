//! WebSocket frame parsing and encoding conforming to RFC 6455.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

// Upper bound on read-ahead reservation for a partially received frame
const MAX_RESERVE: usize = 64 * 1024;

/// WebSocket opcodes as defined in RFC 6455 Section 5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation frame (0x0)
    Continuation,
    /// Text data frame (0x1)
    Text,
    /// Binary data frame (0x2)
    Binary,
    /// Connection close frame (0x8)
    Close,
    /// Ping frame (0x9)
    Ping,
    /// Pong frame (0xA)
    Pong,
    /// Unassigned opcode, never valid on the wire
    Reserved(u8),
}

impl Opcode {
    /// Check if this is a control frame opcode.
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this is a data frame opcode.
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(value) => value & 0x0F,
        }
    }
}

/// Which end of the connection a codec speaks for.
///
/// Clients must mask every frame they send and servers must never mask,
/// so the role decides which mask flag is acceptable in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Accepts masked frames, emits unmasked frames
    #[default]
    Server,
    /// Accepts unmasked frames, emits masked frames
    Client,
}

impl Role {
    /// Validate the mask flag of a frame received by this role.
    pub fn check_incoming(&self, masked: bool) -> Result<(), ProtocolError> {
        match (self, masked) {
            (Role::Server, false) => Err(ProtocolError::UnmaskedFrame),
            (Role::Client, true) => Err(ProtocolError::MaskedFrame),
            _ => Ok(()),
        }
    }

    /// Validate the mask flag of a frame sent by this role.
    pub fn check_outgoing(&self, masked: bool) -> Result<(), ProtocolError> {
        match (self, masked) {
            (Role::Server, true) => Err(ProtocolError::MaskedFrame),
            (Role::Client, false) => Err(ProtocolError::UnmaskedFrame),
            _ => Ok(()),
        }
    }
}

/// Parsed or about-to-be-encoded frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN bit: this is the final fragment of a message
    pub fin: bool,
    /// RSV1-3 as a 3-bit value, zero without a negotiated extension
    pub rsv: u8,
    /// Opcode: identifies the frame type
    pub opcode: Opcode,
    /// Mask bit: payload is XOR-masked
    pub masked: bool,
    /// Masking key, meaningful only when `masked` is set
    pub mask: [u8; 4],
    /// Effective payload length in bytes
    pub length: u64,
}

impl FrameHeader {
    /// Create an unmasked header with no reserved bits set.
    pub fn new(opcode: Opcode, fin: bool, length: u64) -> Self {
        FrameHeader {
            fin,
            rsv: 0,
            opcode,
            masked: false,
            mask: [0; 4],
            length,
        }
    }

    /// Parse a frame header from the start of `data`.
    ///
    /// Returns `Ok(None)` when `data` does not yet hold the whole header,
    /// otherwise the header and the number of bytes it occupies.
    ///
    /// # RFC 6455 Frame Format
    ///
    /// ```text
    ///  0                   1                   2                   3
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    /// +-+-+-+-+-------+-+-------------+-------------------------------+
    /// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
    /// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
    /// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
    /// | |1|2|3|       |K|             |                               |
    /// +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
    /// |     Extended payload length continued, if payload len == 127  |
    /// + - - - - - - - - - - - - - - - +-------------------------------+
    /// |                               |Masking-key, if MASK set to 1  |
    /// +-------------------------------+-------------------------------+
    /// | Masking-key (continued)       |          Payload Data         |
    /// +-------------------------------- - - - - - - - - - - - - - - - +
    /// ```
    pub fn parse(data: &[u8], role: Role) -> Result<Option<(Self, usize)>, ProtocolError> {
        if data.len() < 2 {
            return Ok(None);
        }

        // First byte: FIN, RSV1-3, Opcode
        let byte1 = data[0];
        let fin = (byte1 & 0b1000_0000) != 0;
        let rsv = (byte1 & 0b0111_0000) >> 4;
        let opcode = Opcode::from(byte1 & 0b0000_1111);

        // Second byte: MASK, Payload length
        let byte2 = data[1];
        let masked = (byte2 & 0b1000_0000) != 0;
        let base_len = byte2 & 0b0111_1111;

        if let Opcode::Reserved(value) = opcode {
            return Err(ProtocolError::InvalidOpcode(value));
        }
        if rsv != 0 {
            return Err(ProtocolError::ReservedBitsSet(rsv));
        }
        role.check_incoming(masked)?;

        let mut offset = 2;
        let length = match base_len {
            126 => {
                if data.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([data[offset], data[offset + 1]]) as u64;
                offset += 2;
                if len < 126 {
                    return Err(ProtocolError::NonMinimalLength(len));
                }
                len
            }
            127 => {
                if data.len() < offset + 8 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&data[offset..offset + 8]);
                let len = u64::from_be_bytes(raw);
                offset += 8;
                if len >> 63 != 0 {
                    return Err(ProtocolError::LengthOutOfRange(len));
                }
                if len <= u16::MAX as u64 {
                    return Err(ProtocolError::NonMinimalLength(len));
                }
                len
            }
            len => len as u64,
        };

        if opcode.is_control() {
            if !fin {
                return Err(ProtocolError::ControlFrameFragmented);
            }
            if length > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolError::ControlFrameTooLarge(length));
            }
        }

        let mut mask = [0u8; 4];
        if masked {
            if data.len() < offset + 4 {
                return Ok(None);
            }
            mask.copy_from_slice(&data[offset..offset + 4]);
            offset += 4;
        }

        Ok(Some((
            FrameHeader {
                fin,
                rsv,
                opcode,
                masked,
                mask,
                length,
            },
            offset,
        )))
    }

    /// Number of bytes `encode` writes for this header.
    pub fn encoded_len(&self) -> usize {
        let extension = match self.length {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        let mask = if self.masked { 4 } else { 0 };
        2 + extension + mask
    }

    /// Write the header using the narrowest length field that fits.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut byte1 = u8::from(self.opcode) | ((self.rsv & 0b111) << 4);
        if self.fin {
            byte1 |= 0b1000_0000;
        }
        dst.put_u8(byte1);

        let mask_bit = if self.masked { 0b1000_0000 } else { 0 };
        if self.length < 126 {
            dst.put_u8(mask_bit | self.length as u8);
        } else if self.length <= 0xFFFF {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(self.length as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(self.length);
        }

        if self.masked {
            dst.put_slice(&self.mask);
        }
    }
}

/// Apply XOR mask to payload data per RFC 6455 Section 5.3.
///
/// Applying the same mask twice yields the original data.
pub fn apply_mask(payload: &mut [u8], mask: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// A header plus its unmasked payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketFrame {
    /// Frame header; `length` always matches `payload.len()`
    pub header: FrameHeader,
    /// Payload data, never masked in memory
    pub payload: Bytes,
}

impl WebSocketFrame {
    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when the frame is not
    /// complete yet. On success the frame's bytes are consumed and the payload
    /// is unmasked in place.
    pub fn decode(
        src: &mut BytesMut,
        role: Role,
        max_frame_size: Option<usize>,
    ) -> Result<Option<Self>, ProtocolError> {
        let Some((header, header_len)) = FrameHeader::parse(&src[..], role)? else {
            return Ok(None);
        };

        let too_large = ProtocolError::FrameTooLarge {
            max: max_frame_size.unwrap_or(usize::MAX),
            actual: header.length,
        };
        let payload_len = usize::try_from(header.length).map_err(|_| too_large.clone())?;
        if max_frame_size.is_some_and(|max| payload_len > max) {
            return Err(too_large);
        }

        let total = header_len.checked_add(payload_len).ok_or(too_large)?;
        if src.len() < total {
            src.reserve((total - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(payload_len);
        if header.masked {
            apply_mask(&mut payload, &header.mask);
        }

        Ok(Some(WebSocketFrame {
            header,
            payload: payload.freeze(),
        }))
    }

    /// Encode this frame into `dst`.
    ///
    /// The length field is derived from the payload, so it is always the
    /// narrowest encoding. Mask key and masked payload are written only when
    /// the header's mask flag is set.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut header = self.header.clone();
        header.length = self.payload.len() as u64;

        dst.reserve(header.encoded_len() + self.payload.len());
        header.encode(dst);

        let start = dst.len();
        dst.extend_from_slice(&self.payload);
        if header.masked {
            apply_mask(&mut dst[start..], &header.mask);
        }
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }

    /// Create a new data frame (text, binary or continuation).
    pub fn new_data(opcode: Opcode, payload: impl Into<Bytes>, fin: bool) -> Self {
        debug_assert!(opcode.is_data());
        Self::with_opcode(opcode, payload.into(), fin)
    }

    /// Create a new text frame.
    pub fn new_text(text: impl Into<String>, fin: bool) -> Self {
        let text: String = text.into();
        Self::new_data(Opcode::Text, text, fin)
    }

    /// Create a new binary frame.
    pub fn new_binary(data: impl Into<Bytes>, fin: bool) -> Self {
        Self::new_data(Opcode::Binary, data, fin)
    }

    /// Create a new continuation frame.
    pub fn new_continuation(data: impl Into<Bytes>, fin: bool) -> Self {
        Self::new_data(Opcode::Continuation, data, fin)
    }

    /// Create a new close frame with optional status code and reason.
    pub fn new_close(code: Option<u16>, reason: Option<&str>) -> Self {
        let mut payload = BytesMut::new();
        if let Some(code) = code {
            payload.put_u16(code);
            if let Some(reason) = reason {
                payload.extend_from_slice(reason.as_bytes());
            }
        }
        Self::with_opcode(Opcode::Close, payload.freeze(), true)
    }

    /// Create a new ping frame.
    pub fn new_ping(data: impl Into<Bytes>) -> Self {
        Self::with_opcode(Opcode::Ping, data.into(), true)
    }

    /// Create a new pong frame.
    pub fn new_pong(data: impl Into<Bytes>) -> Self {
        Self::with_opcode(Opcode::Pong, data.into(), true)
    }

    fn with_opcode(opcode: Opcode, payload: Bytes, fin: bool) -> Self {
        WebSocketFrame {
            header: FrameHeader::new(opcode, fin, payload.len() as u64),
            payload,
        }
    }

    /// Mark this frame as masked with `key`, as a client would send it.
    pub fn masked(mut self, key: [u8; 4]) -> Self {
        self.header.masked = true;
        self.header.mask = key;
        self
    }

    /// Mark this frame as masked with a freshly generated key.
    pub fn with_random_mask(self) -> Self {
        let key: [u8; 4] = rand::random();
        self.masked(key)
    }

    /// Check that the header is legal to put on the wire for `role`.
    pub fn validate_outgoing(&self, role: Role) -> Result<(), ProtocolError> {
        if let Opcode::Reserved(value) = self.header.opcode {
            return Err(ProtocolError::InvalidOpcode(value));
        }
        if self.header.rsv != 0 {
            return Err(ProtocolError::ReservedBitsSet(self.header.rsv));
        }
        if self.header.opcode.is_control() {
            if !self.header.fin {
                return Err(ProtocolError::ControlFrameFragmented);
            }
            if self.payload.len() as u64 > MAX_CONTROL_PAYLOAD {
                return Err(ProtocolError::ControlFrameTooLarge(
                    self.payload.len() as u64,
                ));
            }
        }
        role.check_outgoing(self.header.masked)
    }

    /// The frame's opcode.
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Whether this is the final fragment of a message.
    pub fn is_final(&self) -> bool {
        self.header.fin
    }

    /// Check if this is a text frame.
    pub fn is_text(&self) -> bool {
        self.header.opcode == Opcode::Text
    }

    /// Check if this is a binary frame.
    pub fn is_binary(&self) -> bool {
        self.header.opcode == Opcode::Binary
    }

    /// Check if this is a close frame.
    pub fn is_close(&self) -> bool {
        self.header.opcode == Opcode::Close
    }

    /// Get the payload as a UTF-8 text string.
    /// Returns None if the frame is not a text frame or contains invalid UTF-8.
    pub fn payload_as_text(&self) -> Option<&str> {
        if !self.is_text() {
            return None;
        }
        std::str::from_utf8(&self.payload).ok()
    }
}

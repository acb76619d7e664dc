//! RFC 6455 §5 WebSocket frame decoding and encoding.
//!
//! Each decoded non-control frame is delivered to the bridge as a complete message;
//! continuation-frame reassembly is out of scope (see module docs in `lib.rs`).

use bytes::{Buf, BytesMut};

use crate::error::CoreError;
use crate::limits::ServerLimits;

/// Non-control opcodes are delivered whole; control opcodes drive connection-level behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitFirstTwo,
    AwaitExtLen { opcode: u8, fin: bool, mask: bool, ext_len_bytes: usize },
    AwaitMaskKey { opcode: u8, fin: bool, len: u64 },
    AwaitPayload { opcode: u8, fin: bool, key: [u8; 4], len: u64 },
}

/// Decodes client-to-server frames and encodes server-to-client frames. One instance lives for
/// the remainder of a connection once it has been upgraded.
#[derive(Debug)]
pub struct FrameCodec {
    state: State,
    buf: BytesMut,
    limits: ServerLimits,
}

impl FrameCodec {
    pub fn new(limits: ServerLimits) -> Self {
        Self {
            state: State::AwaitFirstTwo,
            buf: BytesMut::new(),
            limits,
        }
    }

    /// Feeds more bytes from the wire, returning every frame that became decodable.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Frame>, CoreError> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();

        loop {
            match self.state {
                State::AwaitFirstTwo => {
                    if self.buf.len() < 2 {
                        break;
                    }
                    let b0 = self.buf[0];
                    let b1 = self.buf[1];
                    self.buf.advance(2);

                    let fin = b0 & 0b1000_0000 != 0;
                    let rsv = b0 & 0b0111_0000;
                    let opcode = b0 & 0b0000_1111;
                    let mask = b1 & 0b1000_0000 != 0;
                    let payload_len_7 = b1 & 0b0111_1111;

                    if rsv != 0 {
                        return Err(CoreError::WebSocketProtocolError(
                            "reserved bits set without a negotiated extension".into(),
                        ));
                    }
                    if !mask {
                        return Err(CoreError::WebSocketProtocolError(
                            "client frame missing mask bit".into(),
                        ));
                    }
                    if Opcode::from_u8(opcode).is_none() {
                        return Err(CoreError::WebSocketProtocolError(format!(
                            "unknown opcode {opcode:#x}"
                        )));
                    }
                    let is_control = opcode >= 0x8;
                    if is_control && !fin {
                        return Err(CoreError::WebSocketProtocolError(
                            "control frame is fragmented".into(),
                        ));
                    }
                    if is_control && payload_len_7 > 125 {
                        return Err(CoreError::WebSocketProtocolError(
                            "control frame payload exceeds 125 bytes".into(),
                        ));
                    }

                    self.state = match payload_len_7 {
                        126 => State::AwaitExtLen { opcode, fin, mask, ext_len_bytes: 2 },
                        127 => State::AwaitExtLen { opcode, fin, mask, ext_len_bytes: 8 },
                        len => State::AwaitMaskKey { opcode, fin, len: len as u64 },
                    };
                }
                State::AwaitExtLen { opcode, fin, ext_len_bytes, .. } => {
                    if self.buf.len() < ext_len_bytes {
                        break;
                    }
                    let len = if ext_len_bytes == 2 {
                        u16::from_be_bytes([self.buf[0], self.buf[1]]) as u64
                    } else {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&self.buf[..8]);
                        let len = u64::from_be_bytes(arr);
                        if len & 0x8000_0000_0000_0000 != 0 {
                            return Err(CoreError::WebSocketProtocolError(
                                "extended payload length has high bit set".into(),
                            ));
                        }
                        len
                    };
                    self.buf.advance(ext_len_bytes);
                    self.state = State::AwaitMaskKey { opcode, fin, len };
                }
                State::AwaitMaskKey { opcode, fin, len } => {
                    if self.buf.len() < 4 {
                        break;
                    }
                    let mut key = [0u8; 4];
                    key.copy_from_slice(&self.buf[..4]);
                    self.buf.advance(4);

                    if len > self.limits.max_frame_payload() as u64 {
                        return Err(CoreError::MessageTooBig {
                            size: len,
                            limit: self.limits.max_frame_payload(),
                        });
                    }
                    self.state = State::AwaitPayload { opcode, fin, key, len };
                }
                State::AwaitPayload { opcode, fin, key, len } => {
                    let len = len as usize;
                    if self.buf.len() < len {
                        break;
                    }
                    let mut payload = self.buf[..len].to_vec();
                    self.buf.advance(len);
                    for (i, byte) in payload.iter_mut().enumerate() {
                        *byte ^= key[i % 4];
                    }

                    let opcode = Opcode::from_u8(opcode)
                        .expect("validated when the opcode byte was first read");

                    if opcode == Opcode::Text {
                        if std::str::from_utf8(&payload).is_err() {
                            return Err(CoreError::InvalidPayloadData(
                                "text frame payload is not valid UTF-8".into(),
                            ));
                        }
                    }

                    frames.push(Frame { fin, opcode, payload });
                    self.state = State::AwaitFirstTwo;
                }
            }
        }

        Ok(frames)
    }

    /// Encodes a server-to-client frame. Server frames are never masked.
    pub fn encode(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 10);
        let first_byte = 0b1000_0000 | opcode.as_u8();
        out.push(first_byte);

        let len = payload.len();
        if len <= 125 {
            out.push(len as u8);
        } else if len <= u16::MAX as usize {
            out.push(126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        out.extend_from_slice(payload);
        out
    }

    /// Encodes a Close frame carrying the given RFC 6455 status code.
    pub fn encode_close(code: u16, reason: &str) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::encode(Opcode::Close, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_payload(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]).collect()
    }

    fn client_frame(opcode: Opcode, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(0b1000_0000 | opcode.as_u8());
        let len = payload.len();
        let mut second = 0b1000_0000u8;
        if len <= 125 {
            second |= len as u8;
            out.push(second);
        } else if len <= u16::MAX as usize {
            second |= 126;
            out.push(second);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            second |= 127;
            out.push(second);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(&key);
        out.extend_from_slice(&mask_payload(payload, key));
        out
    }

    #[test]
    fn decode_short_text_frame() {
        let mut codec = FrameCodec::new(ServerLimits::new());
        let wire = client_frame(Opcode::Text, b"hi", [1, 2, 3, 4]);
        let frames = codec.decode(&wire).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Text);
        assert_eq!(frames[0].payload, b"hi");
        assert!(frames[0].fin);
    }

    #[test]
    fn decode_across_many_small_chunks() {
        let mut codec = FrameCodec::new(ServerLimits::new());
        let wire = client_frame(Opcode::Binary, &[0xAAu8; 300], [9, 9, 9, 9]);
        let mut frames = Vec::new();
        for byte in &wire {
            frames.extend(codec.decode(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![0xAAu8; 300]);
    }

    #[test]
    fn round_trip_all_length_classes() {
        for len in [0usize, 125, 126, 65535, 65536] {
            let payload = vec![0x5Au8; len];
            let mut codec = FrameCodec::new(ServerLimits::new());
            let wire = client_frame(Opcode::Binary, &payload, [7, 8, 9, 10]);
            let frames = codec.decode(&wire).unwrap();
            assert_eq!(frames.len(), 1, "length class {len}");
            assert_eq!(frames[0].payload, payload, "length class {len}");

            let encoded = FrameCodec::encode(Opcode::Binary, &payload);
            assert_eq!(encoded[0] & 0x80, 0x80, "server frame must set FIN");
            assert_eq!(encoded[1] & 0x80, 0, "server frame must never mask");
        }
    }

    #[test]
    fn unmasked_client_frame_is_protocol_error() {
        let mut codec = FrameCodec::new(ServerLimits::new());
        let wire = [0b1000_0001u8, 0x02, b'h', b'i'];
        let err = codec.decode(&wire).unwrap_err();
        assert!(matches!(err, CoreError::WebSocketProtocolError(_)));
    }

    #[test]
    fn fragmented_control_frame_is_protocol_error() {
        let mut codec = FrameCodec::new(ServerLimits::new());
        let wire = client_frame(Opcode::Ping, b"x", [1, 1, 1, 1]);
        let mut wire = wire;
        wire[0] &= 0b0111_1111; // clear FIN
        let err = codec.decode(&wire).unwrap_err();
        assert!(matches!(err, CoreError::WebSocketProtocolError(_)));
    }

    #[test]
    fn oversized_control_frame_is_protocol_error() {
        let mut codec = FrameCodec::new(ServerLimits::new());
        let payload = vec![0u8; 200];
        let mut wire = Vec::new();
        wire.push(0b1000_1000u8); // FIN + Close opcode
        wire.push(0b1111_1110u8); // MASK + 126
        wire.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        wire.extend_from_slice(&[1, 2, 3, 4]);
        wire.extend_from_slice(&mask_payload(&payload, [1, 2, 3, 4]));
        let err = codec.decode(&wire).unwrap_err();
        assert!(matches!(err, CoreError::WebSocketProtocolError(_)));
    }

    #[test]
    fn invalid_utf8_text_frame_is_invalid_payload_data() {
        let mut codec = FrameCodec::new(ServerLimits::new());
        let wire = client_frame(Opcode::Text, &[0xFF, 0xFE], [0, 0, 0, 0]);
        let err = codec.decode(&wire).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayloadData(_)));
    }

    #[test]
    fn server_frame_never_masks() {
        let encoded = FrameCodec::encode(Opcode::Text, b"hello");
        assert_eq!(encoded[1] & 0b1000_0000, 0);
    }
}

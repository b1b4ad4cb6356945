//! Wire framing between agent and collector.
//!
//! Every frame on the wire is `type (1) || payload_len (4, big-endian) || payload`.
//! Two frame types exist: `'A'` carries credentials, `'I'` carries a PNG image.
//! The collector answers an `'A'` frame with a single byte, `'Y'` or `'N'`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size: type byte plus the 4-byte payload length.
pub const HEADER_LEN: usize = 5;

/// Upper bound on a single frame's payload.
pub const MAX_PAYLOAD_LEN: u32 = 10 * 1024 * 1024;

/// Upper bound on hostname/username length inside an auth payload.
pub const MAX_NAME_LEN: usize = 255;

/// Auth accepted response byte.
pub const AUTH_OK: u8 = b'Y';

/// Auth rejected response byte.
pub const AUTH_REJECTED: u8 = b'N';

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("at least {0} more bytes required")]
    InsufficientBytes(usize),
    #[error("invalid frame type: 0x{0:02x}")]
    InvalidFrameType(u8),
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN} byte limit")]
    PayloadTooLarge(u32),
    #[error("malformed auth payload")]
    MalformedAuth,
    #[error("invalid name: {0:?}")]
    InvalidName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Auth = b'A',
    Image = b'I',
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'A' => Ok(FrameType::Auth),
            b'I' => Ok(FrameType::Image),
            other => Err(Error::InvalidFrameType(other)),
        }
    }
}

/// One parsed frame. The payload is detached from the receive buffer, so the
/// buffer can keep accumulating bytes of the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Resumable: on `InsufficientBytes` the buffer is left untouched and the
    /// call can be repeated once more data has arrived. A complete frame
    /// consumes exactly `HEADER_LEN + payload_len` bytes. The length field is
    /// checked against [`MAX_PAYLOAD_LEN`] as soon as the header is readable,
    /// before any of the payload exists.
    pub fn read_from(buf: &mut BytesMut) -> Result<Frame, Error> {
        if buf.len() < HEADER_LEN {
            return Err(Error::InsufficientBytes(HEADER_LEN - buf.len()));
        }

        let frame_type = FrameType::try_from(buf[0])?;
        let payload_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge(payload_len));
        }

        let total = HEADER_LEN + payload_len as usize;

        if buf.len() < total {
            return Err(Error::InsufficientBytes(total - buf.len()));
        }

        buf.advance(HEADER_LEN);
        let payload = buf.split_to(payload_len as usize).freeze();

        Ok(Frame {
            frame_type,
            payload,
        })
    }

    /// Append the encoded frame to `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_LEN + self.payload.len());
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
    }
}

/// Who an agent claims to be. Learned from the auth payload and fixed for the
/// lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub hostname: String,
    pub username: String,
}

impl Identity {
    /// Decode an auth payload: `be16 hostname_len || hostname || be16
    /// username_len || username`. Bytes after the username are ignored.
    pub fn read_from(payload: &mut Bytes) -> Result<Self, Error> {
        let hostname = read_name(payload)?;
        let username = read_name(payload)?;

        Ok(Self { hostname, username })
    }

    /// Append the encoded auth payload to `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        write_name(buf, &self.hostname);
        write_name(buf, &self.username);
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.hostname, self.username)
    }
}

/// A name is non-empty, at most [`MAX_NAME_LEN`] bytes, and limited to
/// `[A-Za-z0-9_-]`.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    name.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn read_name(stream: &mut Bytes) -> Result<String, Error> {
    if stream.len() < 2 {
        return Err(Error::MalformedAuth);
    }

    let len = stream.get_u16() as usize;

    if len > MAX_NAME_LEN || len > stream.len() {
        return Err(Error::MalformedAuth);
    }

    let name = String::from_utf8(stream.split_to(len).to_vec()).map_err(|_| Error::MalformedAuth)?;

    if !is_valid_name(&name) {
        return Err(Error::InvalidName(name));
    }

    Ok(name)
}

fn write_name(buf: &mut BytesMut, name: &str) {
    buf.put_u16(name.len() as u16);
    buf.extend_from_slice(name.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        frame.write(&mut buf);
        buf
    }

    fn auth_frame(hostname: &str, username: &str) -> Frame {
        let mut payload = BytesMut::new();
        Identity {
            hostname: hostname.into(),
            username: username.into(),
        }
        .write(&mut payload);

        Frame::new(FrameType::Auth, payload.freeze())
    }

    #[test]
    fn auth_frame_wire_bytes() {
        let buf = encode(&auth_frame("alpha", "bob"));

        assert_eq!(
            &buf[..],
            [
                0x41, 0x00, 0x00, 0x00, 0x0c, // 'A', payload_len = 12
                0x00, 0x05, b'a', b'l', b'p', b'h', b'a', // hostname
                0x00, 0x03, b'b', b'o', b'b', // username
            ]
        );
    }

    #[test]
    fn round_trips_auth_and_image() {
        for frame in [
            auth_frame("alpha", "bob"),
            Frame::new(FrameType::Image, vec![0xff, 0x00, 0x7f]),
            Frame::new(FrameType::Image, vec![]),
        ] {
            let mut buf = encode(&frame);
            let decoded = Frame::read_from(&mut buf).unwrap();

            assert_eq!(decoded, frame);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn parse_is_chunking_invariant() {
        let wire = encode(&auth_frame("alpha", "bob"));

        // Feed the frame one byte at a time; every prefix must ask for more.
        let mut buf = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);

            if i + 1 < wire.len() {
                assert!(matches!(
                    Frame::read_from(&mut buf),
                    Err(Error::InsufficientBytes(_))
                ));
                assert_eq!(buf.len(), i + 1, "no bytes consumed before completion");
            }
        }

        let decoded = Frame::read_from(&mut buf).unwrap();
        assert_eq!(decoded, auth_frame("alpha", "bob"));
    }

    #[test]
    fn reports_missing_byte_count() {
        let mut buf = BytesMut::from(&[0x49u8, 0x00, 0x00][..]);
        assert!(matches!(
            Frame::read_from(&mut buf),
            Err(Error::InsufficientBytes(2))
        ));

        let mut buf = BytesMut::from(&[0x49u8, 0x00, 0x00, 0x00, 0x08, 0xaa][..]);
        assert!(matches!(
            Frame::read_from(&mut buf),
            Err(Error::InsufficientBytes(7))
        ));
    }

    #[test]
    fn consecutive_frames_parse_from_one_buffer() {
        let mut buf = encode(&auth_frame("alpha", "bob"));
        let image = Frame::new(FrameType::Image, vec![0xff]);
        image.write(&mut buf);

        assert_eq!(Frame::read_from(&mut buf).unwrap(), auth_frame("alpha", "bob"));
        assert_eq!(Frame::read_from(&mut buf).unwrap(), image);
        assert!(buf.is_empty());
    }

    #[test]
    fn payload_at_cap_is_accepted() {
        let mut buf = encode(&Frame::new(
            FrameType::Image,
            vec![0u8; MAX_PAYLOAD_LEN as usize],
        ));

        let frame = Frame::read_from(&mut buf).unwrap();
        assert_eq!(frame.payload.len(), MAX_PAYLOAD_LEN as usize);
    }

    #[test]
    fn oversize_declaration_is_rejected_before_payload_arrives() {
        // Header only: 'I' with payload_len = cap + 1 and no payload bytes.
        let mut buf = BytesMut::new();
        buf.put_u8(b'I');
        buf.put_u32(MAX_PAYLOAD_LEN + 1);

        assert!(matches!(
            Frame::read_from(&mut buf),
            Err(Error::PayloadTooLarge(len)) if len == MAX_PAYLOAD_LEN + 1
        ));
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let mut buf = BytesMut::from(&[b'X', 0x00, 0x00, 0x00, 0x00][..]);
        assert!(matches!(
            Frame::read_from(&mut buf),
            Err(Error::InvalidFrameType(b'X'))
        ));
    }

    #[test]
    fn identity_round_trip() {
        let identity = Identity {
            hostname: "host-1".into(),
            username: "user_2".into(),
        };

        let mut buf = BytesMut::new();
        identity.write(&mut buf);

        let mut payload = buf.freeze();
        assert_eq!(Identity::read_from(&mut payload).unwrap(), identity);
        assert!(payload.is_empty());
    }

    #[test]
    fn identity_ignores_trailing_bytes() {
        let mut buf = BytesMut::new();
        Identity {
            hostname: "alpha".into(),
            username: "bob".into(),
        }
        .write(&mut buf);
        buf.extend_from_slice(&[0xde, 0xad]);

        let mut payload = buf.freeze();
        assert!(Identity::read_from(&mut payload).is_ok());
    }

    #[test]
    fn identity_rejects_truncated_payloads() {
        // Empty payload.
        let mut payload = Bytes::new();
        assert!(matches!(
            Identity::read_from(&mut payload),
            Err(Error::MalformedAuth)
        ));

        // hostname_len runs past the end of the payload.
        let mut buf = BytesMut::new();
        buf.put_u16(200);
        buf.extend_from_slice(b"short");
        let mut payload = buf.freeze();
        assert!(matches!(
            Identity::read_from(&mut payload),
            Err(Error::MalformedAuth)
        ));

        // Valid hostname, missing username.
        let mut buf = BytesMut::new();
        write_name(&mut buf, "alpha");
        let mut payload = buf.freeze();
        assert!(matches!(
            Identity::read_from(&mut payload),
            Err(Error::MalformedAuth)
        ));
    }

    #[test]
    fn identity_rejects_invalid_characters() {
        let mut buf = BytesMut::new();
        write_name(&mut buf, "alpha");
        write_name(&mut buf, "b!b!");

        let mut payload = buf.freeze();
        assert!(matches!(
            Identity::read_from(&mut payload),
            Err(Error::InvalidName(name)) if name == "b!b!"
        ));
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("alpha"));
        assert!(is_valid_name("host-1_a"));
        assert!(is_valid_name(&"a".repeat(255)));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name(&"a".repeat(256)));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("dot.name"));
        assert!(!is_valid_name("имя"));
    }
}

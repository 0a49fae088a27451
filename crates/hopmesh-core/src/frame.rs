//! Wire frame and codec
//!
//! Every message on the air is a single packed frame:
//!
//! ```text
//! offset  field          size
//! 0       network_id     2
//! 2       type           1
//! 3       id             1
//! 4       hop_count      1
//! 5       src            6
//! 11      dest           6
//! 17      payload_len    1
//! 18      payload        payload_len (<= 232)
//! ```
//!
//! The frame is always `18 + payload_len` bytes, which keeps it inside the
//! 250-byte radio payload.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::ops::Deref;

use crate::address::{MacAddress, ADDRESS_LEN};
use crate::error::{MeshError, Result};

/// Fixed header size; anything shorter on the air is garbage
pub const FRAME_HEADER_LEN: usize = 18;

/// Largest buffer the radio will carry
pub const MAX_FRAME_LEN: usize = 250;

/// Largest payload that fits a frame
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_HEADER_LEN;

/// Frame type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Plain data, fire-and-forget (type 0)
    Data,
    /// Data that must be acknowledged by the destination (type 1)
    Confirmable,
    /// Acknowledgement of a confirmable frame (type 3)
    Ack,
    /// Any other type value, passed through untouched
    Other(u8),
}

impl FrameKind {
    /// Wire value of this kind
    pub fn as_u8(self) -> u8 {
        match self {
            FrameKind::Data => 0,
            FrameKind::Confirmable => 1,
            FrameKind::Ack => 3,
            FrameKind::Other(raw) => raw,
        }
    }
}

impl From<u8> for FrameKind {
    fn from(raw: u8) -> Self {
        match raw {
            0 => FrameKind::Data,
            1 => FrameKind::Confirmable,
            3 => FrameKind::Ack,
            other => FrameKind::Other(other),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(kind: FrameKind) -> Self {
        kind.as_u8()
    }
}

/// Why a frame sits in the outgoing queue, and the bucket it is
/// deduplicated under once seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryRole {
    /// Application data without end-to-end confirmation
    Unconfirmed,
    /// Application data awaiting an acknowledgement
    Confirmed,
    /// A foreign frame being relayed, or an unknown frame type
    Forwarded,
    /// Acknowledgement generated by this node
    Acknowledgement,
}

impl DeliveryRole {
    /// Dedup bucket for a received frame kind
    pub fn for_kind(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Data => DeliveryRole::Unconfirmed,
            FrameKind::Confirmable => DeliveryRole::Confirmed,
            FrameKind::Ack => DeliveryRole::Acknowledgement,
            FrameKind::Other(_) => DeliveryRole::Forwarded,
        }
    }
}

impl fmt::Display for DeliveryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryRole::Unconfirmed => write!(f, "unconfirmed"),
            DeliveryRole::Confirmed => write!(f, "confirmed"),
            DeliveryRole::Forwarded => write!(f, "forwarded"),
            DeliveryRole::Acknowledgement => write!(f, "ack"),
        }
    }
}

/// Frame payload, never longer than [`MAX_PAYLOAD_LEN`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap bytes, rejecting anything that would not fit a frame
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(MeshError::PayloadTooLarge {
                size: data.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self(data))
    }

    /// Copy a slice into a payload
    pub fn copy_from_slice(data: &[u8]) -> Result<Self> {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Zero-length payload (acknowledgements)
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Underlying bytes
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consume into the underlying bytes
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A mesh message as carried on the air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Network identifier, carried but never inspected
    pub network_id: [u8; 2],
    /// Frame type
    pub kind: FrameKind,
    /// Per-source sequence number, wraps at 256
    pub id: u8,
    /// Remaining forwarding budget
    pub hop_count: u8,
    /// Originating node
    pub src: MacAddress,
    /// Final destination
    pub dest: MacAddress,
    /// Application payload
    pub payload: Payload,
}

impl Frame {
    /// Serialized size of this frame
    pub fn encoded_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len()
    }

    /// Serialize to the packed wire layout
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&self.network_id);
        buf.put_u8(self.kind.as_u8());
        buf.put_u8(self.id);
        buf.put_u8(self.hop_count);
        buf.put_slice(self.src.as_bytes());
        buf.put_slice(self.dest.as_bytes());
        // Payload length is bounded by construction
        buf.put_u8(self.payload.len() as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a frame from a received buffer
    ///
    /// Bytes past `18 + payload_len` are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(MeshError::FrameTooShort {
                len: data.len(),
                min: FRAME_HEADER_LEN,
            });
        }

        let payload_len = data[17] as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(MeshError::MalformedFrame(format!(
                "payload length {} exceeds {}",
                payload_len, MAX_PAYLOAD_LEN
            )));
        }
        let end = FRAME_HEADER_LEN + payload_len;
        if data.len() < end {
            return Err(MeshError::MalformedFrame(format!(
                "payload length {} but only {} bytes follow the header",
                payload_len,
                data.len() - FRAME_HEADER_LEN
            )));
        }

        let src = MacAddress::from_slice(&data[5..5 + ADDRESS_LEN])
            .ok_or_else(|| MeshError::MalformedFrame("source address".to_string()))?;
        let dest = MacAddress::from_slice(&data[11..11 + ADDRESS_LEN])
            .ok_or_else(|| MeshError::MalformedFrame("destination address".to_string()))?;

        Ok(Self {
            network_id: [data[0], data[1]],
            kind: FrameKind::from(data[2]),
            id: data[3],
            hop_count: data[4],
            src,
            dest,
            payload: Payload::copy_from_slice(&data[FRAME_HEADER_LEN..end])?,
        })
    }

    /// Copy of this frame one hop further along, or `None` once the budget
    /// would run out
    pub fn forwarded(&self) -> Option<Self> {
        if self.hop_count <= 1 {
            return None;
        }
        Some(Self {
            hop_count: self.hop_count - 1,
            ..self.clone()
        })
    }

    /// Acknowledgement answering this frame, sent from `own` back to its source
    pub fn acknowledgement(&self, own: MacAddress, hop_budget: u8) -> Self {
        Self {
            network_id: self.network_id,
            kind: FrameKind::Ack,
            id: self.id,
            hop_count: hop_budget,
            src: own,
            dest: self.src,
            payload: Payload::empty(),
        }
    }

    /// Dedup bucket of this frame
    pub fn role(&self) -> DeliveryRole {
        DeliveryRole::for_kind(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame {
            network_id: [0x12, 0x34],
            kind: FrameKind::Confirmable,
            id: 7,
            hop_count: 3,
            src: MacAddress::repeat(0xAA),
            dest: MacAddress::repeat(0xBB),
            payload: Payload::copy_from_slice(&[0x01, 0x02]).unwrap(),
        }
    }

    #[test]
    fn test_wire_layout() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), 20);
        assert_eq!(&bytes[0..2], &[0x12, 0x34]);
        assert_eq!(bytes[2], 1);
        assert_eq!(bytes[3], 7);
        assert_eq!(bytes[4], 3);
        assert_eq!(&bytes[5..11], &[0xAA; 6]);
        assert_eq!(&bytes[11..17], &[0xBB; 6]);
        assert_eq!(bytes[17], 2);
        assert_eq!(&bytes[18..], &[0x01, 0x02]);
    }

    #[test]
    fn test_decode_encoded() {
        let frame = sample();
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let err = Frame::decode(&[0u8; 17]).unwrap_err();
        assert!(matches!(err, MeshError::FrameTooShort { len: 17, min: 18 }));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let mut bytes = sample().encode().to_vec();
        bytes.pop();
        assert!(matches!(
            Frame::decode(&bytes),
            Err(MeshError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length_byte() {
        let mut bytes = vec![0u8; MAX_FRAME_LEN];
        bytes[17] = 240;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(MeshError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let frame = sample();
        let mut bytes = frame.encode().to_vec();
        bytes.extend_from_slice(&[0xEE; 4]);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let mut frame = sample();
        frame.kind = FrameKind::Other(9);
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.kind, FrameKind::Other(9));
        assert_eq!(decoded.role(), DeliveryRole::Forwarded);
    }

    #[test]
    fn test_payload_bound() {
        assert!(Payload::new(vec![0u8; MAX_PAYLOAD_LEN]).is_ok());
        let err = Payload::new(vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert!(matches!(
            err,
            MeshError::PayloadTooLarge { size: 233, max: 232 }
        ));
    }

    #[test]
    fn test_max_frame_fits_radio() {
        let mut frame = sample();
        frame.payload = Payload::new(vec![0x55; MAX_PAYLOAD_LEN]).unwrap();
        assert_eq!(frame.encode().len(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_forwarded_decrements_budget() {
        let frame = sample();
        let next = frame.forwarded().unwrap();
        assert_eq!(next.hop_count, 2);
        assert_eq!(next.id, frame.id);
        assert_eq!(next.src, frame.src);
        assert_eq!(next.payload, frame.payload);

        let mut last = frame.clone();
        last.hop_count = 1;
        assert!(last.forwarded().is_none());
        last.hop_count = 0;
        assert!(last.forwarded().is_none());
    }

    #[test]
    fn test_acknowledgement() {
        let frame = sample();
        let own = MacAddress::repeat(0xBB);
        let ack = frame.acknowledgement(own, 3);
        assert_eq!(ack.kind, FrameKind::Ack);
        assert_eq!(ack.id, 7);
        assert_eq!(ack.src, own);
        assert_eq!(ack.dest, frame.src);
        assert!(ack.payload.is_empty());
        assert_eq!(ack.encode().len(), FRAME_HEADER_LEN);
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(DeliveryRole::for_kind(FrameKind::Data), DeliveryRole::Unconfirmed);
        assert_eq!(
            DeliveryRole::for_kind(FrameKind::Confirmable),
            DeliveryRole::Confirmed
        );
        assert_eq!(
            DeliveryRole::for_kind(FrameKind::Ack),
            DeliveryRole::Acknowledgement
        );
        assert_eq!(FrameKind::from(2), FrameKind::Other(2));
        assert_eq!(u8::from(FrameKind::Ack), 3);
    }
}

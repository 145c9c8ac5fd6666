//! Datagram framing around audio packet bodies.
//!
//! ```text
//! ┌──────────┬────────────────┬──────────┬────────────┬─────────┐
//! │ type: u8 │ sender: 16 B   │ seq: u16 │ properties │ payload │
//! └──────────┴────────────────┴──────────┴────────────┴─────────┘
//!  transport header            body (parsed by InboundAudioStream)
//! ```

use anyhow::Result;
use uuid::Uuid;

use super::format::PacketType;

const HEADER_LEN: usize = 1 + 16;

/// An audio packet with its transport header already parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPacket<'a> {
    pub packet_type: PacketType,
    pub sender: Uuid,
    /// Sequence number, properties and payload.
    pub body: &'a [u8],
}

impl<'a> AudioPacket<'a> {
    pub fn new(packet_type: PacketType, sender: Uuid, body: &'a [u8]) -> Self {
        Self {
            packet_type,
            sender,
            body,
        }
    }

    pub fn from_datagram(datagram: &'a [u8]) -> Result<Self> {
        if datagram.len() < HEADER_LEN {
            anyhow::bail!(
                "Datagram of {} bytes is shorter than the {} byte header",
                datagram.len(),
                HEADER_LEN
            );
        }
        let packet_type = PacketType::try_from(datagram[0])?;
        let sender = Uuid::from_slice(&datagram[1..HEADER_LEN])?;
        Ok(Self::new(packet_type, sender, &datagram[HEADER_LEN..]))
    }

    pub fn write_datagram(&self, out: &mut Vec<u8>) {
        out.reserve(HEADER_LEN + self.body.len());
        out.push(self.packet_type as u8);
        out.extend_from_slice(self.sender.as_bytes());
        out.extend_from_slice(self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datagram_header_parses() {
        let sender = Uuid::from_u128(42);
        let body = [1u8, 0, 2, 0, 9, 9, 9, 9];
        let mut datagram = Vec::new();
        AudioPacket::new(PacketType::MicrophoneAudio, sender, &body).write_datagram(&mut datagram);

        let packet = AudioPacket::from_datagram(&datagram).unwrap();
        assert_eq!(packet.packet_type, PacketType::MicrophoneAudio);
        assert_eq!(packet.sender, sender);
        assert_eq!(packet.body, &body);
    }

    #[test]
    fn test_short_or_unknown_datagram_rejected() {
        assert!(AudioPacket::from_datagram(&[2, 0, 0]).is_err());

        let mut datagram = vec![99u8];
        datagram.extend_from_slice(&[0u8; 16]);
        assert!(AudioPacket::from_datagram(&datagram).is_err());
    }
}

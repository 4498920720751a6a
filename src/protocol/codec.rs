//! Protocol codec for encoding/decoding datagrams
//!
//! Decoding sniffs length and prefix to pick a message shape and never
//! fails: anything malformed comes back as [`Message::Unrecognized`].

use bytes::{BufMut, Bytes, BytesMut};
use std::net::IpAddr;
use thiserror::Error;

use super::{
    Buttons, ControlFrame, Message, ANNOUNCE_PREFIX, ASSIGN_PREFIX, CONTROL_FRAME_LEN,
    MAX_FRAME_ID_LEN, NEUTRAL_AXIS, PEER_ID_FIELD_LEN, RESUME_TOKEN, STOP_TOKEN,
};

/// Field separator of every text message
const SEPARATOR: char = ':';

/// Codec errors (encode side only)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Peer id must not be empty")]
    EmptyPeerId,

    #[error("Peer id contains a field separator: {0:?}")]
    SeparatorInPeerId(String),

    #[error("Unrecognized messages cannot be encoded")]
    Unencodable,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Classify and decode one inbound datagram
pub fn decode(datagram: &[u8]) -> Message {
    if datagram.len() == CONTROL_FRAME_LEN {
        return Message::Control(decode_control_frame(datagram));
    }

    let text = String::from_utf8_lossy(datagram);
    let text = text.trim_end_matches(&['\0', '\r', '\n'][..]);

    if let Some(rest) = text.strip_prefix(ANNOUNCE_PREFIX) {
        return decode_announcement(rest).unwrap_or(Message::Unrecognized);
    }
    if let Some(rest) = text.strip_prefix(ASSIGN_PREFIX) {
        return decode_assignment(rest).unwrap_or(Message::Unrecognized);
    }
    if text == STOP_TOKEN {
        return Message::Stop { engaged: true };
    }
    if text == RESUME_TOKEN {
        return Message::Stop { engaged: false };
    }

    // Empty ids are rejected like in every other text shape, so anything
    // decoded here can be encoded again
    match text.split_once(SEPARATOR) {
        Some((peer_id, status)) if !peer_id.is_empty() => Message::Status {
            peer_id: peer_id.to_string(),
            status: status.to_string(),
        },
        _ => Message::Unrecognized,
    }
}

fn decode_announcement(rest: &str) -> Option<Message> {
    let mut fields = rest.split(SEPARATOR);

    let peer_id = fields.next().filter(|id| !id.is_empty())?;
    let address: IpAddr = fields.next()?.trim().parse().ok()?;
    let port = match fields.next() {
        Some(field) => Some(field.trim().parse::<u16>().ok().filter(|p| *p != 0)?),
        None => None,
    };

    Some(Message::Announcement {
        peer_id: peer_id.to_string(),
        address,
        port,
    })
}

fn decode_assignment(rest: &str) -> Option<Message> {
    let (peer_id, channel) = rest.split_once(SEPARATOR)?;
    if peer_id.is_empty() {
        return None;
    }
    let channel = channel.trim().parse::<u16>().ok()?;

    Some(Message::Assignment {
        peer_id: peer_id.to_string(),
        channel,
    })
}

fn decode_control_frame(datagram: &[u8]) -> ControlFrame {
    let id_field = &datagram[..PEER_ID_FIELD_LEN];
    let id_len = id_field
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(PEER_ID_FIELD_LEN);

    // Bytes 20 and 21 are the reserved axes, 23 is reserved
    ControlFrame {
        peer_id: String::from_utf8_lossy(&id_field[..id_len]).into_owned(),
        axes: [datagram[16], datagram[17], datagram[18], datagram[19]],
        buttons: Buttons::from_bits(datagram[22]),
    }
}

/// Encode a message into a fresh buffer
pub fn encode(message: &Message) -> CodecResult<Bytes> {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Append the wire form of a message to a buffer
pub fn encode_into(message: &Message, buf: &mut BytesMut) -> CodecResult<()> {
    match message {
        Message::Announcement { peer_id, address, port } => {
            check_text_id(peer_id)?;
            let text = match port {
                Some(port) => format!("{ANNOUNCE_PREFIX}{peer_id}:{address}:{port}"),
                None => format!("{ANNOUNCE_PREFIX}{peer_id}:{address}"),
            };
            buf.put_slice(text.as_bytes());
        }
        Message::Assignment { peer_id, channel } => {
            check_text_id(peer_id)?;
            buf.put_slice(format!("{ASSIGN_PREFIX}{peer_id}:{channel}").as_bytes());
        }
        Message::Status { peer_id, status } => {
            check_text_id(peer_id)?;
            buf.put_slice(format!("{peer_id}:{status}").as_bytes());
        }
        Message::Stop { engaged } => {
            let token = if *engaged { STOP_TOKEN } else { RESUME_TOKEN };
            buf.put_slice(token.as_bytes());
        }
        Message::Control(frame) => encode_control_frame(frame, buf),
        Message::Unrecognized => return Err(CodecError::Unencodable),
    }
    Ok(())
}

fn encode_control_frame(frame: &ControlFrame, buf: &mut BytesMut) {
    let id = frame_id_bytes(&frame.peer_id);

    buf.reserve(CONTROL_FRAME_LEN);
    buf.put_slice(id);
    buf.put_bytes(0, PEER_ID_FIELD_LEN - id.len());
    buf.put_slice(&frame.axes);
    buf.put_u8(NEUTRAL_AXIS);
    buf.put_u8(NEUTRAL_AXIS);
    buf.put_u8(frame.buttons.to_bits());
    buf.put_u8(0);
}

/// Bytes of a peer id as they appear in a control frame
pub fn frame_id_bytes(peer_id: &str) -> &[u8] {
    let bytes = peer_id.as_bytes();
    &bytes[..bytes.len().min(MAX_FRAME_ID_LEN)]
}

fn check_text_id(peer_id: &str) -> CodecResult<()> {
    if peer_id.is_empty() {
        return Err(CodecError::EmptyPeerId);
    }
    if peer_id.contains(SEPARATOR) {
        return Err(CodecError::SeparatorInPeerId(peer_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Mode;
    use std::net::Ipv4Addr;

    #[test]
    fn test_control_frame_layout() {
        let frame = ControlFrame::new("R1", [10, 20, 30, 40], Buttons::new([true, false, true, false]));
        let bytes = encode(&Message::Control(frame)).unwrap();

        let mut expected = b"R1".to_vec();
        expected.resize(16, 0);
        expected.extend_from_slice(&[10, 20, 30, 40, 127, 127]);
        expected.extend_from_slice(&[0b0101, 0]);

        assert_eq!(bytes.len(), CONTROL_FRAME_LEN);
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_control_frame_recovers_samples() {
        let frame = ControlFrame::new("TestRobot", [100, 150, 200, 127], Buttons::new([false, true, false, true]));
        let bytes = encode(&Message::Control(frame.clone())).unwrap();

        assert_eq!(decode(&bytes), Message::Control(frame));
    }

    #[test]
    fn test_control_frame_truncates_long_id() {
        let frame = ControlFrame::new("a-very-long-robot-name", [0, 255, 1, 254], Buttons::default());
        let bytes = encode(&Message::Control(frame)).unwrap();

        assert_eq!(bytes.len(), CONTROL_FRAME_LEN);
        assert_eq!(bytes[15], 0);
        match decode(&bytes) {
            Message::Control(decoded) => {
                assert_eq!(decoded.peer_id, "a-very-long-rob");
                assert_eq!(decoded.axes, [0, 255, 1, 254]);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_any_24_bytes_is_a_control_frame() {
        let datagram = b"ANNOUNCE:R1:10.0.0.1:123";
        assert_eq!(datagram.len(), CONTROL_FRAME_LEN);
        assert!(matches!(decode(datagram), Message::Control(_)));
    }

    #[test]
    fn test_decode_announcement() {
        assert_eq!(
            decode(b"ANNOUNCE:R1:127.0.0.1"),
            Message::Announcement {
                peer_id: "R1".to_string(),
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: None,
            }
        );
        assert_eq!(
            decode(b"ANNOUNCE:Robot2:192.168.1.20:12350"),
            Message::Announcement {
                peer_id: "Robot2".to_string(),
                address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
                port: Some(12350),
            }
        );
    }

    #[test]
    fn test_decode_malformed_announcements() {
        for datagram in [
            &b"ANNOUNCE:R1"[..],
            b"ANNOUNCE::127.0.0.1",
            b"ANNOUNCE:R1:not-an-ip",
            b"ANNOUNCE:R1:127.0.0.1:port",
            b"ANNOUNCE:R1:127.0.0.1:0",
        ] {
            assert_eq!(decode(datagram), Message::Unrecognized, "{:?}", datagram);
        }
    }

    #[test]
    fn test_decode_text_shapes() {
        assert_eq!(
            decode(b"ASSIGN:R1:12346"),
            Message::Assignment { peer_id: "R1".to_string(), channel: 12346 }
        );
        assert_eq!(decode(b"STOP"), Message::Stop { engaged: true });
        assert_eq!(decode(b"STOP_OFF"), Message::Stop { engaged: false });
        assert_eq!(decode(b"R1:active"), Message::status("R1", Mode::Active));
        assert_eq!(
            decode(b"R1:odd:word"),
            Message::Status { peer_id: "R1".to_string(), status: "odd:word".to_string() }
        );
        assert_eq!(decode(b"no separator here"), Message::Unrecognized);
        assert_eq!(decode(b""), Message::Unrecognized);
    }

    #[test]
    fn test_status_with_empty_id_is_unrecognized() {
        // `encode` refuses an empty id, so decode does not produce one
        assert_eq!(decode(b":active"), Message::Unrecognized);
        assert!(encode(&Message::status("", Mode::Active)).is_err());
        assert_eq!(decode(b" :active"), Message::status(" ", Mode::Active));
    }

    #[test]
    fn test_decode_invalid_utf8_is_not_fatal() {
        assert_eq!(
            decode(b"R\xff:standby"),
            Message::Status { peer_id: "R\u{fffd}".to_string(), status: "standby".to_string() }
        );
        assert_eq!(decode(b"STOP\r\n"), Message::Stop { engaged: true });
    }

    #[test]
    fn test_encode_text_messages() {
        let assign = Message::Assignment { peer_id: "R1".to_string(), channel: 12346 };
        assert_eq!(&encode(&assign).unwrap()[..], b"ASSIGN:R1:12346");
        assert_eq!(&encode(&Message::status("R1", Mode::Autonomous)).unwrap()[..], b"R1:autonomous");
        assert_eq!(&encode(&Message::Stop { engaged: true }).unwrap()[..], b"STOP");
        assert_eq!(&encode(&Message::Stop { engaged: false }).unwrap()[..], b"STOP_OFF");

        let announce = Message::Announcement {
            peer_id: "R1".to_string(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: Some(40000),
        };
        assert_eq!(&encode(&announce).unwrap()[..], b"ANNOUNCE:R1:127.0.0.1:40000");
    }

    #[test]
    fn test_encode_rejects_bad_ids() {
        assert_eq!(
            encode(&Message::status("", Mode::Standby)),
            Err(CodecError::EmptyPeerId)
        );
        assert_eq!(
            encode(&Message::status("R:1", Mode::Standby)),
            Err(CodecError::SeparatorInPeerId("R:1".to_string()))
        );
        assert_eq!(encode(&Message::Unrecognized), Err(CodecError::Unencodable));
    }
}

//! Length-prefixed framing
//!
//! A frame is a 4-byte little-endian body length followed by the encoded
//! [`Message`]. Exactly one frame travels over each connection.

use crate::error::{NodeError, Result};
use crate::network::Message;
use std::io::{Read, Write};

pub const LENGTH_PREFIX_LEN: usize = 4;

/// Encode `message` into a complete frame
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let body = message.encode()?;
    let len = u32::try_from(body.len()).map_err(|_| {
        NodeError::Serialization(format!("{} byte message does not fit a frame", body.len()))
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Write one frame carrying `message`
pub fn write_frame<W: Write>(stream: &mut W, message: &Message) -> Result<()> {
    let frame = encode_frame(message)?;
    stream.write_all(&frame)?;
    stream.flush()?;
    Ok(())
}

/// Read one frame and decode its message. Bodies longer than `max_len`
/// are rejected before anything is allocated for them.
pub fn read_frame<R: Read>(stream: &mut R, max_len: u32) -> Result<Message> {
    let prefix = read_up_to(stream, LENGTH_PREFIX_LEN as u64)?;
    if prefix.len() < LENGTH_PREFIX_LEN {
        return Err(NodeError::Framing(format!(
            "stream closed after {} of {LENGTH_PREFIX_LEN} length bytes",
            prefix.len()
        )));
    }
    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
    if len > max_len {
        return Err(NodeError::Framing(format!(
            "declared length {len} exceeds limit {max_len}"
        )));
    }

    let body = read_up_to(stream, u64::from(len))?;
    if body.len() < len as usize {
        return Err(NodeError::Framing(format!(
            "stream closed after {} of {len} body bytes",
            body.len()
        )));
    }
    Message::decode(&body)
}

fn read_up_to<R: Read>(stream: &mut R, limit: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.by_ref().take(limit).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{RoutingSnapshot, TransactionEnvelope};
    use std::io::Cursor;

    const MAX: u32 = 1024 * 1024;

    #[test]
    fn test_prefix_is_little_endian_body_length() {
        let message = Message::Announcement {
            client_port: 7001,
            listener_port: 7000,
        };
        let frame = encode_frame(&message).unwrap();
        let body = message.encode().unwrap();

        assert_eq!(&frame[..4], &(body.len() as u32).to_le_bytes());
        assert_eq!(&frame[4..], body.as_slice());
    }

    #[test]
    fn test_write_then_read() {
        let message = Message::Snapshot {
            table: RoutingSnapshot::from_entries(vec![(7001, 7000)]),
        };
        let mut wire = Vec::new();
        write_frame(&mut wire, &message).unwrap();

        let decoded = read_frame(&mut Cursor::new(wire), MAX).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_reads_only_one_frame() {
        let first = Message::Announcement {
            client_port: 1,
            listener_port: 2,
        };
        let second = Message::Transaction(TransactionEnvelope::new(vec![1], vec![2], vec![3]));
        let mut wire = encode_frame(&first).unwrap();
        wire.extend(encode_frame(&second).unwrap());

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_frame(&mut cursor, MAX).unwrap(), first);
        assert_eq!(read_frame(&mut cursor, MAX).unwrap(), second);
    }

    #[test]
    fn test_truncated_prefix() {
        let result = read_frame(&mut Cursor::new(vec![8, 0]), MAX);
        assert!(matches!(result, Err(NodeError::Framing(_))));
    }

    #[test]
    fn test_truncated_body() {
        let mut frame = encode_frame(&Message::Announcement {
            client_port: 7001,
            listener_port: 7000,
        })
        .unwrap();
        frame.truncate(frame.len() - 1);

        let result = read_frame(&mut Cursor::new(frame), MAX);
        assert!(matches!(result, Err(NodeError::Framing(_))));
    }

    #[test]
    fn test_empty_stream() {
        let result = read_frame(&mut Cursor::new(Vec::new()), MAX);
        assert!(matches!(result, Err(NodeError::Framing(_))));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut wire = 64u32.to_le_bytes().to_vec();
        wire.extend(vec![0u8; 64]);
        let result = read_frame(&mut Cursor::new(wire), 16);
        assert!(matches!(result, Err(NodeError::Framing(_))));
    }

    #[test]
    fn test_unknown_discriminant() {
        let body = [9u8, 0, 0, 0];
        let mut wire = (body.len() as u32).to_le_bytes().to_vec();
        wire.extend_from_slice(&body);

        let result = read_frame(&mut Cursor::new(wire), MAX);
        assert!(matches!(result, Err(NodeError::Framing(_))));
    }
}

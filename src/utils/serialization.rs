// Wire encoding: bincode 2 with little-endian, fixed-width integers so the
// byte layout of every message is stable and independent of values
use crate::error::{NodeError, Result};
use bincode::config::{Configuration, Fixint, Limit, LittleEndian};

/// Upper bound on what one message may claim while decoding; a length field
/// larger than this fails before anything is allocated for it
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

fn wire_config() -> Configuration<LittleEndian, Fixint, Limit<MAX_MESSAGE_LEN>> {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_MESSAGE_LEN>()
}

/// Serialize data with the wire configuration
pub fn serialize<T: bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, wire_config())
        .map_err(|e| NodeError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data with the wire configuration; the whole slice must be consumed
pub fn deserialize<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T> {
    let (data, read) = bincode::decode_from_slice(bytes, wire_config())
        .map_err(|e| NodeError::Framing(format!("Deserialization failed: {e}")))?;
    if read != bytes.len() {
        return Err(NodeError::Framing(format!(
            "{} trailing bytes after message body",
            bytes.len() - read
        )));
    }
    Ok(data)
}

//! Tagged binary encoding used for persisted records and log entries.
//!
//! Every blob starts with a one-byte format tag followed by the `bincode`
//! encoding of the record.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::constants::FORMAT_TAG_CURRENT;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Empty record")]
    Empty,

    #[error("Unknown format tag {0}")]
    UnknownTag(u8),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Encode `value` in the current format.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(value)?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(FORMAT_TAG_CURRENT);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Split a blob into its format tag and body.
pub fn split_tag(data: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    match data.split_first() {
        Some((tag, body)) => Ok((*tag, body)),
        None => Err(CodecError::Empty),
    }
}

/// Decode a blob written by [`to_bytes`].
pub fn from_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    let (tag, body) = split_tag(data)?;
    if tag != FORMAT_TAG_CURRENT {
        return Err(CodecError::UnknownTag(tag));
    }
    Ok(bincode::deserialize(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: i32,
    }

    #[test]
    fn test_tagged_roundtrip() {
        let value = Sample {
            name: "lounge".into(),
            count: 3,
        };
        let bytes = to_bytes(&value).unwrap();
        assert_eq!(bytes[0], FORMAT_TAG_CURRENT);
        let restored: Sample = from_bytes(&bytes).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(from_bytes::<Sample>(&[]), Err(CodecError::Empty)));
        assert!(matches!(
            from_bytes::<Sample>(&[0x7f, 1, 2]),
            Err(CodecError::UnknownTag(0x7f))
        ));
        assert!(from_bytes::<Sample>(&[FORMAT_TAG_CURRENT, 0xff]).is_err());
    }
}

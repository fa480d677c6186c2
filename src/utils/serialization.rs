// bincode 2 with the standard configuration; the encoding is deterministic, which
// the transaction ID and signing digests depend on
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| LedgerError::Serialization(format!("Serialization failed: {e}")))
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| LedgerError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Record {
        id: i64,
        payload: Vec<u8>,
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let record = Record {
            id: -1,
            payload: vec![1, 2, 3],
        };
        let first = serialize(&record).unwrap();
        let second = serialize(&record.clone()).unwrap();
        assert_eq!(first, second);

        let decoded: Record = deserialize(&first).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Record> = deserialize(&invalid_bytes);
        assert!(matches!(result, Err(LedgerError::Serialization(_))));
    }
}

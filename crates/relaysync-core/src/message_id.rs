//! Deterministic message identity
//!
//! ```text
//! id = SHA-256("MESSAGE_ID" || group_id || timestamp_le_u64 || body)
//! ```
//!
//! A content fingerprint used as the de-duplication key downstream, not a
//! secrecy primitive.

use sha2::{Digest, Sha256};

use crate::types::{GroupId, MessageId, SyncRecord};

/// Domain separation tag prefixed to every message id preimage.
const MESSAGE_ID_TAG: &[u8] = b"MESSAGE_ID";

/// Compute the identifier of a message appended to `group_id` at `timestamp`.
pub fn compute_message_id(group_id: &GroupId, timestamp: i64, body: &[u8]) -> MessageId {
    let mut hasher = Sha256::new();
    hasher.update(MESSAGE_ID_TAG);
    hasher.update(group_id.as_bytes());
    hasher.update((timestamp as u64).to_le_bytes());
    hasher.update(body);
    MessageId(hasher.finalize().into())
}

impl SyncRecord {
    /// Identifier of this record, see [`compute_message_id`].
    pub fn id(&self) -> MessageId {
        compute_message_id(&self.group_id, self.timestamp, &self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_is_deterministic() {
        let group = GroupId([3u8; 32]);
        let a = compute_message_id(&group, 1_700_000_000, b"hello");
        let b = compute_message_id(&group, 1_700_000_000, b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn test_message_id_covers_every_field() {
        let group = GroupId([3u8; 32]);
        let base = compute_message_id(&group, 10, b"hello");

        assert_ne!(base, compute_message_id(&GroupId([4u8; 32]), 10, b"hello"));
        assert_ne!(base, compute_message_id(&group, 11, b"hello"));
        assert_ne!(base, compute_message_id(&group, 10, b"hellp"));
    }

    #[test]
    fn test_message_id_matches_manual_preimage() {
        let group = GroupId([0xaa; 32]);
        let timestamp: i64 = 0x0102030405060708;

        let mut preimage = b"MESSAGE_ID".to_vec();
        preimage.extend_from_slice(&[0xaa; 32]);
        preimage.extend_from_slice(&[8, 7, 6, 5, 4, 3, 2, 1]);
        preimage.extend_from_slice(b"body");
        let expected: [u8; 32] = Sha256::digest(&preimage).into();

        assert_eq!(compute_message_id(&group, timestamp, b"body").0, expected);
    }

    #[test]
    fn test_record_id_uses_record_fields() {
        let record = SyncRecord {
            group_id: GroupId([1u8; 32]),
            timestamp: 42,
            body: vec![1, 2, 3],
        };
        assert_eq!(
            record.id(),
            compute_message_id(&record.group_id, 42, &[1, 2, 3])
        );
    }
}

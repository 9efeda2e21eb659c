//! Patch and tool lookup over a message's parts

use tracing::debug;

use crate::ids::{is_valid_hash, MessageId};
use crate::storage::Storage;
use crate::types::Part;

/// Snapshot hash recorded by the first `patch` part of a message.
///
/// Parts are visited in directory enumeration order, which is not
/// necessarily authoring order; with several patch parts the pick is
/// whichever the filesystem lists first.
pub fn patch_hash(storage: &Storage, message_id: &MessageId) -> Option<String> {
    patch_hash_in(&storage.read_parts(message_id))
}

/// Names of the tools a message invoked, in part order.
pub fn tools_used(storage: &Storage, message_id: &MessageId) -> Vec<String> {
    tools_in(&storage.read_parts(message_id))
}

pub(crate) fn patch_hash_in(parts: &[Part]) -> Option<String> {
    let hash = parts.iter().find_map(|part| match part {
        Part::Patch { hash } => Some(hash.clone()),
        _ => None,
    })??;

    if is_valid_hash(&hash) {
        Some(hash)
    } else {
        debug!("Ignoring malformed patch hash {:?}", hash);
        None
    }
}

pub(crate) fn tools_in(parts: &[Part]) -> Vec<String> {
    parts
        .iter()
        .filter_map(|part| match part {
            Part::Tool { tool } => tool.clone(),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(hash: &str) -> Part {
        Part::Patch {
            hash: Some(hash.to_string()),
        }
    }

    fn tool(name: &str) -> Part {
        Part::Tool {
            tool: Some(name.to_string()),
        }
    }

    #[test]
    fn test_first_patch_wins() {
        let parts = vec![tool("edit"), patch("deadbeef"), patch("cafebabe")];
        assert_eq!(patch_hash_in(&parts).as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_no_patch() {
        let parts = vec![tool("edit"), tool("bash"), Part::Unknown];
        assert_eq!(patch_hash_in(&parts), None);
        assert_eq!(tools_in(&parts), vec!["edit", "bash"]);
    }

    #[test]
    fn test_first_patch_without_hash_is_absent() {
        let parts = vec![Part::Patch { hash: None }, patch("deadbeef")];
        assert_eq!(patch_hash_in(&parts), None);
    }

    #[test]
    fn test_unsafe_hash_rejected() {
        assert_eq!(patch_hash_in(&[patch("--output=/tmp/pwn")]), None);
    }

    #[test]
    fn test_reads_from_storage() {
        let dir = tempfile::tempdir().unwrap();
        let part_dir = dir.path().join("part/msg_222");
        std::fs::create_dir_all(&part_dir).unwrap();
        std::fs::write(part_dir.join("prt_1.json"), r#"{"type":"tool","tool":"edit"}"#).unwrap();

        let storage = Storage::new(dir.path());
        let id = MessageId::parse("msg_222").unwrap();
        assert_eq!(patch_hash(&storage, &id), None);
        assert_eq!(tools_used(&storage, &id), vec!["edit"]);
        assert!(tools_used(&storage, &MessageId::parse("msg_none").unwrap()).is_empty());
    }
}

//! Identifier validation
//!
//! Every identifier that ends up in a filesystem path or a git argument goes
//! through one of these newtypes first. Parsing rejects anything outside a
//! strict character set, so `../`, shell metacharacters and whitespace never
//! reach `Path::join` or `Command::arg`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ses_[A-Za-z0-9_-]+$").expect("static pattern"));

static OPAQUE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static pattern"));

static HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{4,64}$").expect("static pattern"));

/// `.` and `..` match the opaque character class but name directories.
fn is_dot_segment(value: &str) -> bool {
    value == "." || value == ".."
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Borrow the validated identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

id_newtype!(
    /// Session identifier, always `ses_` followed by `[A-Za-z0-9_-]`.
    SessionId
);

id_newtype!(
    /// Message identifier (`msg_*` in practice, any `[A-Za-z0-9._-]`).
    MessageId
);

id_newtype!(
    /// Project identifier as recorded in session metadata.
    ProjectId
);

impl SessionId {
    /// Validate and wrap a session id.
    ///
    /// # Errors
    /// Returns `Error::InvalidId` if `value` is not `ses_[A-Za-z0-9_-]+`.
    pub fn parse(value: &str) -> Result<Self> {
        if SESSION_ID_RE.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::InvalidId {
                kind: "session",
                value: value.to_string(),
            })
        }
    }
}

impl MessageId {
    /// Validate and wrap a message id.
    ///
    /// # Errors
    /// Returns `Error::InvalidId` if `value` contains anything outside
    /// `[A-Za-z0-9._-]` or is a bare dot segment.
    pub fn parse(value: &str) -> Result<Self> {
        if OPAQUE_ID_RE.is_match(value) && !is_dot_segment(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::InvalidId {
                kind: "message",
                value: value.to_string(),
            })
        }
    }
}

impl ProjectId {
    /// Validate and wrap a project id.
    ///
    /// # Errors
    /// Returns `Error::InvalidId` under the same rules as [`MessageId::parse`].
    pub fn parse(value: &str) -> Result<Self> {
        if OPAQUE_ID_RE.is_match(value) && !is_dot_segment(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::InvalidId {
                kind: "project",
                value: value.to_string(),
            })
        }
    }
}

/// Check a snapshot object hash before it is handed to git.
pub fn is_valid_hash(hash: &str) -> bool {
    HASH_RE.is_match(hash)
}

/// Validate a file path filter.
///
/// Paths are always passed after `--`, so leading dashes are harmless; only
/// empty strings and control characters that git cannot round-trip are rejected.
///
/// # Errors
/// Returns `Error::InvalidPath` for empty paths or paths containing NUL/newline.
pub fn validate_file_path(path: &str) -> Result<&str> {
    if path.is_empty() || path.contains(['\0', '\n', '\r']) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_accepts_valid() {
        assert!(SessionId::parse("ses_AAA").is_ok());
        assert!(SessionId::parse("ses_4f2a-b_9").is_ok());
    }

    #[test]
    fn test_session_id_rejects_malformed() {
        let malformed = [
            "", "ses_", "AAA", "ses_../x", "ses_a b", "ses_a;rm -rf", "ses_a/b", "ses_a.b",
        ];
        for bad in malformed {
            assert!(SessionId::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_message_id_rules() {
        assert!(MessageId::parse("msg_111").is_ok());
        assert!(MessageId::parse("msg.v2-x_y").is_ok());
        for bad in ["", ".", "..", "../etc", "msg 1", "msg;ls", "a/b", "$(id)", "msg\n"] {
            assert!(MessageId::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_invalid_id_is_input_error() {
        let err = MessageId::parse("; rm -rf /").unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains("message"));
    }

    #[test]
    fn test_project_id_from_serde() {
        let id: ProjectId = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(id.as_str(), "global");
        assert!(serde_json::from_str::<ProjectId>("\"../x\"").is_err());
    }

    #[test]
    fn test_hash_validation() {
        assert!(is_valid_hash("deadbeef"));
        assert!(is_valid_hash("4b825dc642cb6eb9a060e54bf8d69288fbee4904"));
        assert!(!is_valid_hash("HEAD"));
        assert!(!is_valid_hash("--output=/tmp/x"));
        assert!(!is_valid_hash("abc"));
    }

    #[test]
    fn test_validate_file_path() {
        assert_eq!(validate_file_path("src/a.ts").unwrap(), "src/a.ts");
        assert!(validate_file_path("").is_err());
        assert!(validate_file_path("a\0b").is_err());
    }
}

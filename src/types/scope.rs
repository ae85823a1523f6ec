//! Ownership partition key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who owns a catalog: an anonymous session or an authenticated user.
///
/// The engine trusts the value verbatim; deriving it is the host's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OwnerScope {
    Session(String),
    User(String),
}

impl OwnerScope {
    pub fn session(id: impl Into<String>) -> Self {
        OwnerScope::Session(id.into())
    }

    pub fn user(id: impl Into<String>) -> Self {
        OwnerScope::User(id.into())
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            OwnerScope::Session(id) => Some(id),
            OwnerScope::User(_) => None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            OwnerScope::User(id) => Some(id),
            OwnerScope::Session(_) => None,
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self, OwnerScope::Session(_))
    }
}

impl fmt::Display for OwnerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerScope::Session(id) => write!(f, "session:{}", id),
            OwnerScope::User(id) => write!(f, "user:{}", id),
        }
    }
}

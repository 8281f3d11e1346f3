//! Durable conversation state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which assistant conversation the next invocation should continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum SessionRef {
    /// Start a new conversation.
    #[default]
    None,
    /// Continue whatever conversation the tool last had in this scope.
    ContinueMostRecent,
    /// Resume a specific conversation.
    Explicit(String),
}

impl SessionRef {
    /// Whether an invocation with this reference starts a new conversation.
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::ContinueMostRecent => f.write_str("most recent"),
            Self::Explicit(token) => write!(f, "{token}"),
        }
    }
}

/// The singleton session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Working directory of the assistant process
    pub scope: PathBuf,
    /// Conversation to continue
    pub session: SessionRef,
}

impl SessionState {
    /// A state with the given scope and no conversation.
    pub fn new(scope: impl Into<PathBuf>) -> Self {
        Self {
            scope: scope.into(),
            session: SessionRef::None,
        }
    }
}

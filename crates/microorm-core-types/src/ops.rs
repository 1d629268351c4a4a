//! Operation names stamped on structured session events

use serde::{Deserialize, Serialize};
use std::fmt;

/// The session operation an event or error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpName {
    Get,
    Load,
    Save,
    Delete,
    Query,
    Procedure,
    LazyLoad,
    Commit,
    OpenSession,
    Register,
}

impl OpName {
    /// Stable string form used as the `op` field value
    pub fn as_str(&self) -> &'static str {
        match self {
            OpName::Get => "get",
            OpName::Load => "load",
            OpName::Save => "save",
            OpName::Delete => "delete",
            OpName::Query => "query",
            OpName::Procedure => "procedure",
            OpName::LazyLoad => "lazy_load",
            OpName::Commit => "commit",
            OpName::OpenSession => "open_session",
            OpName::Register => "register",
        }
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

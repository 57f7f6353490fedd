use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a sink should do with the record addressed by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert or update the record.
    #[default]
    Write,
    /// Remove the record.
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct ParseOperationError(pub String);

impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("write") {
            Ok(Operation::Write)
        } else if s.eq_ignore_ascii_case("delete") {
            Ok(Operation::Delete)
        } else {
            Err(ParseOperationError(s.to_owned()))
        }
    }
}

//! Caller-side choice of snippet IDs (`all` or `1,3,4`).

use std::str::FromStr;

use thiserror::Error;

use crate::Document;
use crate::snippet::SnippetId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("snippet ID must not be zero")]
    ZeroId,
    #[error("`{0}` is not a snippet ID")]
    InvalidId(String),
    #[error("snippet ID {id} doesn't exist (available: {available})")]
    UnknownId { id: SnippetId, available: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every non-library snippet, ascending.
    All,
    Ids(Vec<SnippetId>),
}

impl FromStr for SnippetId {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| SelectError::InvalidId(s.to_string()))?;
        SnippetId::new(n).ok_or(SelectError::ZeroId)
    }
}

impl FromStr for Selection {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "all" {
            return Ok(Selection::All);
        }
        s.split(',')
            .map(str::parse)
            .collect::<Result<Vec<SnippetId>, _>>()
            .map(Selection::Ids)
    }
}

impl Document {
    /// Concrete IDs for `selection`, rejecting any that don't exist.
    pub fn select(&self, selection: &Selection) -> Result<Vec<SnippetId>, SelectError> {
        let known = self.ids();
        match selection {
            Selection::All => Ok(known),
            Selection::Ids(ids) => {
                if let Some(&id) = ids.iter().find(|id| !known.contains(id)) {
                    let available = if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
                    };
                    return Err(SelectError::UnknownId { id, available });
                }
                Ok(ids.clone())
            }
        }
    }
}

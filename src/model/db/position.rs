use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core position data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCore {
    /// Name of the office, e.g. "President". Unique.
    pub name: String,
    /// Display rank; lower comes first.
    pub priority: u32,
    /// Maximum number of candidates a voter may pick.
    /// A value of one makes this a single-choice position.
    pub max_vote: u32,
}

impl PositionCore {
    /// Does this position allow picking more than one candidate?
    pub fn is_multi_select(&self) -> bool {
        self.max_vote > 1
    }
}

/// A position without an ID.
pub type NewPosition = PositionCore;

/// A position from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub position: PositionCore,
}

impl Deref for Position {
    type Target = PositionCore;

    fn deref(&self) -> &Self::Target {
        &self.position
    }
}

impl DerefMut for Position {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.position
    }
}

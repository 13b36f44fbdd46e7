use crate::{CollabError, CollabResult, PotId, PrimaryKey, Privacy};

/// Category tags are transported joined by this separator
pub const CATEGORY_SEPARATOR: char = '|';

/// The user supplied settings of a new room
#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub name: String,
    /// How many members the room can hold, including the creator
    pub member_limit: i32,
    pub privacy: Privacy,
    pub categories: Vec<String>,
}

impl RoomSettings {
    /// Trims the settings and rejects values a room can't be created with
    pub fn validated(self) -> CollabResult<Self> {
        let name = self.name.trim().to_string();

        if name.is_empty() {
            return Err(CollabError::invalid("room name must not be empty"));
        }

        if self.member_limit <= 0 {
            return Err(CollabError::invalid("member limit must be positive"));
        }

        let categories: Vec<String> = self
            .categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .collect();

        if categories
            .iter()
            .any(|c| c.is_empty() || c.contains(CATEGORY_SEPARATOR))
        {
            return Err(CollabError::invalid(format!(
                "categories must be non-empty and not contain '{CATEGORY_SEPARATOR}'"
            )));
        }

        Ok(Self {
            name,
            member_limit: self.member_limit,
            privacy: self.privacy,
            categories,
        })
    }
}

/// Splits a `|` separated category string, ignoring surrounding whitespace
pub fn parse_categories(raw: &str) -> Vec<String> {
    raw.split(CATEGORY_SEPARATOR)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Identifiers generated when a room is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedRoom {
    pub room_id: PrimaryKey,
    pub pot_id: PotId,
}

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// Identifies the pot a room is currently cooking in
pub type PotId = Uuid;

/// A pottogether account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    /// The login identity of the user
    pub email: String,
    pub username: String,
    /// The argon2 hash of the password
    pub password: String,
    /// Index into the client's avatar set, if one was picked
    pub avatar: Option<i32>,
    pub level: i32,
    /// Sum of all completed intervals in seconds
    pub total_time: i64,
    pub created_at: DateTime<Utc>,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// Whether a room shows up in the public listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privacy {
    Public,
    Private,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

impl Display for Privacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pottogether room
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub name: String,
    /// The pot records are currently cooked in
    pub current_pot: PotId,
    /// Always equal to the number of memberships of this room
    pub member_count: i32,
    /// Capacity ceiling, fixed at creation
    pub member_limit: i32,
    pub privacy: Privacy,
    pub categories: Vec<String>,
    pub level: i32,
    pub total_time: i64,
    pub created_at: DateTime<Utc>,
}

/// A member of a room
#[derive(Debug, Clone)]
pub struct RoomMemberData {
    pub user_id: PrimaryKey,
    pub avatar: Option<i32>,
}

/// A room whose stored member count disagrees with its memberships
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCountDrift {
    pub room_id: PrimaryKey,
    /// The denormalized counter on the room row
    pub recorded: i32,
    /// The number of membership rows
    pub actual: i32,
}

/// An entry in the ingredient catalog
#[derive(Debug, Clone)]
pub struct IngredientData {
    pub id: PrimaryKey,
    pub name: String,
    pub image: String,
    /// Nominal cooking duration in seconds
    pub interval: i32,
    /// Unlock requirement, e.g. `level2`. Empty if always available.
    pub requirement: String,
}

/// The lifecycle state of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordStatus {
    Active,
    Completed,
    Interrupted,
}

impl RecordStatus {
    pub fn code(&self) -> i16 {
        match self {
            Self::Active => 0,
            Self::Completed => 1,
            Self::Interrupted => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Active),
            1 => Some(Self::Completed),
            2 => Some(Self::Interrupted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A record joined with its ingredient and owner
#[derive(Debug, Clone)]
pub struct RecordDetail {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub username: String,
    pub room_id: PrimaryKey,
    pub pot_id: PotId,
    pub ingredient_id: PrimaryKey,
    pub ingredient_name: String,
    pub ingredient_image: String,
    /// Photo of the result, set on completion
    pub image: Option<String>,
    /// Set on completion
    pub caption: Option<String>,
    /// Actual cooking time in seconds, 0 while active
    pub interval: i32,
    pub interrupt: i32,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    /// None while the record is active
    pub finish_time: Option<DateTime<Utc>>,
}

/// The sum of record intervals for a single calendar day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: i64,
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

use crate::ErrorKind;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type ArcedDatabase = Arc<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("User {user_id} is already a member of room {room_id}")]
    AlreadyMember {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    #[error("User {user_id} is not a member of room {room_id}")]
    NotMember {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    #[error("Room {room_id} is full")]
    RoomFull { room_id: PrimaryKey },
    #[error("Record {record_id} is already completed")]
    AlreadyCompleted { record_id: PrimaryKey },
    /// Stored data contradicts an invariant, e.g. a member count below zero
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::NotMember { .. } => ErrorKind::NotFound,
            Self::Conflict { .. }
            | Self::AlreadyMember { .. }
            | Self::RoomFull { .. }
            | Self::AlreadyCompleted { .. } => ErrorKind::Conflict,
            Self::Internal(_) | Self::Invariant(_) => ErrorKind::Internal,
        }
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(DatabaseError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that can fetch pottogether data from a database.
///
/// Every method is one unit of work: implementations must apply all of its
/// writes or none of them.
#[async_trait]
pub trait Database: Send + Sync {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>>;
    async fn rooms_by_member(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>>;
    async fn public_rooms(&self) -> Result<Vec<RoomData>>;
    /// Creates the room, its pot and the creator's membership
    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData>;
    /// Adds a membership and bumps the member count, failing with
    /// [DatabaseError::RoomFull] once the limit is reached
    async fn join_room(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    async fn leave_room(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    async fn member_count_drift(&self) -> Result<Vec<MemberCountDrift>>;

    async fn list_ingredients(&self) -> Result<Vec<IngredientData>>;
    async fn ingredient_by_requirement(&self, requirement: &str) -> Result<IngredientData>;
    async fn create_ingredient(&self, new_ingredient: NewIngredient) -> Result<IngredientData>;

    async fn create_record(&self, new_record: NewRecord) -> Result<PrimaryKey>;
    /// Moves an active record into a terminal state. Fails with
    /// [DatabaseError::AlreadyCompleted] if it already left the active state.
    async fn complete_record(&self, completion: RecordCompletion) -> Result<()>;
    async fn record_by_id(&self, record_id: PrimaryKey) -> Result<RecordDetail>;
    /// Records of a user or room, active ones first, then by creation order
    async fn records_by_owner(&self, owner: RecordOwner) -> Result<Vec<RecordDetail>>;
    /// Records matching the filter, newest first
    async fn latest_records(&self, filter: RecordFilter) -> Result<Vec<RecordDetail>>;
    /// Records of a user that finished within the window
    async fn records_finished_between(
        &self,
        user_id: PrimaryKey,
        window: TimeWindow,
    ) -> Result<Vec<RecordDetail>>;
    /// Sums record intervals per `created_at` day. Days without records are omitted.
    async fn daily_totals(&self, query: DailyTotalsQuery) -> Result<Vec<DailyTotal>>;
}

#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    /// Already hashed
    pub password: String,
    pub avatar: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub member_limit: i32,
    pub privacy: Privacy,
    pub categories: Vec<String>,
    /// The pot created together with the room
    pub pot_id: PotId,
    /// The creator, who becomes the first member
    pub user_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewIngredient {
    pub name: String,
    pub image: String,
    pub interval: i32,
    pub requirement: String,
}

#[derive(Debug)]
pub struct NewRecord {
    pub user_id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub pot_id: PotId,
    pub ingredient_id: PrimaryKey,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RecordCompletion {
    pub record_id: PrimaryKey,
    pub image: String,
    pub caption: String,
    pub interval: i32,
    pub interrupt: i32,
    /// Must be terminal
    pub status: RecordStatus,
    pub finished_at: DateTime<Utc>,
}

/// Who a set of records belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOwner {
    User(PrimaryKey),
    Room(PrimaryKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Any,
    Active,
    Terminal,
    Only(RecordStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: RecordStatus) -> bool {
        match self {
            Self::Any => true,
            Self::Active => !status.is_terminal(),
            Self::Terminal => status.is_terminal(),
            Self::Only(expected) => *expected == status,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecordFilter {
    pub owner: RecordOwner,
    pub status: StatusFilter,
    pub limit: Option<i64>,
}

/// A half-open range of time, `start <= t < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DailyTotalsQuery {
    /// Only count records of this user
    pub user_id: Option<PrimaryKey>,
    /// Only count records of this room
    pub room_id: Option<PrimaryKey>,
    pub window: TimeWindow,
}

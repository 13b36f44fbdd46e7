//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use chrono::{DateTime, NaiveDate, Utc};
use pottogether_collab::{
    DailyTotal, IngredientData, LevelData, RecordDetail, RoomData, RoomMemberData,
    RoomOverview as CollabRoomOverview, SessionData, UserData,
    UserOverview as CollabUserOverview, UserProfile as CollabUserProfile, WeekDay as CollabWeekDay,
    CATEGORY_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The body of every response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub is_success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn success(data: T, message: &str) -> Self {
        Self {
            is_success: true,
            data: Some(data),
            message: Some(message.to_string()),
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            is_success: false,
            data: None,
            message: Some(message),
        }
    }
}

impl Envelope<()> {
    /// A successful response without a payload
    pub fn done(message: &str) -> Self {
        Self {
            is_success: true,
            data: None,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    id: i32,
    email: String,
    username: String,
    avatar: Option<i32>,
    level: i32,
    total_time: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub room_id: i32,
    pub pot_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    id: i32,
    name: String,
    member_count: i32,
    member_limit: i32,
    privacy: String,
    /// Tags joined by `|`
    categories: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    id: i32,
    avatar: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    level: i32,
    total_time: i64,
    /// Image of the ingredient unlocked at the next level
    next: Option<String>,
}

/// A day of the current week. Days without records are left out.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeekDay {
    date: NaiveDate,
    user_total: i64,
    room_total: i64,
}

/// Cooking time of a single day. Days without records are left out.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DayTotal {
    date: NaiveDate,
    total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    id: i32,
    user_id: i32,
    username: String,
    room_id: i32,
    pot_id: Uuid,
    ingredient_id: i32,
    ingredient_name: String,
    ingredient_image: String,
    image: Option<String>,
    caption: Option<String>,
    interval: i32,
    interrupt: i32,
    /// 0 = active, 1 = completed, 2 = interrupted
    status: i16,
    created_at: DateTime<Utc>,
    finish_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordCreated {
    pub record_id: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomOverview {
    id: i32,
    name: String,
    current_pot: Uuid,
    level: Level,
    members: Vec<RoomMember>,
    week: Vec<WeekDay>,
    cooking: Vec<Record>,
    done: Vec<Record>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    id: i32,
    level: Level,
    today: Vec<Record>,
    week: Vec<DayTotal>,
    month: Vec<DayTotal>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    status: i16,
    ingredient: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    id: i32,
    name: String,
    avatar: Option<i32>,
    /// Seconds since the current record started
    cooking_time: i64,
    status: Option<UserStatus>,
    done: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    id: i32,
    name: String,
    image: String,
    interval: i32,
    requirement: String,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            avatar: self.avatar,
            level: self.level,
            total_time: self.total_time,
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            expires_at: self.expires_at,
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<RoomSummary> for RoomData {
    fn to_serialized(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            member_count: self.member_count,
            member_limit: self.member_limit,
            privacy: self.privacy.to_string(),
            categories: self.categories.join(CATEGORY_SEPARATOR.to_string().as_str()),
        }
    }
}

impl ToSerialized<RoomMember> for RoomMemberData {
    fn to_serialized(&self) -> RoomMember {
        RoomMember {
            id: self.user_id,
            avatar: self.avatar,
        }
    }
}

impl ToSerialized<Level> for LevelData {
    fn to_serialized(&self) -> Level {
        Level {
            level: self.level,
            total_time: self.total_time,
            next: self.next.clone(),
        }
    }
}

impl ToSerialized<WeekDay> for CollabWeekDay {
    fn to_serialized(&self) -> WeekDay {
        WeekDay {
            date: self.date,
            user_total: self.user_total,
            room_total: self.room_total,
        }
    }
}

impl ToSerialized<DayTotal> for DailyTotal {
    fn to_serialized(&self) -> DayTotal {
        DayTotal {
            date: self.date,
            total: self.total,
        }
    }
}

impl ToSerialized<Record> for RecordDetail {
    fn to_serialized(&self) -> Record {
        Record {
            id: self.id,
            user_id: self.user_id,
            username: self.username.clone(),
            room_id: self.room_id,
            pot_id: self.pot_id,
            ingredient_id: self.ingredient_id,
            ingredient_name: self.ingredient_name.clone(),
            ingredient_image: self.ingredient_image.clone(),
            image: self.image.clone(),
            caption: self.caption.clone(),
            interval: self.interval,
            interrupt: self.interrupt,
            status: self.status.code(),
            created_at: self.created_at,
            finish_time: self.finish_time,
        }
    }
}

impl ToSerialized<RoomOverview> for CollabRoomOverview {
    fn to_serialized(&self) -> RoomOverview {
        RoomOverview {
            id: self.id,
            name: self.name.clone(),
            current_pot: self.current_pot,
            level: self.level.to_serialized(),
            members: self.members.to_serialized(),
            week: self.week.to_serialized(),
            cooking: self.cooking.to_serialized(),
            done: self.done.to_serialized(),
        }
    }
}

impl ToSerialized<UserOverview> for CollabUserOverview {
    fn to_serialized(&self) -> UserOverview {
        UserOverview {
            id: self.user_id,
            level: self.level.to_serialized(),
            today: self.today.to_serialized(),
            week: self.week.to_serialized(),
            month: self.month.to_serialized(),
        }
    }
}

impl ToSerialized<UserProfile> for CollabUserProfile {
    fn to_serialized(&self) -> UserProfile {
        UserProfile {
            id: self.user_id,
            name: self.name.clone(),
            avatar: self.avatar,
            cooking_time: self.cooking_time,
            status: self.status.as_ref().map(|s| UserStatus {
                status: s.status.code(),
                ingredient: s.ingredient.clone(),
            }),
            done: self.done.clone(),
        }
    }
}

impl ToSerialized<Ingredient> for IngredientData {
    fn to_serialized(&self) -> Ingredient {
        Ingredient {
            id: self.id,
            name: self.name.clone(),
            image: self.image.clone(),
            interval: self.interval,
            requirement: self.requirement.clone(),
        }
    }
}

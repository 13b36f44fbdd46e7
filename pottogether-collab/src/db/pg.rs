use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool};

use crate::{
    DailyTotal, DailyTotalsQuery, Database, DatabaseError, DatabaseResult, IngredientData,
    IntoDatabaseError, MemberCountDrift, NewIngredient, NewRecord, NewRoom, NewSession, NewUser,
    PotId, PrimaryKey, Privacy, RecordCompletion, RecordDetail, RecordFilter, RecordOwner,
    RecordStatus, Result, RoomData, RoomMemberData, SessionData, StatusFilter, TimeWindow,
    UserData,
};

const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

const RECORD_DETAIL_SELECT: &str = "
    SELECT
        records.id,
        records.user_id,
        users.username,
        records.room_id,
        records.pot_id,
        records.ingredient_id,
        ingredients.name AS ingredient_name,
        ingredients.image AS ingredient_image,
        records.image,
        records.caption,
        records.time_interval,
        records.interrupt,
        records.status,
        records.created_at,
        records.finish_time
    FROM records
        INNER JOIN ingredients ON records.ingredient_id = ingredients.id
        INNER JOIN users ON records.user_id = users.id";

/// A postgres database implementation for pottogether
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        Ok(Self { pool })
    }

    /// Applies the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))
    }

    async fn rooms_where(
        &self,
        condition: &str,
        value: Option<PrimaryKey>,
    ) -> Result<Vec<RoomData>> {
        let sql = format!("SELECT * FROM rooms WHERE {condition} ORDER BY id");

        let mut statement = query_as::<_, RoomRow>(&sql);
        if let Some(value) = value {
            statement = statement.bind(value);
        }

        statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(RoomRow::into_data)
            .collect()
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "email"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        query_as::<_, UserRow>(
            "
            INSERT INTO users (email, username, password, avatar, level, total_time, created_at)
            VALUES ($1, $2, $3, $4, 1, 0, $5)
            RETURNING *",
        )
        .bind(&new_user.email)
        .bind(&new_user.username)
        .bind(&new_user.password)
        .bind(new_user.avatar)
        .bind(new_user.created_at)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.unique_or("user", "email", &new_user.email))
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row = query_as::<_, SessionRow>(
            "
            SELECT
                sessions.id AS session_id,
                sessions.token,
                sessions.expires_at,
                users.*
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.session_id,
            token: row.token,
            expires_at: row.expires_at,
            user: row.user.into(),
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&new_session.token)
            .bind(new_session.user_id)
            .bind(new_session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| e.reference_or("user"))?;

        self.session_by_token(&new_session.token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()> {
        query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?
            .into_data()
    }

    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>> {
        let rows = query_as::<_, (PrimaryKey, Option<i32>)>(
            "
            SELECT users.id, users.avatar
            FROM room_users
                INNER JOIN users ON room_users.user_id = users.id
            WHERE room_users.room_id = $1
            ORDER BY users.id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|(user_id, avatar)| RoomMemberData { user_id, avatar })
            .collect())
    }

    async fn rooms_by_member(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        self.rooms_where(
            "id IN (SELECT room_id FROM room_users WHERE user_id = $1)",
            Some(user_id),
        )
        .await
    }

    async fn public_rooms(&self) -> Result<Vec<RoomData>> {
        self.rooms_where("privacy = 'public'", None).await
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("SELECT id FROM users WHERE id = $1")
            .bind(new_room.user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("user", "id"))?;

        let (room_id,) = query_as::<_, (PrimaryKey,)>(
            "
            INSERT INTO rooms (
                name, current_pot, member_count, member_limit, privacy, categories,
                level, total_time, created_at
            )
            VALUES ($1, $2, 1, $3, $4, $5, 1, 0, $6)
            RETURNING id",
        )
        .bind(&new_room.name)
        .bind(new_room.pot_id)
        .bind(new_room.member_limit)
        .bind(new_room.privacy.as_str())
        .bind(&new_room.categories)
        .bind(new_room.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        query("INSERT INTO pots (id, room_id) VALUES ($1, $2)")
            .bind(new_room.pot_id)
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.unique_or("pot", "id", &new_room.pot_id.to_string()))?;

        // The creator is the first member
        query("INSERT INTO room_users (user_id, room_id) VALUES ($1, $2)")
            .bind(new_room.user_id)
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.room_by_id(room_id).await
    }

    async fn join_room(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Holding the row lock serializes joins and leaves of this room
        query("SELECT id FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        let inserted = query(
            "
            INSERT INTO room_users (user_id, room_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.reference_or("user"))?;

        if inserted.rows_affected() == 0 {
            return Err(DatabaseError::AlreadyMember { room_id, user_id });
        }

        let updated = query(
            "
            UPDATE rooms
            SET member_count = member_count + 1
            WHERE id = $1 AND member_count < member_limit",
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        // Dropping the transaction rolls back the membership insert
        if updated.rows_affected() != 1 {
            return Err(DatabaseError::RoomFull { room_id });
        }

        tx.commit().await.map_err(|e| e.any())
    }

    async fn leave_room(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        query("SELECT id FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        let deleted = query("DELETE FROM room_users WHERE user_id = $1 AND room_id = $2")
            .bind(user_id)
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        if deleted.rows_affected() == 0 {
            return Err(DatabaseError::NotMember { room_id, user_id });
        }

        let updated = query(
            "
            UPDATE rooms
            SET member_count = member_count - 1
            WHERE id = $1 AND member_count > 0",
        )
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if updated.rows_affected() != 1 {
            return Err(DatabaseError::Invariant(format!(
                "member count of room {room_id} would drop below zero"
            )));
        }

        tx.commit().await.map_err(|e| e.any())
    }

    async fn member_count_drift(&self) -> Result<Vec<MemberCountDrift>> {
        let rows = query_as::<_, (PrimaryKey, i32, i32)>(
            "
            SELECT rooms.id, rooms.member_count, COUNT(room_users.user_id)::INT AS actual
            FROM rooms
                LEFT JOIN room_users ON room_users.room_id = rooms.id
            GROUP BY rooms.id
            HAVING rooms.member_count <> COUNT(room_users.user_id)
            ORDER BY rooms.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|(room_id, recorded, actual)| MemberCountDrift {
                room_id,
                recorded,
                actual,
            })
            .collect())
    }

    async fn list_ingredients(&self) -> Result<Vec<IngredientData>> {
        query_as::<_, IngredientRow>("SELECT * FROM ingredients ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(|e| e.any())
    }

    async fn ingredient_by_requirement(&self, requirement: &str) -> Result<IngredientData> {
        query_as::<_, IngredientRow>(
            "SELECT * FROM ingredients WHERE requirement = $1 ORDER BY id LIMIT 1",
        )
        .bind(requirement)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("ingredient", "requirement"))
    }

    async fn create_ingredient(&self, new_ingredient: NewIngredient) -> Result<IngredientData> {
        query_as::<_, IngredientRow>(
            "
            INSERT INTO ingredients (name, image, time_interval, requirement)
            VALUES ($1, $2, $3, $4)
            RETURNING *",
        )
        .bind(&new_ingredient.name)
        .bind(&new_ingredient.image)
        .bind(new_ingredient.interval)
        .bind(&new_ingredient.requirement)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.any())
    }

    async fn create_record(&self, new_record: NewRecord) -> Result<PrimaryKey> {
        // Selecting from pots files the record only against the room's own pot
        let inserted = query_as::<_, (PrimaryKey,)>(
            "
            INSERT INTO records (
                user_id, room_id, pot_id, ingredient_id, time_interval, interrupt, status,
                created_at
            )
            SELECT $1, pots.room_id, pots.id, $4, 0, 0, $5, $6
            FROM pots
            WHERE pots.id = $3 AND pots.room_id = $2
            RETURNING id",
        )
        .bind(new_record.user_id)
        .bind(new_record.room_id)
        .bind(new_record.pot_id)
        .bind(new_record.ingredient_id)
        .bind(RecordStatus::Active.code())
        .bind(new_record.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| e.reference_or("record reference"))?;

        match inserted {
            Some((record_id,)) => Ok(record_id),
            None => Err(DatabaseError::NotFound {
                resource: "pot",
                identifier: "room_id",
            }),
        }
    }

    async fn complete_record(&self, completion: RecordCompletion) -> Result<()> {
        let record_id = completion.record_id;
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let updated = query_as::<_, (PrimaryKey, PrimaryKey, i32)>(
            "
            UPDATE records SET
                image = $1,
                caption = $2,
                time_interval = $3,
                interrupt = $4,
                status = $5,
                finish_time = $6
            WHERE id = $7 AND status = $8
            RETURNING user_id, room_id, time_interval",
        )
        .bind(&completion.image)
        .bind(&completion.caption)
        .bind(completion.interval)
        .bind(completion.interrupt)
        .bind(completion.status.code())
        .bind(completion.finished_at)
        .bind(record_id)
        .bind(RecordStatus::Active.code())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let Some((user_id, room_id, interval)) = updated else {
            let exists = query("SELECT id FROM records WHERE id = $1")
                .bind(record_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| e.any())?;

            return match exists {
                Some(_) => Err(DatabaseError::AlreadyCompleted { record_id }),
                None => Err(DatabaseError::NotFound {
                    resource: "record",
                    identifier: "id",
                }),
            };
        };

        query("UPDATE users SET total_time = total_time + $1 WHERE id = $2")
            .bind(i64::from(interval))
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        query("UPDATE rooms SET total_time = total_time + $1 WHERE id = $2")
            .bind(i64::from(interval))
            .bind(room_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn record_by_id(&self, record_id: PrimaryKey) -> Result<RecordDetail> {
        let sql = format!("{RECORD_DETAIL_SELECT} WHERE records.id = $1");

        query_as::<_, RecordRow>(&sql)
            .bind(record_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("record", "id"))?
            .into_data()
    }

    async fn records_by_owner(&self, owner: RecordOwner) -> Result<Vec<RecordDetail>> {
        let (column, owner_id) = owner_column(owner);
        let sql = format!(
            "{RECORD_DETAIL_SELECT}
            WHERE {column} = $1
            ORDER BY (records.status = {}) DESC, records.id ASC",
            RecordStatus::Active.code()
        );

        query_as::<_, RecordRow>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(RecordRow::into_data)
            .collect()
    }

    async fn latest_records(&self, filter: RecordFilter) -> Result<Vec<RecordDetail>> {
        let (column, owner_id) = owner_column(filter.owner);
        let sql = format!(
            "{RECORD_DETAIL_SELECT}
            WHERE {column} = $1 AND {}
            ORDER BY records.created_at DESC, records.id DESC
            LIMIT $2",
            status_condition(filter.status)
        );

        query_as::<_, RecordRow>(&sql)
            .bind(owner_id)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(RecordRow::into_data)
            .collect()
    }

    async fn records_finished_between(
        &self,
        user_id: PrimaryKey,
        window: TimeWindow,
    ) -> Result<Vec<RecordDetail>> {
        let sql = format!(
            "{RECORD_DETAIL_SELECT}
            WHERE records.user_id = $1
                AND records.finish_time >= $2
                AND records.finish_time < $3
            ORDER BY records.finish_time ASC, records.id ASC"
        );

        query_as::<_, RecordRow>(&sql)
            .bind(user_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())?
            .into_iter()
            .map(RecordRow::into_data)
            .collect()
    }

    async fn daily_totals(&self, totals: DailyTotalsQuery) -> Result<Vec<DailyTotal>> {
        let rows = query_as::<_, (NaiveDate, i64)>(
            "
            SELECT
                (created_at AT TIME ZONE 'UTC')::DATE AS day,
                SUM(time_interval)::BIGINT AS total
            FROM records
            WHERE created_at >= $1
                AND created_at < $2
                AND ($3::INT IS NULL OR user_id = $3)
                AND ($4::INT IS NULL OR room_id = $4)
            GROUP BY day
            ORDER BY day",
        )
        .bind(totals.window.start)
        .bind(totals.window.end)
        .bind(totals.user_id)
        .bind(totals.room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows
            .into_iter()
            .map(|(date, total)| DailyTotal { date, total })
            .collect())
    }
}

fn owner_column(owner: RecordOwner) -> (&'static str, PrimaryKey) {
    match owner {
        RecordOwner::User(id) => ("records.user_id", id),
        RecordOwner::Room(id) => ("records.room_id", id),
    }
}

fn status_condition(filter: StatusFilter) -> String {
    let active = RecordStatus::Active.code();

    match filter {
        StatusFilter::Any => "TRUE".to_string(),
        StatusFilter::Active => format!("records.status = {active}"),
        StatusFilter::Terminal => format!("records.status <> {active}"),
        StatusFilter::Only(status) => format!("records.status = {}", status.code()),
    }
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    email: String,
    username: String,
    password: String,
    avatar: Option<i32>,
    level: i32,
    total_time: i64,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password: row.password,
            avatar: row.avatar,
            level: row.level,
            total_time: row.total_time,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRow {
    session_id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    #[sqlx(flatten)]
    user: UserRow,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    name: String,
    current_pot: PotId,
    member_count: i32,
    member_limit: i32,
    privacy: String,
    categories: Vec<String>,
    level: i32,
    total_time: i64,
    created_at: DateTime<Utc>,
}

impl RoomRow {
    fn into_data(self) -> Result<RoomData> {
        let privacy = Privacy::parse(&self.privacy).ok_or_else(|| {
            DatabaseError::Invariant(format!(
                "room {} has unknown privacy {}",
                self.id, self.privacy
            ))
        })?;

        Ok(RoomData {
            id: self.id,
            name: self.name,
            current_pot: self.current_pot,
            member_count: self.member_count,
            member_limit: self.member_limit,
            privacy,
            categories: self.categories,
            level: self.level,
            total_time: self.total_time,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct IngredientRow {
    id: PrimaryKey,
    name: String,
    image: String,
    time_interval: i32,
    requirement: String,
}

impl From<IngredientRow> for IngredientData {
    fn from(row: IngredientRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            image: row.image,
            interval: row.time_interval,
            requirement: row.requirement,
        }
    }
}

#[derive(FromRow)]
struct RecordRow {
    id: PrimaryKey,
    user_id: PrimaryKey,
    username: String,
    room_id: PrimaryKey,
    pot_id: PotId,
    ingredient_id: PrimaryKey,
    ingredient_name: String,
    ingredient_image: String,
    image: Option<String>,
    caption: Option<String>,
    time_interval: i32,
    interrupt: i32,
    status: i16,
    created_at: DateTime<Utc>,
    finish_time: Option<DateTime<Utc>>,
}

impl RecordRow {
    fn into_data(self) -> Result<RecordDetail> {
        let status = RecordStatus::from_code(self.status).ok_or_else(|| {
            DatabaseError::Invariant(format!(
                "record {} has unknown status {}",
                self.id, self.status
            ))
        })?;

        Ok(RecordDetail {
            id: self.id,
            user_id: self.user_id,
            username: self.username,
            room_id: self.room_id,
            pot_id: self.pot_id,
            ingredient_id: self.ingredient_id,
            ingredient_name: self.ingredient_name,
            ingredient_image: self.ingredient_image,
            image: self.image,
            caption: self.caption,
            interval: self.time_interval,
            interrupt: self.interrupt,
            status,
            created_at: self.created_at,
            finish_time: self.finish_time,
        })
    }
}

/// Postgres specific classification on top of [IntoDatabaseError]
trait PgErrorExt {
    /// A foreign key violation means a referenced row doesn't exist
    fn reference_or(self, resource: &'static str) -> DatabaseError;
    /// A unique violation means the value is taken
    fn unique_or(self, resource: &'static str, field: &'static str, value: &str)
        -> DatabaseError;
}

fn violates(error: &SqlxError, code: &str) -> bool {
    error
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|c| c == code)
}

impl PgErrorExt for SqlxError {
    fn reference_or(self, resource: &'static str) -> DatabaseError {
        if violates(&self, FOREIGN_KEY_VIOLATION) {
            DatabaseError::NotFound {
                resource,
                identifier: "id",
            }
        } else {
            self.any()
        }
    }

    fn unique_or(self, resource: &'static str, field: &'static str, value: &str) -> DatabaseError {
        if violates(&self, UNIQUE_VIOLATION) {
            DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }
        } else {
            self.any()
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}

/// These run against a real postgres instance:
/// `DATABASE_URL=postgres://... cargo test -- --ignored`
#[cfg(test)]
mod test {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    async fn connect(test: &str) -> Option<Arc<PgDatabase>> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) if url != "memory" => url,
            _ => {
                eprintln!("skipping {test}: DATABASE_URL not set");
                return None;
            }
        };

        let database = PgDatabase::new(&url, 25).await.unwrap();
        database.migrate().await.unwrap();

        Some(Arc::new(database))
    }

    async fn user(database: &PgDatabase) -> PrimaryKey {
        database
            .create_user(NewUser {
                email: format!("{}@example.com", Uuid::new_v4()),
                username: "cook".to_string(),
                password: "not-a-hash".to_string(),
                avatar: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id
    }

    async fn room(database: &PgDatabase, owner: PrimaryKey, member_limit: i32) -> RoomData {
        database
            .create_room(NewRoom {
                name: "Kitchen A".to_string(),
                member_limit,
                privacy: Privacy::Private,
                categories: vec!["soup".to_string()],
                pot_id: Uuid::new_v4(),
                user_id: owner,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn active_record(database: &PgDatabase) -> (PrimaryKey, RoomData) {
        let owner = user(database).await;
        let room = room(database, owner, 2).await;
        let ingredient = database
            .create_ingredient(NewIngredient {
                name: "tomato".to_string(),
                image: "https://cdn.example.com/tomato.png".to_string(),
                interval: 1500,
                requirement: String::new(),
            })
            .await
            .unwrap();

        let record_id = database
            .create_record(NewRecord {
                user_id: owner,
                room_id: room.id,
                pot_id: room.current_pot,
                ingredient_id: ingredient.id,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        (record_id, room)
    }

    fn completion(record_id: PrimaryKey, status: RecordStatus) -> RecordCompletion {
        RecordCompletion {
            record_id,
            image: "https://cdn.example.com/records/1.png".to_string(),
            caption: "done".to_string(),
            interval: 1500,
            interrupt: 0,
            status,
            finished_at: Utc::now(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires DATABASE_URL pointing at postgres"]
    async fn concurrent_joins_stop_at_the_limit() {
        let Some(database) = connect("concurrent_joins_stop_at_the_limit").await else {
            return;
        };

        let owner = user(&database).await;
        let room = room(&database, owner, 5).await;

        let mut joiners = vec![];
        for _ in 0..20 {
            joiners.push(user(&database).await);
        }

        let room_id = room.id;
        let handles: Vec<_> = joiners
            .into_iter()
            .map(|user_id| {
                let database = database.clone();
                tokio::spawn(async move { database.join_room(room_id, user_id).await })
            })
            .collect();

        let mut joined = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => joined += 1,
                Err(DatabaseError::RoomFull { room_id: full }) => assert_eq!(full, room_id),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(joined, 4);
        let stored = database.room_by_id(room.id).await.unwrap();
        assert_eq!(stored.member_count, 5);
        assert_eq!(database.room_members(room.id).await.unwrap().len(), 5);

        let drift = database.member_count_drift().await.unwrap();
        assert!(drift.iter().all(|d| d.room_id != room.id));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at postgres"]
    async fn leave_never_drops_below_zero() {
        let Some(database) = connect("leave_never_drops_below_zero").await else {
            return;
        };

        let owner = user(&database).await;
        let room = room(&database, owner, 3).await;

        database.leave_room(room.id, owner).await.unwrap();
        assert_eq!(database.room_by_id(room.id).await.unwrap().member_count, 0);

        let again = database.leave_room(room.id, owner).await;
        assert!(matches!(again, Err(DatabaseError::NotMember { .. })));

        // A membership the counter doesn't know about
        query("INSERT INTO room_users (user_id, room_id) VALUES ($1, $2)")
            .bind(owner)
            .bind(room.id)
            .execute(&database.pool)
            .await
            .unwrap();

        let underflow = database.leave_room(room.id, owner).await;
        assert!(matches!(underflow, Err(DatabaseError::Invariant(_))));

        assert_eq!(database.room_by_id(room.id).await.unwrap().member_count, 0);
        assert_eq!(
            database.room_members(room.id).await.unwrap().len(),
            1,
            "the membership delete is rolled back"
        );
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at postgres"]
    async fn second_completion_is_already_completed() {
        let Some(database) = connect("second_completion_is_already_completed").await else {
            return;
        };

        let (record_id, room) = active_record(&database).await;

        database
            .complete_record(completion(record_id, RecordStatus::Completed))
            .await
            .unwrap();

        let again = database
            .complete_record(RecordCompletion {
                caption: "again".to_string(),
                ..completion(record_id, RecordStatus::Interrupted)
            })
            .await;
        assert!(matches!(
            again,
            Err(DatabaseError::AlreadyCompleted { record_id: id }) if id == record_id
        ));

        let detail = database.record_by_id(record_id).await.unwrap();
        assert_eq!(detail.status, RecordStatus::Completed);
        assert_eq!(detail.caption.as_deref(), Some("done"));
        assert_eq!(database.room_by_id(room.id).await.unwrap().total_time, 1500);

        let missing = database
            .complete_record(completion(i32::MAX, RecordStatus::Completed))
            .await;
        assert!(matches!(missing, Err(DatabaseError::NotFound { .. })));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL pointing at postgres"]
    async fn record_pot_must_belong_to_its_room() {
        let Some(database) = connect("record_pot_must_belong_to_its_room").await else {
            return;
        };

        let (_, first) = active_record(&database).await;
        let (_, second) = active_record(&database).await;
        let owner = user(&database).await;

        let error = database
            .create_record(NewRecord {
                user_id: owner,
                room_id: first.id,
                pot_id: second.current_pot,
                ingredient_id: 1,
                created_at: Utc::now(),
            })
            .await;
        assert!(matches!(error, Err(DatabaseError::NotFound { .. })));
    }
}

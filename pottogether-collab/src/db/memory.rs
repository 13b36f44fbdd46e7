use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    DailyTotal, DailyTotalsQuery, Database, DatabaseError, DatabaseResult, IngredientData,
    MemberCountDrift, NewIngredient, NewRecord, NewRoom, NewSession, NewUser, PotId, PrimaryKey,
    Privacy, RecordCompletion, RecordDetail, RecordFilter, RecordOwner, RecordStatus, Result,
    RoomData, RoomMemberData, SessionData, TimeWindow, UserData,
};

/// A database kept entirely in memory.
///
/// Every operation runs while holding a single lock, so each trait method is
/// atomic and isolated from every other one.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<PrimaryKey, UserData>,
    sessions: BTreeMap<PrimaryKey, StoredSession>,
    rooms: BTreeMap<PrimaryKey, RoomData>,
    pots: HashMap<PotId, PrimaryKey>,
    /// (room, user) pairs
    memberships: BTreeSet<(PrimaryKey, PrimaryKey)>,
    ingredients: BTreeMap<PrimaryKey, IngredientData>,
    records: BTreeMap<PrimaryKey, StoredRecord>,
    sequence: Sequence,
}

#[derive(Default)]
struct Sequence {
    users: PrimaryKey,
    sessions: PrimaryKey,
    rooms: PrimaryKey,
    ingredients: PrimaryKey,
    records: PrimaryKey,
}

fn next(counter: &mut PrimaryKey) -> PrimaryKey {
    *counter += 1;
    *counter
}

struct StoredSession {
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

struct StoredRecord {
    user_id: PrimaryKey,
    room_id: PrimaryKey,
    pot_id: PotId,
    ingredient_id: PrimaryKey,
    image: Option<String>,
    caption: Option<String>,
    interval: i32,
    interrupt: i32,
    status: RecordStatus,
    created_at: DateTime<Utc>,
    finish_time: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn owned_by(&self, owner: RecordOwner) -> bool {
        match owner {
            RecordOwner::User(id) => self.user_id == id,
            RecordOwner::Room(id) => self.room_id == id,
        }
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

impl Tables {
    fn user(&self, user_id: PrimaryKey) -> Result<&UserData> {
        self.users.get(&user_id).ok_or_else(|| not_found("user", "id"))
    }

    fn room(&self, room_id: PrimaryKey) -> Result<&RoomData> {
        self.rooms.get(&room_id).ok_or_else(|| not_found("room", "id"))
    }

    fn room_mut(&mut self, room_id: PrimaryKey) -> Result<&mut RoomData> {
        self.rooms.get_mut(&room_id).ok_or_else(|| not_found("room", "id"))
    }

    fn session(&self, token: &str) -> Result<SessionData> {
        let (id, session) = self
            .sessions
            .iter()
            .find(|(_, s)| s.token == token)
            .ok_or_else(|| not_found("session", "token"))?;

        Ok(SessionData {
            id: *id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: self.user(session.user_id)?.clone(),
        })
    }

    fn detail(&self, id: PrimaryKey, record: &StoredRecord) -> Result<RecordDetail> {
        let user = self.user(record.user_id)?;
        let ingredient = self
            .ingredients
            .get(&record.ingredient_id)
            .ok_or_else(|| not_found("ingredient", "id"))?;

        Ok(RecordDetail {
            id,
            user_id: record.user_id,
            username: user.username.clone(),
            room_id: record.room_id,
            pot_id: record.pot_id,
            ingredient_id: record.ingredient_id,
            ingredient_name: ingredient.name.clone(),
            ingredient_image: ingredient.image.clone(),
            image: record.image.clone(),
            caption: record.caption.clone(),
            interval: record.interval,
            interrupt: record.interrupt,
            status: record.status,
            created_at: record.created_at,
            finish_time: record.finish_time,
        })
    }

    fn details<'a>(
        &self,
        records: impl Iterator<Item = (&'a PrimaryKey, &'a StoredRecord)>,
    ) -> Result<Vec<RecordDetail>> {
        records.map(|(id, r)| self.detail(*id, r)).collect()
    }

    fn member_count(&self, room_id: PrimaryKey) -> i32 {
        self.memberships
            .range((room_id, PrimaryKey::MIN)..=(room_id, PrimaryKey::MAX))
            .count() as i32
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a room's counter without touching its memberships
    #[cfg(test)]
    pub(crate) fn overwrite_member_count(&self, room_id: PrimaryKey, member_count: i32) {
        if let Some(room) = self.tables.lock().rooms.get_mut(&room_id) {
            room.member_count = member_count;
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.tables.lock().user(user_id).cloned()
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.tables
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| not_found("user", "email"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut tables = self.tables.lock();

        tables
            .users
            .values()
            .find(|u| u.email == new_user.email)
            .ok_or_else(|| not_found("user", "email"))
            .conflict_or_ok("user", "email", &new_user.email)?;

        let id = next(&mut tables.sequence.users);
        let user = UserData {
            id,
            email: new_user.email,
            username: new_user.username,
            password: new_user.password,
            avatar: new_user.avatar,
            level: 1,
            total_time: 0,
            created_at: new_user.created_at,
        };

        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        self.tables.lock().session(token)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let mut tables = self.tables.lock();

        tables
            .session(&new_session.token)
            .conflict_or_ok("session", "token", &new_session.token)?;
        tables.user(new_session.user_id)?;

        let id = next(&mut tables.sequence.sessions);
        tables.sessions.insert(
            id,
            StoredSession {
                token: new_session.token.clone(),
                user_id: new_session.user_id,
                expires_at: new_session.expires_at,
            },
        );

        tables.session(&new_session.token)
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut tables = self.tables.lock();
        let session = tables.session(token)?;

        tables.sessions.remove(&session.id);
        Ok(())
    }

    async fn clear_expired_sessions(&self, now: DateTime<Utc>) -> Result<()> {
        self.tables
            .lock()
            .sessions
            .retain(|_, session| session.expires_at > now);

        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.tables.lock().room(room_id).cloned()
    }

    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>> {
        let tables = self.tables.lock();

        tables
            .memberships
            .range((room_id, PrimaryKey::MIN)..=(room_id, PrimaryKey::MAX))
            .map(|(_, user_id)| {
                tables.user(*user_id).map(|u| RoomMemberData {
                    user_id: u.id,
                    avatar: u.avatar,
                })
            })
            .collect()
    }

    async fn rooms_by_member(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let tables = self.tables.lock();

        Ok(tables
            .rooms
            .values()
            .filter(|r| tables.memberships.contains(&(r.id, user_id)))
            .cloned()
            .collect())
    }

    async fn public_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self
            .tables
            .lock()
            .rooms
            .values()
            .filter(|r| r.privacy == Privacy::Public)
            .cloned()
            .collect())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let mut tables = self.tables.lock();

        tables.user(new_room.user_id)?;
        if tables.pots.contains_key(&new_room.pot_id) {
            return Err(DatabaseError::Conflict {
                resource: "pot",
                field: "id",
                value: new_room.pot_id.to_string(),
            });
        }

        let id = next(&mut tables.sequence.rooms);
        let room = RoomData {
            id,
            name: new_room.name,
            current_pot: new_room.pot_id,
            member_count: 1,
            member_limit: new_room.member_limit,
            privacy: new_room.privacy,
            categories: new_room.categories,
            level: 1,
            total_time: 0,
            created_at: new_room.created_at,
        };

        tables.rooms.insert(id, room.clone());
        tables.pots.insert(new_room.pot_id, id);
        tables.memberships.insert((id, new_room.user_id));

        Ok(room)
    }

    async fn join_room(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut tables = self.tables.lock();

        let room = tables.room(room_id)?;
        if tables.memberships.contains(&(room_id, user_id)) {
            return Err(DatabaseError::AlreadyMember { room_id, user_id });
        }
        if room.member_count >= room.member_limit {
            return Err(DatabaseError::RoomFull { room_id });
        }
        tables.user(user_id)?;

        tables.memberships.insert((room_id, user_id));
        tables.room_mut(room_id)?.member_count += 1;

        Ok(())
    }

    async fn leave_room(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut tables = self.tables.lock();

        let room = tables.room(room_id)?;
        if !tables.memberships.contains(&(room_id, user_id)) {
            return Err(DatabaseError::NotMember { room_id, user_id });
        }
        if room.member_count <= 0 {
            return Err(DatabaseError::Invariant(format!(
                "member count of room {room_id} would drop below zero"
            )));
        }

        tables.memberships.remove(&(room_id, user_id));
        tables.room_mut(room_id)?.member_count -= 1;

        Ok(())
    }

    async fn member_count_drift(&self) -> Result<Vec<MemberCountDrift>> {
        let tables = self.tables.lock();

        Ok(tables
            .rooms
            .values()
            .map(|room| MemberCountDrift {
                room_id: room.id,
                recorded: room.member_count,
                actual: tables.member_count(room.id),
            })
            .filter(|drift| drift.recorded != drift.actual)
            .collect())
    }

    async fn list_ingredients(&self) -> Result<Vec<IngredientData>> {
        Ok(self.tables.lock().ingredients.values().cloned().collect())
    }

    async fn ingredient_by_requirement(&self, requirement: &str) -> Result<IngredientData> {
        self.tables
            .lock()
            .ingredients
            .values()
            .find(|i| i.requirement == requirement)
            .cloned()
            .ok_or_else(|| not_found("ingredient", "requirement"))
    }

    async fn create_ingredient(&self, new_ingredient: NewIngredient) -> Result<IngredientData> {
        let mut tables = self.tables.lock();

        let id = next(&mut tables.sequence.ingredients);
        let ingredient = IngredientData {
            id,
            name: new_ingredient.name,
            image: new_ingredient.image,
            interval: new_ingredient.interval,
            requirement: new_ingredient.requirement,
        };

        tables.ingredients.insert(id, ingredient.clone());
        Ok(ingredient)
    }

    async fn create_record(&self, new_record: NewRecord) -> Result<PrimaryKey> {
        let mut tables = self.tables.lock();

        tables.user(new_record.user_id)?;
        tables.room(new_record.room_id)?;
        if tables.pots.get(&new_record.pot_id) != Some(&new_record.room_id) {
            return Err(not_found("pot", "room_id"));
        }
        if !tables.ingredients.contains_key(&new_record.ingredient_id) {
            return Err(not_found("ingredient", "id"));
        }

        let id = next(&mut tables.sequence.records);
        tables.records.insert(
            id,
            StoredRecord {
                user_id: new_record.user_id,
                room_id: new_record.room_id,
                pot_id: new_record.pot_id,
                ingredient_id: new_record.ingredient_id,
                image: None,
                caption: None,
                interval: 0,
                interrupt: 0,
                status: RecordStatus::Active,
                created_at: new_record.created_at,
                finish_time: None,
            },
        );

        Ok(id)
    }

    async fn complete_record(&self, completion: RecordCompletion) -> Result<()> {
        let mut tables = self.tables.lock();
        let record_id = completion.record_id;

        let record = tables
            .records
            .get_mut(&record_id)
            .ok_or_else(|| not_found("record", "id"))?;

        if record.status.is_terminal() {
            return Err(DatabaseError::AlreadyCompleted { record_id });
        }

        record.image = Some(completion.image);
        record.caption = Some(completion.caption);
        record.interval = completion.interval;
        record.interrupt = completion.interrupt;
        record.status = completion.status;
        record.finish_time = Some(completion.finished_at);

        let (user_id, room_id) = (record.user_id, record.room_id);
        let interval = i64::from(completion.interval);

        if let Some(user) = tables.users.get_mut(&user_id) {
            user.total_time += interval;
        }
        tables.room_mut(room_id)?.total_time += interval;

        Ok(())
    }

    async fn record_by_id(&self, record_id: PrimaryKey) -> Result<RecordDetail> {
        let tables = self.tables.lock();
        let record = tables
            .records
            .get(&record_id)
            .ok_or_else(|| not_found("record", "id"))?;

        tables.detail(record_id, record)
    }

    async fn records_by_owner(&self, owner: RecordOwner) -> Result<Vec<RecordDetail>> {
        let tables = self.tables.lock();

        // Stable sort keeps ascending id order within each group
        let mut records: Vec<_> = tables
            .records
            .iter()
            .filter(|(_, r)| r.owned_by(owner))
            .collect();
        records.sort_by_key(|(_, r)| r.status.is_terminal());

        tables.details(records.into_iter())
    }

    async fn latest_records(&self, filter: RecordFilter) -> Result<Vec<RecordDetail>> {
        let tables = self.tables.lock();

        let mut records: Vec<_> = tables
            .records
            .iter()
            .filter(|(_, r)| r.owned_by(filter.owner) && filter.status.matches(r.status))
            .collect();
        records.sort_by(|(a_id, a), (b_id, b)| {
            b.created_at.cmp(&a.created_at).then(b_id.cmp(a_id))
        });

        let limit = filter
            .limit
            .map(|l| l.max(0) as usize)
            .unwrap_or(usize::MAX);

        tables.details(records.into_iter().take(limit))
    }

    async fn records_finished_between(
        &self,
        user_id: PrimaryKey,
        window: TimeWindow,
    ) -> Result<Vec<RecordDetail>> {
        let tables = self.tables.lock();

        let mut records: Vec<_> = tables
            .records
            .iter()
            .filter(|(_, r)| r.user_id == user_id)
            .filter(|(_, r)| r.finish_time.is_some_and(|t| window.contains(t)))
            .collect();
        records.sort_by_key(|(id, r)| (r.finish_time, **id));

        tables.details(records.into_iter())
    }

    async fn daily_totals(&self, query: DailyTotalsQuery) -> Result<Vec<DailyTotal>> {
        let tables = self.tables.lock();
        let mut totals = BTreeMap::new();

        let matching = tables.records.values().filter(|r| {
            query.window.contains(r.created_at)
                && query.user_id.map_or(true, |id| r.user_id == id)
                && query.room_id.map_or(true, |id| r.room_id == id)
        });

        for record in matching {
            let day = record.created_at.date_naive();
            *totals.entry(day).or_insert(0) += i64::from(record.interval);
        }

        Ok(totals
            .into_iter()
            .map(|(date, total)| DailyTotal { date, total })
            .collect())
    }
}

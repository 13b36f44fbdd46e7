use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::{
    error::LogInternal,
    util::{day_window, month_window, week_window},
    CollabContext, CollabResult, DailyTotal, DailyTotalsQuery, DatabaseError, PotId, PrimaryKey,
    RecordDetail, RecordFilter, RecordOwner, RecordStatus, RoomMemberData, StatusFilter,
};

/// How many completed ingredients a profile shows
const PROFILE_DONE_LIMIT: i64 = 5;

/// Composes the read models shown on the room and user screens
pub struct OverviewBuilder {
    context: CollabContext,
}

/// Progress of a user or a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelData {
    pub level: i32,
    pub total_time: i64,
    /// Image of the ingredient unlocked at the next level, if there is one
    pub next: Option<String>,
}

/// Cooking time of one day of the current week.
///
/// Only days with at least one record are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub user_total: i64,
    pub room_total: i64,
}

#[derive(Debug, Clone)]
pub struct RoomOverview {
    pub id: PrimaryKey,
    pub name: String,
    pub current_pot: PotId,
    pub level: LevelData,
    pub members: Vec<RoomMemberData>,
    /// Sparse, ascending by date
    pub week: Vec<WeekDay>,
    /// Active records, newest first
    pub cooking: Vec<RecordDetail>,
    /// Completed and interrupted records, newest first
    pub done: Vec<RecordDetail>,
}

#[derive(Debug, Clone)]
pub struct UserOverview {
    pub user_id: PrimaryKey,
    pub level: LevelData,
    /// Records that finished today
    pub today: Vec<RecordDetail>,
    /// Sparse, ascending by date
    pub week: Vec<DailyTotal>,
    /// Sparse, ascending by date
    pub month: Vec<DailyTotal>,
}

/// What the user is doing right now, judged by their latest record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStatus {
    pub status: RecordStatus,
    pub ingredient: String,
}

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: PrimaryKey,
    pub name: String,
    pub avatar: Option<i32>,
    /// Seconds since the latest active record started, 0 if nothing is cooking
    pub cooking_time: i64,
    /// None if the user never started a record
    pub status: Option<UserStatus>,
    /// Names of the most recently completed ingredients
    pub done: Vec<String>,
}

impl OverviewBuilder {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn room_overview(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> CollabResult<RoomOverview> {
        let db = &self.context.database;
        let entity = format!("room {room_id}");

        let room = db
            .room_by_id(room_id)
            .await
            .log_internal("room overview", &entity)?;

        let members = db
            .room_members(room_id)
            .await
            .log_internal("room overview", &entity)?;

        let window = week_window(self.context.clock.today());
        let room_totals = db
            .daily_totals(DailyTotalsQuery {
                user_id: None,
                room_id: Some(room_id),
                window,
            })
            .await
            .log_internal("room overview", &entity)?;
        let user_totals = db
            .daily_totals(DailyTotalsQuery {
                user_id: Some(user_id),
                room_id: Some(room_id),
                window,
            })
            .await
            .log_internal("room overview", &entity)?;

        let cooking = db
            .latest_records(RecordFilter {
                owner: RecordOwner::Room(room_id),
                status: StatusFilter::Active,
                limit: None,
            })
            .await
            .log_internal("room overview", &entity)?;
        let done = db
            .latest_records(RecordFilter {
                owner: RecordOwner::Room(room_id),
                status: StatusFilter::Terminal,
                limit: None,
            })
            .await
            .log_internal("room overview", &entity)?;

        let next = self.next_level_image(room.level).await?;

        Ok(RoomOverview {
            id: room.id,
            name: room.name,
            current_pot: room.current_pot,
            level: LevelData {
                level: room.level,
                total_time: room.total_time,
                next,
            },
            members,
            week: merge_week(room_totals, user_totals),
            cooking,
            done,
        })
    }

    pub async fn user_overview(&self, user_id: PrimaryKey) -> CollabResult<UserOverview> {
        let db = &self.context.database;
        let entity = format!("user {user_id}");
        let today = self.context.clock.today();

        let user = db
            .user_by_id(user_id)
            .await
            .log_internal("user overview", &entity)?;

        let finished_today = db
            .records_finished_between(user_id, day_window(today))
            .await
            .log_internal("user overview", &entity)?;

        let week = db
            .daily_totals(DailyTotalsQuery {
                user_id: Some(user_id),
                room_id: None,
                window: week_window(today),
            })
            .await
            .log_internal("user overview", &entity)?;
        let month = db
            .daily_totals(DailyTotalsQuery {
                user_id: Some(user_id),
                room_id: None,
                window: month_window(today),
            })
            .await
            .log_internal("user overview", &entity)?;

        let next = self.next_level_image(user.level).await?;

        Ok(UserOverview {
            user_id,
            level: LevelData {
                level: user.level,
                total_time: user.total_time,
                next,
            },
            today: finished_today,
            week,
            month,
        })
    }

    pub async fn user_profile(&self, user_id: PrimaryKey) -> CollabResult<UserProfile> {
        let db = &self.context.database;
        let entity = format!("user {user_id}");
        let owner = RecordOwner::User(user_id);

        let user = db
            .user_by_id(user_id)
            .await
            .log_internal("user profile", &entity)?;

        let latest = db
            .latest_records(RecordFilter {
                owner,
                status: StatusFilter::Any,
                limit: Some(1),
            })
            .await
            .log_internal("user profile", &entity)?;

        let cooking = db
            .latest_records(RecordFilter {
                owner,
                status: StatusFilter::Active,
                limit: Some(1),
            })
            .await
            .log_internal("user profile", &entity)?;

        let done = db
            .latest_records(RecordFilter {
                owner,
                status: StatusFilter::Only(RecordStatus::Completed),
                limit: Some(PROFILE_DONE_LIMIT),
            })
            .await
            .log_internal("user profile", &entity)?;

        let now = self.context.clock.now();
        let cooking_time = cooking
            .first()
            .map(|r| (now - r.created_at).num_seconds().max(0))
            .unwrap_or(0);

        Ok(UserProfile {
            user_id,
            name: user.username,
            avatar: user.avatar,
            cooking_time,
            status: latest.into_iter().next().map(|r| UserStatus {
                status: r.status,
                ingredient: r.ingredient_name,
            }),
            done: done.into_iter().map(|r| r.ingredient_name).collect(),
        })
    }

    /// The image of the ingredient unlocked by reaching the level after `level`
    async fn next_level_image(&self, level: i32) -> CollabResult<Option<String>> {
        let requirement = format!("level{}", level + 1);

        let result = self
            .context
            .database
            .ingredient_by_requirement(&requirement)
            .await;

        match result {
            Ok(ingredient) => Ok(Some(ingredient.image)),
            Err(DatabaseError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
        .log_internal("next level", requirement)
    }
}

/// Joins the room and user series of a week by date
pub fn merge_week(room: Vec<DailyTotal>, user: Vec<DailyTotal>) -> Vec<WeekDay> {
    let mut days: BTreeMap<NaiveDate, WeekDay> = BTreeMap::new();

    for total in room {
        days.entry(total.date)
            .or_insert_with(|| empty_day(total.date))
            .room_total += total.total;
    }

    for total in user {
        days.entry(total.date)
            .or_insert_with(|| empty_day(total.date))
            .user_total += total.total;
    }

    days.into_values().collect()
}

fn empty_day(date: NaiveDate) -> WeekDay {
    WeekDay {
        date,
        user_total: 0,
        room_total: 0,
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone, Utc};

    use crate::{
        test_support::{collab_with_database, seed_ingredient, seed_user, wednesday_noon},
        Clock, Collab, Completion, CreatedRoom, ErrorKind, FixedClock, Privacy, RoomSettings,
    };

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn kitchen(collab: &Collab, user_id: PrimaryKey) -> CreatedRoom {
        collab
            .rooms
            .create_room(
                user_id,
                RoomSettings {
                    name: "Kitchen A".to_string(),
                    member_limit: 4,
                    privacy: Privacy::Public,
                    categories: vec!["soup".to_string()],
                },
            )
            .await
            .unwrap()
    }

    /// Starts a record at the clock's current time and finishes it right away
    async fn cook(
        collab: &Collab,
        user_id: PrimaryKey,
        room: CreatedRoom,
        ingredient_id: PrimaryKey,
        interval: i32,
        status_code: i16,
    ) -> PrimaryKey {
        let record_id = collab
            .records
            .create_record(user_id, room.room_id, room.pot_id, ingredient_id)
            .await
            .unwrap();

        collab
            .records
            .complete_record(
                record_id,
                Completion {
                    image: "https://cdn.example.com/r.png".to_string(),
                    caption: String::new(),
                    interval,
                    interrupt: 0,
                    status_code,
                },
            )
            .await
            .unwrap();

        record_id
    }

    fn at_day(clock: &FixedClock, day: u32) {
        clock.set(Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap());
    }

    #[test]
    fn merges_room_and_user_days() {
        let room = vec![
            DailyTotal {
                date: date(2024, 5, 13),
                total: 350,
            },
            DailyTotal {
                date: date(2024, 5, 15),
                total: 300,
            },
        ];
        let user = vec![
            DailyTotal {
                date: date(2024, 5, 13),
                total: 300,
            },
            DailyTotal {
                date: date(2024, 5, 14),
                total: 20,
            },
        ];

        assert_eq!(
            merge_week(room, user),
            vec![
                WeekDay {
                    date: date(2024, 5, 13),
                    user_total: 300,
                    room_total: 350,
                },
                WeekDay {
                    date: date(2024, 5, 14),
                    user_total: 20,
                    room_total: 0,
                },
                WeekDay {
                    date: date(2024, 5, 15),
                    user_total: 0,
                    room_total: 300,
                },
            ]
        );
    }

    #[tokio::test]
    async fn room_week_groups_by_day() {
        let (collab, clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let friend = seed_user(&database, "friend").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, me).await;
        collab.rooms.join_room(friend, room.room_id).await.unwrap();

        // Sunday of the previous week
        at_day(&clock, 12);
        cook(&collab, me, room, tomato, 999, 1).await;

        // Two days before today
        at_day(&clock, 13);
        cook(&collab, me, room, tomato, 100, 1).await;
        cook(&collab, me, room, tomato, 200, 2).await;
        cook(&collab, friend, room, tomato, 50, 1).await;

        clock.set(wednesday_noon());
        cook(&collab, me, room, tomato, 300, 1).await;

        let overview = collab
            .overviews
            .room_overview(room.room_id, me)
            .await
            .unwrap();

        assert_eq!(
            overview.week,
            vec![
                WeekDay {
                    date: date(2024, 5, 13),
                    user_total: 300,
                    room_total: 350,
                },
                WeekDay {
                    date: date(2024, 5, 15),
                    user_total: 300,
                    room_total: 300,
                },
            ]
        );

        assert_eq!(overview.name, "Kitchen A");
        assert_eq!(overview.current_pot, room.pot_id);
        assert_eq!(overview.members.len(), 2);
        assert_eq!(overview.level.total_time, 999 + 100 + 200 + 50 + 300);
        assert_eq!(overview.done.len(), 5);
        assert!(overview.cooking.is_empty());
    }

    #[tokio::test]
    async fn room_overview_splits_cooking_and_done() {
        let (collab, clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, me).await;

        let finished = cook(&collab, me, room, tomato, 60, 1).await;
        clock.advance(Duration::minutes(1));
        let older = collab
            .records
            .create_record(me, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        let newer = collab
            .records
            .create_record(me, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();

        let overview = collab
            .overviews
            .room_overview(room.room_id, me)
            .await
            .unwrap();

        let cooking: Vec<_> = overview.cooking.iter().map(|r| r.id).collect();
        let done: Vec<_> = overview.done.iter().map(|r| r.id).collect();

        assert_eq!(cooking, vec![newer, older]);
        assert_eq!(done, vec![finished]);

        let missing = collab.overviews.room_overview(999, me).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn next_level_is_optional() {
        let (collab, _clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let room = kitchen(&collab, me).await;

        let overview = collab.overviews.user_overview(me).await.unwrap();
        assert_eq!(overview.level.level, 1);
        assert_eq!(overview.level.next, None);

        seed_ingredient(&database, "saffron", "level2").await;

        let overview = collab.overviews.user_overview(me).await.unwrap();
        assert_eq!(
            overview.level.next.as_deref(),
            Some("https://cdn.example.com/saffron.png")
        );

        let room = collab
            .overviews
            .room_overview(room.room_id, me)
            .await
            .unwrap();
        assert!(room.level.next.is_some());
    }

    #[tokio::test]
    async fn user_series_are_sparse() {
        let (collab, clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, me).await;

        clock.set(Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap());
        cook(&collab, me, room, tomato, 1, 1).await;

        at_day(&clock, 1);
        cook(&collab, me, room, tomato, 10, 1).await;

        at_day(&clock, 14);
        cook(&collab, me, room, tomato, 20, 1).await;
        cook(&collab, me, room, tomato, 5, 2).await;

        clock.set(wednesday_noon());

        let overview = collab.overviews.user_overview(me).await.unwrap();

        assert_eq!(
            overview.week,
            vec![DailyTotal {
                date: date(2024, 5, 14),
                total: 25,
            }]
        );
        assert_eq!(
            overview.month,
            vec![
                DailyTotal {
                    date: date(2024, 5, 1),
                    total: 10,
                },
                DailyTotal {
                    date: date(2024, 5, 14),
                    total: 25,
                },
            ]
        );
        assert_eq!(overview.level.total_time, 36);
    }

    #[tokio::test]
    async fn today_lists_records_finished_today() {
        let (collab, clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, me).await;

        at_day(&clock, 14);
        cook(&collab, me, room, tomato, 10, 1).await;
        let overnight = collab
            .records
            .create_record(me, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();

        clock.set(wednesday_noon() - Duration::hours(11));
        collab
            .records
            .complete_record(
                overnight,
                Completion {
                    image: "https://cdn.example.com/r.png".to_string(),
                    caption: "slow".to_string(),
                    interval: 80_000,
                    interrupt: 1,
                    status_code: 2,
                },
            )
            .await
            .unwrap();

        clock.set(wednesday_noon());
        let overview = collab.overviews.user_overview(me).await.unwrap();
        let today: Vec<_> = overview.today.iter().map(|r| r.id).collect();

        assert_eq!(today, vec![overnight]);
    }

    #[tokio::test]
    async fn profile_without_records() {
        let (collab, _clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;

        let profile = collab.overviews.user_profile(me).await.unwrap();

        assert_eq!(profile.name, "me");
        assert_eq!(profile.avatar, Some(1));
        assert_eq!(profile.cooking_time, 0);
        assert_eq!(profile.status, None);
        assert!(profile.done.is_empty());

        let missing = collab.overviews.user_profile(999).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn profile_reports_latest_activity() {
        let (collab, clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let room = kitchen(&collab, me).await;

        let names = ["egg", "leek", "rice", "bean", "corn", "kale"];
        let mut ingredients = vec![];
        for name in names {
            ingredients.push(seed_ingredient(&database, name, "").await);
        }
        let chili = seed_ingredient(&database, "chili", "").await;
        let pepper = seed_ingredient(&database, "pepper", "").await;

        for ingredient in &ingredients {
            cook(&collab, me, room, *ingredient, 60, 1).await;
            clock.advance(Duration::minutes(1));
        }
        cook(&collab, me, room, chili, 60, 2).await;
        clock.advance(Duration::minutes(1));

        let started = clock.now();
        collab
            .records
            .create_record(me, room.room_id, room.pot_id, pepper)
            .await
            .unwrap();
        clock.set(started + Duration::seconds(90));

        let profile = collab.overviews.user_profile(me).await.unwrap();

        assert_eq!(profile.cooking_time, 90);
        assert_eq!(
            profile.status,
            Some(UserStatus {
                status: RecordStatus::Active,
                ingredient: "pepper".to_string(),
            })
        );
        assert_eq!(profile.done, vec!["kale", "corn", "bean", "rice", "leek"]);
    }

    #[tokio::test]
    async fn week_window_follows_the_clock() {
        let (collab, clock, database) = collab_with_database();
        let me = seed_user(&database, "me").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, me).await;

        cook(&collab, me, room, tomato, 10, 1).await;

        // A week later the record is no longer part of the current week
        clock.set(wednesday_noon() + Duration::days(7));
        let overview = collab
            .overviews
            .room_overview(room.room_id, me)
            .await
            .unwrap();

        assert!(overview.week.is_empty());
    }
}

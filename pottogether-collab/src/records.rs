use log::{info, warn};

use crate::{
    error::LogInternal, CollabContext, CollabError, CollabResult, DatabaseError, NewRecord,
    PotId, PrimaryKey, RecordCompletion, RecordDetail, RecordOwner, RecordStatus,
};

/// Creates records and moves them through their lifecycle
pub struct RecordManager {
    context: CollabContext,
}

/// What the user reports when a cooking session ends
#[derive(Debug, Clone)]
pub struct Completion {
    /// URL of the uploaded result photo
    pub image: String,
    pub caption: String,
    /// Seconds actually spent cooking
    pub interval: i32,
    /// How many times the session was interrupted
    pub interrupt: i32,
    /// Must be 1 (completed) or 2 (interrupted)
    pub status_code: i16,
}

impl Completion {
    /// Checks every value except the image, which is usually uploaded last
    pub fn validated_values(&self) -> CollabResult<RecordStatus> {
        let status = RecordStatus::from_code(self.status_code)
            .filter(RecordStatus::is_terminal)
            .ok_or_else(|| {
                CollabError::invalid(format!(
                    "status must be 1 or 2, got {}",
                    self.status_code
                ))
            })?;

        if self.interval < 0 {
            return Err(CollabError::invalid("interval must not be negative"));
        }

        if self.interrupt < 0 {
            return Err(CollabError::invalid("interrupt must not be negative"));
        }

        Ok(status)
    }

    /// Returns the terminal status this completion moves a record into
    pub fn validated_status(&self) -> CollabResult<RecordStatus> {
        let status = self.validated_values()?;

        if self.image.trim().is_empty() {
            return Err(CollabError::invalid("image must not be empty"));
        }

        Ok(status)
    }
}

impl RecordManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Starts a new active record
    pub async fn create_record(
        &self,
        user_id: PrimaryKey,
        room_id: PrimaryKey,
        pot_id: PotId,
        ingredient_id: PrimaryKey,
    ) -> CollabResult<PrimaryKey> {
        let record_id = self
            .context
            .database
            .create_record(NewRecord {
                user_id,
                room_id,
                pot_id,
                ingredient_id,
                created_at: self.context.clock.now(),
            })
            .await
            .log_internal("create record", format!("user {user_id}"))?;

        info!(
            "User {} started record {} in room {} with ingredient {}",
            user_id, record_id, room_id, ingredient_id
        );

        Ok(record_id)
    }

    /// Moves an active record into its terminal state.
    /// Only the first completion of a record succeeds.
    pub async fn complete_record(
        &self,
        record_id: PrimaryKey,
        completion: Completion,
    ) -> CollabResult<()> {
        let status = completion.validated_status()?;

        let result = self
            .context
            .database
            .complete_record(RecordCompletion {
                record_id,
                image: completion.image,
                caption: completion.caption,
                interval: completion.interval,
                interrupt: completion.interrupt,
                status,
                finished_at: self.context.clock.now(),
            })
            .await;

        if let Err(DatabaseError::AlreadyCompleted { .. }) = &result {
            warn!("Record {} was completed more than once", record_id);
        }

        result.log_internal("complete record", format!("record {record_id}"))?;

        info!(
            "Record {} finished with status {} after {}s",
            record_id,
            status.code(),
            completion.interval
        );

        Ok(())
    }

    /// Records of a user or room, active ones first
    pub async fn records_by_owner(&self, owner: RecordOwner) -> CollabResult<Vec<RecordDetail>> {
        self.context
            .database
            .records_by_owner(owner)
            .await
            .log_internal("list records", format!("{owner:?}"))
    }

    pub async fn record_detail(&self, record_id: PrimaryKey) -> CollabResult<RecordDetail> {
        self.context
            .database
            .record_by_id(record_id)
            .await
            .log_internal("fetch record", format!("record {record_id}"))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::Duration;

    use crate::{
        test_support::{collab_with_database, seed_ingredient, seed_user},
        Clock, CreatedRoom, Database, ErrorKind, Privacy, RoomSettings,
    };

    use super::*;

    fn completion(status_code: i16) -> Completion {
        Completion {
            image: "https://cdn.example.com/records/42.png".to_string(),
            caption: "done".to_string(),
            interval: 1500,
            interrupt: 0,
            status_code,
        }
    }

    async fn kitchen(collab: &crate::Collab, user_id: PrimaryKey) -> CreatedRoom {
        collab
            .rooms
            .create_room(
                user_id,
                RoomSettings {
                    name: "Kitchen A".to_string(),
                    member_limit: 4,
                    privacy: Privacy::Public,
                    categories: vec![],
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn record_round_trip() {
        let (collab, clock, database) = collab_with_database();
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, user_id).await;

        let record_id = collab
            .records
            .create_record(user_id, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();

        let detail = collab.records.record_detail(record_id).await.unwrap();
        assert_eq!(detail.status, RecordStatus::Active);
        assert_eq!(detail.interval, 0);
        assert_eq!(detail.interrupt, 0);
        assert_eq!(detail.image, None);
        assert_eq!(detail.caption, None);
        assert_eq!(detail.finish_time, None);
        assert_eq!(detail.ingredient_name, "tomato");
        assert_eq!(detail.username, "cook");

        clock.advance(Duration::minutes(25));
        collab
            .records
            .complete_record(record_id, completion(1))
            .await
            .unwrap();

        let detail = collab.records.record_detail(record_id).await.unwrap();
        assert_eq!(detail.status, RecordStatus::Completed);
        assert_eq!(detail.interval, 1500);
        assert_eq!(detail.caption.as_deref(), Some("done"));
        assert_eq!(
            detail.image.as_deref(),
            Some("https://cdn.example.com/records/42.png")
        );
        assert_eq!(detail.finish_time, Some(clock.now()));

        let user = database.user_by_id(user_id).await.unwrap();
        let room = database.room_by_id(room.room_id).await.unwrap();
        assert_eq!(user.total_time, 1500);
        assert_eq!(room.total_time, 1500);
    }

    #[tokio::test]
    async fn second_completion_changes_nothing() {
        let (collab, clock, database) = collab_with_database();
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, user_id).await;

        let record_id = collab
            .records
            .create_record(user_id, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();

        collab
            .records
            .complete_record(record_id, completion(1))
            .await
            .unwrap();
        let first = collab.records.record_detail(record_id).await.unwrap();

        clock.advance(Duration::minutes(5));
        let again = collab
            .records
            .complete_record(
                record_id,
                Completion {
                    caption: "again".to_string(),
                    interval: 10,
                    ..completion(2)
                },
            )
            .await;

        assert!(matches!(
            again,
            Err(CollabError::Db(DatabaseError::AlreadyCompleted { record_id: id }))
                if id == record_id
        ));

        let second = collab.records.record_detail(record_id).await.unwrap();
        assert_eq!(second.status, RecordStatus::Completed);
        assert_eq!(second.caption, first.caption);
        assert_eq!(second.interval, first.interval);
        assert_eq!(second.finish_time, first.finish_time);

        let user = database.user_by_id(user_id).await.unwrap();
        assert_eq!(user.total_time, 1500, "interval is only counted once");
    }

    #[tokio::test]
    async fn rejects_invalid_completions() {
        let (collab, _clock, database) = collab_with_database();
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, user_id).await;
        let record_id = collab
            .records
            .create_record(user_id, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();

        let invalid = [
            completion(0),
            completion(3),
            Completion {
                interval: -1,
                ..completion(1)
            },
            Completion {
                interrupt: -1,
                ..completion(1)
            },
            Completion {
                image: " ".to_string(),
                ..completion(1)
            },
        ];

        for completion in invalid {
            let error = collab
                .records
                .complete_record(record_id, completion)
                .await
                .unwrap_err();
            assert_eq!(error.kind(), ErrorKind::InvalidInput);
        }

        let detail = collab.records.record_detail(record_id).await.unwrap();
        assert_eq!(detail.status, RecordStatus::Active);

        let missing = collab
            .records
            .complete_record(999, completion(1))
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let (collab, _clock, database) = collab_with_database();
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, user_id).await;

        let bad_pot = collab
            .records
            .create_record(user_id, room.room_id, uuid::Uuid::new_v4(), tomato)
            .await
            .unwrap_err();
        assert_eq!(bad_pot.kind(), ErrorKind::NotFound);

        let bad_ingredient = collab
            .records
            .create_record(user_id, room.room_id, room.pot_id, 999)
            .await
            .unwrap_err();
        assert_eq!(bad_ingredient.kind(), ErrorKind::NotFound);

        let missing = collab.records.record_detail(999).await.unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn pot_must_belong_to_the_room() {
        let (collab, _clock, database) = collab_with_database();
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let first = kitchen(&collab, user_id).await;
        let second = kitchen(&collab, user_id).await;

        let error = collab
            .records
            .create_record(user_id, first.room_id, second.pot_id, tomato)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);

        let records = collab
            .records
            .records_by_owner(RecordOwner::Room(first.room_id))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn active_records_come_first() {
        let (collab, _clock, database) = collab_with_database();
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, user_id).await;

        let mut ids = vec![];
        for _ in 0..4 {
            ids.push(
                collab
                    .records
                    .create_record(user_id, room.room_id, room.pot_id, tomato)
                    .await
                    .unwrap(),
            );
        }

        collab
            .records
            .complete_record(ids[0], completion(1))
            .await
            .unwrap();
        collab
            .records
            .complete_record(ids[2], completion(2))
            .await
            .unwrap();

        let by_user: Vec<_> = collab
            .records
            .records_by_owner(RecordOwner::User(user_id))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(by_user, vec![ids[1], ids[3], ids[0], ids[2]]);

        let by_room: Vec<_> = collab
            .records
            .records_by_owner(RecordOwner::Room(room.room_id))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(by_room, by_user);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_completions_have_one_winner() {
        let (collab, _clock, database) = collab_with_database();
        let collab = Arc::new(collab);
        let user_id = seed_user(&database, "cook").await;
        let tomato = seed_ingredient(&database, "tomato", "").await;
        let room = kitchen(&collab, user_id).await;
        let record_id = collab
            .records
            .create_record(user_id, room.room_id, room.pot_id, tomato)
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let collab = collab.clone();
                let status = if i % 2 == 0 { 1 } else { 2 };
                tokio::spawn(async move {
                    collab
                        .records
                        .complete_record(record_id, completion(status))
                        .await
                })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => won += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
            }
        }

        assert_eq!(won, 1);
        let user = database.user_by_id(user_id).await.unwrap();
        assert_eq!(user.total_time, 1500);
    }
}

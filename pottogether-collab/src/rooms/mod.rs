mod room;

use log::{info, warn};
use uuid::Uuid;

use crate::{
    error::LogInternal, CollabContext, CollabResult, MemberCountDrift, NewRoom, PrimaryKey,
    RoomData, RoomMemberData,
};

pub use room::*;

/// Creates rooms and moves users in and out of them.
///
/// Capacity and the member counter are enforced by the database in the same
/// unit of work as the membership change, so concurrent joins can never push
/// a room past its limit.
pub struct RoomManager {
    context: CollabContext,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new room with a fresh pot, with the creator as its first member
    pub async fn create_room(
        &self,
        user_id: PrimaryKey,
        settings: RoomSettings,
    ) -> CollabResult<CreatedRoom> {
        let settings = settings.validated()?;
        let pot_id = Uuid::new_v4();

        let room = self
            .context
            .database
            .create_room(NewRoom {
                name: settings.name,
                member_limit: settings.member_limit,
                privacy: settings.privacy,
                categories: settings.categories,
                pot_id,
                user_id,
                created_at: self.context.clock.now(),
            })
            .await
            .log_internal("create room", format!("user {user_id}"))?;

        info!(
            "User {} created room {} ({}) with pot {}",
            user_id, room.id, room.name, room.current_pot
        );

        Ok(CreatedRoom {
            room_id: room.id,
            pot_id: room.current_pot,
        })
    }

    /// Adds the user to the room if it has space left
    pub async fn join_room(&self, user_id: PrimaryKey, room_id: PrimaryKey) -> CollabResult<()> {
        self.context
            .database
            .join_room(room_id, user_id)
            .await
            .log_internal("join room", format!("room {room_id}"))?;

        info!("User {} joined room {}", user_id, room_id);
        Ok(())
    }

    /// Removes the user from the room
    pub async fn leave_room(&self, user_id: PrimaryKey, room_id: PrimaryKey) -> CollabResult<()> {
        self.context
            .database
            .leave_room(room_id, user_id)
            .await
            .log_internal("leave room", format!("room {room_id}"))?;

        info!("User {} left room {}", user_id, room_id);
        Ok(())
    }

    pub async fn room_by_id(&self, room_id: PrimaryKey) -> CollabResult<RoomData> {
        self.context
            .database
            .room_by_id(room_id)
            .await
            .log_internal("fetch room", format!("room {room_id}"))
    }

    pub async fn members(&self, room_id: PrimaryKey) -> CollabResult<Vec<RoomMemberData>> {
        self.context
            .database
            .room_members(room_id)
            .await
            .log_internal("list members", format!("room {room_id}"))
    }

    /// Rooms the user is a member of
    pub async fn rooms_of(&self, user_id: PrimaryKey) -> CollabResult<Vec<RoomData>> {
        self.context
            .database
            .rooms_by_member(user_id)
            .await
            .log_internal("list rooms", format!("user {user_id}"))
    }

    /// Rooms anyone can find and join
    pub async fn public_rooms(&self) -> CollabResult<Vec<RoomData>> {
        self.context
            .database
            .public_rooms()
            .await
            .log_internal("list public rooms", "all rooms")
    }

    /// Compares every room's member counter with its memberships.
    /// Returns the rooms that disagree.
    pub async fn audit_member_counts(&self) -> CollabResult<Vec<MemberCountDrift>> {
        let drift = self
            .context
            .database
            .member_count_drift()
            .await
            .log_internal("audit member counts", "all rooms")?;

        for room in &drift {
            warn!(
                "Room {} records {} members but has {} memberships",
                room.room_id, room.recorded, room.actual
            );
        }

        Ok(drift)
    }
}

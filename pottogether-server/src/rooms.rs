use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use pottogether_collab::{parse_categories, Privacy, RecordOwner, RoomSettings};

use crate::{
    auth::Session,
    errors::{ServerError, ServerResult},
    schemas::{NewRoomSchema, ValidatedJson},
    serialized::{Envelope, Record, RoomCreated, RoomOverview, RoomSummary, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/rooms",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<RoomSummary>, description = "Rooms the user is a member of")
    )
)]
async fn list_rooms(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<Vec<RoomSummary>>>> {
    let rooms = context.collab.rooms.rooms_of(session.user().id).await?;

    Ok(Json(Envelope::success(
        rooms.to_serialized(),
        "Rooms retrieved successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/public",
    tag = "rooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<RoomSummary>)
    )
)]
async fn public_rooms(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<Vec<RoomSummary>>>> {
    let rooms = context.collab.rooms.public_rooms().await?;

    Ok(Json(Envelope::success(
        rooms.to_serialized(),
        "Public rooms retrieved successfully",
    )))
}

#[utoipa::path(
    post,
    path = "/v1/rooms",
    tag = "rooms",
    request_body = NewRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomCreated),
        (status = 400, description = "Room settings are invalid")
    )
)]
async fn create_room(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Envelope<RoomCreated>>> {
    let privacy = Privacy::parse(&body.privacy).ok_or_else(|| {
        ServerError::BadRequest(format!("Unknown privacy {}", body.privacy))
    })?;

    let created = context
        .collab
        .rooms
        .create_room(
            session.user().id,
            RoomSettings {
                name: body.name,
                member_limit: body.member_limit,
                privacy,
                categories: parse_categories(&body.category),
            },
        )
        .await?;

    Ok(Json(Envelope::success(
        RoomCreated {
            room_id: created.room_id,
            pot_id: created.pot_id,
        },
        "Room created successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomOverview),
        (status = 404, description = "Room does not exist")
    )
)]
async fn room_overview(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Envelope<RoomOverview>>> {
    let overview = context
        .collab
        .overviews
        .room_overview(room_id, session.user().id)
        .await?;

    Ok(Json(Envelope::success(
        overview.to_serialized(),
        "Room overview retrieved successfully",
    )))
}

#[utoipa::path(
    post,
    path = "/v1/rooms/{id}/members",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "User joined the room"),
        (status = 404, description = "Room does not exist"),
        (status = 409, description = "User is already a member, or the room is full")
    )
)]
async fn join_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Envelope<()>>> {
    context
        .collab
        .rooms
        .join_room(session.user().id, room_id)
        .await?;

    Ok(Json(Envelope::done("Joined room successfully")))
}

#[utoipa::path(
    delete,
    path = "/v1/rooms/{id}/members",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "User left the room"),
        (status = 404, description = "Room does not exist, or user is not a member")
    )
)]
async fn leave_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Envelope<()>>> {
    context
        .collab
        .rooms
        .leave_room(session.user().id, room_id)
        .await?;

    Ok(Json(Envelope::done("Left room successfully")))
}

#[utoipa::path(
    get,
    path = "/v1/rooms/{id}/records",
    tag = "rooms",
    params(
        ("id" = i32, Path, description = "Room id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Record>, description = "Active records first")
    )
)]
async fn room_records(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Envelope<Vec<Record>>>> {
    // Unknown rooms are a 404 rather than an empty list
    context.collab.rooms.room_by_id(room_id).await?;

    let records = context
        .collab
        .records
        .records_by_owner(RecordOwner::Room(room_id))
        .await?;

    Ok(Json(Envelope::success(
        records.to_serialized(),
        "Records retrieved successfully",
    )))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/public", get(public_rooms))
        .route("/:id", get(room_overview))
        .route("/:id/members", post(join_room).delete(leave_room))
        .route("/:id/records", get(room_records))
}

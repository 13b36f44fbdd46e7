use axum::{extract::State, routing::get, Json};

use crate::{
    auth::Session,
    errors::ServerResult,
    serialized::{Envelope, ToSerialized, UserOverview, UserProfile},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/users/profile",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = UserProfile)
    )
)]
async fn profile(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<UserProfile>>> {
    let profile = context
        .collab
        .overviews
        .user_profile(session.user().id)
        .await?;

    Ok(Json(Envelope::success(
        profile.to_serialized(),
        "User profile retrieved successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/v1/users/overview",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = UserOverview)
    )
)]
async fn overview(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<UserOverview>>> {
    let overview = context
        .collab
        .overviews
        .user_overview(session.user().id)
        .await?;

    Ok(Json(Envelope::success(
        overview.to_serialized(),
        "User overview retrieved successfully",
    )))
}

pub fn router() -> Router {
    Router::new()
        .route("/profile", get(profile))
        .route("/overview", get(overview))
}

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{auth, ingredients, records, rooms, schemas, serialized, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup,
        auth::login,
        auth::logout,
        users::profile,
        users::overview,
        rooms::list_rooms,
        rooms::public_rooms,
        rooms::create_room,
        rooms::room_overview,
        rooms::join_room,
        rooms::leave_room,
        rooms::room_records,
        records::create_record,
        records::user_records,
        records::record_detail,
        records::complete_record,
        ingredients::list_ingredients,
        ingredients::add_ingredient,
    ),
    components(schemas(
        schemas::LoginSchema,
        schemas::SignupSchema,
        schemas::NewRoomSchema,
        schemas::NewRecordSchema,
        schemas::CompleteRecordForm,
        schemas::NewIngredientForm,
        serialized::User,
        serialized::LoginResult,
        serialized::RoomCreated,
        serialized::RoomSummary,
        serialized::RoomMember,
        serialized::Level,
        serialized::WeekDay,
        serialized::DayTotal,
        serialized::Record,
        serialized::RecordCreated,
        serialized::RoomOverview,
        serialized::UserOverview,
        serialized::UserStatus,
        serialized::UserProfile,
        serialized::Ingredient,
    )),
    modifiers(&Security),
    info(
        title = "pottogether API",
        description = "pottogether-server exposes endpoints to cook together in shared rooms. \
            Every response is wrapped in `{ isSuccess, data, message }`."
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

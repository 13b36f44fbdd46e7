use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::get,
    Json,
};
use log::warn;
use pottogether_collab::{Completion, DatabaseError, RecordOwner};

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{CompleteRecordForm, FormFields, NewRecordSchema, ValidatedJson, MAX_UPLOAD_BYTES},
    serialized::{Envelope, Record, RecordCreated, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    post,
    path = "/v1/records",
    tag = "records",
    request_body = NewRecordSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RecordCreated),
        (status = 404, description = "Room, pot or ingredient does not exist")
    )
)]
async fn create_record(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRecordSchema>,
) -> ServerResult<Json<Envelope<RecordCreated>>> {
    let record_id = context
        .collab
        .records
        .create_record(
            session.user().id,
            body.room_id,
            body.pot_id,
            body.ingredient_id,
        )
        .await?;

    Ok(Json(Envelope::success(
        RecordCreated { record_id },
        "Record created successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/v1/records",
    tag = "records",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Record>, description = "Active records first")
    )
)]
async fn user_records(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<Vec<Record>>>> {
    let records = context
        .collab
        .records
        .records_by_owner(RecordOwner::User(session.user().id))
        .await?;

    Ok(Json(Envelope::success(
        records.to_serialized(),
        "Records retrieved successfully",
    )))
}

#[utoipa::path(
    get,
    path = "/v1/records/{id}",
    tag = "records",
    params(
        ("id" = i32, Path, description = "Record id")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Record),
        (status = 404, description = "Record does not exist")
    )
)]
async fn record_detail(
    _session: Session,
    State(context): State<ServerContext>,
    Path(record_id): Path<i32>,
) -> ServerResult<Json<Envelope<Record>>> {
    let record = context.collab.records.record_detail(record_id).await?;

    Ok(Json(Envelope::success(
        record.to_serialized(),
        "Record detail retrieved successfully",
    )))
}

#[utoipa::path(
    patch,
    path = "/v1/records/{id}",
    tag = "records",
    params(
        ("id" = i32, Path, description = "Record id")
    ),
    request_body(content = CompleteRecordForm, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Record was completed or interrupted"),
        (status = 400, description = "Form is invalid"),
        (status = 404, description = "Record does not exist"),
        (status = 409, description = "Record already finished"),
        (status = 413, description = "Image is larger than 10 MiB")
    )
)]
async fn complete_record(
    _session: Session,
    State(context): State<ServerContext>,
    Path(record_id): Path<i32>,
    multipart: Multipart,
) -> ServerResult<Json<Envelope<()>>> {
    let mut form = FormFields::read(multipart, "image").await?;
    let image = form.take_file()?;

    let mut completion = Completion {
        image: String::new(),
        caption: form.optional_text("caption").unwrap_or_default(),
        interval: form.parse("interval")?,
        interrupt: form.parse_or("interrupt", 0)?,
        status_code: form.parse("status")?,
    };

    // Reject before uploading
    completion.validated_values()?;

    let record = context.collab.records.record_detail(record_id).await?;
    if record.status.is_terminal() {
        return Err(DatabaseError::AlreadyCompleted { record_id }.into());
    }

    let image = context
        .store
        .put(image, &format!("record/{record_id}"))
        .await?;
    completion.image = image.clone();

    let completed = context
        .collab
        .records
        .complete_record(record_id, completion)
        .await;

    // Another completion may have won after the check above
    if let Err(error) = completed {
        if let Err(e) = context.store.delete(&image).await {
            warn!("Could not remove orphaned upload {}: {}", image, e);
        }

        return Err(error.into());
    }

    Ok(Json(Envelope::done("Record updated successfully")))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(user_records).post(create_record))
        .route(
            "/:id",
            get(record_detail)
                .patch(complete_record)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

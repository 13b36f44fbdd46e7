use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::get,
    Json,
};
use log::warn;
use pottogether_collab::NewIngredient;

use crate::{
    auth::Session,
    errors::ServerResult,
    schemas::{FormFields, NewIngredientForm, MAX_UPLOAD_BYTES},
    serialized::{Envelope, Ingredient, ToSerialized},
    Router, ServerContext,
};

#[utoipa::path(
    get,
    path = "/v1/ingredients",
    tag = "ingredients",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Ingredient>)
    )
)]
async fn list_ingredients(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<Vec<Ingredient>>>> {
    let ingredients = context.collab.ingredients.list().await?;

    Ok(Json(Envelope::success(
        ingredients.to_serialized(),
        "Ingredients retrieved successfully",
    )))
}

#[utoipa::path(
    post,
    path = "/v1/ingredients",
    tag = "ingredients",
    request_body(content = NewIngredientForm, content_type = "multipart/form-data"),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Ingredient),
        (status = 400, description = "Form is invalid"),
        (status = 413, description = "Image is larger than 10 MiB")
    )
)]
async fn add_ingredient(
    _session: Session,
    State(context): State<ServerContext>,
    multipart: Multipart,
) -> ServerResult<Json<Envelope<Ingredient>>> {
    let mut form = FormFields::read(multipart, "image").await?;
    let image = form.take_file()?;

    // Reject before uploading
    let new_ingredient = NewIngredient {
        name: form.text("name")?,
        image: String::new(),
        interval: form.parse("interval")?,
        requirement: form.optional_text("requirement").unwrap_or_default(),
    }
    .validated()?;

    let image = context.store.put(image, "ingredient").await?;

    let added = context
        .collab
        .ingredients
        .add(NewIngredient {
            image: image.clone(),
            ..new_ingredient
        })
        .await;

    let ingredient = match added {
        Ok(ingredient) => ingredient,
        Err(error) => {
            if let Err(e) = context.store.delete(&image).await {
                warn!("Could not remove orphaned upload {}: {}", image, e);
            }

            return Err(error.into());
        }
    };

    Ok(Json(Envelope::success(
        ingredient.to_serialized(),
        "Ingredient added successfully",
    )))
}

pub fn router() -> Router {
    Router::new().route(
        "/",
        get(list_ingredients)
            .post(add_ingredient)
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

use std::{collections::HashMap, str::FromStr};

use axum::{
    async_trait,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::errors::{ServerError, ServerResult};

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupSchema {
    #[validate(email, length(max = 254))]
    pub email: String,
    #[validate(length(min = 8, max = 64))]
    pub password: String,
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(range(min = 0))]
    pub avatar: Option<i32>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(range(min = 1))]
    pub member_limit: i32,
    /// `public` or `private`
    pub privacy: String,
    /// Tags joined by `|`
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewRecordSchema {
    pub room_id: i32,
    pub pot_id: Uuid,
    pub ingredient_id: i32,
}

/// Multipart form of `PATCH /v1/records/{id}`
#[derive(Debug, ToSchema)]
pub struct CompleteRecordForm {
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    pub caption: String,
    pub interval: i32,
    pub interrupt: Option<i32>,
    /// 1 = completed, 2 = interrupted
    pub status: i16,
}

/// Multipart form of `POST /v1/ingredients`
#[derive(Debug, ToSchema)]
pub struct NewIngredientForm {
    pub name: String,
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    pub interval: i32,
    pub requirement: Option<String>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ServerError::BadRequest(e.body_text()))?;

        extracted_json
            .0
            .validate()
            .map_err(|e| ServerError::BadRequest(format!("Request body is invalid: {e}")))?;

        Ok(Self(extracted_json.0))
    }
}

/// Largest multipart body accepted by the upload routes
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

fn form_error(error: MultipartError) -> ServerError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::UploadTooLarge {
            limit: MAX_UPLOAD_BYTES,
        }
    } else {
        ServerError::BadRequest(format!("Form could not be read: {}", error.body_text()))
    }
}

/// The text fields and the single file of a multipart form
#[derive(Debug, Default)]
pub struct FormFields {
    text: HashMap<String, String>,
    file: Option<Vec<u8>>,
}

impl FormFields {
    /// Reads the whole form. The field named `file_field` is kept as bytes.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> ServerResult<Self> {
        let mut fields = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(form_error)?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == file_field {
                let bytes = field.bytes().await.map_err(form_error)?;
                fields.file = Some(bytes.to_vec());
            } else {
                let value = field.text().await.map_err(form_error)?;
                fields.text.insert(name, value);
            }
        }

        Ok(fields)
    }

    pub fn text(&self, name: &str) -> ServerResult<String> {
        self.text
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::BadRequest(format!("Missing field {name}")))
    }

    pub fn optional_text(&self, name: &str) -> Option<String> {
        self.text.get(name).cloned()
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> ServerResult<T> {
        self.text(name)?
            .trim()
            .parse()
            .map_err(|_| ServerError::BadRequest(format!("Field {name} is not a number")))
    }

    pub fn parse_or<T: FromStr>(&self, name: &str, default: T) -> ServerResult<T> {
        match self.text.get(name) {
            Some(_) => self.parse(name),
            None => Ok(default),
        }
    }

    pub fn take_file(&mut self) -> ServerResult<Vec<u8>> {
        match self.file.take() {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(ServerError::BadRequest("Missing image".to_string())),
        }
    }
}

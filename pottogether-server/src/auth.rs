use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{header, request::Parts},
    routing::post,
    Json,
};
use pottogether_collab::{AuthError, Credentials, NewPlainUser, SessionData, UserData};

use crate::{
    errors::{ServerError, ServerResult},
    schemas::{LoginSchema, SignupSchema, ValidatedJson},
    serialized::{Envelope, LoginResult, ToSerialized},
    Router, ServerContext,
};

/// Wraps [SessionData] so [FromRequestParts] can be implemented for it
pub struct Session(SessionData);

impl Session {
    /// Returns the user of the session
    pub fn user(&self) -> &UserData {
        &self.0.user
    }

    pub fn token(&self) -> &str {
        &self.0.token
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    ServerContext: FromRef<S>,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = ServerContext::from_ref(state);

        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or(ServerError::Unauthorized("Missing authorization"))?;

        let parts: Vec<_> = authorization.split_ascii_whitespace().collect();

        let token = match parts.as_slice() {
            ["Bearer", token] => *token,
            _ => return Err(ServerError::Unauthorized("Authorization must be Bearer")),
        };

        let session = context
            .collab
            .auth
            .session(token)
            .await
            .map_err(|e| match e {
                AuthError::InvalidSession => ServerError::Unauthorized("Session does not exist"),
                e => ServerError::Auth(e),
            })?;

        Ok(Self(session))
    }
}

#[utoipa::path(
    post,
    path = "/v1/users/signup",
    tag = "users",
    request_body = SignupSchema,
    responses(
        (status = 200, body = LoginResult, description = "Account created and logged in"),
        (status = 409, description = "Email is already registered")
    )
)]
async fn signup(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SignupSchema>,
) -> ServerResult<Json<Envelope<LoginResult>>> {
    let session = context
        .collab
        .auth
        .register(NewPlainUser {
            email: body.email,
            password: body.password,
            username: body.username,
            avatar: body.avatar,
        })
        .await?;

    Ok(Json(Envelope::success(
        session.to_serialized(),
        "User created successfully",
    )))
}

#[utoipa::path(
    post,
    path = "/v1/users/login",
    tag = "users",
    request_body = LoginSchema,
    responses(
        (status = 200, body = LoginResult),
        (status = 401, description = "Email or password is incorrect")
    )
)]
async fn login(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<LoginSchema>,
) -> ServerResult<Json<Envelope<LoginResult>>> {
    let session = context
        .collab
        .auth
        .login(Credentials {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Json(Envelope::success(
        session.to_serialized(),
        "Login successful",
    )))
}

#[utoipa::path(
    post,
    path = "/v1/users/logout",
    tag = "users",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Session was deleted")
    )
)]
async fn logout(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Envelope<()>>> {
    context.collab.auth.logout(session.token()).await?;

    Ok(Json(Envelope::done("Logout successful")))
}

pub fn router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

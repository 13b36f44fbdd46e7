use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::Duration;
use log::info;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{
    util::random_string, ArcedClock, ArcedDatabase, CollabContext, DatabaseError, ErrorKind,
    NewSession, NewUser, SessionData, UserData,
};

pub struct Auth {
    db: ArcedDatabase,
    clock: ArcedClock,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Email or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The session token is unknown or expired
    #[error("Session does not exist")]
    InvalidSession,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials | Self::InvalidSession => ErrorKind::Unauthorized,
            Self::Db(e) => e.kind(),
            Self::HashError(_) => ErrorKind::Internal,
        }
    }
}

impl Auth {
    const SESSION_DURATION_IN_DAYS: i64 = 7;
    const TOKEN_LENGTH: usize = 32;

    pub fn new(context: &CollabContext) -> Self {
        Self {
            db: context.database.clone(),
            clock: context.clock.clone(),
            argon: Argon2::default(),
        }
    }

    /// Creates a user and logs them in, returning the new session
    pub async fn register(&self, new_user: NewPlainUser) -> Result<SessionData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        let user = self
            .db
            .create_user(NewUser {
                email: new_user.email,
                username: new_user.username,
                password: hashed_password,
                avatar: new_user.avatar,
                created_at: self.clock.now(),
            })
            .await
            .map_err(AuthError::Db)?;

        info!("Registered user {} ({})", user.id, user.email);

        self.start_session(&user).await
    }

    /// Logs in a user, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await.map_err(AuthError::Db)?;

        let user = self
            .db
            .user_by_email(&credentials.email)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.start_session(&user).await
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.db.delete_session_by_token(token).await
    }

    /// Returns a session if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, AuthError> {
        let session = self
            .db
            .session_by_token(token)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidSession,
                err => AuthError::Db(err),
            })?;

        if session.expires_at <= self.clock.now() {
            return Err(AuthError::InvalidSession);
        }

        Ok(session)
    }

    /// Removes every session past its expiry
    pub async fn clear_expired(&self) -> Result<(), DatabaseError> {
        self.db.clear_expired_sessions(self.clock.now()).await
    }

    async fn start_session(&self, user: &UserData) -> Result<SessionData, AuthError> {
        let expires_at = self.clock.now() + Duration::days(Self::SESSION_DURATION_IN_DAYS);

        let new_session = NewSession {
            token: random_string(Self::TOKEN_LENGTH),
            user_id: user.id,
            expires_at,
        };

        self.db
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewPlainUser {
    pub email: String,
    pub password: String,
    pub username: String,
    pub avatar: Option<i32>,
}

#[cfg(test)]
mod test {
    use crate::test_support::collab;

    use super::*;

    fn john() -> NewPlainUser {
        NewPlainUser {
            email: "john@example.com".to_string(),
            password: "strawberries".to_string(),
            username: "john".to_string(),
            avatar: Some(3),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let (collab, _clock) = collab();

        let registered = collab.auth.register(john()).await.unwrap();
        assert_eq!(registered.user.username, "john");
        assert_eq!(registered.user.avatar, Some(3));
        assert_ne!(registered.user.password, "strawberries", "password is hashed");

        let session = collab
            .auth
            .login(Credentials {
                email: "john@example.com".to_string(),
                password: "strawberries".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.id, registered.user.id);
        assert_ne!(session.token, registered.token);

        let resolved = collab.auth.session(&session.token).await.unwrap();
        assert_eq!(resolved.user.id, registered.user.id);
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_duplicate_email() {
        let (collab, _clock) = collab();
        collab.auth.register(john()).await.unwrap();

        let wrong = collab
            .auth
            .login(Credentials {
                email: "john@example.com".to_string(),
                password: "bananas".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));

        let unknown = collab
            .auth
            .login(Credentials {
                email: "mary@example.com".to_string(),
                password: "bananas".to_string(),
            })
            .await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));

        let duplicate = collab.auth.register(john()).await.unwrap_err();
        assert_eq!(duplicate.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn sessions_expire_and_log_out() {
        let (collab, clock) = collab();
        let session = collab.auth.register(john()).await.unwrap();

        clock.advance(Duration::days(8));
        let expired = collab.auth.session(&session.token).await;
        assert!(matches!(expired, Err(AuthError::InvalidSession)));

        clock.advance(Duration::days(-8));
        collab.auth.logout(&session.token).await.unwrap();
        let gone = collab.auth.session(&session.token).await;
        assert!(matches!(gone, Err(AuthError::InvalidSession)));
    }
}

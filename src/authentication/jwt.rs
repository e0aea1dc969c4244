use std::sync::Arc;

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::database::{
    error::Error,
    schema::{Id, User, UserRole},
};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), Error> {
        if !action.authenticate(self) {
            return Err(Error::forbidden());
        }
        Ok(())
    }

    /// Authors manage their own recipes, admins manage all of them.
    pub fn authenticate_owner(&self, author_id: Id) -> Result<(), Error> {
        if author_id == self.user_id {
            return self.authenticate(ActionType::ManageOwnRecipes);
        }
        self.authenticate(ActionType::ManageAllRecipes)
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            role: value.role,
        }
    }
}

/// Signing secret and token lifetime shared by every request.
#[derive(Clone)]
pub struct SessionKey {
    secret: Arc<Vec<u8>>,
    lifetime: Duration,
}

impl SessionKey {
    pub fn new(secret: &str, lifetime_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.as_bytes().to_vec()),
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn hmac(&self) -> Result<Hmac<Sha256>, Error> {
        Hmac::new_from_slice(&self.secret)
            .map_err(|e| Error::Transaction(format!("Invalid session key: {e}")))
    }
}

pub fn generate_jwt_session(user: &User, key: &SessionKey) -> Result<String, Error> {
    let claims = JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role,
        key.lifetime(),
    );

    claims
        .sign_with_key(&key.hmac()?)
        .map_err(|e| Error::Transaction(format!("Failed to sign session: {e}")))
}

pub fn verify_jwt_session(token: &str, key: &SessionKey) -> Result<JwtSessionData, Error> {
    let session: JwtSessionData = token
        .verify_with_key(&key.hmac()?)
        .map_err(|_| Error::Unauthorized(String::from("Invalid session; Invalid token")))?;

    if session.is_expired() {
        return Err(Error::Unauthorized(String::from(
            "Invalid session; Token expired",
        )));
    }

    Ok(session)
}

use serde::{Deserialize, Serialize};

use crate::{
    authentication::{
        cryptography::verify_password,
        jwt::{generate_jwt_session, SessionKey},
    },
    constants::{MAX_EMAIL_LENGTH, MAX_USERNAME_LENGTH, RESERVED_USERNAMES},
    database::{
        error::Error,
        schema::{Id, NewUser, UserProfile, UserRole},
        store::Datastore,
    },
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

/// Credentials of the administrator created on start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub email: String,
    pub username: String,
    pub password: String,
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || ".@+-_".contains(c)
}

fn check_user_payload(payload: &UserPayload) -> Result<(), Error> {
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') || email.len() > MAX_EMAIL_LENGTH {
        return Err(Error::validation("Enter a valid email address"));
    }

    let username = payload.username.trim();
    if username.is_empty()
        || username.chars().count() > MAX_USERNAME_LENGTH
        || !username.chars().all(is_username_char)
    {
        return Err(Error::validation(
            "Username may contain only letters, digits and .@+-_",
        ));
    }
    if RESERVED_USERNAMES.contains(&username) {
        return Err(Error::Validation(format!(
            "Username `{username}` is reserved"
        )));
    }

    for (field, value) in [
        ("first_name", &payload.first_name),
        ("last_name", &payload.last_name),
    ] {
        let value = value.trim();
        if value.is_empty() || value.chars().count() > MAX_USERNAME_LENGTH {
            return Err(Error::Validation(format!("Invalid {field}")));
        }
    }

    if payload.password.is_empty() {
        return Err(Error::validation("Password is required"));
    }

    Ok(())
}

/// Registers a regular user. `hash` turns the plain password into its stored form.
pub async fn create_user<F>(
    payload: UserPayload,
    store: &dyn Datastore,
    hash: F,
) -> Result<UserProfile, Error>
where
    F: FnOnce(&str) -> Result<String, Error>,
{
    create_user_with_role(payload, UserRole::User, store, hash).await
}

pub async fn create_user_with_role<F>(
    payload: UserPayload,
    role: UserRole,
    store: &dyn Datastore,
    hash: F,
) -> Result<UserProfile, Error>
where
    F: FnOnce(&str) -> Result<String, Error>,
{
    check_user_payload(&payload)?;
    let password = hash(&payload.password)?;

    let user = store
        .insert_user(NewUser {
            email: payload.email.trim().to_lowercase(),
            username: payload.username.trim().to_string(),
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            password,
            role,
        })
        .await
        .map_err(|e| match e {
            Error::Conflict(_) => {
                Error::conflict("A user with that email or username already exists")
            }
            e => e,
        })?;

    log::info!("Registered user {} ({:?})", user.username, user.role);

    Ok(UserProfile::from_user(user, false))
}

/// Creates the administrator unless a user with that email exists. An
/// existing account that is not an admin is left alone and reported.
pub async fn ensure_admin<F>(
    account: &AdminAccount,
    store: &dyn Datastore,
    hash: F,
) -> Result<UserProfile, Error>
where
    F: FnOnce(&str) -> Result<String, Error>,
{
    if let Some(user) = store.get_user_by_email(account.email.trim()).await? {
        if user.role != UserRole::Admin {
            return Err(Error::Conflict(format!(
                "User {} exists and is not an admin",
                user.username
            )));
        }
        log::info!("Admin {} already exists", user.username);
        return Ok(UserProfile::from_user(user, false));
    }

    let payload = UserPayload {
        email: account.email.clone(),
        username: account.username.clone(),
        first_name: String::from("Admin"),
        last_name: String::from("Admin"),
        password: account.password.clone(),
    };

    create_user_with_role(payload, UserRole::Admin, store, hash).await
}

/// Checks the credentials and returns a signed session token.
pub async fn login_user(
    payload: LoginPayload,
    store: &dyn Datastore,
    key: &SessionKey,
) -> Result<TokenResponse, Error> {
    let user = match store.get_user_by_email(payload.email.trim()).await? {
        Some(user) => user,
        None => return Err(Error::validation("Invalid credentials")),
    };

    if !verify_password(&payload.password, &user.password) {
        log::warn!("Failed login for user {}", user.username);
        return Err(Error::validation("Invalid credentials"));
    }

    Ok(TokenResponse {
        auth_token: generate_jwt_session(&user, key)?,
    })
}

pub async fn get_profile(
    id: Id,
    viewer: Option<Id>,
    store: &dyn Datastore,
) -> Result<UserProfile, Error> {
    let user = store
        .get_user(id)
        .await?
        .ok_or_else(|| Error::not_found("No user exists with specified id"))?;

    let is_subscribed = match viewer {
        Some(viewer) => store.is_subscribed(viewer, user.id).await?,
        None => false,
    };

    Ok(UserProfile::from_user(user, is_subscribed))
}

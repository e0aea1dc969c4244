use warp::{reject::Rejection, Filter};

use crate::{
    constants::SESSION_COOKIE,
    database::{error::Error, schema::Id},
};

use super::jwt::{verify_jwt_session, SessionData, SessionKey};

/// Who is making a request. Anonymous callers can read but own no relations.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Anonymous,
    User(SessionData),
}

impl Identity {
    pub fn session(&self) -> Option<&SessionData> {
        match self {
            Identity::Anonymous => None,
            Identity::User(session) => Some(session),
        }
    }

    pub fn user_id(&self) -> Option<Id> {
        self.session().map(|s| s.user_id)
    }

    pub fn require(&self) -> Result<&SessionData, Error> {
        self.session().ok_or_else(Error::unauthorized)
    }
}

fn header_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Token ")
        .or_else(|| header.strip_prefix("Bearer "))
        .map(str::trim)
}

pub fn resolve_identity(
    authorization: Option<String>,
    cookie: Option<String>,
    key: &SessionKey,
) -> Identity {
    let token = match (authorization.as_deref().and_then(header_token), cookie.as_deref()) {
        (Some(token), _) => token,
        (None, Some(token)) => token,
        (None, None) => return Identity::Anonymous,
    };

    match verify_jwt_session(token, key) {
        Ok(data) => Identity::User(data.into()),
        Err(e) => {
            log::warn!("Ignoring session: {e}");
            Identity::Anonymous
        }
    }
}

pub fn with_identity(
    key: SessionKey,
) -> impl Filter<Extract = (Identity,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>(SESSION_COOKIE))
        .map(move |authorization: Option<String>, cookie: Option<String>| {
            resolve_identity(authorization, cookie, &key)
        })
}

pub fn with_session(
    key: SessionKey,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_identity(key).and_then(|identity: Identity| async move {
        match identity {
            Identity::User(session) => Ok(session),
            Identity::Anonymous => Err(warp::reject::custom(Error::unauthorized())),
        }
    })
}

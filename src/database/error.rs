use std::fmt::{self, Display};

use thiserror::Error;
use warp::reject::Reject;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

impl Error {
    pub fn validation(info: &str) -> Self {
        Self::Validation(info.to_string())
    }

    pub fn conflict(info: &str) -> Self {
        Self::Conflict(info.to_string())
    }

    pub fn not_found(info: &str) -> Self {
        Self::NotFound(info.to_string())
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized(String::from("Authentication credentials were not provided"))
    }

    pub fn forbidden() -> Self {
        Self::Forbidden(String::from(
            "You don't have permission to perform this action",
        ))
    }

    /// HTTP status the error is surfaced with.
    pub fn code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            // the public API reports duplicates as bad requests
            Error::Conflict(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::Transaction(_) => 500,
        }
    }
}

impl Reject for Error {}

pub struct QueryError {
    info: String,
    kind: QueryErrorKind,
}

enum QueryErrorKind {
    UniqueViolation,
    ForeignKeyViolation,
    CheckViolation,
    Other,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            kind: QueryErrorKind::Other,
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => {
                let kind = if e.is_unique_violation() {
                    QueryErrorKind::UniqueViolation
                } else if e.is_foreign_key_violation() {
                    QueryErrorKind::ForeignKeyViolation
                } else if e.is_check_violation() {
                    QueryErrorKind::CheckViolation
                } else {
                    QueryErrorKind::Other
                };
                let info = match e.constraint() {
                    Some(constraint) => format!("{e} ({constraint})"),
                    None => format!("{e}"),
                };
                Self { info, kind }
            }
            sqlx::Error::Configuration(e) => Self::new(format!("{e}")),
            sqlx::Error::Io(e) => Self::new(format!("{e}")),
            sqlx::Error::Tls(e) => Self::new(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(String::from("RowNotFound")),
            sqlx::Error::TypeNotFound { type_name } => {
                Self::new(format!("Type not found: {type_name}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                Self::new(format!("Column index out of bounds {index} ({len})"))
            }
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::new(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for Error {
    fn from(value: QueryError) -> Self {
        match value.kind {
            QueryErrorKind::UniqueViolation | QueryErrorKind::CheckViolation => {
                log::warn!("Constraint rejected write: {}", value.info);
                Error::Conflict(value.info)
            }
            QueryErrorKind::ForeignKeyViolation => Error::NotFound(value.info),
            QueryErrorKind::Other => {
                log::error!("Query failed: {}", value.info);
                Error::Transaction(value.info)
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

/// Recipe writes report dangling tag, ingredient or author references as
/// conflicts, like any other constraint the write runs into.
pub fn recipe_write_error(value: sqlx::Error) -> Error {
    let error = QueryError::from(value);
    match error.kind {
        QueryErrorKind::ForeignKeyViolation => {
            log::warn!("Recipe write references a missing row: {}", error.info);
            Error::Conflict(error.info)
        }
        _ => error.into(),
    }
}

#[derive(Debug)]
pub struct TypeError {
    info: String,
}

impl TypeError {
    pub fn new(info: &str) -> Self {
        Self {
            info: info.to_string(),
        }
    }
}

impl From<TypeError> for Error {
    fn from(value: TypeError) -> Self {
        Error::Validation(value.info)
    }
}

impl Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.info)
    }
}

impl std::error::Error for TypeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::validation("x").code(), 400);
        assert_eq!(Error::conflict("x").code(), 400);
        assert_eq!(Error::unauthorized().code(), 401);
        assert_eq!(Error::forbidden().code(), 403);
        assert_eq!(Error::not_found("x").code(), 404);
        assert_eq!(Error::Transaction(String::from("x")).code(), 500);
    }

    #[test]
    fn non_database_query_errors_are_transaction_failures() {
        let error: Error = sqlx::Error::PoolTimedOut.into();
        assert_eq!(error, Error::Transaction(String::from("Pool timed out")));

        let error = recipe_write_error(sqlx::Error::PoolTimedOut);
        assert_eq!(error, Error::Transaction(String::from("Pool timed out")));
    }

    #[test]
    fn type_errors_become_validation_errors() {
        let error: Error = TypeError::new("Invalid key").into();
        assert_eq!(error, Error::validation("Invalid key"));
    }
}

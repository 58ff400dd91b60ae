use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// Construct a `404 Not Found` error about the given thing.
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("{} not found", what.as_ref()))
    }

    /// Construct a `400 Bad Request` error with the given message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    /// Construct a `409 Conflict` error with the given message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Status(Status::Conflict, message.into())
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Status(status, _) => *status,
        }
    }
}

/// The body sent back to the client for any failed request.
#[derive(Debug, Serialize)]
struct ErrorMessage {
    error: bool,
    message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        // Internal details stay in the log.
        let message = match status.class() {
            StatusClass::ServerError => {
                error!("{self}");
                "Something went wrong. Please try again.".to_string()
            }
            _ => {
                warn!("{self}");
                self.to_string()
            }
        };
        let mut response = Json(ErrorMessage {
            error: true,
            message,
        })
        .respond_to(req)?;
        response.set_status(status);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_pick_statuses() {
        assert_eq!(Error::not_found("Position").status(), Status::NotFound);
        assert_eq!(Error::not_found("Position").to_string(), "Position not found");
        assert_eq!(Error::bad_request("nope").status(), Status::BadRequest);
        assert_eq!(Error::conflict("twice").status(), Status::Conflict);
    }
}

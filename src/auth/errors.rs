use thiserror::Error;

/// Reasons a presented token is refused.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Given token not valid for any token type")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("Token has wrong type")]
    WrongKind,
    #[error("Authorization header must contain two space-delimited values")]
    MalformedHeader,
}

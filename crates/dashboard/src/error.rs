//! Dashboard error types.

use stockroom_core::ProductId;
use thiserror::Error;

/// Failure of a single call to the inventory API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Field-level validation failure, as full messages.
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Sign-in rejected; carries the server's alert.
    #[error("{0}")]
    AuthFailure(String),

    /// Absent, or outside the signed-in store.
    #[error("not found")]
    NotFound,

    /// No live session.
    #[error("unauthorized")]
    Unauthorized,

    /// The forgery protection token was rejected.
    #[error("invalid authenticity token")]
    InvalidAuthenticityToken,

    /// The product was locked by concurrent adjustments; safe to retry.
    #[error("product busy")]
    Timeout,

    /// Server-side failure.
    #[error("server error: HTTP {0}")]
    Server(u16),

    /// Network or decoding failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Bad base URL or path.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Message for the status banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(messages) if !messages.is_empty() => messages.join(", "),
            Self::AuthFailure(alert) => alert.clone(),
            Self::NotFound => "Product not found.".to_string(),
            Self::Unauthorized => "Please sign in to continue.".to_string(),
            Self::InvalidAuthenticityToken => {
                "Your session has changed. Reload the page and try again.".to_string()
            }
            Self::Timeout => "The product is busy. Please try again.".to_string(),
            Self::Validation(_) | Self::Server(_) | Self::Transport(_) | Self::InvalidUrl(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Like [`user_message`](Self::user_message), but with an
    /// operation-specific message for failures the server did not explain.
    #[must_use]
    pub fn message_or(&self, fallback: &str) -> String {
        let explained = match self {
            Self::Validation(messages) => !messages.is_empty(),
            Self::Server(_) | Self::Transport(_) | Self::InvalidUrl(_) => false,
            _ => true,
        };
        if explained {
            self.user_message()
        } else {
            fallback.to_string()
        }
    }
}

/// Failure of a dashboard operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another operation on this product has not finished.
    #[error("product {0} has an operation in progress")]
    Busy(ProductId),

    /// The user declined the confirmation prompt.
    #[error("cancelled")]
    Cancelled,

    /// Rejected before any request was sent.
    #[error("{0}")]
    Invalid(String),

    /// The dashboard was unmounted; the result was discarded.
    #[error("dashboard unmounted")]
    Unmounted,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = ApiError::Validation(vec![
            "Name can't be blank".to_string(),
            "Sku has already been taken".to_string(),
        ]);
        assert_eq!(
            err.user_message(),
            "Name can't be blank, Sku has already been taken"
        );
        assert_eq!(
            ApiError::AuthFailure("Invalid email or password.".to_string()).user_message(),
            "Invalid email or password."
        );
        assert_eq!(
            ApiError::Server(500).user_message(),
            "Something went wrong. Please try again."
        );
    }

    #[test]
    fn test_message_or_prefers_server_explanation() {
        let fallback = "Unable to delete the product right now.";
        assert_eq!(ApiError::Server(502).message_or(fallback), fallback);
        assert_eq!(ApiError::NotFound.message_or(fallback), "Product not found.");
    }
}

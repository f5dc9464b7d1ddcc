use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::flash::Category;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Username already exists")]
    UsernameAlreadyExists,
    #[error("Username and password are required")]
    MissingField,
    #[error("The form has expired, please try again")]
    InvalidCsrfToken,
    #[error("Please describe the image you want")]
    EmptyPrompt,
    #[error("User not found")]
    UserNotFound,
    #[error("Image service returned an unreadable response")]
    MalformedApiResponse,
    #[error("Stored image is not valid base64")]
    CorruptImage,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::UsernameAlreadyExists => StatusCode::CONFLICT,
            Error::MissingField => StatusCode::BAD_REQUEST,
            Error::InvalidCsrfToken => StatusCode::FORBIDDEN,
            Error::EmptyPrompt => StatusCode::BAD_REQUEST,
            Error::UserNotFound => StatusCode::NOT_FOUND,
            Error::MalformedApiResponse => StatusCode::BAD_GATEWAY,
            Error::CorruptImage => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors the user can act on are shown as a flash message on the page
    /// they came from; everything else is a plain error response.
    pub fn flash_category(&self) -> Option<Category> {
        match self {
            Error::InvalidCredentials => Some(Category::Danger),
            Error::UsernameAlreadyExists => Some(Category::Warning),
            Error::MissingField => Some(Category::Danger),
            Error::InvalidCsrfToken => Some(Category::Danger),
            Error::EmptyPrompt => Some(Category::Warning),
            Error::MalformedApiResponse => Some(Category::Danger),
            _ => None,
        }
    }

    pub fn into_response_tuple(self) -> (StatusCode, String) {
        (self.status_code(), self.to_string())
    }
}

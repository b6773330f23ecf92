use crate::submission::ValidationError;
use lambda_http::{
    http::{HeaderMap, StatusCode},
    Body, Response,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::{error, info, warn};

const RECAPTCHA_FAILED_FIELD: &str = "recaptha";
const RECAPTCHA_FAILED_MESSAGE: &str = "reCAPTCHA could not be validated, please try again";

/// Everything which can stop a contact form message from being sent. Each variant maps onto one
/// response the browser knows how to display.
#[derive(Debug)]
pub enum ContactFormError {
    MalformedBody(serde_json::Error),
    InvalidSubmission(Vec<ValidationError>),
    ChallengeFailed(String),
    DispatchFailed {
        description: String,
        fallback_address: String,
    },
}

#[derive(Serialize)]
pub struct ResponseBody<'a> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<&'a [ValidationError]>,
}

impl ContactFormError {
    pub fn log(&self) {
        match self {
            ContactFormError::MalformedBody(error) => {
                warn!("Rejecting request with malformed body: {error}");
            }
            ContactFormError::InvalidSubmission(errors) => {
                info!(error_count = errors.len(), "Rejecting invalid submission: {errors:?}");
            }
            ContactFormError::ChallengeFailed(description) => {
                warn!("reCAPTCHA validation failed: {description}");
            }
            ContactFormError::DispatchFailed { description, .. } => {
                error!("Failed to send email: {description}");
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ContactFormError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ContactFormError::InvalidSubmission(_) | ContactFormError::ChallengeFailed(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ContactFormError::DispatchFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The errors shown to the user. Details of upstream failures stay in the logs.
    pub fn client_errors(self) -> Vec<ValidationError> {
        match self {
            ContactFormError::MalformedBody(_) => vec![ValidationError::new(
                "body",
                "Request body is not valid JSON",
            )],
            ContactFormError::InvalidSubmission(errors) => errors,
            ContactFormError::ChallengeFailed(_) => vec![ValidationError::new(
                RECAPTCHA_FAILED_FIELD,
                RECAPTCHA_FAILED_MESSAGE,
            )],
            ContactFormError::DispatchFailed {
                fallback_address, ..
            } => vec![ValidationError::without_field(format!(
                "An unknown error prevented the sending of this message - please try again later, or send an email to {fallback_address}"
            ))],
        }
    }

    pub fn into_response(self, headers: HeaderMap) -> serde_json::Result<Response<Body>> {
        let status = self.status();
        let errors = self.client_errors();
        json_response(
            status,
            headers,
            &ResponseBody {
                success: false,
                errors: Some(&errors),
            },
        )
    }
}

pub fn json_response(
    status: StatusCode,
    headers: HeaderMap,
    body: &ResponseBody,
) -> serde_json::Result<Response<Body>> {
    let mut response = Response::new(Body::Text(serde_json::to_string(body)?));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

impl std::fmt::Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::MalformedBody(error) => write!(f, "Malformed body: {error}"),
            ContactFormError::InvalidSubmission(errors) => {
                write!(f, "Invalid submission: {} error(s)", errors.len())
            }
            ContactFormError::ChallengeFailed(description) => {
                write!(f, "Challenge failed: {description}")
            }
            ContactFormError::DispatchFailed { description, .. } => {
                write!(f, "Dispatch failed: {description}")
            }
        }
    }
}

impl std::error::Error for ContactFormError {}

#[derive(Debug)]
pub enum EnvironmentError {
    MissingSecret(&'static str),
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::MissingSecret(key) => write!(f, "Missing secret {key}"),
        }
    }
}

impl std::error::Error for EnvironmentError {}

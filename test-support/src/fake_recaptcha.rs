use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/recaptcha/api/siteverify";

/// Stands in for Google's `siteverify` endpoint.
#[derive(Clone)]
pub struct FakeRecaptcha {
    required_secret: Cow<'static, str>,
    required_token: Option<String>,
    return_invalid_response: bool,
    return_server_error: bool,
    response_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<VerifyRequest>>>,
}

/// A form-encoded verification request as received by the fake.
#[derive(Deserialize, Debug, Clone)]
pub struct VerifyRequest {
    pub secret: String,
    pub response: String,
    pub remoteip: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes", skip_serializing_if = "Vec::is_empty")]
    error_codes: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<&'static str>,
}

impl FakeRecaptcha {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_token: None,
            return_invalid_response: false,
            return_server_error: false,
            response_delay: None,
            requests: Default::default(),
        }
    }

    pub fn require_token(self, required_token: impl AsRef<str>) -> Self {
        Self {
            required_token: Some(required_token.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn return_server_error(self) -> Self {
        Self {
            return_server_error: true,
            ..self
        }
    }

    pub fn delay_response(self, delay: Duration) -> Self {
        Self {
            response_delay: Some(delay),
            ..self
        }
    }

    /// Every request received so far, shared with the running server.
    pub fn requests(&self) -> Arc<Mutex<Vec<VerifyRequest>>> {
        self.requests.clone()
    }

    /// Binds to an ephemeral local port, serves in the background and returns the verify URL.
    pub async fn start(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}{VERIFY_PATH}")
    }
}

async fn verify(
    State(state): State<FakeRecaptcha>,
    Form(request): Form<VerifyRequest>,
) -> Response {
    state.requests.lock().unwrap().push(request.clone());
    if let Some(delay) = state.response_delay {
        tokio::time::sleep(delay).await;
    }
    if state.return_invalid_response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response()
    } else if state.return_server_error {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    } else if request.secret != state.required_secret {
        verdict(&["invalid-input-secret"])
    } else if state
        .required_token
        .as_ref()
        .is_some_and(|token| *token != request.response)
    {
        verdict(&["invalid-input-response"])
    } else {
        verdict(&[])
    }
}

fn verdict(error_codes: &[&'static str]) -> Response {
    let success = error_codes.is_empty();
    Json(VerifyResponsePayload {
        success,
        error_codes: error_codes.to_vec(),
        hostname: success.then_some("localhost"),
    })
    .into_response()
}

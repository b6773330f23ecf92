use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const AMZ_JSON: &str = "application/x-amz-json-1.1";

/// Answers `GetSecretValue` calls the way AWS Secrets Manager does.
#[derive(Clone, Default)]
pub struct FakeSecretsManager {
    secrets: Arc<Mutex<HashMap<String, String>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueRequest {
    secret_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueResponse<'a> {
    name: &'a str,
    secret_string: &'a str,
}

impl FakeSecretsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.into(), value.into());
        self
    }

    /// Binds to an ephemeral local port, serves in the background and returns the endpoint URL.
    pub async fn start(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/", post(get_secret_value))
            .with_state(self);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}")
    }
}

async fn get_secret_value(State(state): State<FakeSecretsManager>, body: String) -> Response {
    let Ok(request) = serde_json::from_str::<GetSecretValueRequest>(&body) else {
        return aws_error(StatusCode::BAD_REQUEST, "ValidationException", "Malformed request");
    };
    let secrets = state.secrets.lock().unwrap();
    let Some(value) = secrets.get(&request.secret_id) else {
        return aws_error(
            StatusCode::BAD_REQUEST,
            "ResourceNotFoundException",
            "Secrets Manager can't find the specified secret.",
        );
    };
    let payload = GetSecretValueResponse {
        name: &request.secret_id,
        secret_string: value,
    };
    (
        [(header::CONTENT_TYPE, AMZ_JSON)],
        serde_json::to_string(&payload).unwrap(),
    )
        .into_response()
}

fn aws_error(status: StatusCode, error_type: &'static str, message: &'static str) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, AMZ_JSON),
            (header::HeaderName::from_static("x-amzn-errortype"), error_type),
        ],
        serde_json::json!({"__type": error_type, "message": message}).to_string(),
    )
        .into_response()
}

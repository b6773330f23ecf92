use crate::config::Config;
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Checks a challenge token produced by the widget on the contact page.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<Verdict, VerificationError>;
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    pub success: bool,
    #[serde(default, rename = "error-codes")]
    pub error_codes: Vec<String>,
    #[serde(default)]
    pub hostname: Option<String>,
}

pub struct RecaptchaVerifier {
    client: Client,
    verify_url: String,
    secret: String,
}

#[derive(Serialize)]
struct RecaptchaVerifyPayload<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

impl RecaptchaVerifier {
    pub fn new(config: &Config) -> Result<Self, VerificationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(VerificationError::Client)?;
        Ok(Self {
            client,
            verify_url: config.recaptcha_verify_url.clone(),
            secret: config.recaptcha_secret.clone(),
        })
    }
}

#[async_trait]
impl ChallengeVerifier for RecaptchaVerifier {
    async fn verify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<Verdict, VerificationError> {
        let payload = RecaptchaVerifyPayload {
            secret: &self.secret,
            response: token,
            remoteip: remote_ip,
        };
        let response = self
            .client
            .post(&self.verify_url)
            .header(ACCEPT, "application/json")
            .form(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(VerificationError::Transport)?;
        let verdict: Verdict = response
            .json()
            .await
            .map_err(VerificationError::InvalidResponse)?;
        if verdict.success {
            info!(hostname = ?verdict.hostname, "Successfully validated reCAPTCHA");
        } else {
            warn!(error_codes = ?verdict.error_codes, "reCAPTCHA rejected the token");
        }
        Ok(verdict)
    }
}

#[derive(Debug)]
pub enum VerificationError {
    Client(reqwest::Error),
    Transport(reqwest::Error),
    InvalidResponse(reqwest::Error),
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationError::Client(error) => write!(f, "Unable to build HTTP client: {error}"),
            VerificationError::Transport(error) => {
                write!(f, "Error contacting reCAPTCHA: {error}")
            }
            VerificationError::InvalidResponse(error) => {
                write!(f, "Invalid response from reCAPTCHA: {error}")
            }
        }
    }
}

impl std::error::Error for VerificationError {}

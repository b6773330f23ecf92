use anyhow::{anyhow, Context};
use std::time::Duration;

const SMTP_URL: &str = "smtps://email-smtp.us-east-1.amazonaws.com";
const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Process-wide settings, read once from the environment when the Lambda starts.
#[derive(Debug, Clone)]
pub struct Config {
    /// Site domain. Used for CORS and to derive the sender, bounce and fallback addresses.
    pub domain: String,
    /// Mailbox which receives the contact form messages.
    pub receiver: String,
    pub sender: String,
    pub recaptcha_secret: String,
    pub smtp_url: String,
    pub recaptcha_verify_url: String,
    /// Upper bound on each call to an external service.
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| {
            var(key).ok_or_else(|| anyhow!("Missing environment variable {key}"))
        };

        let domain = required("DOMAIN")?;
        let request_timeout = match var("REQUEST_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(
                value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid REQUEST_TIMEOUT_SECS {value:?}"))?,
            ),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        Ok(Self {
            receiver: required("RECEIVER")?,
            sender: var("SENDER").unwrap_or_else(|| format!("webcontact@{domain}")),
            recaptcha_secret: required("RECAPTCHA_SECRET")?,
            smtp_url: var("SMTP_URL").unwrap_or_else(|| SMTP_URL.into()),
            recaptcha_verify_url: var("RECAPTCHA_VERIFY_URL")
                .unwrap_or_else(|| RECAPTCHA_VERIFY_URL.into()),
            request_timeout,
            domain,
        })
    }

    pub fn bounce_address(&self) -> String {
        format!("bounces@{}", self.domain)
    }

    pub fn fallback_address(&self) -> String {
        format!("hello@{}", self.domain)
    }

    /// Whether a browser at `origin` may read our responses.
    pub fn permits_origin(&self, origin: &str) -> bool {
        origin.contains("localhost") || origin.contains(self.domain.as_str())
    }
}

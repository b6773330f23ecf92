pub mod config;
pub mod error;
pub mod handler;
pub mod mailer;
pub mod recaptcha;
pub mod secrets;
pub mod submission;

/// Selects ring as the TLS backend for every rustls user in the process. Both the HTTP client
/// and the SMTP transport link rustls, and it refuses to pick a provider on its own when more
/// than one is compiled in.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

use crate::{config::Config, secrets::SecretRepository};
use async_once_cell::OnceCell;
use async_trait::async_trait;
use lettre::{
    address::{AddressError, Envelope},
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

pub const SMTP_CREDENTIALS_NAME: &str = "smtp-ses-credentials";

/// Delivers one contact form message to the site owner.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, mail: &OutgoingMail<'_>) -> Result<(), MailError>;
}

/// The parts of a message which come from the visitor. Sender and receiver are fixed by the
/// dispatcher's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail<'a> {
    pub reply_to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

pub struct SmtpMailDispatcher<SecretRepositoryT: SecretRepository> {
    smtp_url: String,
    timeout: Duration,
    from: Mailbox,
    to: Mailbox,
    /// Envelope sender, so that delivery failures do not go to the visitor.
    bounce_to: Address,
    secrets_repository: SecretRepositoryT,
    mailer: OnceCell<AsyncSmtpTransport<Tokio1Executor>>,
}

#[derive(Deserialize)]
struct SmtpCredentials {
    #[serde(rename = "SMTP_USERNAME")]
    username: String,
    #[serde(rename = "SMTP_PASSWORD")]
    password: String,
}

impl<SecretRepositoryT: SecretRepository> SmtpMailDispatcher<SecretRepositoryT> {
    /// Fails if the configured sender, receiver or bounce address is not a valid mailbox.
    pub fn new(config: &Config, secrets_repository: SecretRepositoryT) -> Result<Self, MailError> {
        let bounce_address = config.bounce_address();
        let bounce_to: Address = bounce_address
            .parse()
            .map_err(|error| MailError::InvalidAddress(bounce_address, error))?;
        Ok(Self {
            smtp_url: config.smtp_url.clone(),
            timeout: config.request_timeout,
            from: parse_mailbox(&config.sender)?,
            to: parse_mailbox(&config.receiver)?,
            bounce_to,
            secrets_repository,
            mailer: Default::default(),
        })
    }

    async fn initialise_mailer(
        &self,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, lambda_http::Error> {
        info!("initialise_mailer: Connecting to {}", self.smtp_url);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.smtp_url)?
            .authentication(vec![Mechanism::Plain])
            .timeout(Some(self.timeout));

        // Credentials are only sent over TLS. A misconfigured plaintext URL then gets rejected by
        // SES instead of leaking them.
        if self.smtp_url.starts_with("smtps://") {
            let credentials: SmtpCredentials = self
                .secrets_repository
                .get_secret(SMTP_CREDENTIALS_NAME)
                .await?;
            builder = builder.credentials(Credentials::new(
                credentials.username,
                credentials.password,
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl<SecretRepositoryT: SecretRepository> MailDispatcher
    for SmtpMailDispatcher<SecretRepositoryT>
{
    async fn send(&self, mail: &OutgoingMail<'_>) -> Result<(), MailError> {
        let envelope = Envelope::new(Some(self.bounce_to.clone()), vec![self.to.email.clone()])
            .map_err(MailError::Build)?;
        let message = Message::builder()
            .from(self.from.clone())
            .reply_to(parse_mailbox(mail.reply_to)?)
            .to(self.to.clone())
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.to_string())
            .map_err(MailError::Build)?;

        // The transport's own timeout only covers connecting, so every SMTP exchange is bounded
        // here as well.
        let mailer = timeout(
            self.timeout,
            self.mailer.get_or_try_init(self.initialise_mailer()),
        )
        .await
        .map_err(|_| MailError::Timeout(self.timeout))?
        .map_err(|error| MailError::Transport(error.to_string()))?;
        timeout(
            self.timeout,
            mailer.send_raw(&envelope, &message.formatted()),
        )
        .await
        .map_err(|_| MailError::Timeout(self.timeout))?
        .map_err(MailError::Send)?;
        info!(
            reply_to = mail.reply_to,
            subject = mail.subject,
            "Sent contact form email"
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|error| MailError::InvalidAddress(address.into(), error))
}

#[derive(Debug)]
pub enum MailError {
    InvalidAddress(String, AddressError),
    Build(lettre::error::Error),
    Transport(String),
    Send(lettre::transport::smtp::Error),
    Timeout(Duration),
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::InvalidAddress(address, error) => {
                write!(f, "Invalid email address {address}: {error}")
            }
            MailError::Build(error) => write!(f, "Error building message: {error}"),
            MailError::Transport(description) => {
                write!(f, "Unable to set up SMTP transport: {description}")
            }
            MailError::Send(error) => write!(f, "Error sending message: {error}"),
            MailError::Timeout(limit) => {
                write!(f, "SMTP server did not respond within {limit:?}")
            }
        }
    }
}

impl std::error::Error for MailError {}

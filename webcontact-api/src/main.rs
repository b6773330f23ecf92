use lambda_http::{run, service_fn, Error};
use webcontact_api::{
    config::Config, handler::ContactFormHandler, install_crypto_provider,
    mailer::SmtpMailDispatcher, recaptcha::RecaptchaVerifier,
    secrets::{AwsSecretsManagerSecretRepository, SecretRepository},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    install_crypto_provider();

    let config = Config::from_env()?;
    let verifier = RecaptchaVerifier::new(&config)?;
    let mailer = SmtpMailDispatcher::new(&config, AwsSecretsManagerSecretRepository::open().await)?;
    let handler = ContactFormHandler::new(config, verifier, mailer);
    run(service_fn(|event| handler.handle(event))).await
}

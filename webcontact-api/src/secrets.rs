use crate::error::EnvironmentError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use serde::de::DeserializeOwned;

#[async_trait]
pub trait SecretRepository: Send + Sync {
    async fn open() -> Self;

    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error>;
}

/// Reads secrets from AWS Secrets Manager in the region the Lambda runs in.
pub struct AwsSecretsManagerSecretRepository(aws_sdk_secretsmanager::Client);

#[async_trait]
impl SecretRepository for AwsSecretsManagerSecretRepository {
    async fn open() -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self(aws_sdk_secretsmanager::Client::new(&config))
    }

    async fn get_secret<T: DeserializeOwned>(
        &self,
        name: &'static str,
    ) -> Result<T, lambda_http::Error> {
        let secret = self.0.get_secret_value().secret_id(name).send().await?;
        let Some(secret_value) = secret.secret_string() else {
            return Err(Box::new(EnvironmentError::MissingSecret(name)));
        };
        Ok(serde_json::from_str(secret_value)?)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::SecretRepository;
    use crate::mailer::SMTP_CREDENTIALS_NAME;
    use async_trait::async_trait;
    use aws_sdk_secretsmanager::types::error::ResourceNotFoundException;
    use serde::de::DeserializeOwned;
    use std::{collections::HashMap, sync::Mutex};

    pub const FAKE_SMTP_USERNAME: &str = "fake SMTP username";
    pub const FAKE_SMTP_PASSWORD: &str = "fake SMTP password";

    pub struct FakeSecretRepository {
        secrets: Mutex<HashMap<&'static str, String>>,
        lookups: Mutex<Vec<&'static str>>,
    }

    impl FakeSecretRepository {
        pub fn remove_secret(&self, name: &'static str) {
            self.secrets.lock().unwrap().remove(name);
        }

        pub fn lookups(&self) -> Vec<&'static str> {
            self.lookups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SecretRepository for FakeSecretRepository {
        async fn open() -> Self {
            Self {
                secrets: Mutex::new(HashMap::from([(
                    SMTP_CREDENTIALS_NAME,
                    format!(
                        r#"{{
                            "SMTP_USERNAME": "{FAKE_SMTP_USERNAME}",
                            "SMTP_PASSWORD": "{FAKE_SMTP_PASSWORD}"
                        }}"#
                    ),
                )])),
                lookups: Default::default(),
            }
        }

        async fn get_secret<T: DeserializeOwned>(
            &self,
            name: &'static str,
        ) -> std::result::Result<T, lambda_http::Error> {
            self.lookups.lock().unwrap().push(name);
            let string_value = self.secrets.lock().unwrap().get(name).cloned().ok_or(
                Box::new(aws_sdk_secretsmanager::Error::ResourceNotFoundException(
                    ResourceNotFoundException::builder()
                        .message(format!("No such secret {name}"))
                        .build(),
                )),
            )?;
            Ok(serde_json::from_str(&string_value)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AwsSecretsManagerSecretRepository, SecretRepository};
    use googletest::prelude::*;
    use serde::Deserialize;
    use serial_test::serial;
    use test_support::fake_secrets_manager::FakeSecretsManager;

    #[derive(Deserialize, Debug)]
    struct ArbitrarySecret {
        value: String,
    }

    async fn repository_for(fake: FakeSecretsManager) -> AwsSecretsManagerSecretRepository {
        crate::install_crypto_provider();
        let endpoint = fake.start().await;
        // The SDK's default loader picks up the endpoint override and static credentials.
        std::env::set_var("AWS_ENDPOINT_URL", endpoint);
        std::env::set_var("AWS_REGION", "us-east-1");
        std::env::set_var("AWS_ACCESS_KEY_ID", "arbitrary key id");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "arbitrary secret key");
        AwsSecretsManagerSecretRepository::open().await
    }

    #[tokio::test]
    #[serial]
    async fn reads_secret_from_endpoint_configured_in_environment() -> Result<()> {
        let subject = repository_for(
            FakeSecretsManager::new().with_secret("arbitrary-secret", r#"{"value": "hunter2"}"#),
        )
        .await;

        let secret = subject
            .get_secret::<ArbitrarySecret>("arbitrary-secret")
            .await;

        verify_that!(
            secret,
            ok(matches_pattern!(ArbitrarySecret {
                value: eq("hunter2")
            }))
        )
    }

    #[tokio::test]
    #[serial]
    async fn fails_for_unknown_secret() -> Result<()> {
        let subject = repository_for(FakeSecretsManager::new()).await;

        let secret = subject
            .get_secret::<ArbitrarySecret>("arbitrary-secret")
            .await;

        verify_that!(secret, err(anything()))
    }
}

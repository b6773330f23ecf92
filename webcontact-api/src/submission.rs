use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::OnceLock};

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@.\s]+\.[^@\s]+$";

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// The contact form as posted by the browser. Every field is optional on the wire so that
/// validation can report all of the missing ones at once.
#[derive(Deserialize, Debug, Default)]
pub struct ContactFormSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "g-recaptcha-response")]
    pub recaptcha_token: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    pub message: Cow<'static, str>,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            field: Some(field),
            message: message.into(),
        }
    }

    pub fn without_field(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

pub struct ValidatedSubmission<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub subject: &'a str,
    pub message: &'a str,
    pub recaptcha_token: &'a str,
}

impl ContactFormSubmission {
    /// Checks every field and collects one error per failing rule, in field order.
    pub fn validate(&self) -> Result<ValidatedSubmission, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let name = non_empty(&self.name);
        if name.is_none() {
            errors.push(ValidationError::new("name", "Name cannot be empty"));
        }
        let email = non_empty(&self.email);
        match email {
            None => errors.push(ValidationError::new("email", "Email cannot be empty")),
            Some(email) if !is_well_formed_email(email) => {
                errors.push(ValidationError::new("email", "Email address is invalid"))
            }
            Some(_) => {}
        }
        let subject = non_empty(&self.subject);
        if subject.is_none() {
            errors.push(ValidationError::new("subject", "Subject cannot be empty"));
        }
        let message = non_empty(&self.message);
        if message.is_none() {
            errors.push(ValidationError::new("message", "Message cannot be empty"));
        }
        let recaptcha_token = non_empty(&self.recaptcha_token);
        if recaptcha_token.is_none() {
            errors.push(ValidationError::new(
                "recaptcha",
                "You must complete the recaptcha challenge",
            ));
        }

        match (name, email, subject, message, recaptcha_token) {
            (Some(name), Some(email), Some(subject), Some(message), Some(recaptcha_token))
                if errors.is_empty() =>
            {
                Ok(ValidatedSubmission {
                    name,
                    email,
                    subject,
                    message,
                    recaptcha_token,
                })
            }
            _ => Err(errors),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn is_well_formed_email(email: &str) -> bool {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN).unwrap())
        .is_match(email)
}

#[cfg(test)]
mod tests {
    use super::{ContactFormSubmission, ValidationError};
    use googletest::prelude::*;

    fn complete() -> ContactFormSubmission {
        ContactFormSubmission {
            name: Some("Arbitrary sender".into()),
            email: Some("user@example.com".into()),
            subject: Some("Test".into()),
            message: Some("Test message".into()),
            recaptcha_token: Some("arbitrary token".into()),
        }
    }

    fn errors_of(submission: &ContactFormSubmission) -> Vec<ValidationError> {
        submission.validate().err().unwrap_or_default()
    }

    fn fields_of(submission: &ContactFormSubmission) -> Vec<&'static str> {
        errors_of(submission)
            .into_iter()
            .filter_map(|error| error.field)
            .collect()
    }

    #[test]
    fn accepts_complete_submission() -> Result<()> {
        verify_that!(fields_of(&complete()), empty())
    }

    #[test]
    fn returns_borrowed_fields_when_valid() -> Result<()> {
        let submission = complete();

        let validated = submission.validate().ok().unwrap();

        verify_that!(
            (validated.email, validated.recaptcha_token),
            eq(("user@example.com", "arbitrary token"))
        )
    }

    #[test]
    fn reports_missing_name() -> Result<()> {
        let submission = ContactFormSubmission {
            name: None,
            ..complete()
        };

        verify_that!(
            errors_of(&submission),
            elements_are![eq(ValidationError::new("name", "Name cannot be empty"))]
        )
    }

    #[test]
    fn treats_empty_string_as_missing() -> Result<()> {
        let submission = ContactFormSubmission {
            subject: Some("".into()),
            ..complete()
        };

        verify_that!(
            errors_of(&submission),
            elements_are![eq(ValidationError::new(
                "subject",
                "Subject cannot be empty"
            ))]
        )
    }

    #[test]
    fn reports_missing_email_once() -> Result<()> {
        let submission = ContactFormSubmission {
            email: None,
            ..complete()
        };

        verify_that!(
            errors_of(&submission),
            elements_are![eq(ValidationError::new("email", "Email cannot be empty"))]
        )
    }

    #[test]
    fn reports_missing_message() -> Result<()> {
        let submission = ContactFormSubmission {
            message: None,
            ..complete()
        };

        verify_that!(fields_of(&submission), elements_are![eq("message")])
    }

    #[test]
    fn labels_missing_token_as_recaptcha() -> Result<()> {
        let submission = ContactFormSubmission {
            recaptcha_token: Some("".into()),
            ..complete()
        };

        verify_that!(
            errors_of(&submission),
            elements_are![eq(ValidationError::new(
                "recaptcha",
                "You must complete the recaptcha challenge"
            ))]
        )
    }

    #[googletest::test]
    fn rejects_malformed_email_addresses() {
        for email in ["no-at-sign", "a@b", "@b.c", "a@b.", "a b@c.d", "a@b@c.d", "a@.b"] {
            let submission = ContactFormSubmission {
                email: Some(email.into()),
                ..complete()
            };

            expect_that!(
                errors_of(&submission),
                elements_are![eq(ValidationError::new(
                    "email",
                    "Email address is invalid"
                ))]
            );
        }
    }

    #[googletest::test]
    fn accepts_well_formed_email_addresses() {
        for email in ["user@example.com", "first.last+tag@mail.example.co.uk", "a@b.c"] {
            let submission = ContactFormSubmission {
                email: Some(email.into()),
                ..complete()
            };

            expect_that!(fields_of(&submission), empty());
        }
    }

    #[test]
    fn does_not_stop_at_first_error() -> Result<()> {
        let submission = ContactFormSubmission {
            name: None,
            message: None,
            ..complete()
        };

        verify_that!(
            fields_of(&submission),
            elements_are![eq("name"), eq("message")]
        )
    }

    #[test]
    fn reports_every_field_of_empty_submission_in_order() -> Result<()> {
        verify_that!(
            fields_of(&ContactFormSubmission::default()),
            elements_are![
                eq("name"),
                eq("email"),
                eq("subject"),
                eq("message"),
                eq("recaptcha")
            ]
        )
    }

    #[test]
    fn deserializes_recaptcha_token_from_form_key() -> Result<()> {
        let submission: ContactFormSubmission =
            serde_json::from_str(r#"{"g-recaptcha-response": "token"}"#).unwrap();

        verify_that!(submission.recaptcha_token, some(eq("token")))
    }
}

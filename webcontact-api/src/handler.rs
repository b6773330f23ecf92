use crate::{
    config::Config,
    error::{json_response, ContactFormError, ResponseBody},
    mailer::{MailDispatcher, OutgoingMail},
    recaptcha::ChallengeVerifier,
    submission::{ContactFormSubmission, ValidatedSubmission},
};
use lambda_http::{
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN, VARY},
        HeaderMap, HeaderValue, StatusCode,
    },
    request::RequestContext,
    Body, Error, Request, RequestExt, Response,
};
use tracing::info;

pub struct ContactFormHandler<VerifierT: ChallengeVerifier, MailerT: MailDispatcher> {
    config: Config,
    verifier: VerifierT,
    mailer: MailerT,
}

impl<VerifierT: ChallengeVerifier, MailerT: MailDispatcher> ContactFormHandler<VerifierT, MailerT> {
    pub fn new(config: Config, verifier: VerifierT, mailer: MailerT) -> Self {
        Self {
            config,
            verifier,
            mailer,
        }
    }

    /// Turns one API Gateway event into a JSON response. Every failure of the submission is
    /// reported to the browser as a structured error, so `Err` only means the response body could
    /// not be serialised.
    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let headers = self.response_headers(&event);
        let response = match self.process_submission(&event).await {
            Ok(()) => json_response(
                StatusCode::OK,
                headers,
                &ResponseBody {
                    success: true,
                    errors: None,
                },
            )?,
            Err(error) => {
                error.log();
                error.into_response(headers)?
            }
        };
        Ok(response)
    }

    async fn process_submission(&self, event: &Request) -> Result<(), ContactFormError> {
        let submission: ContactFormSubmission = serde_json::from_slice(event.body().as_ref())
            .map_err(ContactFormError::MalformedBody)?;
        info!(
            name = ?submission.name,
            email = ?submission.email,
            subject = ?submission.subject,
            "Received contact form submission"
        );
        let validated = submission
            .validate()
            .map_err(ContactFormError::InvalidSubmission)?;
        self.verify_challenge(&validated, source_ip(event).as_deref())
            .await?;
        self.send_email(&validated).await
    }

    async fn verify_challenge(
        &self,
        submission: &ValidatedSubmission<'_>,
        remote_ip: Option<&str>,
    ) -> Result<(), ContactFormError> {
        match self
            .verifier
            .verify(submission.recaptcha_token, remote_ip)
            .await
        {
            Ok(verdict) if verdict.success => Ok(()),
            Ok(verdict) => Err(ContactFormError::ChallengeFailed(format!(
                "Token rejected with error codes {:?}",
                verdict.error_codes
            ))),
            Err(error) => Err(ContactFormError::ChallengeFailed(error.to_string())),
        }
    }

    async fn send_email(
        &self,
        submission: &ValidatedSubmission<'_>,
    ) -> Result<(), ContactFormError> {
        let mail = OutgoingMail {
            reply_to: submission.email,
            subject: submission.subject,
            body: submission.message,
        };
        self.mailer
            .send(&mail)
            .await
            .map_err(|error| ContactFormError::DispatchFailed {
                description: error.to_string(),
                fallback_address: self.config.fallback_address(),
            })
    }

    fn response_headers(&self, event: &Request) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match event.headers().get(ORIGIN) {
            Some(origin)
                if origin
                    .to_str()
                    .is_ok_and(|origin| self.config.permits_origin(origin)) =>
            {
                info!("Permitting CORS request for {origin:?}");
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                // Caches must not serve this response to other origins.
                headers.insert(VARY, HeaderValue::from_static("Origin"));
            }
            origin => {
                info!("Not attaching CORS authorization headers for origin: {origin:?}");
            }
        }
        headers
    }
}

/// Address of the browser, as seen by API Gateway.
fn source_ip(event: &Request) -> Option<String> {
    let from_context = match event.request_context_ref() {
        Some(RequestContext::ApiGatewayV1(context)) => context.identity.source_ip.clone(),
        Some(RequestContext::ApiGatewayV2(context)) => context.http.source_ip.clone(),
        _ => None,
    };
    from_context.or_else(|| {
        event
            .headers()
            .get("X-Forwarded-For")?
            .to_str()
            .ok()?
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
    })
}

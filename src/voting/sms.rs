use std::{ops::Deref, sync::Arc, time::Duration};

use rocket::serde::json::Value;
use serde::Serialize;
use thiserror::Error;

use crate::model::api::sms::Sms;

/// Something that can deliver a text message to a phone.
#[rocket::async_trait]
pub trait SmsGateway: Send + Sync {
    /// Deliver `message` to `recipient`. There are no retries: a failure is
    /// reported straight back to the caller.
    async fn send(&self, recipient: &Sms, message: &str) -> Result<(), SendError>;
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("SMS gateway credentials are not configured")]
    MissingCredentials,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("SMS gateway reported status {0}")]
    Rejected(String),
}

/// A shareable handle on whichever [`SmsGateway`] the server was built with.
#[derive(Clone)]
pub struct Notifier(Arc<dyn SmsGateway>);

impl Notifier {
    pub fn new(gateway: impl SmsGateway + 'static) -> Self {
        Self(Arc::new(gateway))
    }
}

impl Deref for Notifier {
    type Target = dyn SmsGateway;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// Credentials and addressing for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub endpoint: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub sender: String,
    pub timeout: Duration,
}

/// Sends messages through a bulk-SMS provider's JSON-over-HTTPS API.
pub struct HttpGateway {
    client: reqwest::Client,
    settings: GatewaySettings,
}

impl HttpGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }
}

/// The body the provider expects.
#[derive(Serialize)]
struct GatewayRequest<'a> {
    email: &'a str,
    password: &'a str,
    message: &'a str,
    sender_name: &'a str,
    recipients: String,
    forcednd: u8,
}

/// Did the provider's response report success?
/// The provider signals success with a `status` of `"1"`, sometimes as a number.
fn accepted(response: &Value) -> Result<(), SendError> {
    match response.get("status") {
        Some(Value::String(s)) if s == "1" => Ok(()),
        Some(Value::Number(n)) if n.as_u64() == Some(1) => Ok(()),
        Some(other) => Err(SendError::Rejected(other.to_string())),
        None => Err(SendError::Rejected("<missing>".to_string())),
    }
}

#[rocket::async_trait]
impl SmsGateway for HttpGateway {
    async fn send(&self, recipient: &Sms, message: &str) -> Result<(), SendError> {
        let (email, password) = match (&self.settings.email, &self.settings.password) {
            (Some(email), Some(password)) => (email, password),
            _ => return Err(SendError::MissingCredentials),
        };
        let body = GatewayRequest {
            email,
            password,
            message,
            sender_name: &self.settings.sender,
            recipients: recipient.to_string(),
            forcednd: 1,
        };
        let response: Value = self
            .client
            .post(&self.settings.endpoint)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        accepted(&response)
    }
}

#[cfg(test)]
pub use recording::{RecordingGateway, TestGateway};

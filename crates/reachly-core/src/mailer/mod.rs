//! Outbound mail transport
//!
//! The send path delivers instrumented email through an SMTP relay. The
//! transport sits behind a trait so the send handler is testable with a
//! recording stub. Every outbound message carries the tracking token
//! out-of-band in an `X-Tracking-ID` header, which providers echo back in
//! their webhook payloads for correlation.

use async_trait::async_trait;
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use reachly_common::config::SmtpConfig;
use reachly_common::{Error, Result};
use tracing::info;

/// An email ready for delivery
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    /// Tracking token carried in the X-Tracking-ID header
    pub tracking_id: String,
}

/// Mail transport seam
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver an outbound email
    async fn deliver(&self, email: &OutboundEmail) -> Result<()>;
}

/// X-Tracking-ID header carrying the tracking token out-of-band
#[derive(Debug, Clone)]
struct TrackingIdHeader(String);

impl Header for TrackingIdHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Tracking-ID")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Build the wire message for an outbound email
fn build_message(email: &OutboundEmail) -> Result<lettre::Message> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid sender address: {}", e)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| Error::Validation(format!("Invalid recipient address: {}", e)))?;

    let builder = lettre::Message::builder()
        .from(from)
        .to(to)
        .subject(&email.subject)
        .header(TrackingIdHeader(email.tracking_id.clone()));

    let message = match &email.text {
        Some(text) => builder.multipart(MultiPart::alternative_plain_html(
            text.clone(),
            email.html.clone(),
        )),
        None => builder.singlepart(SinglePart::html(email.html.clone())),
    }
    .map_err(|e| Error::Mail(format!("Failed to build message: {}", e)))?;

    Ok(message)
}

/// SMTP relay transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a mailer for the configured relay
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| Error::Mail(format!("Invalid SMTP relay: {}", e)))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, email: &OutboundEmail) -> Result<()> {
        let message = build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| Error::Mail(format!("SMTP delivery failed: {}", e)))?;

        info!(to = %email.to, tracking_id = %email.tracking_id, "Delivered outbound email");
        Ok(())
    }
}

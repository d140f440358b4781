use std::time::Duration;

use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::templates::TemplateCatalog;
use super::{NotificationChannel, NotificationError, TicketNotice};

fn http_client(timeout: Duration) -> Result<reqwest::Client, NotificationError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|error| NotificationError::Client(error.to_string()))
}

/// Sends the request on the ambient tokio runtime and returns without waiting.
fn spawn_post(
    channel: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<(), NotificationError> {
    let handle = Handle::try_current().map_err(|_| NotificationError::NoRuntime)?;
    handle.spawn(async move {
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(channel, status = %response.status(), "notification delivered");
            }
            Ok(response) => {
                let error = NotificationError::Rejected(response.status().as_u16());
                warn!(channel, %error, "notification not accepted");
            }
            Err(error) => {
                warn!(channel, %error, "notification request failed");
            }
        }
    });
    Ok(())
}

/// Chat-style webhook receiving `{"text": "..."}`.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
        })
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn deliver(
        &self,
        notice: &TicketNotice,
        catalog: &TemplateCatalog,
    ) -> Result<(), NotificationError> {
        let Some(text) = catalog.webhook_text(notice) else {
            return Ok(());
        };
        spawn_post(
            self.name(),
            self.client.post(&self.url).json(&json!({ "text": text })),
        )
    }
}

/// E-mail delivered through an HTTP mail relay accepting `{from, to, subject, text}`.
#[derive(Debug, Clone)]
pub struct MailRelayChannel {
    client: reqwest::Client,
    url: String,
    from: String,
}

impl MailRelayChannel {
    pub fn new(
        url: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
            from: from.into(),
        })
    }
}

impl NotificationChannel for MailRelayChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn deliver(
        &self,
        notice: &TicketNotice,
        catalog: &TemplateCatalog,
    ) -> Result<(), NotificationError> {
        let Some(recipient) = notice.recipient.as_deref() else {
            debug!(ticket = %notice.ticket_number, "submitter has no e-mail address");
            return Ok(());
        };
        let Some(email) = catalog.email(notice) else {
            return Ok(());
        };

        let payload = json!({
            "from": self.from,
            "to": recipient,
            "subject": email.subject,
            "text": email.message,
        });
        spawn_post(self.name(), self.client.post(&self.url).json(&payload))
    }
}

/// Writes the webhook rendering to the log; used when no endpoints are configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(
        &self,
        notice: &TicketNotice,
        catalog: &TemplateCatalog,
    ) -> Result<(), NotificationError> {
        if let Some(text) = catalog.webhook_text(notice) {
            info!(event = %notice.event, ticket = %notice.ticket_number, "{text}");
        }
        Ok(())
    }
}

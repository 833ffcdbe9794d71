// lib/src/notifications.rs
// Notification collaborator contract plus the provider payload dispatch.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::context::RequestContext;
use models::errors::{BatchOutcome, PlannerResult};
use models::{MotherId, UserId, Visit};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// Worth retrying: provider timeout, rate limit, 5xx.
    #[error("transient send failure: {0}")]
    Transient(String),
    /// Dropped: unknown device, invalid number, rejected payload.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl NotificationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotificationError::Transient(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        PushMessage {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushProvider {
    Expo,
    Firebase,
}

impl PushProvider {
    /// Provider-specific request body for one device.
    pub fn payload(&self, device_token: &str, message: &PushMessage) -> Value {
        match self {
            PushProvider::Expo => json!({
                "to": device_token,
                "title": message.title,
                "body": message.body,
                "data": message.data,
                "sound": "default",
            }),
            PushProvider::Firebase => json!({
                "message": {
                    "token": device_token,
                    "notification": { "title": message.title, "body": message.body },
                    "data": message.data,
                }
            }),
        }
    }
}

/// Human wording for a reminder `days_until` days ahead.
pub fn reminder_text(days_until: i64) -> String {
    match days_until {
        d if d <= 0 => "Reminder: you have a clinic visit today".to_string(),
        1 => "Reminder: you have a clinic visit tomorrow".to_string(),
        d => format!("Reminder: you have a clinic visit in {} days", d),
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_visit_reminder(
        &self,
        visit: &Visit,
        mother_id: &MotherId,
        days_until: i64,
    ) -> Result<(), NotificationError>;
    async fn send_push(&self, user_id: &UserId, message: &PushMessage) -> Result<(), NotificationError>;
    async fn send_sms(&self, phone: &str, text: &str) -> Result<(), NotificationError>;
}

/// Delivers by writing the rendered payload to the log.
#[derive(Debug, Clone, Copy)]
pub struct LoggingNotifier {
    provider: PushProvider,
}

impl LoggingNotifier {
    pub fn new(provider: PushProvider) -> Self {
        LoggingNotifier { provider }
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_visit_reminder(
        &self,
        visit: &Visit,
        mother_id: &MotherId,
        days_until: i64,
    ) -> Result<(), NotificationError> {
        let message = PushMessage::new("Visit reminder", reminder_text(days_until))
            .with_data("visit_id", visit.id.to_string())
            .with_data("scheduled_time", visit.scheduled_time.to_rfc3339());
        let payload = self.provider.payload(&mother_id.to_string(), &message);
        info!(visit_id = %visit.id, %mother_id, days_until, "reminder: {}", payload);
        Ok(())
    }

    async fn send_push(&self, user_id: &UserId, message: &PushMessage) -> Result<(), NotificationError> {
        let payload = self.provider.payload(&user_id.to_string(), message);
        info!(%user_id, "push: {}", payload);
        Ok(())
    }

    async fn send_sms(&self, phone: &str, text: &str) -> Result<(), NotificationError> {
        if phone.trim().is_empty() {
            return Err(NotificationError::Permanent("empty phone number".to_string()));
        }
        info!(phone, "sms: {}", text);
        Ok(())
    }
}

/// Sends in flight at once during a broadcast.
const PUSH_CONCURRENCY: usize = 8;

/// Pushes `message` to every user. Fails with `PartialFailure` carrying the
/// per-recipient reasons when any send fails.
pub async fn broadcast_push(
    ctx: &RequestContext,
    notifier: &dyn Notifier,
    users: &[UserId],
    message: &PushMessage,
) -> PlannerResult<BatchOutcome> {
    let results = ctx
        .run(async {
            Ok(stream::iter(users)
                .map(|user_id| async move { (user_id, notifier.send_push(user_id, message).await) })
                .buffered(PUSH_CONCURRENCY)
                .collect::<Vec<_>>()
                .await)
        })
        .await?;

    let mut outcome = BatchOutcome::new();
    for (user_id, result) in results {
        match result {
            Ok(()) => outcome.record_success(),
            Err(e) => {
                warn!("Push to {} failed: {}", user_id, e);
                outcome.record_failure(user_id, e.to_string());
            }
        }
    }
    outcome.into_result()
}

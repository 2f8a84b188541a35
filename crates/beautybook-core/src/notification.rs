//! C11 Notification Dispatcher: template rendering, push-token fan-out, and
//! bounded retry with exponential backoff.
//!
//! Delivery is asynchronous with respect to the originating request: a
//! handler calls `enqueue` inside its transaction, and a background worker
//! (`beautybook-service`'s sweeper) later calls `drain` against the real
//! `PushSender` adapter after commit.

use crate::types::{PushPlatform, PushToken};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Classification the adapter maps its transport-level failure onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    InvalidToken,
    RateLimited,
    Timeout,
    ServerError,
    Permanent,
}

impl DeliveryError {
    fn is_retry_eligible(self) -> bool {
        matches!(self, DeliveryError::RateLimited | DeliveryError::Timeout | DeliveryError::ServerError)
    }
}

/// Port the push adapter implements.
pub trait PushSender: Send + Sync {
    fn send(&self, token: &str, platform: PushPlatform, title: &str, body: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct QueuedNotification {
    pub user_id: String,
    pub template_id: String,
    pub correlation_id: String,
    pub title: String,
    pub body: String,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

pub struct NotificationDispatcher {
    tokens_by_user: HashMap<String, Vec<PushToken>>,
    queue: Vec<QueuedNotification>,
    seen_idempotency_keys: HashSet<(String, String, String)>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            tokens_by_user: HashMap::new(),
            queue: Vec::new(),
            seen_idempotency_keys: HashSet::new(),
        }
    }

    /// Created on login; superseded by a later token with the same
    /// `device_id` for the same user.
    pub fn register_token(&mut self, token: PushToken) {
        let tokens = self.tokens_by_user.entry(token.user_id.clone()).or_default();
        tokens.retain(|t| t.device_id != token.device_id);
        tokens.push(token);
    }

    /// Deactivated on logout.
    pub fn deactivate_token(&mut self, user_id: &str, device_id: &str) {
        if let Some(tokens) = self.tokens_by_user.get_mut(user_id) {
            for t in tokens.iter_mut().filter(|t| t.device_id == device_id) {
                t.active = false;
            }
        }
    }

    fn active_tokens_for(&self, user_id: &str) -> Vec<PushToken> {
        self.tokens_by_user
            .get(user_id)
            .map(|ts| ts.iter().filter(|t| t.active).cloned().collect())
            .unwrap_or_default()
    }

    /// `(audience, template, params)`. Korean-locale rendering is the
    /// caller's concern (template lookup); this takes the already-rendered
    /// title/body so the engine stays free of a templating dependency.
    /// Idempotency key is `(userId, templateId, correlationId)`.
    pub fn enqueue(
        &mut self,
        user_id: &str,
        template_id: &str,
        correlation_id: &str,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) {
        let key = (user_id.to_string(), template_id.to_string(), correlation_id.to_string());
        if self.seen_idempotency_keys.contains(&key) {
            return;
        }
        self.seen_idempotency_keys.insert(key);
        self.queue.push(QueuedNotification {
            user_id: user_id.to_string(),
            template_id: template_id.to_string(),
            correlation_id: correlation_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            attempts: 0,
            enqueued_at: now,
        });
    }

    pub fn pending(&self) -> &[QueuedNotification] {
        &self.queue
    }

    /// Drains the queue against `sender`, fanning each notification out to
    /// every active token for its audience. `invalid_token` deactivates the
    /// token; retry-eligible errors (`rate_limited`, `timeout`, `5xx`) are
    /// left in the queue up to `max_retries`; `permanent` errors are
    /// dropped. Ordering across a single user's devices is not guaranteed.
    pub fn drain(&mut self, sender: &dyn PushSender, max_retries: u32) {
        let mut still_pending = Vec::new();
        let pending = std::mem::take(&mut self.queue);
        for mut notification in pending {
            let tokens = self.active_tokens_for(&notification.user_id);
            let mut retry_needed = false;
            let mut tokens_to_deactivate = Vec::new();

            for token in &tokens {
                match sender.send(&token.token, token.platform, &notification.title, &notification.body) {
                    Ok(()) => {}
                    Err(DeliveryError::InvalidToken) => {
                        tokens_to_deactivate.push((token.user_id.clone(), token.device_id.clone()));
                    }
                    Err(e) if e.is_retry_eligible() => {
                        retry_needed = true;
                    }
                    Err(DeliveryError::Permanent) => {}
                    Err(_) => {}
                }
            }

            for (user_id, device_id) in tokens_to_deactivate {
                self.deactivate_token(&user_id, &device_id);
            }

            if retry_needed {
                notification.attempts += 1;
                if notification.attempts < max_retries {
                    still_pending.push(notification);
                }
            }
        }
        self.queue = still_pending;
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedSender {
        responses: RefCell<Vec<Result<(), DeliveryError>>>,
    }

    impl PushSender for ScriptedSender {
        fn send(&self, _token: &str, _platform: PushPlatform, _title: &str, _body: &str) -> Result<(), DeliveryError> {
            self.responses.borrow_mut().pop().unwrap_or(Ok(()))
        }
    }

    fn token(user_id: &str, device_id: &str) -> PushToken {
        PushToken {
            user_id: user_id.to_string(),
            token: format!("tok-{device_id}"),
            platform: PushPlatform::Ios,
            device_id: device_id.to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_idempotency_key_is_suppressed() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register_token(token("u1", "d1"));
        dispatcher.enqueue("u1", "referral_credit", "corr-1", "title", "body", Utc::now());
        dispatcher.enqueue("u1", "referral_credit", "corr-1", "title", "body", Utc::now());
        assert_eq!(dispatcher.pending().len(), 1);
    }

    #[test]
    fn invalid_token_is_deactivated() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register_token(token("u1", "d1"));
        dispatcher.enqueue("u1", "t", "c1", "title", "body", Utc::now());
        let sender = ScriptedSender {
            responses: RefCell::new(vec![Err(DeliveryError::InvalidToken)]),
        };
        dispatcher.drain(&sender, 5);
        assert!(dispatcher.active_tokens_for("u1").is_empty());
        assert!(dispatcher.pending().is_empty());
    }

    #[test]
    fn retry_eligible_error_is_bounded_by_max_retries() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register_token(token("u1", "d1"));
        dispatcher.enqueue("u1", "t", "c1", "title", "body", Utc::now());
        for _ in 0..3 {
            let sender = ScriptedSender {
                responses: RefCell::new(vec![Err(DeliveryError::Timeout)]),
            };
            dispatcher.drain(&sender, 3);
        }
        assert!(dispatcher.pending().is_empty());
    }

    #[test]
    fn device_superseded_token_replaces_prior() {
        let mut dispatcher = NotificationDispatcher::new();
        dispatcher.register_token(token("u1", "d1"));
        let mut newer = token("u1", "d1");
        newer.token = "tok-new".to_string();
        dispatcher.register_token(newer);
        assert_eq!(dispatcher.active_tokens_for("u1").len(), 1);
        assert_eq!(dispatcher.active_tokens_for("u1")[0].token, "tok-new");
    }
}

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

/// Best-effort outbound notification.
///
/// `send` reports delivery as a boolean; an unreachable recipient is a
/// normal outcome, never an error, and must not block the trading
/// pipeline.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, user_id: Uuid, payload: &str) -> bool;
}

/// Telegram Bot API notifier; users map to chat ids.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chats: HashMap<Uuid, i64>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chats: HashMap<Uuid, i64>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token,
            chats,
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn send(&self, user_id: Uuid, payload: &str) -> bool {
        let Some(chat_id) = self.chats.get(&user_id) else {
            tracing::debug!("No Telegram chat linked for user {}", user_id);
            return false;
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = json!({ "chat_id": chat_id, "text": payload });

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    "Telegram send for user {} failed with status {}",
                    user_id,
                    response.status()
                );
                false
            }
            Err(e) => {
                tracing::warn!("Telegram send for user {} failed: {}", user_id, e);
                false
            }
        }
    }
}

/// Fallback sink that only logs; always reports delivery.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, user_id: Uuid, payload: &str) -> bool {
        tracing::info!("Notification for user {}: {}", user_id, payload);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_always_delivers() {
        let sink = LogNotifier;
        let delivered = tokio_test::block_on(sink.send(Uuid::new_v4(), "2 trades executed"));
        assert!(delivered);
    }

    #[tokio::test]
    async fn test_telegram_unlinked_user_is_undelivered_not_error() {
        let sink = TelegramNotifier::new("token".to_string(), HashMap::new());
        assert!(!sink.send(Uuid::new_v4(), "hello").await);
    }
}

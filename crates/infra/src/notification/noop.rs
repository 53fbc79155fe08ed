//! Noop 通知送信実装
//!
//! 実際には送信せず、宛先と件名をログに出すだけ。
//! `NOTIFICATION_BACKEND` の既定値で、ローカルでの試運転に使う。

use async_trait::async_trait;
use ihundred_domain::{SendError, notification::EmailMessage};

use super::NotificationSender;

#[derive(Debug, Clone, Default)]
pub struct NoopNotificationSender;

#[async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), SendError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "Noop: メール送信をスキップ"
        );
        Ok(())
    }
}

//! # 配信エンジン
//!
//! 1 通のメールを再試行付きで送る。送信の失敗はエラーではなく
//! [`DeliveryOutcome::Failed`] として返す。
//!
//! 1 回の試行で送信を 1 回だけ呼ぶ。タイムアウト後の再試行で同じメールが
//! 2 通届くことはありうる（at-least-once）。

use std::sync::Arc;

use ihundred_domain::{
    delivery::DeliveryOutcome,
    notification::EmailMessage,
    retry::RetryPolicy,
};
use ihundred_infra::notification::NotificationSender;

use super::retry::run_with_retry;

/// 配信結果と再試行回数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub outcome:     DeliveryOutcome,
    pub retry_count: u32,
}

pub struct DeliveryEngine {
    sender: Arc<dyn NotificationSender>,
    policy: RetryPolicy,
}

impl DeliveryEngine {
    pub fn new(sender: Arc<dyn NotificationSender>, policy: RetryPolicy) -> Self {
        Self { sender, policy }
    }

    pub async fn send(&self, email: &EmailMessage) -> Delivery {
        let retried = run_with_retry(&self.policy, &email.to, |_| self.sender.send_email(email)).await;
        let retry_count = retried.retry_count();

        let outcome = match retried.result {
            Ok(()) => DeliveryOutcome::Sent,
            Err(e) => DeliveryOutcome::Failed {
                error: e.to_string(),
            },
        };

        Delivery {
            outcome,
            retry_count,
        }
    }
}

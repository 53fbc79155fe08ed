//! # 通知送信
//!
//! メール送信を [`NotificationSender`] で抽象化する。
//!
//! - SES（本番）
//! - SMTP（ローカル検証。Mailpit など）
//! - Noop（送信せずログ出力のみ）
//!
//! どれを使うかは `NOTIFICATION_BACKEND` で切り替える。
//!
//! 送信失敗は [`SendError`] の 2 種類に分類して返す。再試行するかどうかは
//! 呼び出し側（配信エンジン）のリトライポリシーが決める。

mod noop;
mod ses;
mod smtp;

use async_trait::async_trait;
use ihundred_domain::{SendError, notification::EmailMessage};
pub use noop::NoopNotificationSender;
pub use ses::SesNotificationSender;
pub use smtp::SmtpNotificationSender;

/// メール送信トレイト
///
/// 1 回の呼び出しでトランスポートへの送信を 1 回だけ行う。再試行はしない。
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), SendError>;
}

//! SMTP 通知送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用する。ローカルでは Mailpit に接続して
//! 送信内容を確認する。

use std::time::Duration;

use async_trait::async_trait;
use ihundred_domain::{SendError, notification::EmailMessage};
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType},
};

use super::NotificationSender;

/// SMTP 通知送信
pub struct SmtpNotificationSender {
    transport:    AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpNotificationSender {
    /// # 引数
    ///
    /// - `host`: SMTP サーバーのホスト名（例: "localhost"）
    /// - `port`: ポート番号（例: Mailpit は 1025）
    /// - `from_address`: 送信元（`"Name <addr>"` 形式も可）
    pub fn new(host: &str, port: u16, from_address: String) -> Self {
        // TLS なし。Mailpit などローカルの SMTP サーバー向け
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .timeout(Some(Duration::from_secs(30)))
            .build();

        Self {
            transport,
            from_address,
        }
    }

    fn build_message(&self, email: &EmailMessage) -> Result<Message, SendError> {
        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|e| SendError::Permanent(format!("送信元アドレス不正: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| SendError::Permanent(format!("宛先アドレス不正: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| SendError::Permanent(format!("メッセージ構築失敗: {e}")))
    }
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), SendError> {
        let message = self.build_message(email)?;

        self.transport.send(message).await.map_err(|e| {
            // 5xx 応答と、送信側の構築エラーは再送しても変わらない
            if e.is_permanent() || e.is_client() {
                SendError::Permanent(format!("SMTP 送信失敗: {e}"))
            } else {
                SendError::Transient(format!("SMTP 送信失敗: {e}"))
            }
        })?;

        Ok(())
    }
}

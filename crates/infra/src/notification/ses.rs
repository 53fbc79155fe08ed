//! SES 通知送信実装
//!
//! AWS SES v2 API を使用してメールを送信する。

use async_trait::async_trait;
use aws_sdk_sesv2::{
    Client,
    error::{DisplayErrorContext, SdkError},
    operation::send_email::SendEmailError,
    types::{Body, Content, Destination, EmailContent, Message},
};
use ihundred_domain::{SendError, notification::EmailMessage};

use super::NotificationSender;
use crate::error::is_retryable_status;

/// SES 通知送信
pub struct SesNotificationSender {
    client:       Client,
    from_address: String,
}

impl SesNotificationSender {
    /// `from_address` は SES で検証済みであること
    pub fn new(client: Client, from_address: String) -> Self {
        Self {
            client,
            from_address,
        }
    }

    fn content(data: &str, part: &str) -> Result<Content, SendError> {
        Content::builder()
            .data(data)
            .charset("UTF-8")
            .build()
            .map_err(|e| SendError::Permanent(format!("{part}の構築に失敗: {e}")))
    }
}

#[async_trait]
impl NotificationSender for SesNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), SendError> {
        let destination = Destination::builder().to_addresses(&email.to).build();

        let content = EmailContent::builder()
            .simple(
                Message::builder()
                    .subject(Self::content(&email.subject, "件名")?)
                    .body(
                        Body::builder()
                            .html(Self::content(&email.html_body, "HTML 本文")?)
                            .text(Self::content(&email.text_body, "テキスト本文")?)
                            .build(),
                    )
                    .build(),
            )
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(destination)
            .content(content)
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }
}

/// SES のエラーを一時的 / 恒久的に分類する
///
/// - タイムアウト、接続失敗、応答の破損 → 一時的
/// - スロットリング、送信上限、5xx → 一時的
/// - 宛先・内容の拒否、未検証の送信元、アカウント停止 → 恒久的
fn classify(error: SdkError<SendEmailError>) -> SendError {
    let message = format!("SES 送信失敗: {}", DisplayErrorContext(&error));

    let transient = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => {
            let service_error = context.err();
            service_error.is_too_many_requests_exception()
                || service_error.is_limit_exceeded_exception()
                || is_retryable_status(context.raw().status().as_u16())
        }
        _ => false,
    };

    if transient {
        SendError::Transient(message)
    } else {
        SendError::Permanent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SesNotificationSender>();
    }

    #[test]
    fn test_本文は組み立てられる() {
        let content = SesNotificationSender::content("本文", "テキスト本文").unwrap();

        assert_eq!(content.data(), "本文");
        assert_eq!(content.charset(), Some("UTF-8"));
    }
}

//! # 再試行の実行
//!
//! [`RetryPolicy`] に従って非同期の処理を繰り返す。
//! 一時的エラーだけを上限まで再試行し、恒久的エラーは 1 回で諦める。
//! 待機中はジョブ全体が止まる（1 回の実行の中で並行処理はしない）。

use std::future::Future;

use ihundred_domain::retry::{RetryPolicy, Transience};

/// 再試行の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T, E> {
    pub result:   Result<T, E>,
    /// 実際に呼び出した回数（1 以上）
    pub attempts: u32,
}

impl<T, E> Retried<T, E> {
    /// 初回を除いた試行回数
    pub fn retry_count(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// `operation` を再試行付きで実行する
///
/// `label` はログに出す処理名（宛先やデータベース名）。
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Retried<T, E>
where
    E: Transience + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Retried {
                    result:   Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if policy.should_retry(attempt, &e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    target_label = label,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "一時的なエラーのため再試行します"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(
                        target_label = label,
                        attempts = attempt,
                        error = %e,
                        "再試行の上限に達しました"
                    );
                } else {
                    tracing::error!(
                        target_label = label,
                        attempts = attempt,
                        error = %e,
                        "恒久的なエラーのため再試行しません"
                    );
                }
                return Retried {
                    result:   Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

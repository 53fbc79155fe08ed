//! # リトライポリシー
//!
//! メール送信とバックアップのアップロードで共有する。
//! ポリシー自体は「何回まで」「次まで何秒待つか」だけを決め、
//! 何を再試行するかはエラー側の [`Transience`] 分類に委ねる。
//!
//! 実際の再試行ループは jobs 側の executor が持つ。ここは純粋な値で、
//! トランスポートなしで単体テストできる。

use std::time::Duration;

/// エラーが一時的か（再試行で解消し得るか）
pub trait Transience {
    fn is_transient(&self) -> bool;
}

/// 待機時間の計算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 毎回同じ時間待つ
    Fixed(Duration),
    /// `base * 2^(retry - 1)` を `max` で頭打ちにする
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// `retry` 回目の再試行の前に待つ時間（`retry` は 1 始まり）
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let exponent = retry.saturating_sub(1).min(16);
                base.checked_mul(1 << exponent).unwrap_or(max).min(max)
            }
        }
    }
}

/// リトライポリシー
///
/// `max_attempts` は初回を含む試行回数の上限で、常に 1 以上。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff:      Backoff,
}

impl RetryPolicy {
    /// 0 を渡された場合は 1（再試行なし）として扱う
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self::new(max_attempts, Backoff::Exponential { base, max })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// `attempt` 回目の試行が `error` で失敗した後、もう一度試すべきか
    pub fn should_retry<E: Transience>(&self, attempt: u32, error: &E) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// `attempt` 回目の失敗から次の試行までの待機時間
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

impl Default for RetryPolicy {
    /// 3 回まで、5 秒間隔
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

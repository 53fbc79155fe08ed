//! # インフラ層エラー定義
//!
//! データベースやローカルファイル、外部クライアントの構築で発生するエラー。
//!
//! `std::io::Error` と同じ struct + enum パターン:
//! - [`InfraError`]: 種別（[`InfraErrorKind`]）と [`SpanTrace`] を保持するラッパー
//! - [`InfraErrorKind`]: 具体的な種別
//!
//! `From` 実装や convenience constructor でエラーを生成すると、その時点の
//! スパン（`job_run` など）が自動で記録される。
//!
//! メール送信とアップロードの失敗はここではなく、再試行の判断に使う
//! ドメインの `SendError` / `UploadError` で表す。

use std::fmt;

use derive_more::Display;
use ihundred_domain::QueryError;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// データベースエラー（接続失敗、クエリ拒否、型の不一致）
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// ローカルファイルの操作に失敗
    #[error("ファイル操作エラー: {0}")]
    Io(#[source] std::io::Error),

    /// 外部クライアント（HTTP、AWS）の構築に失敗
    ///
    /// AWS SDK や reqwest のエラー型はジェネリクスが深いため String にマップする。
    #[error("クライアント構築エラー: {0}")]
    Client(String),

    #[error("入力エラー: {0}")]
    InvalidInput(String),
}

impl InfraError {
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// データベースに到達できなかったことによるエラーか
    pub fn is_connection_failure(&self) -> bool {
        match &self.kind {
            InfraErrorKind::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Configuration(_)
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }

    // ===== Convenience constructors =====

    pub fn client(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::Client(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::InvalidInput(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Database(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(source: std::io::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Io(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// 再試行で解消し得る HTTP ステータスか（408、429、5xx）
///
/// メール送信（SES）とアップロード（Azure、S3）の失敗分類で共有する。
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// 受信者選択の失敗を致命的エラーに変換する
impl From<InfraError> for QueryError {
    fn from(error: InfraError) -> Self {
        if error.is_connection_failure() {
            QueryError::Connection(error.to_string())
        } else {
            QueryError::Rejected(error.to_string())
        }
    }
}

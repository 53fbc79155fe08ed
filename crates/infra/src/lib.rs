//! # IHundred インフラ層
//!
//! ジョブが触れる外部システムとの接続をまとめる。
//!
//! ## 責務
//!
//! - **データベース**: PostgreSQL への接続プール、受信者とレポートの読み出し（読み取り専用）
//! - **メール送信**: SES / SMTP / Noop
//! - **クラウドストレージ**: Azure Blob Storage / S3 へのアップロード
//! - **ダンプ**: `pg_dump` の起動とローカルのバックアップファイル管理
//!
//! ## 依存関係
//!
//! ```text
//! jobs → infra → domain
//! ```
//!
//! 各外部システムはトレイトで抽象化し、`test-utils` feature で
//! インメモリのモック（[`mock`]）を公開する。

pub mod db;
pub mod dump;
pub mod error;
pub mod local_backup;
pub mod notification;
pub mod repository;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use dump::{DatabaseDumper, PgDumpDumper};
pub use error::{InfraError, InfraErrorKind};
pub use local_backup::LocalBackupStore;
pub use notification::{
    NoopNotificationSender,
    NotificationSender,
    SesNotificationSender,
    SmtpNotificationSender,
};
pub use storage::{AzureBlobUploader, BlobUploader, S3BlobUploader};

//! # IHundred ドメイン層
//!
//! 定期バッチジョブ（通知メール送信、データベースバックアップ）の
//! ドメインモデルを定義する。
//!
//! ## 依存関係の方向
//!
//! ```text
//! jobs → infra → domain
//!   ↘      ↘
//!     shared
//! ```
//!
//! ドメイン層は DB・メール送信・クラウドストレージには一切依存しない。
//! 外部とのやり取りは infra 層のトレイトを通じて行う。
//!
//! ## モジュール構成
//!
//! - [`recipient`] - 送信対象者（受信者スナップショット）
//! - [`job`] - ジョブ種別、ジョブ定義、送信条件
//! - [`delivery`] - 配信試行、配信結果、実行サマリー
//! - [`report`] - サマリーレポート（学科別集計、検証者パフォーマンス）
//! - [`backup`] - バックアップ対象と結果
//! - [`retry`] - リトライポリシー
//! - [`error`] - エラー分類
//! - [`clock`] - 時刻プロバイダ
//!
//! ## 使用例
//!
//! ```rust
//! use ihundred_domain::{
//!     job::{JobDefinition, JobKind},
//!     recipient::{Recipient, RecipientId},
//! };
//!
//! let job = JobDefinition::for_kind(JobKind::Lt50FinalYear);
//! let recipient = Recipient::new(RecipientId::new("1"), "a@x.com")
//!     .with_final_year(true)
//!     .with_balance(30);
//!
//! assert!(job.missing_field(&recipient).is_none());
//! ```

#[macro_use]
mod macros;

pub mod backup;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod job;
pub mod notification;
pub mod recipient;
pub mod report;
pub mod retry;

pub use error::{DumpError, QueryError, RenderError, SendError, UploadError};

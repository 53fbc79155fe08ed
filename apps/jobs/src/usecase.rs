//! # ユースケース層
//!
//! ジョブの処理本体。外部システムはすべて infra のトレイト越しに使い、
//! `Arc<dyn Trait>` で注入する。
//!
//! - `orchestrator`: 通知ジョブ 1 回分の実行
//! - `backup`: バックアップジョブ 1 回分の実行
//! - `delivery` / `retry`: 再試行付きの送信
//! - `template_renderer`: メール本文の生成

pub mod backup;
pub mod delivery;
pub mod orchestrator;
pub mod retry;
pub mod template_renderer;

pub use backup::BackupPipeline;
pub use delivery::{Delivery, DeliveryEngine};
pub use orchestrator::JobOrchestrator;
pub use template_renderer::TemplateRenderer;

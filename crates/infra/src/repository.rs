//! # リポジトリ実装
//!
//! ジョブが読むデータ（受信者、サマリーレポート）の取得を担当する。
//! すべて読み取り専用で、すべてのクエリに `ORDER BY` を付けて
//! 同じデータベース状態なら同じ順序で返す。

pub mod recipient_selector;
pub mod summary_report_repository;

pub use recipient_selector::{AudienceSettings, PostgresRecipientSelector, RecipientSelector};
pub use summary_report_repository::{
    PostgresSummaryReportRepository,
    ReportScope,
    SummaryReportRepository,
};

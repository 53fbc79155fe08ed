//! # IHundred ジョブ
//!
//! 定期実行されるバッチジョブ（通知メールとデータベースのバックアップ）。
//! ジョブごとに `src/bin/` のバイナリがあり、引数なしで起動する。
//! スケジュールは外部（cron / CI）が決める。
//!
//! 終了ステータスは [`error::JobExit`] を参照。

pub mod config;
pub mod error;
pub mod reporting;
pub mod runner;
pub mod usecase;

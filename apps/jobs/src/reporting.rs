//! # 実行サマリーの報告
//!
//! 実行の終わりに結果を `job.completed` のビジネスイベントとして出力し、
//! `RUN_SUMMARY_PATH` が設定されていれば JSON ファイルにも書き出す。

use std::path::Path;

use ihundred_domain::{backup::BackupRunSummary, delivery::RunSummary};
use ihundred_shared::{event_log::event, log_business_event};
use itertools::Itertools;
use serde::Serialize;

/// 成功件数と失敗件数からイベントの結果を決める
fn result_of(succeeded: usize, failed: usize) -> &'static str {
    match (succeeded, failed) {
        (_, 0) => event::result::SUCCESS,
        (0, _) => event::result::FAILURE,
        _ => event::result::PARTIAL,
    }
}

pub fn report_run(summary: &RunSummary) {
    let counts = summary.counts();
    let failed_ids = summary
        .failed()
        .iter()
        .map(|f| f.recipient_id.as_str())
        .join(",");

    log_business_event!(
        event.category = event::category::JOB,
        event.action = event::action::JOB_COMPLETED,
        event.entity_type = event::entity_type::RUN,
        event.entity_id = %summary.run_id(),
        event.result = result_of(counts.sent, counts.failed),
        job.kind = %summary.job_kind(),
        sent = counts.sent,
        failed = counts.failed,
        skipped = counts.skipped,
        failed_recipients = %failed_ids,
        "ジョブ完了"
    );

    for failure in summary.failed() {
        tracing::warn!(
            recipient.id = %failure.recipient_id,
            retry_count = failure.retry_count,
            error = %failure.error,
            "送信できなかった受信者"
        );
    }
}

pub fn report_backup(summary: &BackupRunSummary) {
    let failed_databases = summary
        .results
        .iter()
        .filter(|r| !r.outcome.is_done())
        .map(|r| r.database.as_str())
        .join(",");

    log_business_event!(
        event.category = event::category::JOB,
        event.action = event::action::JOB_COMPLETED,
        event.entity_type = event::entity_type::RUN,
        event.entity_id = %summary.run_id,
        event.result = result_of(summary.done_count(), summary.failed_count()),
        job.kind = "backup",
        done = summary.done_count(),
        failed = summary.failed_count(),
        pruned_files = summary.pruned_files,
        failed_databases = %failed_databases,
        "ジョブ完了"
    );
}

/// サマリーを整形済み JSON で書き出す
pub async fn write_summary(path: &Path, summary: &impl Serialize) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(summary)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await
}

/// 書き出しに失敗しても実行結果は変えない
pub async fn write_summary_if_configured(path: Option<&Path>, summary: &impl Serialize) {
    let Some(path) = path else {
        return;
    };
    match write_summary(path, summary).await {
        Ok(()) => tracing::info!(path = %path.display(), "実行サマリーを書き出しました"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "実行サマリーを書き出せません"),
    }
}

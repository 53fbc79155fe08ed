//! # バックアップパイプライン
//!
//! データベースごとに `Dumping → Uploading → Done` と進める。
//!
//! - ダンプの失敗（コマンドの異常終了、空・読めない出力）はそのデータベースだけを失敗にする
//! - アップロードは一時的エラーを再試行し、上限に達したらそのデータベースを失敗にする
//! - 1 つの失敗で他のデータベースを止めない
//! - 最後に保持期間を過ぎたローカルのダンプを削除する（削除の失敗はログのみ）

use std::{path::Path, sync::Arc};

use chrono::TimeDelta;
use ihundred_domain::{
    backup::{BackupOutcome, BackupResult, BackupRunSummary, BackupStage, BackupTarget},
    clock::Clock,
    delivery::RunId,
    retry::RetryPolicy,
};
use ihundred_infra::{DatabaseDumper, InfraError, LocalBackupStore, storage::BlobUploader};
use ihundred_shared::{
    event_log::{error as error_fields, event},
    log_business_event,
};
use tracing::Instrument;

use super::retry::run_with_retry;

pub struct BackupPipeline {
    dumper:    Arc<dyn DatabaseDumper>,
    uploader:  Arc<dyn BlobUploader>,
    store:     LocalBackupStore,
    policy:    RetryPolicy,
    retention: TimeDelta,
    clock:     Arc<dyn Clock>,
}

impl BackupPipeline {
    pub fn new(
        dumper: Arc<dyn DatabaseDumper>,
        uploader: Arc<dyn BlobUploader>,
        store: LocalBackupStore,
        policy: RetryPolicy,
        retention: TimeDelta,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dumper,
            uploader,
            store,
            policy,
            retention,
            clock,
        }
    }

    /// すべての対象をバックアップする
    ///
    /// 出力先ディレクトリを用意できない場合だけエラーを返す。
    pub async fn run(&self, targets: &[BackupTarget]) -> Result<BackupRunSummary, InfraError> {
        let run_id = RunId::new();
        let span = tracing::info_span!("job_run", job.kind = "backup", run.id = %run_id);

        self.run_inner(targets, run_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        targets: &[BackupTarget],
        run_id: RunId,
    ) -> Result<BackupRunSummary, InfraError> {
        let mut summary = BackupRunSummary::new(run_id, self.clock.now());

        self.store.prepare().await.inspect_err(|e| {
            tracing::error!(
                error.category = error_fields::category::INFRASTRUCTURE,
                error.kind = error_fields::kind::FILESYSTEM,
                error = %e,
                dir = %self.store.dir().display(),
                "バックアップの出力先を用意できません"
            );
        })?;

        for target in targets {
            let outcome = self.back_up(target).await;
            summary.results.push(BackupResult {
                label:    target.label.clone(),
                database: target.database.clone(),
                outcome,
            });
        }

        summary.pruned_files = self.prune(summary.started_at).await;
        summary.finished_at = Some(self.clock.now());
        Ok(summary)
    }

    async fn back_up(&self, target: &BackupTarget) -> BackupOutcome {
        let at = self.clock.now();
        let path = self.store.path_for(&target.file_name(at));
        let key = target.blob_key(at);

        // Dumping
        let bytes = match self.dump(target, &path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                self.discard(&path).await;
                return failed(target, BackupStage::Dumping, error, 0);
            }
        };
        log_business_event!(
            event.category = event::category::BACKUP,
            event.action = event::action::BACKUP_DUMPED,
            event.entity_type = event::entity_type::DATABASE,
            event.entity_id = %target.database,
            event.result = event::result::SUCCESS,
            bytes,
            path = %path.display(),
            "ダンプ完了"
        );

        // Uploading
        let retried = run_with_retry(&self.policy, &target.database, |_| {
            self.uploader.upload(&path, &target.destination, &key)
        })
        .await;
        let retry_count = retried.retry_count();

        match retried.result {
            Ok(()) => {
                log_business_event!(
                    event.category = event::category::BACKUP,
                    event.action = event::action::BACKUP_UPLOADED,
                    event.entity_type = event::entity_type::DATABASE,
                    event.entity_id = %target.database,
                    event.result = event::result::SUCCESS,
                    container = %target.destination.container,
                    blob_key = %key,
                    retry_count,
                    "アップロード完了"
                );
                BackupOutcome::Done {
                    blob_key: key,
                    bytes,
                    retry_count,
                }
            }
            Err(e) => failed(target, BackupStage::Uploading, e.to_string(), retry_count),
        }
    }

    /// ダンプして出力を検証する
    async fn dump(&self, target: &BackupTarget, path: &Path) -> Result<u64, String> {
        self.dumper
            .dump(&target.database, path)
            .await
            .map_err(|e| e.to_string())?;
        self.store.verify_dump(path).await.map_err(|e| e.to_string())
    }

    /// 失敗したダンプの残骸を消す
    async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "不完全なダンプを削除しました"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "不完全なダンプを削除できません"),
        }
    }

    async fn prune(&self, started_at: chrono::DateTime<chrono::Utc>) -> usize {
        let cutoff = started_at - self.retention;
        match self.store.prune_older_than(cutoff).await {
            Ok(removed) => {
                if !removed.is_empty() {
                    log_business_event!(
                        event.category = event::category::BACKUP,
                        event.action = event::action::BACKUP_PRUNED,
                        event.result = event::result::SUCCESS,
                        removed = removed.len(),
                        cutoff = %cutoff,
                        "保持期間を過ぎたダンプを削除しました"
                    );
                }
                removed.len()
            }
            Err(e) => {
                tracing::warn!(
                    error.category = error_fields::category::INFRASTRUCTURE,
                    error.kind = error_fields::kind::FILESYSTEM,
                    error = %e,
                    "古いダンプの削除に失敗しました"
                );
                0
            }
        }
    }
}

fn failed(target: &BackupTarget, stage: BackupStage, error: String, retry_count: u32) -> BackupOutcome {
    let (category, kind) = match stage {
        BackupStage::Dumping => (error_fields::category::INFRASTRUCTURE, error_fields::kind::DUMP),
        BackupStage::Uploading => (
            error_fields::category::EXTERNAL_SERVICE,
            error_fields::kind::BLOB_STORAGE,
        ),
    };
    log_business_event!(
        event.category = event::category::BACKUP,
        event.action = event::action::BACKUP_FAILED,
        event.entity_type = event::entity_type::DATABASE,
        event.entity_id = %target.database,
        event.result = event::result::FAILURE,
        error.category = category,
        error.kind = kind,
        stage = %stage,
        retry_count,
        error = %error,
        "バックアップ失敗"
    );
    BackupOutcome::Failed {
        stage,
        error,
        retry_count,
    }
}

//! # バックアップ
//!
//! データベースごとに `Dumping → Uploading → Done` と進む。
//! どこかで失敗したらそのデータベースだけが `Failed` になり、
//! 他のデータベースのバックアップは続行する。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::delivery::RunId;

/// SAS トークン
///
/// ログやサマリーに平文で出さないよう、`Debug` はマスクする。
#[derive(Clone, PartialEq, Eq)]
pub struct SasToken(String);

impl SasToken {
    /// 先頭の `?` は取り除く（ポータルからコピーした値をそのまま受け付ける）
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self(value.trim().trim_start_matches('?').to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SasToken([REDACTED])")
    }
}

/// アップロード先
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDestination {
    /// Azure のコンテナ名、または S3 のバケット名
    pub container: String,
    /// Azure 用。S3 では使わない
    pub sas_token: Option<SasToken>,
}

/// バックアップ対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    /// 設定上のラベル（例: `IHUNDRED`）
    pub label:       String,
    pub database:    String,
    pub destination: BlobDestination,
}

impl BackupTarget {
    /// ローカルのダンプファイル名
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!("{}_backup_{}.dump", self.database, at.format("%Y%m%d_%H%M%S"))
    }

    /// アップロード先のキー（`<database>/<YYYY>/<MM>/<DD>/<file>`）
    pub fn blob_key(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}",
            self.database,
            at.format("%Y/%m/%d"),
            self.file_name(at)
        )
    }
}

/// 失敗した段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupStage {
    Dumping,
    Uploading,
}

/// データベース 1 つ分の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupOutcome {
    Done {
        blob_key:    String,
        bytes:       u64,
        retry_count: u32,
    },
    Failed {
        stage:       BackupStage,
        error:       String,
        retry_count: u32,
    },
}

impl BackupOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupResult {
    pub label:    String,
    pub database: String,
    pub outcome:  BackupOutcome,
}

/// バックアップ実行サマリー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRunSummary {
    pub run_id:        RunId,
    pub started_at:    DateTime<Utc>,
    pub finished_at:   Option<DateTime<Utc>>,
    pub results:       Vec<BackupResult>,
    /// 保持期間を過ぎて削除したローカルファイル数
    pub pruned_files:  usize,
}

impl BackupRunSummary {
    pub fn new(run_id: RunId, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: None,
            results: Vec::new(),
            pruned_files: 0,
        }
    }

    pub fn done_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_done()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.done_count()
    }

    /// 一部だけ成功した
    pub fn is_partial(&self) -> bool {
        self.done_count() > 0 && self.failed_count() > 0
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }
}

//! # ローカルバックアップファイル
//!
//! ダンプの出力先ディレクトリを管理する。
//!
//! - 出力先の作成
//! - ダンプ結果の検証（存在する・読める・空でない）
//! - 保持期間を過ぎたファイルの削除
//!
//! 保持期間の判定はファイル名の日時（`<db>_backup_<YYYYmmdd_HHMMSS>.dump`）で行う。
//! この形式に合わないファイルには触れない。

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use ihundred_domain::DumpError;

use crate::error::InfraError;

const FILE_MARKER: &str = "_backup_";
const FILE_EXTENSION: &str = ".dump";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct LocalBackupStore {
    dir: PathBuf,
}

impl LocalBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 出力先ディレクトリを作成する
    pub async fn prepare(&self) -> Result<(), InfraError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// ダンプ結果を検証し、ファイルサイズを返す
    pub async fn verify_dump(&self, path: &Path) -> Result<u64, DumpError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| DumpError::Unreadable {
                path:    path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !metadata.is_file() {
            return Err(DumpError::Unreadable {
                path:    path.to_path_buf(),
                message: "通常のファイルではありません".to_string(),
            });
        }
        if metadata.len() == 0 {
            return Err(DumpError::EmptyOutput(path.to_path_buf()));
        }

        // 読み出せることも確認する（権限のないファイルを残さない）
        tokio::fs::File::open(path)
            .await
            .map_err(|e| DumpError::Unreadable {
                path:    path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(metadata.len())
    }

    /// `cutoff` より古いバックアップファイルを削除し、削除したパスを返す
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<PathBuf>, InfraError> {
        let mut removed = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(created_at) = name.to_str().and_then(backup_timestamp) else {
                continue;
            };
            if created_at >= cutoff || !entry.file_type().await?.is_file() {
                continue;
            }

            let path = entry.path();
            tokio::fs::remove_file(&path).await?;
            tracing::debug!(path = %path.display(), "古いバックアップを削除しました");
            removed.push(path);
        }

        removed.sort();
        Ok(removed)
    }
}

/// ファイル名からバックアップの作成日時を読み取る
fn backup_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let stem = file_name.strip_suffix(FILE_EXTENSION)?;
    let (_, timestamp) = stem.rsplit_once(FILE_MARKER)?;
    NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

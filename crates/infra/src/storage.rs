//! # クラウドストレージ
//!
//! バックアップファイルのアップロードを [`BlobUploader`] で抽象化する。
//!
//! - Azure Blob Storage（既定）: SAS トークンで認証し、REST API に PUT する
//! - S3: AWS の標準の認証情報チェーンを使う
//!
//! ダンプはメモリに読み込まずにファイルから直接送る。一定の大きさを超える
//! ファイルはブロック（S3 ではマルチパート）に分けて送る。
//!
//! `BACKUP_STORAGE_BACKEND` で切り替える。

mod azure;
mod s3;

use std::path::Path;

use async_trait::async_trait;
pub use azure::AzureBlobUploader;
use ihundred_domain::{UploadError, backup::BlobDestination};
pub use s3::{S3BlobUploader, create_client as create_s3_client};

/// アップロードトレイト
///
/// 1 回の呼び出しで 1 回だけアップロードを試みる。再試行は呼び出し側が行う。
#[async_trait]
pub trait BlobUploader: Send + Sync {
    /// `local_path` のファイルを `destination` の `key` に置く
    async fn upload(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
    ) -> Result<(), UploadError>;
}

/// アップロード元ファイルの大きさ
///
/// ローカルファイルが読めないのは再試行しても解消しないので恒久的エラーにする。
async fn local_file_len(local_path: &Path) -> Result<u64, UploadError> {
    tokio::fs::metadata(local_path)
        .await
        .map(|metadata| metadata.len())
        .map_err(|e| unreadable(local_path, &e))
}

fn unreadable(local_path: &Path, error: &dyn std::fmt::Display) -> UploadError {
    UploadError::Permanent(format!(
        "アップロード元を読めません: {}: {error}",
        local_path.display()
    ))
}

/// `len` バイトを `part_size` ごとに区切った `(開始位置, 長さ)` の並び
fn split_into_parts(len: u64, part_size: u64) -> Vec<(u64, u64)> {
    let part_size = part_size.max(1);
    (0..len.div_ceil(part_size))
        .map(|index| {
            let offset = index * part_size;
            (offset, part_size.min(len - offset))
        })
        .collect()
}

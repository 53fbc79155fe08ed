//! Azure Blob Storage アップロード実装
//!
//! 認証はコンテナ単位の SAS トークン（URL のクエリ文字列）で行う。
//!
//! - [`SINGLE_PUT_LIMIT`] 以下: Put Blob で 1 回に PUT する
//! - それを超える: [`BLOCK_SIZE`] ごとに Put Block し、Put Block List で確定する
//!
//! どちらもファイルを読みながら送り、全体をメモリに載せない。

use std::{io::SeekFrom, path::Path, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use ihundred_domain::{UploadError, backup::BlobDestination};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use url::Url;

use super::{BlobUploader, local_file_len, split_into_parts, unreadable};
use crate::error::{InfraError, is_retryable_status};

const API_VERSION: &str = "2021-08-06";

/// Put Blob 1 回で送る上限（256 MiB）
const SINGLE_PUT_LIMIT: u64 = 256 * 1024 * 1024;

/// Put Block 1 回あたりの大きさ（64 MiB）
const BLOCK_SIZE: u64 = 64 * 1024 * 1024;

pub struct AzureBlobUploader {
    client:   reqwest::Client,
    endpoint: Url,
}

impl AzureBlobUploader {
    /// `https://<account>.blob.core.windows.net/` に接続する
    pub fn new(account: &str, timeout: Duration) -> Result<Self, InfraError> {
        let endpoint = Url::parse(&format!("https://{account}.blob.core.windows.net/"))
            .map_err(|e| InfraError::invalid_input(format!("ストレージアカウント名が不正: {e}")))?;
        Self::with_endpoint(endpoint, timeout)
    }

    /// エンドポイントを直接指定する（Azurite など）
    pub fn with_endpoint(endpoint: Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InfraError::client(format!("HTTP クライアントの構築に失敗: {e}")))?;

        Ok(Self { client, endpoint })
    }

    /// `<endpoint>/<container>/<key>?<sas>` を組み立てる
    fn blob_url(&self, destination: &BlobDestination, key: &str) -> Result<Url, UploadError> {
        let sas_token = destination.sas_token.as_ref().ok_or_else(|| {
            UploadError::Permanent(format!(
                "コンテナ {} の SAS トークンが設定されていません",
                destination.container
            ))
        })?;

        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| UploadError::Permanent("エンドポイント URL が不正です".to_string()))?
            .pop_if_empty()
            .push(&destination.container)
            .extend(key.split('/'));
        url.set_query(Some(sas_token.expose()));

        Ok(url)
    }

    async fn put_blob(&self, url: Url, local_path: &Path, len: u64) -> Result<(), UploadError> {
        let body = file_body(local_path, 0, len).await?;

        let response = self
            .client
            .put(url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, len.to_string())
            .body(body)
            .send()
            .await
            .map_err(request_error)?;

        check_response(response).await
    }

    async fn put_blocks(&self, url: Url, local_path: &Path, len: u64) -> Result<(), UploadError> {
        let parts = split_into_parts(len, BLOCK_SIZE);
        let mut block_ids = Vec::with_capacity(parts.len());

        for (index, (offset, part_len)) in parts.into_iter().enumerate() {
            let block_id = block_id(index);
            let mut block_url = url.clone();
            block_url
                .query_pairs_mut()
                .append_pair("comp", "block")
                .append_pair("blockid", &block_id);

            let body = file_body(local_path, offset, part_len).await?;
            let response = self
                .client
                .put(block_url)
                .header("x-ms-version", API_VERSION)
                .header(reqwest::header::CONTENT_LENGTH, part_len.to_string())
                .body(body)
                .send()
                .await
                .map_err(request_error)?;
            check_response(response).await?;

            tracing::debug!(block = index, bytes = part_len, "ブロックを送信しました");
            block_ids.push(block_id);
        }

        let mut list_url = url;
        list_url.query_pairs_mut().append_pair("comp", "blocklist");

        let response = self
            .client
            .put(list_url)
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/xml")
            .body(block_list_xml(&block_ids))
            .send()
            .await
            .map_err(request_error)?;

        check_response(response).await
    }
}

#[async_trait]
impl BlobUploader for AzureBlobUploader {
    async fn upload(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
    ) -> Result<(), UploadError> {
        let url = self.blob_url(destination, key)?;
        let len = local_file_len(local_path).await?;

        if len <= SINGLE_PUT_LIMIT {
            self.put_blob(url, local_path, len).await
        } else {
            self.put_blocks(url, local_path, len).await
        }
    }
}

/// ファイルの `offset` から `len` バイトを読みながら送る本文
async fn file_body(local_path: &Path, offset: u64, len: u64) -> Result<reqwest::Body, UploadError> {
    let mut file = File::open(local_path)
        .await
        .map_err(|e| unreadable(local_path, &e))?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| unreadable(local_path, &e))?;
    }

    Ok(reqwest::Body::wrap_stream(ReaderStream::new(file.take(len))))
}

/// ブロック ID
///
/// 1 つの BLOB の中ではすべて同じ長さでなければならないので番号を 0 埋めする。
fn block_id(index: usize) -> String {
    BASE64.encode(format!("block-{index:06}"))
}

fn block_list_xml(block_ids: &[String]) -> String {
    let latest: String = block_ids
        .iter()
        .map(|id| format!("<Latest>{id}</Latest>"))
        .collect();
    format!(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>{latest}</BlockList>"#)
}

fn request_error(error: reqwest::Error) -> UploadError {
    // SAS トークンを含む URL をエラーメッセージに残さない
    let error = error.without_url();
    if error.is_builder() {
        UploadError::Permanent(format!("リクエスト構築失敗: {error}"))
    } else {
        UploadError::Transient(format!("Azure への送信失敗: {error}"))
    }
}

async fn check_response(response: reqwest::Response) -> Result<(), UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let detail = response.text().await.unwrap_or_default();
    let message = format!(
        "Azure がアップロードを拒否しました ({status}): {}",
        detail.chars().take(300).collect::<String>()
    );
    if is_retryable_status(status.as_u16()) {
        Err(UploadError::Transient(message))
    } else {
        Err(UploadError::Permanent(message))
    }
}

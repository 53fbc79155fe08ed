//! S3 アップロード実装
//!
//! `BlobDestination::container` をバケット名として扱う。SAS トークンは使わない。
//! [`SINGLE_PUT_LIMIT`] を超えるファイルはマルチパートアップロードで送る。

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, Length},
    types::{CompletedMultipartUpload, CompletedPart},
};
use ihundred_domain::{UploadError, backup::BlobDestination};

use super::{BlobUploader, local_file_len, split_into_parts, unreadable};
use crate::error::is_retryable_status;

/// PutObject 1 回で送る上限（256 MiB）
const SINGLE_PUT_LIMIT: u64 = 256 * 1024 * 1024;

/// マルチパートの 1 パートの大きさ（64 MiB）
const PART_SIZE: u64 = 64 * 1024 * 1024;

/// S3 クライアントを作成する
///
/// `endpoint_url` を指定すると MinIO などの S3 互換ストレージに接続する。
pub async fn create_client(endpoint_url: Option<&str>) -> Client {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let mut builder = aws_sdk_s3::config::Builder::from(&config);
    if let Some(url) = endpoint_url {
        builder = builder.endpoint_url(url).force_path_style(true);
    }
    Client::from_conf(builder.build())
}

pub struct S3BlobUploader {
    client: Client,
}

impl S3BlobUploader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn put_object(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
    ) -> Result<(), UploadError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| unreadable(local_path, &e))?;

        self.client
            .put_object()
            .bucket(&destination.container)
            .key(key)
            .content_type("application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
        len: u64,
    ) -> Result<(), UploadError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&destination.container)
            .key(key)
            .content_type("application/octet-stream")
            .send()
            .await
            .map_err(classify)?;
        let upload_id = created.upload_id().ok_or_else(|| {
            UploadError::Transient("S3 がアップロード ID を返しませんでした".to_string())
        })?;

        let result = self
            .upload_parts(local_path, destination, key, upload_id, len)
            .await;

        if result.is_err() {
            // 途中まで送ったパートを残さない
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&destination.container)
                .key(key)
                .upload_id(upload_id)
                .send()
                .await
            {
                tracing::warn!(
                    error.message = %DisplayErrorContext(&e),
                    "マルチパートアップロードの中止に失敗しました"
                );
            }
        }

        result
    }

    async fn upload_parts(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
        upload_id: &str,
        len: u64,
    ) -> Result<(), UploadError> {
        let mut completed = Vec::new();

        for (index, (offset, part_len)) in split_into_parts(len, PART_SIZE).into_iter().enumerate() {
            let part_number = i32::try_from(index + 1)
                .map_err(|_| UploadError::Permanent("パート数が多すぎます".to_string()))?;
            let body = ByteStream::read_from()
                .path(local_path)
                .offset(offset)
                .length(Length::Exact(part_len))
                .build()
                .await
                .map_err(|e| unreadable(local_path, &e))?;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&destination.container)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(classify)?;

            tracing::debug!(part = part_number, bytes = part_len, "パートを送信しました");
            completed.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(&destination.container)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(classify)?;

        Ok(())
    }
}

#[async_trait]
impl BlobUploader for S3BlobUploader {
    async fn upload(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
    ) -> Result<(), UploadError> {
        let len = local_file_len(local_path).await?;

        if len <= SINGLE_PUT_LIMIT {
            self.put_object(local_path, destination, key).await
        } else {
            self.put_multipart(local_path, destination, key, len).await
        }
    }
}

fn classify<E>(error: SdkError<E>) -> UploadError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = format!("S3 アップロード失敗: {}", DisplayErrorContext(&error));

    let transient = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => is_retryable_status(context.raw().status().as_u16()),
        _ => false,
    };

    if transient {
        UploadError::Transient(message)
    } else {
        UploadError::Permanent(message)
    }
}

//! # テスト用モック
//!
//! ユースケーステストで使うインメモリ実装。呼び出しを記録し、
//! あらかじめ積んでおいた結果を順に返す。
//! `test-utils` feature を有効にすると他クレートからも利用できる。
//!
//! ```toml
//! [dev-dependencies]
//! ihundred-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ihundred_domain::{
    DumpError,
    SendError,
    UploadError,
    backup::BlobDestination,
    job::{JobDefinition, JobKind},
    notification::EmailMessage,
    recipient::Recipient,
    report::SummaryReport,
};

use crate::{
    dump::DatabaseDumper,
    error::InfraError,
    notification::NotificationSender,
    repository::{RecipientSelector, SummaryReportRepository},
    storage::BlobUploader,
};

// ===== MockRecipientSelector =====

#[derive(Clone, Default)]
pub struct MockRecipientSelector {
    recipients: Arc<Mutex<Vec<Recipient>>>,
    unreachable: bool,
    calls: Arc<Mutex<Vec<JobKind>>>,
}

impl MockRecipientSelector {
    pub fn new(recipients: Vec<Recipient>) -> Self {
        Self {
            recipients: Arc::new(Mutex::new(recipients)),
            ..Self::default()
        }
    }

    /// データベースに接続できない状態を再現する
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<JobKind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipientSelector for MockRecipientSelector {
    async fn select(&self, job: &JobDefinition) -> Result<Vec<Recipient>, InfraError> {
        self.calls.lock().unwrap().push(job.kind);
        if self.unreachable {
            return Err(sqlx::Error::PoolTimedOut.into());
        }
        Ok(self.recipients.lock().unwrap().clone())
    }
}

// ===== MockSummaryReportRepository =====

#[derive(Clone)]
pub struct MockSummaryReportRepository {
    report: Option<SummaryReport>,
    calls:  Arc<Mutex<usize>>,
}

impl MockSummaryReportRepository {
    pub fn new(report: SummaryReport) -> Self {
        Self {
            report: Some(report),
            calls:  Arc::new(Mutex::new(0)),
        }
    }

    /// 集計ビューが存在しない状態を再現する
    pub fn broken() -> Self {
        Self {
            report: None,
            calls:  Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Default for MockSummaryReportRepository {
    fn default() -> Self {
        Self::new(SummaryReport {
            final_year_batch: None,
            departments:      Vec::new(),
            verifiers:        Vec::new(),
        })
    }
}

#[async_trait]
impl SummaryReportRepository for MockSummaryReportRepository {
    async fn load(&self) -> Result<SummaryReport, InfraError> {
        *self.calls.lock().unwrap() += 1;
        self.report
            .clone()
            .ok_or_else(|| sqlx::Error::ColumnNotFound("AdminSummary".into()).into())
    }
}

// ===== MockNotificationSender =====

/// 宛先ごとに結果を積めるメール送信モック
///
/// 積んだ結果が尽きた宛先への送信は成功する。
#[derive(Clone, Default)]
pub struct MockNotificationSender {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Result<(), SendError>>>>>,
    calls:   Arc<Mutex<Vec<EmailMessage>>>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// `to` への送信結果を順に積む
    pub fn script(&self, to: &str, results: impl IntoIterator<Item = Result<(), SendError>>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(to.to_string())
            .or_default()
            .extend(results);
    }

    /// 送信の試行すべて（失敗を含む）
    pub fn calls(&self) -> Vec<EmailMessage> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, to: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| m.to == to).count()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), SendError> {
        self.calls.lock().unwrap().push(email.clone());
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&email.to)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

// ===== MockBlobUploader =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCall {
    pub local_path: PathBuf,
    pub container:  String,
    pub key:        String,
}

/// コンテナごとに結果を積めるアップロードモック
#[derive(Clone, Default)]
pub struct MockBlobUploader {
    scripts: Arc<Mutex<HashMap<String, VecDeque<Result<(), UploadError>>>>>,
    calls:   Arc<Mutex<Vec<UploadCall>>>,
}

impl MockBlobUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(
        &self,
        container: &str,
        results: impl IntoIterator<Item = Result<(), UploadError>>,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_default()
            .extend(results);
    }

    pub fn calls(&self) -> Vec<UploadCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, container: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.container == container)
            .count()
    }
}

#[async_trait]
impl BlobUploader for MockBlobUploader {
    async fn upload(
        &self,
        local_path: &Path,
        destination: &BlobDestination,
        key: &str,
    ) -> Result<(), UploadError> {
        self.calls.lock().unwrap().push(UploadCall {
            local_path: local_path.to_path_buf(),
            container:  destination.container.clone(),
            key:        key.to_string(),
        });
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&destination.container)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

// ===== MockDatabaseDumper =====

/// データベースごとにダンプ内容（またはエラー）を決めておけるモック
///
/// 成功時は指定した内容を出力ファイルに書く。未設定のデータベースは
/// 1 バイトの内容で成功する。
#[derive(Clone, Default)]
pub struct MockDatabaseDumper {
    outputs: Arc<Mutex<HashMap<String, Result<Vec<u8>, DumpError>>>>,
    calls:   Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl MockDatabaseDumper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_output(&self, database: &str, output: Result<Vec<u8>, DumpError>) {
        self.outputs
            .lock()
            .unwrap()
            .insert(database.to_string(), output);
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseDumper for MockDatabaseDumper {
    async fn dump(&self, database: &str, output: &Path) -> Result<(), DumpError> {
        self.calls
            .lock()
            .unwrap()
            .push((database.to_string(), output.to_path_buf()));

        let contents = self
            .outputs
            .lock()
            .unwrap()
            .get(database)
            .cloned()
            .unwrap_or_else(|| Ok(b"P".to_vec()))?;

        tokio::fs::write(output, contents)
            .await
            .map_err(|e| DumpError::Spawn(e.to_string()))
    }
}

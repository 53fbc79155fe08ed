//! # ジョブ設定
//!
//! 環境変数からジョブの設定を読み込む。
//!
//! 読み込みは [`JobsConfig::from_lookup`] / [`BackupConfig::from_lookup`] に
//! 値の取得関数を渡して行う。本番では `std::env::var`、テストでは `HashMap` を渡す。
//! 空文字列は未設定として扱う。
//!
//! 不正な値はその場でエラーにし、ジョブは何も送らずに終了する。

use std::{path::PathBuf, time::Duration};

use chrono::TimeDelta;
use ihundred_domain::{
    backup::{BackupTarget, BlobDestination, SasToken},
    retry::{Backoff, RetryPolicy},
};
use ihundred_infra::repository::{AudienceSettings, ReportScope};
use itertools::Itertools;
use thiserror::Error;
use url::Url;

const DEFAULT_FROM_ADDRESS: &str = "IHundred Admin <100activitypoints@scet.ac.in>";
const DEFAULT_PORTAL_BASE_URL: &str = "https://ihundred.scet.ac.in";
const DEFAULT_EXCLUDED_DEPARTMENTS: &str = "ASH,DET";

/// 設定エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("環境変数 {0} が設定されていません")]
    Missing(String),

    #[error("環境変数 {key} の値が不正です ({value:?}): {reason}")]
    Invalid {
        key:    String,
        value:  String,
        reason: String,
    },
}

/// 環境変数の読み出し
struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
                value,
            }),
        }
    }

    /// カンマ区切りのリスト（前後の空白と空要素は捨てる）
    fn list_or(&self, key: &str, default: &str) -> Vec<String> {
        split_list(&self.or(key, default))
    }

    fn invalid(&self, key: &str, value: impl Into<String>, reason: impl Into<String>) -> ConfigError {
        ConfigError::Invalid {
            key:    key.to_string(),
            value:  value.into(),
            reason: reason.into(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// データベース接続設定
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host:     String,
    pub port:     u16,
    pub name:     String,
    pub user:     String,
    pub password: String,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl DatabaseConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            host:     env.required("DB_HOST")?,
            port:     env.parse_or("DB_PORT", 5432)?,
            name:     env.or("DB_NAME", "ihundred"),
            user:     env.required("DB_USER")?,
            password: env.required("DB_PASSWORD")?,
        })
    }
}

/// メール送信バックエンド
///
/// `NOTIFICATION_BACKEND` で切り替える:
/// - `ses`: Amazon SES v2 経由で送信（本番）
/// - `smtp`: SMTP サーバー経由で送信（Mailpit など）
/// - `noop`: 送信しない（ログ出力のみ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationBackend {
    Ses { region: String },
    Smtp { host: String, port: u16 },
    Noop,
}

/// 通知設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub backend:      NotificationBackend,
    pub from_address: String,
    /// ポータルの URL（メール内リンク用）
    pub base_url:     Url,
}

impl NotificationConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let backend = match env.or("NOTIFICATION_BACKEND", "noop").as_str() {
            "ses" => NotificationBackend::Ses {
                region: env.or("AWS_REGION", "ap-south-1"),
            },
            "smtp" => NotificationBackend::Smtp {
                host: env.or("SMTP_HOST", "localhost"),
                port: env.parse_or("SMTP_PORT", 1025)?,
            },
            "noop" => NotificationBackend::Noop,
            other => {
                return Err(env.invalid(
                    "NOTIFICATION_BACKEND",
                    other,
                    "ses / smtp / noop のいずれかを指定してください",
                ));
            }
        };

        let base_url = env.or("PORTAL_BASE_URL", DEFAULT_PORTAL_BASE_URL);
        let base_url = Url::parse(&base_url)
            .map_err(|e| env.invalid("PORTAL_BASE_URL", base_url.clone(), e.to_string()))?;

        Ok(Self {
            backend,
            from_address: env.or("NOTIFICATION_FROM_ADDRESS", DEFAULT_FROM_ADDRESS),
            base_url,
        })
    }
}

/// 再試行ポリシーを読み込む
///
/// 試行回数と初回の待機時間は用途ごと、バックオフ方式と上限は共通。
fn retry_policy(
    env: &Env<'_>,
    attempts_key: &str,
    default_attempts: u32,
    delay_key: &str,
    default_delay_secs: u64,
) -> Result<RetryPolicy, ConfigError> {
    let max_attempts: u32 = env.parse_or(attempts_key, default_attempts)?;
    if max_attempts == 0 {
        return Err(env.invalid(attempts_key, "0", "1 以上を指定してください"));
    }
    let delay = Duration::from_secs(env.parse_or(delay_key, default_delay_secs)?);
    let max_delay = Duration::from_secs(env.parse_or("RETRY_MAX_DELAY_SECS", 300)?);

    let backoff = match env.or("RETRY_BACKOFF", "fixed").as_str() {
        "fixed" => Backoff::Fixed(delay),
        "exponential" => Backoff::Exponential {
            base: delay,
            max:  max_delay.max(delay),
        },
        other => {
            return Err(env.invalid(
                "RETRY_BACKOFF",
                other,
                "fixed / exponential のいずれかを指定してください",
            ));
        }
    };

    Ok(RetryPolicy::new(max_attempts, backoff))
}

/// 通知ジョブの設定
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub database:         DatabaseConfig,
    pub notification:     NotificationConfig,
    pub send_retry:       RetryPolicy,
    pub audience:         AudienceSettings,
    pub report_scope:     ReportScope,
    /// 実行サマリーの JSON 出力先
    pub run_summary_path: Option<PathBuf>,
}

impl JobsConfig {
    /// プロセスの環境変数から読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };
        let excluded_departments = env.list_or("EXCLUDED_DEPARTMENTS", DEFAULT_EXCLUDED_DEPARTMENTS);

        Ok(Self {
            database:         DatabaseConfig::from_env(&env)?,
            notification:     NotificationConfig::from_env(&env)?,
            send_retry:       retry_policy(&env, "SEND_MAX_ATTEMPTS", 3, "SEND_RETRY_DELAY_SECS", 5)?,
            audience:         AudienceSettings {
                excluded_departments: excluded_departments.clone(),
                extra_recipients:     env.list_or("SUMMARY_EXTRA_RECIPIENTS", ""),
                excluded_recipients:  env.list_or("SUMMARY_EXCLUDED_RECIPIENTS", ""),
            },
            report_scope:     ReportScope {
                excluded_departments,
                excluded_batches: env.list_or("SUMMARY_EXCLUDED_BATCHES", ""),
            },
            run_summary_path: env.optional("RUN_SUMMARY_PATH").map(PathBuf::from),
        })
    }
}

/// アップロード先のストレージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Azure {
        account:  String,
        /// Azurite などを使う場合のエンドポイント
        endpoint: Option<Url>,
    },
    S3 {
        endpoint_url: Option<String>,
    },
}

/// バックアップジョブの設定
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub database:         DatabaseConfig,
    pub pg_dump_path:     PathBuf,
    pub backup_dir:       PathBuf,
    pub retention:        TimeDelta,
    pub targets:          Vec<BackupTarget>,
    pub storage:          StorageBackend,
    pub upload_retry:     RetryPolicy,
    pub upload_timeout:   Duration,
    pub run_summary_path: Option<PathBuf>,
}

impl BackupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };

        let retention_days: u32 = env.parse_or("BACKUP_RETENTION_DAYS", 30)?;
        let storage = match env.or("BACKUP_STORAGE_BACKEND", "azure").as_str() {
            "azure" => StorageBackend::Azure {
                account:  env.required("AZURE_STORAGE_ACCOUNT")?,
                endpoint: env
                    .optional("AZURE_BLOB_ENDPOINT")
                    .map(|value| {
                        Url::parse(&value)
                            .map_err(|e| env.invalid("AZURE_BLOB_ENDPOINT", value.clone(), e.to_string()))
                    })
                    .transpose()?,
            },
            "s3" => StorageBackend::S3 {
                endpoint_url: env.optional("S3_ENDPOINT_URL"),
            },
            other => {
                return Err(env.invalid(
                    "BACKUP_STORAGE_BACKEND",
                    other,
                    "azure / s3 のいずれかを指定してください",
                ));
            }
        };

        Ok(Self {
            database: DatabaseConfig::from_env(&env)?,
            pg_dump_path: PathBuf::from(env.or("PG_DUMP_PATH", "pg_dump")),
            backup_dir: PathBuf::from(env.or("BACKUP_DIR", "/backups")),
            retention: TimeDelta::days(i64::from(retention_days)),
            targets: backup_targets(&env)?,
            storage,
            upload_retry: retry_policy(&env, "UPLOAD_MAX_ATTEMPTS", 3, "UPLOAD_RETRY_DELAY_SECS", 10)?,
            upload_timeout: Duration::from_secs(env.parse_or("UPLOAD_TIMEOUT_SECS", 600)?),
            run_summary_path: env.optional("RUN_SUMMARY_PATH").map(PathBuf::from),
        })
    }
}

/// `BACKUP_TARGETS` のラベルごとにバックアップ対象を組み立てる
///
/// ラベル固有の設定（`BACKUP_<LABEL>_*`）が無ければ共通の設定を使う。
fn backup_targets(env: &Env<'_>) -> Result<Vec<BackupTarget>, ConfigError> {
    let labels: Vec<String> = env
        .list_or("BACKUP_TARGETS", "IHUNDRED")
        .into_iter()
        .map(|label| label.to_uppercase())
        .unique()
        .collect();

    labels
        .into_iter()
        .map(|label| {
            let database = env
                .optional(&format!("BACKUP_{label}_DB_NAME"))
                .unwrap_or_else(|| label.to_lowercase());

            let container_key = format!("BACKUP_{label}_CONTAINER");
            let container = env
                .optional(&container_key)
                .or_else(|| env.optional("AZURE_STORAGE_CONTAINER"))
                .ok_or(ConfigError::Missing(container_key))?;

            let sas_token = env
                .optional(&format!("BACKUP_{label}_SAS_TOKEN"))
                .or_else(|| env.optional("AZURE_SAS_TOKEN"))
                .map(SasToken::new);

            Ok(BackupTarget {
                label,
                database,
                destination: BlobDestination {
                    container,
                    sas_token,
                },
            })
        })
        .collect()
}

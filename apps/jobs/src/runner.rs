//! # ジョブの起動
//!
//! 各バイナリの `main` から呼ばれ、設定の読み込みから依存コンポーネントの組み立て、
//! 実行、報告、終了ステータスの決定までを行う。
//!
//! データベース接続プールは結果にかかわらず実行の最後に閉じる。

use std::{process::ExitCode, sync::Arc};

use anyhow::Context as _;
use ihundred_domain::{
    clock::SystemClock,
    job::{JobDefinition, JobKind},
};
use ihundred_infra::{
    AzureBlobUploader,
    LocalBackupStore,
    NoopNotificationSender,
    PgDumpDumper,
    S3BlobUploader,
    SesNotificationSender,
    SmtpNotificationSender,
    db,
    notification::NotificationSender,
    repository::{PostgresRecipientSelector, PostgresSummaryReportRepository},
    storage::{BlobUploader, create_s3_client},
};
use ihundred_shared::observability::{TracingConfig, init_tracing};

use crate::{
    config::{BackupConfig, DatabaseConfig, JobsConfig, NotificationBackend, NotificationConfig, StorageBackend},
    error::JobExit,
    reporting,
    usecase::{BackupPipeline, DeliveryEngine, JobOrchestrator, TemplateRenderer},
};

/// 起動時の共通処理（`.env` の読み込みとトレーシングの初期化）
fn bootstrap(job_name: &str) {
    dotenvy::dotenv().ok();
    init_tracing(&TracingConfig::from_env(job_name));
}

fn exit_with(result: anyhow::Result<JobExit>) -> ExitCode {
    match result {
        Ok(exit) => {
            tracing::info!(exit_code = exit.code(), "ジョブを終了します");
            exit.into()
        }
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "致命的なエラーでジョブを中断しました");
            JobExit::Fatal.into()
        }
    }
}

fn create_pool(config: &DatabaseConfig) -> sqlx::PgPool {
    db::create_pool(db::connect_options(
        &config.host,
        config.port,
        &config.name,
        &config.user,
        &config.password,
    ))
}

/// 通知ジョブのエントリーポイント
pub async fn run_notification_job(kind: JobKind) -> ExitCode {
    bootstrap(kind.into());
    exit_with(execute_notification_job(kind).await)
}

async fn execute_notification_job(kind: JobKind) -> anyhow::Result<JobExit> {
    let config = JobsConfig::from_env().context("設定の読み込みに失敗しました")?;
    tracing::debug!(?config, "設定を読み込みました");

    let sender = create_sender(&config.notification).await;
    let renderer = TemplateRenderer::new(&config.notification.base_url)
        .context("通知テンプレートの読み込みに失敗しました")?;

    let pool = create_pool(&config.database);
    let orchestrator = JobOrchestrator::new(
        Arc::new(PostgresRecipientSelector::new(pool.clone(), config.audience.clone())),
        Arc::new(PostgresSummaryReportRepository::new(pool.clone(), config.report_scope.clone())),
        renderer,
        DeliveryEngine::new(sender, config.send_retry),
        Arc::new(SystemClock),
    );

    let result = orchestrator.run(&JobDefinition::for_kind(kind)).await;
    pool.close().await;

    let summary = result.context("受信者の選択に失敗したため何も送信していません")?;
    reporting::report_run(&summary);
    reporting::write_summary_if_configured(config.run_summary_path.as_deref(), &summary).await;

    Ok(JobExit::from_run(&summary))
}

async fn create_sender(config: &NotificationConfig) -> Arc<dyn NotificationSender> {
    match &config.backend {
        NotificationBackend::Ses { region } => {
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(region.clone()))
                .load()
                .await;
            let client = aws_sdk_sesv2::Client::new(&aws_config);
            tracing::info!(region, "SES 通知送信を使用します");
            Arc::new(SesNotificationSender::new(client, config.from_address.clone()))
        }
        NotificationBackend::Smtp { host, port } => {
            tracing::info!(host, port, "SMTP 通知送信を使用します");
            Arc::new(SmtpNotificationSender::new(host, *port, config.from_address.clone()))
        }
        NotificationBackend::Noop => {
            tracing::info!("Noop 通知送信を使用します（メールは送信されません）");
            Arc::new(NoopNotificationSender)
        }
    }
}

/// バックアップジョブのエントリーポイント
pub async fn run_backup_job() -> ExitCode {
    bootstrap("backup");
    exit_with(execute_backup_job().await)
}

async fn execute_backup_job() -> anyhow::Result<JobExit> {
    let config = BackupConfig::from_env().context("設定の読み込みに失敗しました")?;
    tracing::debug!(?config, "設定を読み込みました");

    let uploader = create_uploader(&config).await?;
    let dumper = PgDumpDumper::new(
        config.database.host.clone(),
        config.database.port,
        config.database.user.clone(),
        config.database.password.clone(),
    )
    .with_program(config.pg_dump_path.clone());

    let pipeline = BackupPipeline::new(
        Arc::new(dumper),
        uploader,
        LocalBackupStore::new(config.backup_dir.clone()),
        config.upload_retry,
        config.retention,
        Arc::new(SystemClock),
    );

    let summary = pipeline
        .run(&config.targets)
        .await
        .context("バックアップの出力先を用意できません")?;
    reporting::report_backup(&summary);
    reporting::write_summary_if_configured(config.run_summary_path.as_deref(), &summary).await;

    Ok(JobExit::from_backup(&summary))
}

async fn create_uploader(config: &BackupConfig) -> anyhow::Result<Arc<dyn BlobUploader>> {
    let uploader: Arc<dyn BlobUploader> = match &config.storage {
        StorageBackend::Azure { account, endpoint } => {
            tracing::info!(account, "Azure Blob Storage にアップロードします");
            let uploader = match endpoint {
                Some(endpoint) => AzureBlobUploader::with_endpoint(endpoint.clone(), config.upload_timeout),
                None => AzureBlobUploader::new(account, config.upload_timeout),
            }
            .context("Azure Blob Storage クライアントを作成できません")?;
            Arc::new(uploader)
        }
        StorageBackend::S3 { endpoint_url } => {
            tracing::info!(endpoint_url, "S3 にアップロードします");
            Arc::new(S3BlobUploader::new(create_s3_client(endpoint_url.as_deref()).await))
        }
    };
    Ok(uploader)
}

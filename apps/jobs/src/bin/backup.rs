//! データベースのバックアップ
//!
//! `BACKUP_TARGETS` の各データベースを `pg_dump` でダンプし、クラウドストレージに置く。

use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    ihundred_jobs::runner::run_backup_job().await
}

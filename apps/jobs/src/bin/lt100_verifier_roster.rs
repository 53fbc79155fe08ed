//! 最終学年で 100 ポイント未満の学生一覧を担当検証者へ送る

use std::process::ExitCode;

use ihundred_domain::job::JobKind;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    ihundred_jobs::runner::run_notification_job(JobKind::Lt100VerifierRoster).await
}

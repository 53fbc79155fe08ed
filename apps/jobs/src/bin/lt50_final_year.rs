//! 50 ポイント未満の最終学年の学生への通知

use std::process::ExitCode;

use ihundred_domain::job::JobKind;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    ihundred_jobs::runner::run_notification_job(JobKind::Lt50FinalYear).await
}

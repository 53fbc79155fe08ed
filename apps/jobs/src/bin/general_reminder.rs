//! 学生全体への 100 ポイント活動リマインダー

use std::process::ExitCode;

use ihundred_domain::job::JobKind;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    ihundred_jobs::runner::run_notification_job(JobKind::GeneralReminder).await
}

//! 最終学年で 50 ポイント未満の学生一覧を学科担当者と学科長へ送る

use std::process::ExitCode;

use ihundred_domain::job::JobKind;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    ihundred_jobs::runner::run_notification_job(JobKind::Lt50DepartmentRoster).await
}

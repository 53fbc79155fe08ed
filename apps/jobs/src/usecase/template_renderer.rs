//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで通知メールを HTML/plaintext 両形式で生成する。
//!
//! - テンプレートは `include_str!` でバイナリに埋め込む
//! - テンプレート名はジョブ種別と同じ（`lt50_final_year.html` など）
//! - 任意の属性が欠けていれば既定値を使い、必須属性が欠けていれば [`RenderError`] を返す
//! - ポータルへのリンクは `{base_url}/dashboard`

use ihundred_domain::{
    RenderError,
    job::{JobDefinition, JobKind},
    notification::EmailMessage,
    recipient::{Recipient, RosterEntry},
    report::SummaryReport,
};
use serde::Serialize;
use tera::{Context, Tera};
use url::Url;

/// ジョブ種別ごとの件名
fn subject(kind: JobKind, recipient: &Recipient) -> String {
    match kind {
        JobKind::GeneralReminder => {
            "Plan Ahead for Success: 100 Activity Points Reminder!".to_string()
        }
        JobKind::Lt50FinalYear => {
            "Important Notification: Less Than 50 Points in Your 100 Points Activity Record"
                .to_string()
        }
        JobKind::Lt100FinalYear => {
            "Important Notification: Less Than 100 Points in Your 100 Points Activity Record"
                .to_string()
        }
        JobKind::Lt50DepartmentRoster => format!(
            "Notification: Students with Less Than 50 Points in {}",
            recipient.department.as_deref().unwrap_or_default()
        ),
        JobKind::Lt100VerifierRoster => {
            "Action Required: Students With Less Than 100 Points in 100 Points Activity".to_string()
        }
        JobKind::PendingVerification => {
            "Urgent: Pending Activities Require Your Attention!".to_string()
        }
        JobKind::Unallocated => format!(
            "Notification: Unallocated Students in {}",
            recipient.department.as_deref().unwrap_or_default()
        ),
        JobKind::Summary => "Current Status of 100 Points Activity @ SCET".to_string(),
    }
}

/// 名前が無い受信者の呼びかけ
fn fallback_name(kind: JobKind) -> &'static str {
    match kind {
        JobKind::GeneralReminder | JobKind::Lt50FinalYear | JobKind::Lt100FinalYear => "Student",
        JobKind::PendingVerification | JobKind::Lt100VerifierRoster => "Verifier",
        JobKind::Unallocated => "Department Representative",
        JobKind::Lt50DepartmentRoster | JobKind::Summary => "Sir/Madam",
    }
}

/// 学生向けジョブの目標ポイント
fn target_points(kind: JobKind) -> i64 {
    match kind {
        JobKind::Lt50FinalYear => 50,
        _ => 100,
    }
}

/// サマリー表の 1 行
#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    department: &'a str,
    batch:      &'a str,
    gte100:     i64,
    gte75:      i64,
    gte50:      i64,
    lt50:       i64,
    registered: i64,
    highlight:  bool,
}

/// 学生一覧の 1 行（欠けている列は `-` で埋める）
#[derive(Debug, Serialize)]
struct RosterRow<'a> {
    enrollment_no:      &'a str,
    name:               &'a str,
    email:              &'a str,
    batch:              &'a str,
    status:             &'a str,
    points:             String,
    pending_activities: String,
}

impl<'a> From<&'a RosterEntry> for RosterRow<'a> {
    fn from(entry: &'a RosterEntry) -> Self {
        let text = |value: &'a Option<String>| value.as_deref().unwrap_or("-");
        let number = |value: Option<i64>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
        Self {
            enrollment_no:      text(&entry.enrollment_no),
            name:               text(&entry.name),
            email:              text(&entry.email),
            batch:              text(&entry.batch),
            status:             text(&entry.status),
            points:             number(entry.points),
            pending_activities: number(entry.pending_activities),
        }
    }
}

fn roster_rows<'a>(entries: impl Iterator<Item = &'a RosterEntry>) -> Vec<RosterRow<'a>> {
    entries.map(RosterRow::from).collect()
}

/// テンプレートレンダラー
pub struct TemplateRenderer {
    engine:        Tera,
    dashboard_url: String,
}

impl TemplateRenderer {
    /// `include_str!` で埋め込んだテンプレートを tera に登録する
    pub fn new(base_url: &Url) -> Result<Self, RenderError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                ("base.html", include_str!("../../templates/notifications/base.html")),
                (
                    "general_reminder.html",
                    include_str!("../../templates/notifications/general_reminder.html"),
                ),
                (
                    "general_reminder.txt",
                    include_str!("../../templates/notifications/general_reminder.txt"),
                ),
                (
                    "lt50_final_year.html",
                    include_str!("../../templates/notifications/lt50_final_year.html"),
                ),
                (
                    "lt50_final_year.txt",
                    include_str!("../../templates/notifications/lt50_final_year.txt"),
                ),
                (
                    "lt100_final_year.html",
                    include_str!("../../templates/notifications/lt100_final_year.html"),
                ),
                (
                    "lt100_final_year.txt",
                    include_str!("../../templates/notifications/lt100_final_year.txt"),
                ),
                (
                    "pending_verification.html",
                    include_str!("../../templates/notifications/pending_verification.html"),
                ),
                (
                    "pending_verification.txt",
                    include_str!("../../templates/notifications/pending_verification.txt"),
                ),
                (
                    "unallocated.html",
                    include_str!("../../templates/notifications/unallocated.html"),
                ),
                (
                    "unallocated.txt",
                    include_str!("../../templates/notifications/unallocated.txt"),
                ),
                (
                    "lt50_department_roster.html",
                    include_str!("../../templates/notifications/lt50_department_roster.html"),
                ),
                (
                    "lt50_department_roster.txt",
                    include_str!("../../templates/notifications/lt50_department_roster.txt"),
                ),
                (
                    "lt100_verifier_roster.html",
                    include_str!("../../templates/notifications/lt100_verifier_roster.html"),
                ),
                (
                    "lt100_verifier_roster.txt",
                    include_str!("../../templates/notifications/lt100_verifier_roster.txt"),
                ),
                ("summary.html", include_str!("../../templates/notifications/summary.html")),
                ("summary.txt", include_str!("../../templates/notifications/summary.txt")),
            ])
            .map_err(|e| RenderError::Template(e.to_string()))?;

        let dashboard_url = format!("{}/dashboard", base_url.as_str().trim_end_matches('/'));

        Ok(Self {
            engine,
            dashboard_url,
        })
    }

    /// 受信者 1 人分のメールを生成する
    ///
    /// `report` はサマリージョブでだけ使う。
    pub fn render(
        &self,
        job: &JobDefinition,
        recipient: &Recipient,
        report: Option<&SummaryReport>,
    ) -> Result<EmailMessage, RenderError> {
        if let Some(field) = job.missing_field(recipient) {
            return Err(RenderError::MissingField(field));
        }

        let context = self.build_context(job.kind, recipient, report)?;

        let html_body = self
            .engine
            .render(&format!("{}.html", job.template), &context)
            .map_err(|e| RenderError::Template(template_error(&e)))?;

        let text_body = self
            .engine
            .render(&format!("{}.txt", job.template), &context)
            .map_err(|e| RenderError::Template(template_error(&e)))?;

        Ok(EmailMessage {
            to: recipient.email.trim().to_string(),
            subject: subject(job.kind, recipient),
            html_body,
            text_body,
        })
    }

    fn build_context(
        &self,
        kind: JobKind,
        recipient: &Recipient,
        report: Option<&SummaryReport>,
    ) -> Result<Context, RenderError> {
        let mut context = Context::new();
        context.insert("name", recipient.display_name(fallback_name(kind)));
        context.insert("dashboard_url", &self.dashboard_url);

        match kind {
            JobKind::GeneralReminder | JobKind::Lt50FinalYear | JobKind::Lt100FinalYear => {
                let target = target_points(kind);
                let balance = recipient.balance.unwrap_or_default();
                context.insert("balance_known", &recipient.balance.is_some());
                context.insert("balance", &balance);
                context.insert("target", &target);
                context.insert("points_needed", &(target - balance).max(0));
                context.insert("pending_activities", &recipient.pending_activities.unwrap_or_default());
                context.insert("batch", recipient.batch.as_deref().unwrap_or_default());
            }
            JobKind::PendingVerification => {
                context.insert("pending_count", &recipient.pending_activities.unwrap_or_default());
                context.insert("statistics", &recipient.statistics);
            }
            JobKind::Unallocated => {
                context.insert("department", recipient.department.as_deref().unwrap_or_default());
                context.insert(
                    "unallocated_count",
                    &recipient.pending_activities.unwrap_or_default(),
                );
                context.insert(
                    "pending_approval",
                    &roster_rows(recipient.roster.iter().filter(|e| e.is_pending_approval())),
                );
                context.insert(
                    "pending_allocation",
                    &roster_rows(recipient.roster.iter().filter(|e| e.is_pending_allocation())),
                );
            }
            JobKind::Lt50DepartmentRoster | JobKind::Lt100VerifierRoster => {
                context.insert("department", recipient.department.as_deref().unwrap_or_default());
                context.insert("student_count", &recipient.roster.len());
                context.insert("students", &roster_rows(recipient.roster.iter()));
            }
            JobKind::Summary => {
                let report = report.ok_or_else(|| {
                    RenderError::Template("サマリーレポートが読み込まれていません".to_string())
                })?;
                let rows: Vec<SummaryRow<'_>> = report
                    .departments
                    .iter()
                    .map(|row| SummaryRow {
                        department: &row.department,
                        batch:      &row.batch,
                        gte100:     row.gte100,
                        gte75:      row.gte75,
                        gte50:      row.gte50,
                        lt50:       row.lt50,
                        registered: row.registered(),
                        highlight:  report.is_highlighted(row),
                    })
                    .collect();

                context.insert("final_year_batch", &report.final_year_batch);
                context.insert("departments", &rows);
                context.insert("verifiers", &report.verifiers);
                context.insert("total_registered", &report.total_registered());
                context.insert("total_pending", &report.total_pending());
            }
        }

        Ok(context)
    }
}

/// tera のエラーは原因が `source` に連なるので、すべてつなげて返す
fn template_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

//! # RecipientSelector
//!
//! ジョブ定義の [`Cohort`] を SQL に対応付け、受信者のスナップショットを返す。
//!
//! | Cohort | 参照するビュー / テーブル | 受信者 ID |
//! |---|---|---|
//! | `Students` | `StudentsWithPointsandPendingActivitiesCount`, `Batches` | 学籍番号 |
//! | `VerifiersWithPendingActivities` | `User`, `Activity`, `VerifierStastics` | 検証者メール |
//! | `DepartmentsWithUnallocatedStudents` | `User`, `Departments` | 学科コード |
//! | `DepartmentStaffRoster` | `StudentsWithPointsandPendingActivitiesCount`, `Departments`, `Batches` | `学科コード:メール` |
//! | `VerifierRoster` | `StudentsWithPointsandPendingActivitiesCount`, `Batches` | 検証者メール |
//! | `ReportAudience` | `Departments`, `VerifierStastics` + 設定の追加宛先 | メール |
//!
//! 一覧付きの宛先（学科、検証者）は学生単位の行を 1 回のクエリで読み、
//! 宛先ごとにまとめる。まとめる前の行はキー順に並んでいる必要がある。
//!
//! 選択は全件取得か失敗かのどちらかで、途中までの結果は返さない。

use async_trait::async_trait;
use ihundred_domain::{
    job::{Cohort, JobDefinition},
    recipient::{Recipient, RecipientId, RosterEntry, VerifierStatistics},
};
use itertools::Itertools;
use sqlx::PgPool;

use crate::error::InfraError;

/// 受信者選択トレイト
#[async_trait]
pub trait RecipientSelector: Send + Sync {
    /// ジョブ定義の条件に合う受信者を決定的な順序で返す
    async fn select(&self, job: &JobDefinition) -> Result<Vec<Recipient>, InfraError>;
}

/// 配布先の調整
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceSettings {
    /// 最終学年 50 未満の学生と学科一覧から除外する学科コード
    pub excluded_departments: Vec<String>,
    /// サマリーの追加宛先
    pub extra_recipients:     Vec<String>,
    /// サマリーを送らない宛先
    pub excluded_recipients:  Vec<String>,
}

/// PostgreSQL 実装の RecipientSelector
#[derive(Debug, Clone)]
pub struct PostgresRecipientSelector {
    pool:     PgPool,
    audience: AudienceSettings,
}

impl PostgresRecipientSelector {
    pub fn new(pool: PgPool, audience: AudienceSettings) -> Self {
        Self { pool, audience }
    }

    fn excluded_departments(&self, skip: bool) -> &[String] {
        if skip {
            &self.audience.excluded_departments
        } else {
            &[]
        }
    }

    async fn select_students(
        &self,
        final_year: bool,
        min_points: Option<i64>,
        max_points: i64,
        skip_excluded_departments: bool,
    ) -> Result<Vec<Recipient>, InfraError> {
        let rows = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT
                s.enrollmentno,
                s.email,
                s.name,
                s.total_points::BIGINT AS total_points,
                s.pending_activities::BIGINT AS pending_activities,
                s.deptcode,
                s.batch,
                COALESCE(s.batch = fy.batch, FALSE) AS final_year
            FROM public."StudentsWithPointsandPendingActivitiesCount" s
            LEFT JOIN (
                SELECT batch FROM public."Batches" WHERE "IsFinalYear" = 'Yes' ORDER BY batch LIMIT 1
            ) fy ON TRUE
            WHERE s.batch IS NOT NULL
              AND COALESCE(s.batch = fy.batch, FALSE) = $1
              AND s.total_points::BIGINT < $2
              AND ($3::BIGINT IS NULL OR s.total_points::BIGINT >= $3)
              AND NOT COALESCE(s.deptcode = ANY($4), FALSE)
            ORDER BY s.enrollmentno
            "#,
        )
        .bind(final_year)
        .bind(max_points)
        .bind(min_points)
        .bind(self.excluded_departments(skip_excluded_departments))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Recipient::from).collect())
    }

    async fn select_verifiers(&self) -> Result<Vec<Recipient>, InfraError> {
        let rows = sqlx::query_as::<_, VerifierRow>(
            r#"
            SELECT
                p.verifier_email,
                p.pending_count,
                v.total_activities::BIGINT AS total_activities,
                v.avg_pending_days::FLOAT8 AS avg_pending_days,
                v.max_pending_days::FLOAT8 AS max_pending_days
            FROM (
                SELECT u."verifierEmail" AS verifier_email, COUNT(*)::BIGINT AS pending_count
                FROM public."User" u
                JOIN public."Activity" a ON u.email = a."ownerEmail"
                WHERE a.status = 'Pending'
                  AND u.userstatus = 'verified'
                  AND u."verifierEmail" IS NOT NULL
                GROUP BY u."verifierEmail"
            ) p
            LEFT JOIN public."VerifierStastics" v ON v."verifierEmail" = p.verifier_email
            ORDER BY p.verifier_email
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Recipient::from).collect())
    }

    async fn select_unallocated_departments(&self) -> Result<Vec<Recipient>, InfraError> {
        let rows = sqlx::query_as::<_, UnallocatedStudentRow>(
            r#"
            SELECT
                d.deptcode,
                d.deprepemail,
                u.enrollmentno,
                u.name,
                u.email,
                u.batch,
                u.userstatus
            FROM public."User" u
            JOIN public."Departments" d ON d.deptcode = u.deptcode
            WHERE u."verifierEmail" IS NULL
              AND u.role = 'student'
            ORDER BY d.deptcode, u.enrollmentno NULLS LAST, u.email
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(unallocated_departments(rows))
    }

    async fn select_department_staff(&self, max_points: i64) -> Result<Vec<Recipient>, InfraError> {
        let rows = sqlx::query_as::<_, DepartmentRosterRow>(
            r#"
            SELECT
                d.deptcode,
                d.deprep,
                d.deprepemail,
                d.hodname,
                d.hodemail,
                s.enrollmentno,
                s.name,
                s.email,
                s.total_points::BIGINT AS total_points,
                s.pending_activities::BIGINT AS pending_activities,
                s.batch
            FROM public."StudentsWithPointsandPendingActivitiesCount" s
            JOIN public."Departments" d ON d.deptcode = s.deptcode
            JOIN (
                SELECT batch FROM public."Batches" WHERE "IsFinalYear" = 'Yes' ORDER BY batch LIMIT 1
            ) fy ON fy.batch = s.batch
            WHERE s.total_points::BIGINT < $1
              AND NOT (d.deptcode = ANY($2))
            ORDER BY d.deptcode, s.enrollmentno
            "#,
        )
        .bind(max_points)
        .bind(self.excluded_departments(true))
        .fetch_all(&self.pool)
        .await?;

        Ok(department_staff(rows))
    }

    async fn select_verifier_rosters(
        &self,
        min_points: i64,
        max_points: i64,
    ) -> Result<Vec<Recipient>, InfraError> {
        let rows = sqlx::query_as::<_, VerifierRosterRow>(
            r#"
            SELECT
                s."verifierEmail" AS verifier_email,
                s.enrollmentno,
                s.name,
                s.email,
                s.total_points::BIGINT AS total_points,
                s.pending_activities::BIGINT AS pending_activities,
                s.deptcode,
                s.batch
            FROM public."StudentsWithPointsandPendingActivitiesCount" s
            JOIN (
                SELECT batch FROM public."Batches" WHERE "IsFinalYear" = 'Yes' ORDER BY batch LIMIT 1
            ) fy ON fy.batch = s.batch
            WHERE s."verifierEmail" IS NOT NULL
              AND s."verifierEmail" <> ''
              AND s.total_points::BIGINT >= $1
              AND s.total_points::BIGINT < $2
            ORDER BY s."verifierEmail", s.enrollmentno
            "#,
        )
        .bind(min_points)
        .bind(max_points)
        .fetch_all(&self.pool)
        .await?;

        Ok(verifier_rosters(rows))
    }

    async fn select_report_audience(&self) -> Result<Vec<Recipient>, InfraError> {
        let addresses: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT email FROM (
                SELECT deprepemail AS email FROM public."Departments"
                UNION
                SELECT hodemail FROM public."Departments"
                UNION
                SELECT "verifierEmail" FROM public."VerifierStastics"
            ) audience
            WHERE email IS NOT NULL AND email <> ''
            ORDER BY email
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(merge_audience(addresses, &self.audience))
    }
}

#[async_trait]
impl RecipientSelector for PostgresRecipientSelector {
    async fn select(&self, job: &JobDefinition) -> Result<Vec<Recipient>, InfraError> {
        let recipients = match job.cohort {
            Cohort::Students {
                final_year,
                min_points,
                max_points,
                skip_excluded_departments,
            } => {
                self.select_students(final_year, min_points, max_points, skip_excluded_departments)
                    .await?
            }
            Cohort::VerifiersWithPendingActivities => self.select_verifiers().await?,
            Cohort::DepartmentsWithUnallocatedStudents => {
                self.select_unallocated_departments().await?
            }
            Cohort::DepartmentStaffRoster { max_points } => {
                self.select_department_staff(max_points).await?
            }
            Cohort::VerifierRoster {
                min_points,
                max_points,
            } => self.select_verifier_rosters(min_points, max_points).await?,
            Cohort::ReportAudience => self.select_report_audience().await?,
        };

        tracing::debug!(
            job.kind = %job.kind,
            recipients = recipients.len(),
            "受信者を選択しました"
        );
        Ok(recipients)
    }
}

/// データベースの配布先と設定の追加宛先を合わせ、除外宛先を取り除く
///
/// メールアドレスは大文字小文字を区別せずに重複を除き、昇順に並べる。
pub fn merge_audience(addresses: Vec<String>, settings: &AudienceSettings) -> Vec<Recipient> {
    let excluded: Vec<String> = settings
        .excluded_recipients
        .iter()
        .map(|a| a.trim().to_lowercase())
        .collect();

    addresses
        .into_iter()
        .chain(settings.extra_recipients.iter().cloned())
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty() && !excluded.contains(a))
        .sorted()
        .dedup()
        .map(|address| Recipient::new(RecipientId::new(address.clone()), address))
        .collect()
}

/// 学科ごとに未割り当て学生をまとめ、学科担当者を受信者にする
fn unallocated_departments(rows: Vec<UnallocatedStudentRow>) -> Vec<Recipient> {
    let mut recipients = Vec::new();

    for (deptcode, group) in &rows.into_iter().chunk_by(|row| row.deptcode.clone()) {
        let group: Vec<UnallocatedStudentRow> = group.collect();
        let rep_email = group
            .first()
            .and_then(|row| row.deprepemail.clone())
            .unwrap_or_default();
        let roster: Vec<RosterEntry> = group
            .into_iter()
            .map(|row| RosterEntry {
                enrollment_no: row.enrollmentno,
                name: row.name,
                email: row.email,
                department: Some(deptcode.clone()),
                batch: row.batch,
                status: row.userstatus,
                ..Default::default()
            })
            .collect();

        recipients.push(
            Recipient::new(RecipientId::new(deptcode.clone()), rep_email)
                .with_department(deptcode)
                .with_pending_activities(roster.len() as i64)
                .with_roster(roster),
        );
    }

    recipients
}

/// 学科ごとに学生をまとめ、学科担当者と学科長を受信者にする
///
/// 担当者と学科長が同じアドレスなら 1 通にする。どちらも未登録の学科は
/// 宛先の無い受信者として残し、送信時にスキップとして記録させる。
fn department_staff(rows: Vec<DepartmentRosterRow>) -> Vec<Recipient> {
    let mut recipients = Vec::new();

    for (deptcode, group) in &rows.into_iter().chunk_by(|row| row.deptcode.clone()) {
        let group: Vec<DepartmentRosterRow> = group.collect();
        let Some(first) = group.first() else {
            continue;
        };

        let contacts: Vec<(Option<String>, String)> = [
            (first.deprep.clone(), first.deprepemail.clone()),
            (first.hodname.clone(), first.hodemail.clone()),
        ]
        .into_iter()
        .filter_map(|(name, email)| {
            let email = email?.trim().to_lowercase();
            (!email.is_empty()).then_some((name, email))
        })
        .unique_by(|(_, email)| email.clone())
        .collect();

        let roster: Vec<RosterEntry> = group
            .into_iter()
            .map(|row| RosterEntry {
                enrollment_no: Some(row.enrollmentno),
                name: row.name,
                email: row.email,
                department: Some(deptcode.clone()),
                batch: row.batch,
                points: row.total_points,
                pending_activities: row.pending_activities,
                status: None,
            })
            .collect();

        if contacts.is_empty() {
            recipients.push(
                Recipient::new(RecipientId::new(deptcode.clone()), "")
                    .with_department(deptcode)
                    .with_roster(roster),
            );
            continue;
        }

        for (name, email) in contacts {
            let mut recipient =
                Recipient::new(RecipientId::new(format!("{deptcode}:{email}")), email)
                    .with_department(deptcode.clone())
                    .with_roster(roster.clone());
            recipient.name = name;
            recipients.push(recipient);
        }
    }

    recipients
}

/// 検証者ごとに担当学生をまとめる
fn verifier_rosters(rows: Vec<VerifierRosterRow>) -> Vec<Recipient> {
    let mut recipients = Vec::new();

    for (verifier_email, group) in &rows.into_iter().chunk_by(|row| row.verifier_email.clone()) {
        let roster: Vec<RosterEntry> = group
            .map(|row| RosterEntry {
                enrollment_no: Some(row.enrollmentno),
                name: row.name,
                email: row.email,
                department: row.deptcode,
                batch: row.batch,
                points: row.total_points,
                pending_activities: row.pending_activities,
                status: None,
            })
            .collect();

        recipients.push(
            Recipient::new(RecipientId::new(verifier_email.clone()), verifier_email)
                .with_roster(roster),
        );
    }

    recipients
}

// ===== 行の型 =====

#[derive(Debug, sqlx::FromRow)]
struct StudentRow {
    enrollmentno:       String,
    email:              Option<String>,
    name:               Option<String>,
    total_points:       Option<i64>,
    pending_activities: Option<i64>,
    deptcode:           Option<String>,
    batch:              Option<String>,
    final_year:         bool,
}

impl From<StudentRow> for Recipient {
    fn from(row: StudentRow) -> Self {
        Self {
            id:                 RecipientId::new(row.enrollmentno),
            email:              row.email.unwrap_or_default(),
            name:               row.name,
            balance:            row.total_points,
            pending_activities: row.pending_activities,
            department:         row.deptcode,
            batch:              row.batch,
            final_year:         row.final_year,
            statistics:         None,
            roster:             Vec::new(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VerifierRow {
    verifier_email:   String,
    pending_count:    i64,
    total_activities: Option<i64>,
    avg_pending_days: Option<f64>,
    max_pending_days: Option<f64>,
}

impl From<VerifierRow> for Recipient {
    fn from(row: VerifierRow) -> Self {
        let statistics = match (row.total_activities, row.avg_pending_days, row.max_pending_days) {
            (Some(total_activities), Some(avg_pending_days), Some(max_pending_days)) => {
                Some(VerifierStatistics {
                    total_activities,
                    avg_pending_days,
                    max_pending_days,
                })
            }
            _ => None,
        };

        Self {
            statistics,
            ..Recipient::new(RecipientId::new(row.verifier_email.clone()), row.verifier_email)
                .with_pending_activities(row.pending_count)
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UnallocatedStudentRow {
    deptcode:     String,
    deprepemail:  Option<String>,
    enrollmentno: Option<String>,
    name:         Option<String>,
    email:        Option<String>,
    batch:        Option<String>,
    userstatus:   Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct DepartmentRosterRow {
    deptcode:           String,
    deprep:             Option<String>,
    deprepemail:        Option<String>,
    hodname:            Option<String>,
    hodemail:           Option<String>,
    enrollmentno:       String,
    name:               Option<String>,
    email:              Option<String>,
    total_points:       Option<i64>,
    pending_activities: Option<i64>,
    batch:              Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct VerifierRosterRow {
    verifier_email:     String,
    enrollmentno:       String,
    name:               Option<String>,
    email:              Option<String>,
    total_points:       Option<i64>,
    pending_activities: Option<i64>,
    deptcode:           Option<String>,
    batch:              Option<String>,
}

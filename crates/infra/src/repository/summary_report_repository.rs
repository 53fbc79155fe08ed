//! # SummaryReportRepository
//!
//! サマリーメールの本文になる集計を読み出す。
//! `AdminSummary` ビュー（学科・学年ごとのポイント分布）と
//! `VerifierStastics` ビュー（検証者ごとの処理状況）が集計元。

use async_trait::async_trait;
use ihundred_domain::report::{DepartmentSummary, SummaryReport, VerifierPerformance};
use sqlx::PgPool;

use crate::error::InfraError;

#[async_trait]
pub trait SummaryReportRepository: Send + Sync {
    async fn load(&self) -> Result<SummaryReport, InfraError>;
}

/// 集計から外す学科・学年
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportScope {
    pub excluded_departments: Vec<String>,
    /// 卒業済みの古いバッチなど
    pub excluded_batches:     Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PostgresSummaryReportRepository {
    pool:  PgPool,
    scope: ReportScope,
}

impl PostgresSummaryReportRepository {
    pub fn new(pool: PgPool, scope: ReportScope) -> Self {
        Self { pool, scope }
    }

    async fn final_year_batch(&self) -> Result<Option<String>, InfraError> {
        let batch = sqlx::query_scalar::<_, String>(
            r#"
            SELECT batch FROM public."Batches"
            WHERE "IsFinalYear" = 'Yes'
            ORDER BY batch
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    async fn departments(&self) -> Result<Vec<DepartmentSummary>, InfraError> {
        let rows = sqlx::query_as::<_, DepartmentRow>(
            r#"
            SELECT
                deptcode,
                batch,
                COALESCE(gte100, 0)::BIGINT AS gte100,
                COALESCE(gte75, 0)::BIGINT AS gte75,
                COALESCE(gte50, 0)::BIGINT AS gte50,
                COALESCE(lt50, 0)::BIGINT AS lt50
            FROM public."AdminSummary"
            WHERE deptcode IS NOT NULL
              AND batch IS NOT NULL
              AND NOT (deptcode = ANY($1))
              AND NOT (batch = ANY($2))
            ORDER BY batch, deptcode
            "#,
        )
        .bind(self.scope.excluded_departments.as_slice())
        .bind(self.scope.excluded_batches.as_slice())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DepartmentSummary {
                department: row.deptcode,
                batch:      row.batch,
                gte100:     row.gte100,
                gte75:      row.gte75,
                gte50:      row.gte50,
                lt50:       row.lt50,
            })
            .collect())
    }

    async fn verifiers(&self) -> Result<Vec<VerifierPerformance>, InfraError> {
        let rows = sqlx::query_as::<_, VerifierPerformanceRow>(
            r#"
            SELECT
                "verifierEmail" AS verifier_email,
                total_activities::BIGINT AS total_activities,
                pending_count::BIGINT AS pending_count,
                avg_pending_days::FLOAT8 AS avg_pending_days,
                max_pending_days::FLOAT8 AS max_pending_days,
                performance_status
            FROM public."VerifierStastics"
            WHERE "verifierEmail" IS NOT NULL
              AND total_activities IS NOT NULL
              AND pending_count IS NOT NULL
              AND avg_pending_days IS NOT NULL
              AND max_pending_days IS NOT NULL
              AND performance_status IS NOT NULL
            ORDER BY pending_count DESC, "verifierEmail"
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| VerifierPerformance {
                verifier_email:   row.verifier_email,
                total_activities: row.total_activities,
                pending_count:    row.pending_count,
                avg_pending_days: row.avg_pending_days,
                max_pending_days: row.max_pending_days,
                remarks:          row.performance_status,
            })
            .collect())
    }
}

#[async_trait]
impl SummaryReportRepository for PostgresSummaryReportRepository {
    async fn load(&self) -> Result<SummaryReport, InfraError> {
        let final_year_batch = self.final_year_batch().await?;
        let departments = self.departments().await?;
        let verifiers = self.verifiers().await?;

        tracing::debug!(
            departments = departments.len(),
            verifiers = verifiers.len(),
            final_year_batch = final_year_batch.as_deref().unwrap_or("-"),
            "サマリーレポートを読み込みました"
        );

        Ok(SummaryReport {
            final_year_batch,
            departments,
            verifiers,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DepartmentRow {
    deptcode: String,
    batch:    String,
    gte100:   i64,
    gte75:    i64,
    gte50:    i64,
    lt50:     i64,
}

#[derive(Debug, sqlx::FromRow)]
struct VerifierPerformanceRow {
    verifier_email:     String,
    total_activities:   i64,
    pending_count:      i64,
    avg_pending_days:   f64,
    max_pending_days:   f64,
    performance_status: String,
}

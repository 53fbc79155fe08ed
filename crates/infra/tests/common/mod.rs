//! テスト共通フィクスチャ
//!
//! `tests/schema` のテーブルに行を入れるヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use sqlx::PgPool;

/// 最終学年のバッチ
pub const FINAL_YEAR: &str = "2022-2026";
/// 最終学年以外のバッチ
pub const THIRD_YEAR: &str = "2023-2027";

pub async fn insert_batch(pool: &PgPool, batch: &str, final_year: bool) {
    sqlx::query(r#"INSERT INTO public."Batches" (batch, "IsFinalYear") VALUES ($1, $2)"#)
        .bind(batch)
        .bind(if final_year { "Yes" } else { "No" })
        .execute(pool)
        .await
        .unwrap();
}

/// 最終学年と 3 年生のバッチを登録する
pub async fn setup_batches(pool: &PgPool) {
    insert_batch(pool, FINAL_YEAR, true).await;
    insert_batch(pool, THIRD_YEAR, false).await;
}

pub async fn insert_department(
    pool: &PgPool,
    deptcode: &str,
    rep_email: Option<&str>,
    hod_email: Option<&str>,
) {
    sqlx::query(
        r#"
        INSERT INTO public."Departments" (deptcode, name, deprep, deprepemail, hodname, hodemail)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(deptcode)
    .bind(format!("Department of {deptcode}"))
    .bind(format!("Rep {deptcode}"))
    .bind(rep_email)
    .bind(format!("Hod {deptcode}"))
    .bind(hod_email)
    .execute(pool)
    .await
    .unwrap();
}

/// 学生ごとのポイント集計の 1 行
pub struct StudentPoints<'a> {
    pub enrollmentno: &'a str,
    pub email:        Option<&'a str>,
    pub deptcode:     &'a str,
    pub batch:        Option<&'a str>,
    pub verifier:     Option<&'a str>,
    pub total_points: i32,
}

impl<'a> StudentPoints<'a> {
    /// CE 学科、宛先あり、検証者なしの学生
    pub fn new(enrollmentno: &'a str, batch: Option<&'a str>, total_points: i32) -> Self {
        Self {
            enrollmentno,
            email: Some("student@scet.ac.in"),
            deptcode: "CE",
            batch,
            verifier: None,
            total_points,
        }
    }

    pub fn in_department(mut self, deptcode: &'a str) -> Self {
        self.deptcode = deptcode;
        self
    }

    pub fn verified_by(mut self, verifier: &'a str) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn without_email(mut self) -> Self {
        self.email = None;
        self
    }
}

pub async fn insert_student_points(pool: &PgPool, student: StudentPoints<'_>) {
    sqlx::query(
        r#"
        INSERT INTO public."StudentsWithPointsandPendingActivitiesCount"
            (enrollmentno, name, email, deptcode, batch, "verifierEmail", total_points, pending_activities)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
        "#,
    )
    .bind(student.enrollmentno)
    .bind(format!("Student {}", student.enrollmentno))
    .bind(student.email)
    .bind(student.deptcode)
    .bind(student.batch)
    .bind(student.verifier)
    .bind(student.total_points)
    .execute(pool)
    .await
    .unwrap();
}

/// 学生ユーザーを登録する
pub async fn insert_student_user(
    pool: &PgPool,
    enrollmentno: &str,
    deptcode: &str,
    verifier: Option<&str>,
    status: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO public."User"
            (name, email, role, "verifierEmail", deptcode, batch, enrollmentno, userstatus)
        VALUES ($1, $2, 'student', $3, $4, $5, $6, $7)
        "#,
    )
    .bind(format!("Student {enrollmentno}"))
    .bind(format!("{}@scet.ac.in", enrollmentno.to_lowercase()))
    .bind(verifier)
    .bind(deptcode)
    .bind(THIRD_YEAR)
    .bind(enrollmentno)
    .bind(status)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn insert_activity(pool: &PgPool, owner_email: &str, status: &str) {
    sqlx::query(r#"INSERT INTO public."Activity" ("ownerEmail", status) VALUES ($1, $2)"#)
        .bind(owner_email)
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_verifier_statistics(
    pool: &PgPool,
    verifier: &str,
    pending_count: Option<i32>,
    performance_status: Option<&str>,
) {
    sqlx::query(
        r#"
        INSERT INTO public."VerifierStastics"
            ("verifierEmail", total_activities, pending_count, avg_pending_days, max_pending_days, performance_status)
        VALUES ($1, 100, $2, 2.5, 9, $3)
        "#,
    )
    .bind(verifier)
    .bind(pending_count)
    .bind(performance_status)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn insert_admin_summary(pool: &PgPool, deptcode: &str, batch: &str, lt50: i32) {
    sqlx::query(
        r#"
        INSERT INTO public."AdminSummary" (deptcode, batch, gte100, gte75, gte50, lt50)
        VALUES ($1, $2, 10, 5, 3, $3)
        "#,
    )
    .bind(deptcode)
    .bind(batch)
    .bind(lt50)
    .execute(pool)
    .await
    .unwrap();
}

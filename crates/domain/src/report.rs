//! # サマリーレポート
//!
//! 学科・学年ごとのポイント到達状況と、検証者ごとの処理状況をまとめたもの。
//! サマリージョブのメール本文になる。

use serde::Serialize;

/// 学科・学年ごとのポイント分布
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentSummary {
    pub department: String,
    pub batch:      String,
    /// 100 ポイント以上
    pub gte100:     i64,
    /// 75 以上 100 未満
    pub gte75:      i64,
    /// 50 以上 75 未満
    pub gte50:      i64,
    /// 50 未満
    pub lt50:       i64,
}

impl DepartmentSummary {
    /// 登録学生数
    pub fn registered(&self) -> i64 {
        self.gte100 + self.gte75 + self.gte50 + self.lt50
    }
}

/// 検証者ごとの処理状況
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifierPerformance {
    pub verifier_email:   String,
    pub total_activities: i64,
    pub pending_count:    i64,
    pub avg_pending_days: f64,
    pub max_pending_days: f64,
    /// ビュー側で算出された評価（例: "Good", "Needs Attention"）
    pub remarks:          String,
}

/// サマリーレポート
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    /// 最終学年のバッチ（未登録なら `None`）
    pub final_year_batch: Option<String>,
    pub departments:      Vec<DepartmentSummary>,
    pub verifiers:        Vec<VerifierPerformance>,
}

impl SummaryReport {
    /// 最終学年で 50 ポイント未満の学生がいる行か（本文で強調表示する）
    pub fn is_highlighted(&self, row: &DepartmentSummary) -> bool {
        self.final_year_batch.as_deref() == Some(row.batch.as_str()) && row.lt50 > 0
    }

    /// 全学科の登録学生数
    pub fn total_registered(&self) -> i64 {
        self.departments.iter().map(DepartmentSummary::registered).sum()
    }

    /// 全検証者の保留件数
    pub fn total_pending(&self) -> i64 {
        self.verifiers.iter().map(|v| v.pending_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(batch: &str, lt50: i64) -> DepartmentSummary {
        DepartmentSummary {
            department: "CO".into(),
            batch: batch.into(),
            gte100: 10,
            gte75: 5,
            gte50: 3,
            lt50,
        }
    }

    #[test]
    fn test_登録学生数は4区分の合計() {
        assert_eq!(row("2022-2026", 2).registered(), 20);
    }

    #[test]
    fn test_最終学年で50未満がいる行だけ強調する() {
        let report = SummaryReport {
            final_year_batch: Some("2022-2026".into()),
            departments:      vec![row("2022-2026", 2), row("2022-2026", 0), row("2023-2027", 4)],
            verifiers:        vec![],
        };

        let highlighted: Vec<bool> = report
            .departments
            .iter()
            .map(|r| report.is_highlighted(r))
            .collect();

        assert_eq!(highlighted, vec![true, false, false]);
        assert_eq!(report.total_registered(), 18 * 3 + 6);
    }

    #[test]
    fn test_最終学年が不明なら強調しない() {
        let report = SummaryReport {
            final_year_batch: None,
            departments:      vec![row("2022-2026", 2)],
            verifiers:        vec![],
        };

        assert!(!report.is_highlighted(&report.departments[0]));
    }
}

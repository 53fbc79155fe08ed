//! # ジョブ定義
//!
//! 学生・検証者・学科宛ての通知ジョブとサマリージョブは、すべて 1 つの
//! パラメータ化された [`JobDefinition`] で表現する。ジョブ種別ごとに異なるのは次の 4 点だけ:
//!
//! - 対象者の選び方（[`Cohort`]）
//! - 使用するテンプレート
//! - テンプレートが必須とする受信者属性
//! - 送信前に再確認する条件（[`SendCriteria`]）
//!
//! 定義はジョブ開始時に一度だけ組み立て、実行中は変更しない。

use serde::{Deserialize, Serialize};

use crate::recipient::{Recipient, RecipientField};

/// ジョブ種別
///
/// バイナリ名・ログの `job.kind`・テンプレート名はすべて snake_case 表記に揃える。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// 最終学年以外で 100 ポイント未満の学生への定期リマインダー
    GeneralReminder,
    /// 最終学年で 50 ポイント未満の学生への警告
    Lt50FinalYear,
    /// 最終学年で 50 以上 100 ポイント未満の学生への警告
    Lt100FinalYear,
    /// 最終学年で 50 ポイント未満の学生一覧を学科担当者と学科長へ
    Lt50DepartmentRoster,
    /// 最終学年で 50 以上 100 ポイント未満の学生一覧を担当検証者へ
    Lt100VerifierRoster,
    /// 検証待ちアクティビティを抱える検証者への催促
    PendingVerification,
    /// 検証者未割り当ての学生がいる学科の担当者への通知
    Unallocated,
    /// 学科担当者・学科長・検証者への集計レポート
    Summary,
}

/// 対象者の選択条件
///
/// SQL そのものは infra 層が持つ。ドメイン側は条件の意味だけを表現する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cohort {
    /// ポイントが `[min_points, max_points)` の学生
    ///
    /// `skip_excluded_departments` が真なら、設定の除外学科（既定は ASH, DET）の学生を外す。
    Students {
        final_year: bool,
        min_points: Option<i64>,
        max_points: i64,
        skip_excluded_departments: bool,
    },
    /// 最終学年で `max_points` 未満の学生がいる学科の担当者と学科長（除外学科を除く）
    DepartmentStaffRoster { max_points: i64 },
    /// 最終学年で `[min_points, max_points)` の学生を担当する検証者
    VerifierRoster { min_points: i64, max_points: i64 },
    /// 検証済み学生の保留中アクティビティを担当している検証者
    VerifiersWithPendingActivities,
    /// 検証者未割り当ての学生がいる学科の担当者
    DepartmentsWithUnallocatedStudents,
    /// サマリーレポートの配布先（学科担当者、学科長、検証者、追加宛先）
    ReportAudience,
}

/// 送信前の再確認条件
///
/// 選択クエリの結果を信用しきらず、描画前にもう一度受信者の属性を確認する。
/// 条件を満たさない受信者は「条件によるスキップ」になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SendCriteria {
    /// ポイントが `threshold` 未満
    BalanceBelow { threshold: i64 },
    /// ポイントが `[min, max)`
    BalanceBetween { min: i64, max: i64 },
    /// 保留中件数が `minimum` 以上
    PendingAtLeast { minimum: i64 },
}

impl SendCriteria {
    pub fn matches(&self, recipient: &Recipient) -> bool {
        match *self {
            Self::BalanceBelow { threshold } => recipient.balance.is_some_and(|b| b < threshold),
            Self::BalanceBetween { min, max } => {
                recipient.balance.is_some_and(|b| min <= b && b < max)
            }
            Self::PendingAtLeast { minimum } => recipient
                .pending_activities
                .is_some_and(|count| count >= minimum),
        }
    }

    /// スキップ理由としてログ・サマリーに残す説明
    pub fn describe(&self) -> String {
        match *self {
            Self::BalanceBelow { threshold } => format!("balance < {threshold}"),
            Self::BalanceBetween { min, max } => format!("{min} <= balance < {max}"),
            Self::PendingAtLeast { minimum } => format!("pending >= {minimum}"),
        }
    }
}

/// ジョブ定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefinition {
    pub kind:            JobKind,
    pub cohort:          Cohort,
    /// テンプレート名（拡張子なし。`.html` と `.txt` の 2 つが対になる）
    pub template:        &'static str,
    pub required_fields: &'static [RecipientField],
    pub criteria:        Option<SendCriteria>,
}

impl JobDefinition {
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::GeneralReminder => Self {
                kind,
                cohort: Cohort::Students {
                    final_year: false,
                    min_points: None,
                    max_points: 100,
                    skip_excluded_departments: false,
                },
                template: "general_reminder",
                required_fields: &[],
                criteria: Some(SendCriteria::BalanceBelow { threshold: 100 }),
            },
            JobKind::Lt50FinalYear => Self {
                kind,
                cohort: Cohort::Students {
                    final_year: true,
                    min_points: None,
                    max_points: 50,
                    skip_excluded_departments: true,
                },
                template: "lt50_final_year",
                required_fields: &[RecipientField::Balance],
                criteria: Some(SendCriteria::BalanceBelow { threshold: 50 }),
            },
            JobKind::Lt100FinalYear => Self {
                kind,
                cohort: Cohort::Students {
                    final_year: true,
                    min_points: Some(50),
                    max_points: 100,
                    skip_excluded_departments: false,
                },
                template: "lt100_final_year",
                required_fields: &[RecipientField::Balance],
                criteria: Some(SendCriteria::BalanceBetween { min: 50, max: 100 }),
            },
            JobKind::Lt50DepartmentRoster => Self {
                kind,
                cohort: Cohort::DepartmentStaffRoster { max_points: 50 },
                template: "lt50_department_roster",
                required_fields: &[RecipientField::Department, RecipientField::Roster],
                criteria: None,
            },
            JobKind::Lt100VerifierRoster => Self {
                kind,
                cohort: Cohort::VerifierRoster {
                    min_points: 50,
                    max_points: 100,
                },
                template: "lt100_verifier_roster",
                required_fields: &[RecipientField::Roster],
                criteria: None,
            },
            JobKind::PendingVerification => Self {
                kind,
                cohort: Cohort::VerifiersWithPendingActivities,
                template: "pending_verification",
                required_fields: &[RecipientField::PendingActivities],
                criteria: Some(SendCriteria::PendingAtLeast { minimum: 1 }),
            },
            JobKind::Unallocated => Self {
                kind,
                cohort: Cohort::DepartmentsWithUnallocatedStudents,
                template: "unallocated",
                required_fields: &[RecipientField::Department, RecipientField::PendingActivities],
                criteria: Some(SendCriteria::PendingAtLeast { minimum: 1 }),
            },
            JobKind::Summary => Self {
                kind,
                cohort: Cohort::ReportAudience,
                template: "summary",
                required_fields: &[],
                criteria: None,
            },
        }
    }

    /// 受信者に欠けている必須属性（最初の 1 つ）
    pub fn missing_field(&self, recipient: &Recipient) -> Option<RecipientField> {
        self.required_fields
            .iter()
            .copied()
            .find(|field| !field.is_present(recipient))
    }

    /// サマリーレポートを本文に含むジョブか
    pub fn needs_summary_report(&self) -> bool {
        self.cohort == Cohort::ReportAudience
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::recipient::RecipientId;

    fn student(balance: i64) -> Recipient {
        Recipient::new(RecipientId::new("1"), "a@x.com").with_balance(balance)
    }

    #[rstest]
    #[case(JobKind::GeneralReminder, "general_reminder")]
    #[case(JobKind::Lt50FinalYear, "lt50_final_year")]
    #[case(JobKind::Lt100FinalYear, "lt100_final_year")]
    #[case(JobKind::Lt50DepartmentRoster, "lt50_department_roster")]
    #[case(JobKind::Lt100VerifierRoster, "lt100_verifier_roster")]
    #[case(JobKind::PendingVerification, "pending_verification")]
    #[case(JobKind::Unallocated, "unallocated")]
    #[case(JobKind::Summary, "summary")]
    fn test_ジョブ種別とテンプレート名は同じ表記になる(#[case] kind: JobKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
        assert_eq!(JobDefinition::for_kind(kind).template, expected);
        assert_eq!(JobKind::from_str(expected).unwrap(), kind);
    }

    #[test]
    fn test_すべての種別に定義がある() {
        for kind in JobKind::iter() {
            assert_eq!(JobDefinition::for_kind(kind).kind, kind);
        }
    }

    #[rstest]
    #[case(SendCriteria::BalanceBelow { threshold: 50 }, 49, true)]
    #[case(SendCriteria::BalanceBelow { threshold: 50 }, 50, false)]
    #[case(SendCriteria::BalanceBetween { min: 50, max: 100 }, 50, true)]
    #[case(SendCriteria::BalanceBetween { min: 50, max: 100 }, 99, true)]
    #[case(SendCriteria::BalanceBetween { min: 50, max: 100 }, 100, false)]
    #[case(SendCriteria::BalanceBetween { min: 50, max: 100 }, 30, false)]
    fn test_ポイント条件の境界(
        #[case] criteria: SendCriteria,
        #[case] balance: i64,
        #[case] expected: bool,
    ) {
        assert_eq!(criteria.matches(&student(balance)), expected);
    }

    #[test]
    fn test_ポイント不明の受信者はポイント条件を満たさない() {
        let recipient = Recipient::new(RecipientId::new("1"), "a@x.com");

        assert!(!SendCriteria::BalanceBelow { threshold: 100 }.matches(&recipient));
    }

    #[test]
    fn test_保留件数条件は件数で判定する() {
        let criteria = SendCriteria::PendingAtLeast { minimum: 1 };
        let verifier = Recipient::new(RecipientId::new("v@x.com"), "v@x.com");

        assert!(!criteria.matches(&verifier.clone().with_pending_activities(0)));
        assert!(criteria.matches(&verifier.with_pending_activities(4)));
    }

    #[test]
    fn test_必須属性が欠けていればその属性を返す() {
        let job = JobDefinition::for_kind(JobKind::Unallocated);
        let rep = Recipient::new(RecipientId::new("CO"), "rep@x.com").with_department("CO");

        assert_eq!(job.missing_field(&rep), Some(RecipientField::PendingActivities));
        assert_eq!(job.missing_field(&rep.with_pending_activities(2)), None);
    }

    #[rstest]
    #[case(JobKind::GeneralReminder, false)]
    #[case(JobKind::Lt50FinalYear, true)]
    #[case(JobKind::Lt100FinalYear, false)]
    fn test_除外学科を外すのは最終学年50未満の学生だけ(#[case] kind: JobKind, #[case] expected: bool) {
        let Cohort::Students {
            skip_excluded_departments,
            ..
        } = JobDefinition::for_kind(kind).cohort
        else {
            panic!("学生向けのジョブではありません");
        };

        assert_eq!(skip_excluded_departments, expected);
    }

    #[test]
    fn test_一覧ジョブは学生一覧が無ければ送らない() {
        let job = JobDefinition::for_kind(JobKind::Lt100VerifierRoster);
        let verifier = Recipient::new(RecipientId::new("v@x.com"), "v@x.com");

        assert_eq!(job.missing_field(&verifier), Some(RecipientField::Roster));
        assert_eq!(
            job.missing_field(&verifier.with_roster(vec![Default::default()])),
            None
        );
    }

    #[test]
    fn test_サマリージョブだけがレポートを必要とする() {
        for kind in JobKind::iter() {
            let expected = kind == JobKind::Summary;
            assert_eq!(JobDefinition::for_kind(kind).needs_summary_report(), expected);
        }
    }

    #[test]
    fn test_条件の説明は範囲を表す() {
        assert_eq!(
            SendCriteria::BalanceBetween { min: 50, max: 100 }.describe(),
            "50 <= balance < 100"
        );
    }
}

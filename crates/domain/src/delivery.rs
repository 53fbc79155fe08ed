//! # 配信結果と実行サマリー
//!
//! 1 回の実行（プロセス起動）の間だけ存在するモデル。実行をまたいだ状態は持たない。
//!
//! ## 不変条件
//!
//! 選択された受信者はそれぞれ、ちょうど 1 つの最終結果
//! （送信済み / 再試行後の失敗 / スキップ）を持つ。
//! [`RunSummary::record`] は同じ受信者への 2 件目の記録を拒否するので、
//! 実行内で同じ受信者に二度送ることはない。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::{
    job::JobKind,
    recipient::{RecipientField, RecipientId},
};

define_uuid_id! {
    /// 実行 ID
    ///
    /// プロセス起動ごとに採番し、ログの `run.id` とサマリーに残す。
    pub struct RunId;
}

/// スキップ理由
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// 宛先が無い
    #[display("宛先がありません")]
    MissingAddress,
    /// 送信条件を満たさない
    #[display("送信条件を満たしません: {_0}")]
    Criteria(String),
    /// 必須属性が無い
    #[display("必須属性 {_0} がありません")]
    MissingField(RecipientField),
    /// テンプレートの描画に失敗
    #[display("描画に失敗しました: {_0}")]
    Render(String),
}

/// 配信結果（最終状態）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// 再試行を尽くした、または恒久的エラーで失敗
    Failed { error: String },
    Skipped { reason: SkipReason },
}

/// 配信試行の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAttempt {
    pub recipient_id:   RecipientId,
    pub job_kind:       JobKind,
    pub run_started_at: DateTime<Utc>,
    pub outcome:        DeliveryOutcome,
    /// 初回を除いた再試行回数
    pub retry_count:    u32,
}

/// 失敗した受信者と最後のエラー
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRecipient {
    pub recipient_id: RecipientId,
    pub error:        String,
    pub retry_count:  u32,
}

/// 結果ごとの件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub sent:    usize,
    pub failed:  usize,
    pub skipped: usize,
}

impl OutcomeCounts {
    pub fn total(&self) -> usize {
        self.sent + self.failed + self.skipped
    }
}

/// 同じ受信者の結果を 2 度記録しようとした
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("受信者 {0} の結果は記録済みです")]
pub struct AlreadyRecorded(pub RecipientId);

/// 実行サマリー
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    run_id:      RunId,
    job_kind:    JobKind,
    started_at:  DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    counts:      OutcomeCounts,
    failed:      Vec<FailedRecipient>,
    attempts:    Vec<DeliveryAttempt>,
    #[serde(skip)]
    recorded:    HashSet<RecipientId>,
}

impl RunSummary {
    pub fn new(run_id: RunId, job_kind: JobKind, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            job_kind,
            started_at,
            finished_at: None,
            counts: OutcomeCounts::default(),
            failed: Vec::new(),
            attempts: Vec::new(),
            recorded: HashSet::new(),
        }
    }

    /// この受信者の結果が記録済みか
    pub fn contains(&self, recipient_id: &RecipientId) -> bool {
        self.recorded.contains(recipient_id)
    }

    /// 最終結果を記録する
    pub fn record(&mut self, attempt: DeliveryAttempt) -> Result<(), AlreadyRecorded> {
        if !self.recorded.insert(attempt.recipient_id.clone()) {
            return Err(AlreadyRecorded(attempt.recipient_id));
        }

        match &attempt.outcome {
            DeliveryOutcome::Sent => self.counts.sent += 1,
            DeliveryOutcome::Failed { error } => {
                self.counts.failed += 1;
                self.failed.push(FailedRecipient {
                    recipient_id: attempt.recipient_id.clone(),
                    error:        error.clone(),
                    retry_count:  attempt.retry_count,
                });
            }
            DeliveryOutcome::Skipped { .. } => self.counts.skipped += 1,
        }
        self.attempts.push(attempt);
        Ok(())
    }

    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn job_kind(&self) -> JobKind {
        self.job_kind
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    pub fn failed(&self) -> &[FailedRecipient] {
        &self.failed
    }

    pub fn attempts(&self) -> &[DeliveryAttempt] {
        &self.attempts
    }

    /// 失敗のまま終わった受信者がいるか
    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn started_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap()
    }

    fn attempt(id: &str, outcome: DeliveryOutcome, retry_count: u32) -> DeliveryAttempt {
        DeliveryAttempt {
            recipient_id: RecipientId::new(id),
            job_kind: JobKind::Lt50FinalYear,
            run_started_at: started_at(),
            outcome,
            retry_count,
        }
    }

    #[test]
    fn test_結果ごとに件数を数える() {
        let mut summary = RunSummary::new(RunId::new(), JobKind::Lt50FinalYear, started_at());

        summary.record(attempt("1", DeliveryOutcome::Sent, 0)).unwrap();
        summary.record(attempt("2", DeliveryOutcome::Sent, 2)).unwrap();
        summary
            .record(attempt(
                "3",
                DeliveryOutcome::Failed {
                    error: "一時的な送信エラー: throttled".into(),
                },
                2,
            ))
            .unwrap();
        summary
            .record(attempt(
                "4",
                DeliveryOutcome::Skipped {
                    reason: SkipReason::MissingAddress,
                },
                0,
            ))
            .unwrap();

        assert_eq!(
            summary.counts(),
            OutcomeCounts {
                sent:    2,
                failed:  1,
                skipped: 1,
            }
        );
        assert_eq!(summary.counts().total(), 4);
        assert!(summary.has_failures());
        assert_eq!(
            summary.failed(),
            &[FailedRecipient {
                recipient_id: RecipientId::new("3"),
                error:        "一時的な送信エラー: throttled".into(),
                retry_count:  2,
            }]
        );
    }

    #[test]
    fn test_同じ受信者の2件目の記録は拒否される() {
        let mut summary = RunSummary::new(RunId::new(), JobKind::Summary, started_at());
        summary.record(attempt("1", DeliveryOutcome::Sent, 0)).unwrap();

        let result = summary.record(attempt("1", DeliveryOutcome::Sent, 0));

        assert_eq!(result, Err(AlreadyRecorded(RecipientId::new("1"))));
        assert_eq!(summary.counts().sent, 1);
        assert_eq!(summary.attempts().len(), 1);
    }

    #[test]
    fn test_受信者ゼロでも空のサマリーを作れる() {
        let mut summary = RunSummary::new(RunId::new(), JobKind::GeneralReminder, started_at());
        summary.finish(started_at());

        assert_eq!(summary.counts(), OutcomeCounts::default());
        assert!(!summary.has_failures());
        assert_eq!(summary.finished_at(), Some(started_at()));
    }

    #[test]
    fn test_サマリーはjsonに変換でき内部の記録済み集合は出力しない() {
        let mut summary = RunSummary::new(RunId::new(), JobKind::Unallocated, started_at());
        summary
            .record(attempt(
                "CO",
                DeliveryOutcome::Skipped {
                    reason: SkipReason::Criteria("pending >= 1".into()),
                },
                0,
            ))
            .unwrap();

        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["job_kind"], "unallocated");
        assert_eq!(json["counts"]["skipped"], 1);
        assert_eq!(json["attempts"][0]["outcome"]["status"], "skipped");
        assert_eq!(json["attempts"][0]["outcome"]["reason"]["reason"], "criteria");
        assert!(json.get("recorded").is_none());
    }

    #[test]
    fn test_スキップ理由は人が読める形で表示される() {
        assert_eq!(
            SkipReason::MissingField(RecipientField::Balance).to_string(),
            "必須属性 balance がありません"
        );
    }
}

//! # ジョブオーケストレーター
//!
//! 1 回の通知ジョブの実行を進める。
//!
//! ```text
//! Selecting → Sending（受信者ごと） → Summarizing → Done
//! ```
//!
//! 受信者ごとの処理は 重複確認 → 送信条件 → 宛先確認 → 描画 → 配信 → 記録 の順。
//! 1 人の失敗は記録して次に進む。受信者の選択（とサマリーの集計）に失敗した
//! 場合だけ、何も送らずに [`QueryError`] を返す。

use std::sync::Arc;

use ihundred_domain::{
    QueryError,
    RenderError,
    clock::Clock,
    delivery::{DeliveryAttempt, DeliveryOutcome, RunId, RunSummary, SkipReason},
    job::JobDefinition,
    recipient::Recipient,
    report::SummaryReport,
};
use ihundred_infra::repository::{RecipientSelector, SummaryReportRepository};
use ihundred_shared::{
    event_log::{error as error_fields, event},
    log_business_event,
};
use tracing::Instrument;

use super::{
    delivery::{Delivery, DeliveryEngine},
    template_renderer::TemplateRenderer,
};

pub struct JobOrchestrator {
    selector: Arc<dyn RecipientSelector>,
    reports:  Arc<dyn SummaryReportRepository>,
    renderer: TemplateRenderer,
    delivery: DeliveryEngine,
    clock:    Arc<dyn Clock>,
}

impl JobOrchestrator {
    pub fn new(
        selector: Arc<dyn RecipientSelector>,
        reports: Arc<dyn SummaryReportRepository>,
        renderer: TemplateRenderer,
        delivery: DeliveryEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            selector,
            reports,
            renderer,
            delivery,
            clock,
        }
    }

    /// ジョブを 1 回実行する
    pub async fn run(&self, job: &JobDefinition) -> Result<RunSummary, QueryError> {
        let run_id = RunId::new();
        let span = tracing::info_span!("job_run", job.kind = %job.kind, run.id = %run_id);

        self.run_inner(job, run_id).instrument(span).await
    }

    async fn run_inner(&self, job: &JobDefinition, run_id: RunId) -> Result<RunSummary, QueryError> {
        let mut summary = RunSummary::new(run_id, job.kind, self.clock.now());

        // Selecting
        let recipients = self.selector.select(job).await.map_err(|e| {
            tracing::error!(
                error.category = error_fields::category::INFRASTRUCTURE,
                error.kind = error_fields::kind::DATABASE,
                error = %e,
                span_trace = %e.span_trace(),
                "受信者を選択できませんでした"
            );
            QueryError::from(e)
        })?;

        let report = if job.needs_summary_report() {
            Some(self.reports.load().await.map_err(|e| {
                tracing::error!(
                    error.category = error_fields::category::INFRASTRUCTURE,
                    error.kind = error_fields::kind::DATABASE,
                    error = %e,
                    "サマリーレポートを集計できませんでした"
                );
                QueryError::from(e)
            })?)
        } else {
            None
        };

        tracing::info!(recipients = recipients.len(), "送信を開始します");

        // Sending
        for recipient in &recipients {
            if summary.contains(&recipient.id) {
                tracing::debug!(recipient.id = %recipient.id, "同じ受信者が重複しているため 2 回目は送りません");
                continue;
            }

            let delivery = self.process(job, recipient, report.as_ref()).await;
            log_outcome(job, recipient, &delivery);

            let attempt = DeliveryAttempt {
                recipient_id:   recipient.id.clone(),
                job_kind:       job.kind,
                run_started_at: summary.started_at(),
                outcome:        delivery.outcome,
                retry_count:    delivery.retry_count,
            };
            if let Err(e) = summary.record(attempt) {
                tracing::warn!(error = %e, "結果を記録できませんでした");
            }
        }

        // Summarizing
        summary.finish(self.clock.now());
        Ok(summary)
    }

    /// 受信者 1 人分の処理（送らない場合も含めて結果を返す）
    async fn process(
        &self,
        job: &JobDefinition,
        recipient: &Recipient,
        report: Option<&SummaryReport>,
    ) -> Delivery {
        let skipped = |reason| Delivery {
            outcome:     DeliveryOutcome::Skipped { reason },
            retry_count: 0,
        };

        if let Some(criteria) = job.criteria.filter(|c| !c.matches(recipient)) {
            return skipped(SkipReason::Criteria(criteria.describe()));
        }

        if !recipient.has_address() {
            return skipped(SkipReason::MissingAddress);
        }

        let email = match self.renderer.render(job, recipient, report) {
            Ok(email) => email,
            Err(RenderError::MissingField(field)) => {
                return skipped(SkipReason::MissingField(field));
            }
            Err(e @ RenderError::Template(_)) => {
                tracing::error!(
                    error.category = error_fields::category::CONFIGURATION,
                    error.kind = error_fields::kind::TEMPLATE,
                    error = %e,
                    template = job.template,
                    "通知テンプレートの描画に失敗"
                );
                return skipped(SkipReason::Render(e.to_string()));
            }
        };

        self.delivery.send(&email).await
    }
}

fn log_outcome(job: &JobDefinition, recipient: &Recipient, delivery: &Delivery) {
    match &delivery.outcome {
        DeliveryOutcome::Sent => log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_SENT,
            event.entity_type = event::entity_type::RECIPIENT,
            event.entity_id = %recipient.id,
            event.result = event::result::SUCCESS,
            job.kind = %job.kind,
            retry_count = delivery.retry_count,
            "通知メール送信成功"
        ),
        DeliveryOutcome::Failed { error } => log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_FAILED,
            event.entity_type = event::entity_type::RECIPIENT,
            event.entity_id = %recipient.id,
            event.result = event::result::FAILURE,
            error.category = error_fields::category::EXTERNAL_SERVICE,
            error.kind = error_fields::kind::MAIL_TRANSPORT,
            job.kind = %job.kind,
            retry_count = delivery.retry_count,
            error = %error,
            "通知メール送信失敗"
        ),
        DeliveryOutcome::Skipped { reason } => log_business_event!(
            event.category = event::category::NOTIFICATION,
            event.action = event::action::NOTIFICATION_SKIPPED,
            event.entity_type = event::entity_type::RECIPIENT,
            event.entity_id = %recipient.id,
            event.result = event::result::SKIPPED,
            job.kind = %job.kind,
            reason = %reason,
            "通知メールを送りませんでした"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use ihundred_domain::{
        SendError,
        clock::FixedClock,
        delivery::OutcomeCounts,
        job::JobKind,
        recipient::{RecipientField, RecipientId},
        retry::RetryPolicy,
    };
    use ihundred_infra::mock::{
        MockNotificationSender,
        MockRecipientSelector,
        MockSummaryReportRepository,
    };
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;

    fn orchestrator(
        selector: MockRecipientSelector,
        reports: MockSummaryReportRepository,
        sender: &MockNotificationSender,
    ) -> JobOrchestrator {
        let clock = FixedClock::new(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 3, 30, 0).unwrap());
        JobOrchestrator::new(
            Arc::new(selector),
            Arc::new(reports),
            TemplateRenderer::new(&Url::parse("https://ihundred.scet.ac.in").unwrap()).unwrap(),
            DeliveryEngine::new(Arc::new(sender.clone()), RetryPolicy::fixed(3, Duration::ZERO)),
            Arc::new(clock),
        )
    }

    fn student(id: &str, email: &str, balance: i64) -> Recipient {
        Recipient::new(RecipientId::new(id), email)
            .with_balance(balance)
            .with_final_year(true)
    }

    fn outcome_of(summary: &RunSummary, id: &str) -> DeliveryOutcome {
        summary
            .attempts()
            .iter()
            .find(|a| a.recipient_id.as_str() == id)
            .map(|a| a.outcome.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_条件外と宛先なしと属性欠けはスキップになる() {
        let selector = MockRecipientSelector::new(vec![
            student("1", "a@x.com", 30),
            student("2", "b@x.com", 70),
            student("3", "", 10),
            Recipient::new(RecipientId::new("4"), "d@x.com"),
        ]);
        let sender = MockNotificationSender::new();
        let sut = orchestrator(selector, MockSummaryReportRepository::default(), &sender);

        let summary = sut
            .run(&JobDefinition::for_kind(JobKind::Lt50FinalYear))
            .await
            .unwrap();

        assert_eq!(
            summary.counts(),
            OutcomeCounts {
                sent:    1,
                failed:  0,
                skipped: 3,
            }
        );
        assert_eq!(outcome_of(&summary, "1"), DeliveryOutcome::Sent);
        assert_eq!(
            outcome_of(&summary, "2"),
            DeliveryOutcome::Skipped {
                reason: SkipReason::Criteria("balance < 50".into()),
            }
        );
        assert_eq!(
            outcome_of(&summary, "3"),
            DeliveryOutcome::Skipped {
                reason: SkipReason::MissingAddress,
            }
        );
        // 残高が無い受信者は送信条件の段階で外れる
        assert!(matches!(
            outcome_of(&summary, "4"),
            DeliveryOutcome::Skipped {
                reason: SkipReason::Criteria(_)
            }
        ));
        assert_eq!(sender.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_送信条件の無いジョブで必須属性が欠ければスキップ() {
        let selector = MockRecipientSelector::new(vec![
            Recipient::new(RecipientId::new("CO"), "rep.co@x.com").with_pending_activities(2),
        ]);
        let sender = MockNotificationSender::new();
        let sut = orchestrator(selector, MockSummaryReportRepository::default(), &sender);
        let job = JobDefinition {
            criteria: None,
            ..JobDefinition::for_kind(JobKind::Unallocated)
        };

        let summary = sut.run(&job).await.unwrap();

        assert_eq!(
            outcome_of(&summary, "CO"),
            DeliveryOutcome::Skipped {
                reason: SkipReason::MissingField(RecipientField::Department),
            }
        );
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn test_重複した受信者には1回だけ送る() {
        let selector = MockRecipientSelector::new(vec![
            student("1", "a@x.com", 30),
            student("1", "a@x.com", 30),
        ]);
        let sender = MockNotificationSender::new();
        let sut = orchestrator(selector, MockSummaryReportRepository::default(), &sender);

        let summary = sut
            .run(&JobDefinition::for_kind(JobKind::Lt50FinalYear))
            .await
            .unwrap();

        assert_eq!(summary.counts().total(), 1);
        assert_eq!(sender.calls_to("a@x.com"), 1);
    }

    #[tokio::test]
    async fn test_失敗した受信者の後も処理を続ける() {
        let selector = MockRecipientSelector::new(vec![
            student("1", "a@x.com", 30),
            student("2", "b@x.com", 20),
        ]);
        let sender = MockNotificationSender::new();
        sender.script("a@x.com", [Err(SendError::Permanent("rejected".into()))]);
        let sut = orchestrator(selector, MockSummaryReportRepository::default(), &sender);

        let summary = sut
            .run(&JobDefinition::for_kind(JobKind::Lt50FinalYear))
            .await
            .unwrap();

        assert_eq!(summary.counts().failed, 1);
        assert_eq!(summary.counts().sent, 1);
        assert_eq!(summary.failed()[0].recipient_id, RecipientId::new("1"));
        assert!(summary.finished_at().is_some());
    }

    #[tokio::test]
    async fn test_サマリーはレポートを1回だけ集計する() {
        let selector = MockRecipientSelector::new(vec![
            Recipient::new(RecipientId::new("hod.co@x.com"), "hod.co@x.com"),
            Recipient::new(RecipientId::new("hod.it@x.com"), "hod.it@x.com"),
        ]);
        let reports = MockSummaryReportRepository::default();
        let sender = MockNotificationSender::new();
        let sut = orchestrator(selector, reports.clone(), &sender);

        let summary = sut.run(&JobDefinition::for_kind(JobKind::Summary)).await.unwrap();

        assert_eq!(summary.counts().sent, 2);
        assert_eq!(reports.call_count(), 1);
    }

    #[tokio::test]
    async fn test_レポートを集計できなければ何も送らない() {
        let selector = MockRecipientSelector::new(vec![Recipient::new(
            RecipientId::new("hod.co@x.com"),
            "hod.co@x.com",
        )]);
        let sender = MockNotificationSender::new();
        let sut = orchestrator(selector, MockSummaryReportRepository::broken(), &sender);

        let result = sut.run(&JobDefinition::for_kind(JobKind::Summary)).await;

        assert!(matches!(result, Err(QueryError::Rejected(_))));
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn test_レポートが不要なジョブでは集計しない() {
        let reports = MockSummaryReportRepository::default();
        let sender = MockNotificationSender::new();
        let sut = orchestrator(MockRecipientSelector::new(vec![]), reports.clone(), &sender);

        sut.run(&JobDefinition::for_kind(JobKind::GeneralReminder))
            .await
            .unwrap();

        assert_eq!(reports.call_count(), 0);
    }
}

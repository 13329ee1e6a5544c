use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::{Mutex, OnceCell, RwLock};
use uuid::Uuid;

use crate::assessment::{
    ScoringPolicy, Session, Submission, TickControl, TickOutcome, TimerDriver, TimerHandle,
};
use crate::error::{Error, Result};
use crate::models::invitation::{Invitation, InvitationStatus};
use crate::models::result_record::ResultRecord;
use crate::models::test::Test;
use crate::services::audit_service::AuditService;
use crate::services::invitation_service::InvitationService;
use crate::services::notification_service::NotificationService;
use crate::services::result_service::ResultService;
use crate::services::test_service::TestService;

/// One running attempt: the session behind its own lock, the countdown that
/// drives it and the cell its stored result lands in exactly once.
struct LiveAttempt {
    invitation: Invitation,
    started_at: DateTime<Utc>,
    session: Mutex<Session>,
    timer: Mutex<Option<TimerHandle>>,
    record: OnceCell<ResultRecord>,
    failed_finalizations: AtomicU32,
}

/// Ticks spent retrying a failed auto-submit before the countdown gives up.
const MAX_FINALIZE_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: ResultRecord,
    pub fresh: bool,
}

/// Read-only copy of a live session's state plus the invitation it belongs to.
pub struct SessionSnapshot<T> {
    pub invitation: Invitation,
    pub view: T,
}

#[derive(Clone)]
pub struct AttemptService {
    live: Arc<RwLock<HashMap<Uuid, Arc<LiveAttempt>>>>,
    tests: TestService,
    invitations: InvitationService,
    results: ResultService,
    notifications: NotificationService,
    audit: AuditService,
    policy: ScoringPolicy,
    timer: TimerDriver,
}

impl AttemptService {
    pub fn new(
        tests: TestService,
        invitations: InvitationService,
        results: ResultService,
        notifications: NotificationService,
        audit: AuditService,
        policy: ScoringPolicy,
        timer: TimerDriver,
    ) -> Self {
        Self {
            live: Arc::new(RwLock::new(HashMap::new())),
            tests,
            invitations,
            results,
            notifications,
            audit,
            policy,
            timer,
        }
    }

    /// Resolves a token for viewing or starting. Lapsed invitations are
    /// expired on the spot and refused.
    pub async fn open(&self, token: &str) -> Result<(Invitation, Arc<Test>)> {
        let invitation = self.invitations.find_by_token(token).await?;
        match invitation.status {
            InvitationStatus::Revoked => {
                tracing::warn!(invitation_id = %invitation.id, "revoked invitation used");
                return Err(Error::Forbidden("invitation_revoked".to_string()));
            }
            InvitationStatus::Expired => {
                return Err(Error::Forbidden("test_expired".to_string()));
            }
            _ if invitation.is_overdue(Utc::now()) => {
                tracing::warn!(invitation_id = %invitation.id, "expired invitation used");
                self.invitations.mark_expired(invitation.id).await?;
                return Err(Error::Forbidden("test_expired".to_string()));
            }
            _ => {}
        }
        let test = self.tests.get_test_by_id(invitation.test_id).await?;
        Ok((invitation, test))
    }

    /// Starts the attempt, or resumes it when it is already running.
    pub async fn start<T>(&self, token: &str, view: impl FnOnce(&Session) -> T) -> Result<SessionSnapshot<T>> {
        let (invitation, test) = self.open(token).await?;
        if invitation.status == InvitationStatus::Completed {
            return Err(Error::Conflict("already_completed".to_string()));
        }

        let existing = self.live.read().await.get(&invitation.id).cloned();
        if let Some(attempt) = existing {
            let session = attempt.session.lock().await;
            return Ok(SessionSnapshot {
                invitation: attempt.invitation.clone(),
                view: view(&*session),
            });
        }

        let session = Session::start(test, self.policy)?;

        let mut live = self.live.write().await;
        let raced = live.get(&invitation.id).cloned();
        if let Some(attempt) = raced {
            drop(live);
            let session = attempt.session.lock().await;
            return Ok(SessionSnapshot {
                invitation: attempt.invitation.clone(),
                view: view(&*session),
            });
        }

        let started_at = Utc::now();
        let invitation = self.invitations.mark_started(invitation.id, started_at).await?;
        let snapshot = view(&session);
        let attempt = Arc::new(LiveAttempt {
            invitation: invitation.clone(),
            started_at,
            session: Mutex::new(session),
            timer: Mutex::new(None),
            record: OnceCell::new(),
            failed_finalizations: AtomicU32::new(0),
        });
        live.insert(invitation.id, attempt.clone());
        drop(live);

        let handle = self.schedule_countdown(&attempt);
        *attempt.timer.lock().await = Some(handle);

        tracing::info!(
            invitation_id = %invitation.id,
            test_id = %invitation.test_id,
            candidate = %invitation.candidate_email,
            "test session started"
        );
        self.audit
            .log(
                Some(&invitation.candidate_email),
                "test_started",
                "invitation",
                invitation.id,
                None,
            )
            .await;

        Ok(SessionSnapshot {
            invitation,
            view: snapshot,
        })
    }

    fn schedule_countdown(&self, attempt: &Arc<LiveAttempt>) -> TimerHandle {
        let service = self.clone();
        let weak = Arc::downgrade(attempt);
        self.timer.schedule(move || {
            let service = service.clone();
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(attempt) => service.on_tick(&attempt).await,
                    None => TickControl::Stop,
                }
            }
        })
    }

    async fn on_tick(&self, attempt: &Arc<LiveAttempt>) -> TickControl {
        let outcome = attempt.session.lock().await.tick();
        match outcome {
            Ok(TickOutcome::Running { .. }) => TickControl::Continue,
            Ok(TickOutcome::Expired(_)) => {
                tracing::info!(invitation_id = %attempt.invitation.id, "time expired, submitting");
                self.auto_finalize(attempt).await
            }
            // Submitted but not yet stored: an earlier auto-submit failed.
            Ok(TickOutcome::Inactive) if !attempt.record.initialized() => {
                self.auto_finalize(attempt).await
            }
            Ok(TickOutcome::Inactive) => TickControl::Stop,
            Err(e) => {
                tracing::error!(error = %e, invitation_id = %attempt.invitation.id, "countdown scoring failed");
                TickControl::Stop
            }
        }
    }

    /// Stores the expired session's result, retrying on the next tick when
    /// that fails.
    async fn auto_finalize(&self, attempt: &Arc<LiveAttempt>) -> TickControl {
        match self.finalize(attempt).await {
            Ok(_) => TickControl::Stop,
            Err(e) => {
                let failures = attempt.failed_finalizations.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= MAX_FINALIZE_ATTEMPTS {
                    tracing::error!(
                        error = %e,
                        invitation_id = %attempt.invitation.id,
                        failures,
                        "auto-submit failed, waiting for the candidate to submit"
                    );
                    TickControl::Stop
                } else {
                    tracing::warn!(
                        error = %e,
                        invitation_id = %attempt.invitation.id,
                        failures,
                        "auto-submit failed, retrying"
                    );
                    TickControl::Continue
                }
            }
        }
    }

    async fn live_attempt(&self, token: &str) -> Result<Arc<LiveAttempt>> {
        let invitation = self.invitations.find_by_token(token).await?;
        match invitation.status {
            InvitationStatus::InProgress => {}
            InvitationStatus::Pending => return Err(Error::Conflict("test_not_started".to_string())),
            InvitationStatus::Completed => return Err(Error::Conflict("already_completed".to_string())),
            InvitationStatus::Expired => return Err(Error::Forbidden("test_expired".to_string())),
            InvitationStatus::Revoked => return Err(Error::Forbidden("invitation_revoked".to_string())),
        }
        self.live
            .read()
            .await
            .get(&invitation.id)
            .cloned()
            .ok_or_else(|| Error::NotFound("No running session for this invitation".to_string()))
    }

    /// Runs `op` against the live session under its lock.
    pub async fn with_session<T>(
        &self,
        token: &str,
        op: impl FnOnce(&mut Session) -> std::result::Result<T, crate::assessment::AssessmentError>,
    ) -> Result<T> {
        let attempt = self.live_attempt(token).await?;
        let mut session = attempt.session.lock().await;
        Ok(op(&mut *session)?)
    }

    pub async fn submit(&self, token: &str) -> Result<SubmitOutcome> {
        let invitation = self.invitations.find_by_token(token).await?;
        if invitation.status == InvitationStatus::Completed {
            let record = self.results.find_by_invitation(invitation.id).await?;
            return Ok(SubmitOutcome { record, fresh: false });
        }

        let attempt = self.live_attempt(token).await?;
        let submission = attempt.session.lock().await.submit()?;
        let record = self.finalize(&attempt).await?;
        Ok(SubmitOutcome {
            record,
            fresh: matches!(submission, Submission::Fresh(_)),
        })
    }

    /// Persists the session's result. Whichever of the timer and the
    /// candidate gets here first does the work; the other gets the same
    /// record back.
    async fn finalize(&self, attempt: &Arc<LiveAttempt>) -> Result<ResultRecord> {
        let record = attempt
            .record
            .get_or_try_init(|| async {
                if let Some(handle) = attempt.timer.lock().await.take() {
                    self.timer.cancel(&handle);
                }

                let (result, trigger, time_spent) = {
                    let session = attempt.session.lock().await;
                    let result = session.result().cloned().ok_or_else(|| {
                        Error::Internal("finalize called on an active session".to_string())
                    })?;
                    let trigger = session.trigger().ok_or_else(|| {
                        Error::Internal("submitted session has no trigger".to_string())
                    })?;
                    let spent = session
                        .test()
                        .duration_seconds()
                        .saturating_sub(session.remaining_seconds());
                    (result, trigger, spent)
                };

                let invitation = &attempt.invitation;
                let record = self
                    .results
                    .record(ResultRecord::new(
                        invitation,
                        &result,
                        trigger,
                        attempt.started_at,
                        time_spent,
                    ))
                    .await;
                self.invitations
                    .mark_completed(invitation.id, record.submitted_at)
                    .await?;

                self.notifications
                    .enqueue_webhook(
                        "test_completed",
                        &json!({
                            "event": "test_completed",
                            "invitation_id": invitation.id,
                            "result_id": record.id,
                            "candidate": {
                                "email": invitation.candidate_email,
                                "name": invitation.candidate_name,
                            },
                            "test": {
                                "id": invitation.test_id,
                                "title": invitation.test_title,
                            },
                            "score": record.score,
                            "total_questions": record.total_questions,
                            "percentage": record.percentage,
                            "passed": record.passed,
                            "trigger": trigger.as_str(),
                        }),
                    )
                    .await;
                self.audit
                    .log(
                        Some(&invitation.candidate_email),
                        "test_submitted",
                        "invitation",
                        invitation.id,
                        Some(json!({
                            "score": record.score,
                            "total_questions": record.total_questions,
                            "trigger": trigger.as_str(),
                        })),
                    )
                    .await;

                tracing::info!(
                    invitation_id = %invitation.id,
                    score = record.score,
                    total = record.total_questions,
                    percentage = record.percentage,
                    trigger = trigger.as_str(),
                    "test submitted"
                );
                Ok::<_, Error>(record)
            })
            .await?
            .clone();

        self.live.write().await.remove(&attempt.invitation.id);
        Ok(record)
    }

    pub async fn result(&self, token: &str) -> Result<ResultRecord> {
        let invitation = self.invitations.find_by_token(token).await?;
        if invitation.status != InvitationStatus::Completed {
            return Err(Error::Conflict("test_not_completed".to_string()));
        }
        self.results.find_by_invitation(invitation.id).await
    }

    /// Invitation state plus, while the session runs, a view of it.
    pub async fn status<T>(
        &self,
        token: &str,
        view: impl FnOnce(&Session) -> T,
    ) -> Result<(Invitation, Option<T>)> {
        let invitation = self.invitations.find_by_token(token).await?;
        let attempt = self.live.read().await.get(&invitation.id).cloned();
        let view = match attempt {
            Some(attempt) => Some(view(&*attempt.session.lock().await)),
            None => None,
        };
        Ok((invitation, view))
    }

    pub async fn active_count(&self) -> usize {
        self.live.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::{SessionStatus, SubmissionTrigger};
    use crate::dto::admin_dto::InviteCandidate;
    use crate::services::mail_service::LogMailer;
    use crate::services::test_service::fixtures::physics_payload;
    use reqwest::Client;
    use std::time::Duration;

    struct Harness {
        attempts: AttemptService,
        invitations: InvitationService,
        results: ResultService,
        tests: TestService,
        audit: AuditService,
    }

    fn harness() -> Harness {
        let tests = TestService::new();
        let invitations = InvitationService::new(Arc::new(LogMailer), "http://localhost:3000".into(), 72);
        let results = ResultService::new();
        let audit = AuditService::new();
        let attempts = AttemptService::new(
            tests.clone(),
            invitations.clone(),
            results.clone(),
            NotificationService::new(Client::new(), None, None),
            audit.clone(),
            ScoringPolicy::default(),
            TimerDriver::new(Duration::from_secs(1)),
        );
        Harness {
            attempts,
            invitations,
            results,
            tests,
            audit,
        }
    }

    async fn invite(h: &Harness, duration_minutes: u32) -> Invitation {
        let mut payload = physics_payload();
        payload.duration_minutes = duration_minutes;
        let test = h.tests.create_test(payload, None).await.unwrap();
        h.invitations
            .invite(
                &test,
                vec![InviteCandidate {
                    email: "ada@example.com".into(),
                    name: Some("Ada".into()),
                }],
                None,
            )
            .await
            .unwrap()
            .created
            .remove(0)
    }

    #[tokio::test]
    async fn manual_submission_stores_one_result() {
        let h = harness();
        let inv = invite(&h, 60).await;
        let token = inv.access_token.as_str();

        let started = h.attempts.start(token, |s| s.remaining_seconds()).await.unwrap();
        assert_eq!(started.view, 3600);
        assert_eq!(started.invitation.status, InvitationStatus::InProgress);

        h.attempts.with_session(token, |s| s.record_answer(1)).await.unwrap();
        h.attempts.with_session(token, |s| Ok(s.go_to_next())).await.unwrap();
        h.attempts.with_session(token, |s| s.record_answer(0)).await.unwrap();

        let first = h.attempts.submit(token).await.unwrap();
        assert!(first.fresh);
        assert_eq!(first.record.score, 1);
        assert_eq!(first.record.trigger, SubmissionTrigger::Manual);

        let second = h.attempts.submit(token).await.unwrap();
        assert!(!second.fresh);
        assert_eq!(second.record.id, first.record.id);

        assert_eq!(h.results.summary().await.total, 1);
        assert_eq!(h.invitations.get(inv.id).await.unwrap().status, InvitationStatus::Completed);
        assert_eq!(h.attempts.active_count().await, 0);
        assert_eq!(h.attempts.result(token).await.unwrap().id, first.record.id);

        let actions: Vec<String> = h.audit.recent(10).await.into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["test_submitted", "test_started"]);
    }

    #[tokio::test]
    async fn starting_twice_resumes_the_same_session() {
        let h = harness();
        let inv = invite(&h, 60).await;
        let token = inv.access_token.as_str();

        h.attempts.start(token, |_| ()).await.unwrap();
        h.attempts.with_session(token, |s| s.record_answer(2)).await.unwrap();
        let resumed = h.attempts.start(token, |s| s.answer_for(0)).await.unwrap();
        assert_eq!(resumed.view, Some(2));
        assert_eq!(h.attempts.active_count().await, 1);
    }

    #[tokio::test]
    async fn completed_revoked_and_unstarted_tokens_are_refused() {
        let h = harness();
        let inv = invite(&h, 60).await;
        let token = inv.access_token.as_str();

        assert!(matches!(
            h.attempts.with_session(token, |s| s.record_answer(0)).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(h.attempts.result(token).await, Err(Error::Conflict(_))));

        h.invitations.revoke(inv.id).await.unwrap();
        assert!(matches!(h.attempts.start(token, |_| ()).await, Err(Error::Forbidden(_))));
        assert!(matches!(h.attempts.start("nope", |_| ()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_option_leaves_session_untouched() {
        let h = harness();
        let inv = invite(&h, 60).await;
        let token = inv.access_token.as_str();
        h.attempts.start(token, |_| ()).await.unwrap();

        let err = h.attempts.with_session(token, |s| s.record_answer(7)).await.unwrap_err();
        assert!(matches!(err, Error::Assessment(_)));
        let answered = h.attempts.with_session(token, |s| Ok(s.answered_count())).await.unwrap();
        assert_eq!(answered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_auto_submits_when_time_runs_out() {
        let h = harness();
        let inv = invite(&h, 1).await;
        let token = inv.access_token.as_str();
        h.attempts.start(token, |_| ()).await.unwrap();
        h.attempts.with_session(token, |s| s.record_answer(1)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(30) + Duration::from_millis(500)).await;
        let (_, view) = h
            .attempts
            .status(token, |s| (s.status(), s.remaining_seconds()))
            .await
            .unwrap();
        assert_eq!(view, Some((SessionStatus::Active, 30)));

        tokio::time::sleep(Duration::from_secs(31)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let record = h.attempts.result(token).await.unwrap();
        assert_eq!(record.trigger, SubmissionTrigger::TimeExpired);
        assert_eq!(record.score, 1);
        assert_eq!(record.time_spent_seconds, 60);

        let late = h.attempts.submit(token).await.unwrap();
        assert!(!late.fresh);
        assert_eq!(late.record.id, record.id);
        assert_eq!(h.results.summary().await.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_auto_submit_is_retried_on_later_ticks() {
        let h = harness();
        let inv = invite(&h, 1).await;
        let token = inv.access_token.as_str();
        h.attempts.start(token, |_| ()).await.unwrap();

        h.invitations.force_status(inv.id, InvitationStatus::Expired).await;
        tokio::time::sleep(Duration::from_millis(62_500)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.attempts.active_count().await, 1);
        assert!(matches!(h.attempts.result(token).await, Err(Error::Conflict(_))));

        h.invitations.force_status(inv.id, InvitationStatus::InProgress).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let record = h.attempts.result(token).await.unwrap();
        assert_eq!(record.trigger, SubmissionTrigger::TimeExpired);
        assert_eq!(h.results.summary().await.total, 1);
        assert_eq!(h.attempts.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_submit_gives_up_after_repeated_failures() {
        let h = harness();
        let inv = invite(&h, 1).await;
        let token = inv.access_token.as_str();
        h.attempts.start(token, |_| ()).await.unwrap();

        h.invitations.force_status(inv.id, InvitationStatus::Expired).await;
        tokio::time::sleep(Duration::from_secs(60 + MAX_FINALIZE_ATTEMPTS as u64 + 5)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        h.invitations.force_status(inv.id, InvitationStatus::InProgress).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(h.attempts.result(token).await, Err(Error::Conflict(_))));

        let outcome = h.attempts.submit(token).await.unwrap();
        assert_eq!(outcome.record.trigger, SubmissionTrigger::TimeExpired);
        assert_eq!(h.attempts.result(token).await.unwrap().id, outcome.record.id);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_cancels_the_countdown() {
        let h = harness();
        let inv = invite(&h, 1).await;
        let token = inv.access_token.as_str();
        h.attempts.start(token, |_| ()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let outcome = h.attempts.submit(token).await.unwrap();
        assert!(outcome.fresh);
        assert_eq!(outcome.record.time_spent_seconds, 10);

        tokio::time::sleep(Duration::from_secs(120)).await;
        let record = h.attempts.result(token).await.unwrap();
        assert_eq!(record.trigger, SubmissionTrigger::Manual);
        assert_eq!(record.time_spent_seconds, 10);
        assert_eq!(h.results.summary().await.total, 1);
    }

    #[tokio::test]
    async fn edits_after_start_do_not_reach_the_session() {
        let h = harness();
        let inv = invite(&h, 60).await;
        let token = inv.access_token.as_str();
        h.attempts.start(token, |_| ()).await.unwrap();

        h.tests
            .update_test(
                inv.test_id,
                crate::dto::admin_dto::UpdateTestPayload {
                    duration_minutes: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let total = h
            .attempts
            .with_session(token, |s| Ok(s.test().duration_minutes))
            .await
            .unwrap();
        assert_eq!(total, 60);
    }
}

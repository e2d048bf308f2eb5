//! Sequential, rate-limited delivery of winner notifications
//!
//! One target at a time: send, retry transient failures after a backoff, give
//! up immediately on forum rejections, then wait a fixed delay before the next
//! target regardless of how the previous one ended.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::models::{
    AttemptOutcome, DispatchSession, NotificationRequest, SessionReport, TargetReport, Winner,
};
use crate::traits::{Clock, Notifier};

/// Pacing and retry policy for one dispatch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Pause after each target before starting the next one
    pub delay_between_sends: Duration,
    /// Attempts per target, counting the first
    pub max_attempts: u32,
    /// Pause before retrying a transient failure
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay_between_sends: Duration::from_secs(30),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(30),
        }
    }
}

/// Rough duration of a run over `targets` winners: one send spacing per
/// target. Retries add to it, and no wait follows the last target.
pub fn estimated_duration(targets: usize, config: &DispatchConfig) -> Duration {
    let targets = u32::try_from(targets).unwrap_or(u32::MAX);
    config.delay_between_sends.saturating_mul(targets)
}

/// [`estimated_duration`] rounded up to whole minutes.
pub fn estimated_minutes(targets: usize, config: &DispatchConfig) -> u64 {
    estimated_duration(targets, config).as_secs().div_ceil(60)
}

/// Real waiting on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cloneable stop flag for a running dispatch.
///
/// Checked before every send and every wait; waits in progress end early.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as this token, so this only ends on cancel
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened on the attempt a [`Progress`] update describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Delivered,
    /// Transient failure; another attempt follows after the backoff.
    Retrying { reason: String },
    /// The forum rejected the message.
    Rejected { messages: Vec<String> },
    /// Transient failures used up every attempt.
    GaveUp { reason: String },
}

/// Emitted after every send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Targets that have reached a final state, this one included if it just did
    pub completed: usize,
    pub total: usize,
    pub username: String,
    pub attempt: u32,
    pub event: ProgressEvent,
}

/// Drives notifications across a winner list
pub struct Dispatcher<N, C = TokioClock> {
    notifier: N,
    clock: C,
}

impl<N: Notifier> Dispatcher<N, TokioClock> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            clock: TokioClock,
        }
    }
}

impl<N: Notifier, C: Clock> Dispatcher<N, C> {
    pub fn with_clock(notifier: N, clock: C) -> Self {
        Self { notifier, clock }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Notifies every target in order and reports per-target results.
    ///
    /// Never fails as a whole: rejections and exhausted retries are recorded
    /// in the report and the run moves on. When `cancel` fires, targets not
    /// yet started are left out of the report entirely.
    pub async fn send_all<F>(
        &self,
        targets: &[Winner],
        session: &DispatchSession,
        config: &DispatchConfig,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> SessionReport
    where
        F: FnMut(&Progress),
    {
        let started_at = Utc::now();
        let total = targets.len();
        let mut reports: Vec<TargetReport> = Vec::with_capacity(total);

        info!(
            "Sending {} notification(s), estimated {} minute(s)",
            total,
            estimated_minutes(total, config)
        );

        for (index, target) in targets.iter().enumerate() {
            if index > 0 && !self.pause(config.delay_between_sends, cancel).await {
                break;
            }

            if cancel.is_cancelled() {
                break;
            }

            let report = self
                .deliver(target, session, config, cancel, index, total, &mut on_progress)
                .await;
            let interrupted = report.interrupted;
            reports.push(report);

            if interrupted {
                break;
            }
        }

        // A cancel that lands after the last target finished stopped nothing
        let cancelled =
            reports.len() < total || reports.last().is_some_and(|report| report.interrupted);
        let report = SessionReport::from_targets(reports, cancelled, started_at);

        if report.cancelled {
            warn!(
                "Dispatch cancelled after {}/{} target(s)",
                report.total, total
            );
        }
        info!(
            "{}/{} messages sent successfully. {} failed.",
            report.succeeded, report.total, report.failed
        );

        report
    }

    /// Runs one target through its send/retry cycle.
    #[allow(clippy::too_many_arguments)]
    async fn deliver<F>(
        &self,
        target: &Winner,
        session: &DispatchSession,
        config: &DispatchConfig,
        cancel: &CancelToken,
        completed: usize,
        total: usize,
        on_progress: &mut F,
    ) -> TargetReport
    where
        F: FnMut(&Progress),
    {
        let max_attempts = config.max_attempts.max(1);
        let request = NotificationRequest { target, session };
        let mut report = TargetReport {
            username: target.username.clone(),
            succeeded: false,
            attempts: 0,
            error_messages: Vec::new(),
            interrupted: false,
        };

        loop {
            if report.attempts > 0 && !self.pause(config.retry_backoff, cancel).await {
                report.interrupted = true;
                return report;
            }

            report.attempts += 1;
            let attempt = report.attempts;
            let progress = |completed, event| Progress {
                completed,
                total,
                username: target.username.clone(),
                attempt,
                event,
            };

            match self.attempt(&request).await {
                AttemptOutcome::Success => {
                    info!(username = %target.username, attempt, "Message delivered");
                    report.succeeded = true;
                    on_progress(&progress(completed + 1, ProgressEvent::Delivered));
                    return report;
                }
                AttemptOutcome::TerminalFailure(messages) => {
                    error!(
                        username = %target.username,
                        attempt,
                        errors = ?messages,
                        "Message rejected by forum"
                    );
                    report.error_messages.clone_from(&messages);
                    on_progress(&progress(
                        completed + 1,
                        ProgressEvent::Rejected { messages },
                    ));
                    return report;
                }
                AttemptOutcome::RetryableFailure(reason) if attempt >= max_attempts => {
                    error!(
                        username = %target.username,
                        attempts = attempt,
                        reason = %reason,
                        "Giving up after repeated transient failures"
                    );
                    on_progress(&progress(completed + 1, ProgressEvent::GaveUp { reason }));
                    return report;
                }
                AttemptOutcome::RetryableFailure(reason) => {
                    warn!(
                        username = %target.username,
                        attempt,
                        max_attempts,
                        reason = %reason,
                        "Send failed, will retry"
                    );
                    on_progress(&progress(completed, ProgressEvent::Retrying { reason }));
                }
            }
        }
    }

    /// One send; a panic inside the notifier counts as a transient failure.
    async fn attempt(&self, request: &NotificationRequest<'_>) -> AttemptOutcome {
        match AssertUnwindSafe(self.notifier.send(request))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => AttemptOutcome::RetryableFailure("notifier panicked".to_string()),
        }
    }

    /// Waits `duration` unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        tokio::select! {
            () = self.clock.sleep(duration) => !cancel.is_cancelled(),
            () = cancel.cancelled() => false,
        }
    }
}

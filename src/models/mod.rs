//! Data models for giveaway candidates, notification attempts and dispatch reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An eligible participant scraped from a topic's like list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub username: String,
    pub id: u64,
}

impl Candidate {
    /// Builds a candidate from raw page text.
    ///
    /// Returns `None` when the trimmed username is empty or the id is zero.
    pub fn new(username: &str, id: u64) -> Option<Self> {
        let username = username.trim();
        if username.is_empty() || id == 0 {
            return None;
        }

        Some(Self {
            username: username.to_string(),
            id,
        })
    }
}

/// A candidate drawn by the selection engine.
///
/// Owned copy of the candidate's data; it never points back into the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Winner {
    pub username: String,
    pub id: u64,
}

impl From<Candidate> for Winner {
    fn from(candidate: Candidate) -> Self {
        Self {
            username: candidate.username,
            id: candidate.id,
        }
    }
}

/// Values shared read-only by every send of one dispatch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSession {
    pub csrf_token: String,
    pub subject: String,
    pub body: String,
}

impl DispatchSession {
    pub fn new(
        csrf_token: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            csrf_token: csrf_token.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// One private message to one winner
#[derive(Debug, Clone, Copy)]
pub struct NotificationRequest<'a> {
    pub target: &'a Winner,
    pub session: &'a DispatchSession,
}

impl NotificationRequest<'_> {
    pub fn subject(&self) -> &str {
        &self.session.subject
    }

    pub fn body(&self) -> &str {
        &self.session.body
    }

    pub fn session_token(&self) -> &str {
        &self.session.csrf_token
    }
}

/// Classified result of a single send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Transport-level problem; the same request may succeed later.
    RetryableFailure(String),
    /// The forum rejected the message. Messages are the forum's own text.
    TerminalFailure(Vec<String>),
}

/// Per-winner result of a dispatch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub username: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub error_messages: Vec<String>,
    /// Cancellation arrived while this target was waiting to retry.
    pub interrupted: bool,
}

/// Aggregate result of one dispatch run
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub target_reports: Vec<TargetReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    /// Tallies the target reports collected so far.
    pub fn from_targets(
        target_reports: Vec<TargetReport>,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let succeeded = target_reports.iter().filter(|r| r.succeeded).count();
        let total = target_reports.len();

        Self {
            total,
            succeeded,
            failed: total - succeeded,
            cancelled,
            target_reports,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

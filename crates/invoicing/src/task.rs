//! Approval tasks owned by an invoice while it is under review.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use invoiceflow_core::ApprovalTaskId;

/// Action an approver took on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Escalate,
    RequestInfo,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Reject => "reject",
            ApprovalAction::Escalate => "escalate",
            ApprovalAction::RequestInfo => "request_info",
        }
    }
}

/// Deadline health of a task relative to a reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    OnTrack,
    Warning,
    Breached,
}

/// A single approver slot to open (role + deadline), with the task ID chosen by
/// the caller so that replaying the command is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: ApprovalTaskId,
    pub role: String,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTask {
    pub id: ApprovalTaskId,
    pub role: String,
    /// Who acted on the task (filled on decision).
    pub assignee: Option<String>,
    pub action: Option<ApprovalAction>,
    pub comment: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub breached_at: Option<DateTime<Utc>>,
    /// Set when the task was escalated and replaced by another one.
    pub superseded_by: Option<ApprovalTaskId>,
}

impl ApprovalTask {
    pub fn open(assignment: &TaskAssignment, assigned_at: DateTime<Utc>) -> Self {
        Self {
            id: assignment.task_id,
            role: assignment.role.clone(),
            assignee: None,
            action: None,
            comment: None,
            assigned_at,
            deadline: assignment.deadline,
            decided_at: None,
            breached_at: None,
            superseded_by: None,
        }
    }

    /// Part of the current plan (not replaced by an escalation).
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Still awaiting a binding decision. `request_info` does not close a task.
    pub fn is_open(&self) -> bool {
        self.is_active()
            && !matches!(
                self.action,
                Some(ApprovalAction::Approve) | Some(ApprovalAction::Reject)
            )
    }

    pub fn is_approved(&self) -> bool {
        self.action == Some(ApprovalAction::Approve)
    }

    /// SLA status at `now`. `warning_fraction` is the elapsed share of the
    /// window after which the task is flagged (0.75 = last quarter).
    ///
    /// Decided tasks are judged at their decision time.
    pub fn sla_status(&self, now: DateTime<Utc>, warning_fraction: f64) -> SlaStatus {
        let reference = if self.is_open() {
            now
        } else {
            self.decided_at.unwrap_or(now)
        };

        if self.breached_at.is_some() || reference > self.deadline {
            return SlaStatus::Breached;
        }

        let window = (self.deadline - self.assigned_at).num_milliseconds().max(0) as f64;
        let fraction = warning_fraction.clamp(0.0, 1.0);
        let warning_after = Duration::milliseconds((window * fraction).round() as i64);
        if reference >= self.assigned_at + warning_after {
            SlaStatus::Warning
        } else {
            SlaStatus::OnTrack
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn task_with_window(hours: i64) -> ApprovalTask {
        let assignment = TaskAssignment {
            task_id: ApprovalTaskId::new(),
            role: "ap_manager".to_string(),
            deadline: test_time() + Duration::hours(hours),
        };
        ApprovalTask::open(&assignment, test_time())
    }

    #[test]
    fn sla_moves_from_on_track_to_warning_to_breached() {
        let task = task_with_window(8);
        assert_eq!(task.sla_status(test_time() + Duration::hours(1), 0.75), SlaStatus::OnTrack);
        assert_eq!(task.sla_status(test_time() + Duration::hours(7), 0.75), SlaStatus::Warning);
        assert_eq!(task.sla_status(test_time() + Duration::hours(9), 0.75), SlaStatus::Breached);
    }

    #[test]
    fn decided_task_is_judged_at_decision_time() {
        let mut task = task_with_window(8);
        task.action = Some(ApprovalAction::Approve);
        task.decided_at = Some(test_time() + Duration::hours(2));
        assert_eq!(task.sla_status(test_time() + Duration::days(3), 0.75), SlaStatus::OnTrack);
    }

    #[test]
    fn request_info_keeps_task_open() {
        let mut task = task_with_window(8);
        task.action = Some(ApprovalAction::RequestInfo);
        assert!(task.is_open());
        task.action = Some(ApprovalAction::Reject);
        assert!(!task.is_open());
    }
}

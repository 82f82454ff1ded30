//! BFF models.
//!
//! Downstream payloads (teams, tasks, comments) and the JSON views the BFF
//! composes from them. Downstream fields the BFF does not need default when
//! absent.

use crate::auth::principal::Principal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Task status and priority
// ============================================================================

pub const STATUS_TODO: &str = "TODO";
pub const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
pub const STATUS_DONE: &str = "DONE";

/// Statuses a task may be moved to.
pub const TASK_STATUSES: [&str; 3] = [STATUS_TODO, STATUS_IN_PROGRESS, STATUS_DONE];

/// Accepted task priorities.
pub const TASK_PRIORITIES: [&str; 3] = ["LOW", "MEDIUM", "HIGH"];

pub const DEFAULT_PRIORITY: &str = "MEDIUM";

/// Max tasks listed in each dashboard section.
pub const DASHBOARD_LIST_LIMIT: usize = 10;

/// Max tasks previewed per team row.
pub const TEAM_PREVIEW_LIMIT: usize = 5;

pub fn is_valid_status(status: &str) -> bool {
    TASK_STATUSES.contains(&status)
}

// ============================================================================
// Downstream payloads
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teamid: Option<i64>,
    #[serde(default)]
    pub username: String,
    /// owner, leader or member.
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub teamid: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub leader: String,
    #[serde(default, rename = "memberCount")]
    pub member_count: i64,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub taskid: i64,
    #[serde(default)]
    pub teamid: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub commentid: i64,
    #[serde(default)]
    pub taskid: i64,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// `{items, limit}` envelope used by the team service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamList {
    #[serde(default)]
    pub items: Vec<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// `{items, limit, order, status}` envelope used by the task service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub items: Vec<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentList {
    #[serde(default)]
    pub items: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

// ============================================================================
// Downstream request bodies
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChangeStatusBody {
    pub taskid: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCommentBody {
    pub taskid: i64,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTaskBody {
    pub teamid: i64,
    pub title: String,
    pub description: String,
    pub assignee: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTeamBody {
    pub name: String,
    pub description: String,
    pub leader: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditTeamBody {
    pub teamid: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberBody {
    pub username: String,
}

// ============================================================================
// Inbound request bodies
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub body: String,
}

/// Create-task form. Fields are trimmed and validated by
/// [`CreateTaskRequest::validate`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub teamid: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub priority: String,
    /// `yyyy-mm-dd`; empty means no deadline.
    #[serde(default)]
    pub deadline: String,
}

impl CreateTaskRequest {
    /// Validate and normalize into the downstream body.
    ///
    /// # Errors
    ///
    /// Returns a client-safe message for the first invalid field.
    pub fn validate(&self) -> Result<NewTaskBody, &'static str> {
        if self.teamid <= 0 {
            return Err("invalid teamid");
        }

        let title = self.title.trim();
        let assignee = self.assignee.trim();
        if title.is_empty() || assignee.is_empty() {
            return Err("title and assignee are required");
        }

        let priority = match self.priority.trim().to_ascii_uppercase().as_str() {
            "" => DEFAULT_PRIORITY.to_string(),
            p if TASK_PRIORITIES.contains(&p) => p.to_string(),
            _ => return Err("invalid priority"),
        };

        let deadline = match self.deadline.trim() {
            "" => None,
            d => Some(normalize_deadline(d).ok_or("invalid deadline")?),
        };

        Ok(NewTaskBody {
            teamid: self.teamid,
            title: title.to_string(),
            description: self.description.trim().to_string(),
            assignee: assignee.to_string(),
            priority,
            deadline,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTeamRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub leader: String,
}

impl CreateTeamRequest {
    /// # Errors
    ///
    /// Returns a client-safe message when name or leader is blank.
    pub fn validate(&self) -> Result<NewTeamBody, &'static str> {
        let name = self.name.trim();
        let leader = self.leader.trim();
        if name.is_empty() || leader.is_empty() {
            return Err("name and leader are required");
        }

        Ok(NewTeamBody {
            name: name.to_string(),
            description: self.description.trim().to_string(),
            leader: leader.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditTeamRequest {
    #[serde(default)]
    pub teamid: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl EditTeamRequest {
    /// # Errors
    ///
    /// Returns a client-safe message for a non-positive teamid or blank name.
    pub fn validate(&self) -> Result<EditTeamBody, &'static str> {
        if self.teamid <= 0 {
            return Err("invalid teamid");
        }

        let name = self.name.trim();
        if name.is_empty() {
            return Err("name required");
        }

        Ok(EditTeamBody {
            teamid: self.teamid,
            name: name.to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

/// Add or remove one team member.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberRequest {
    #[serde(default)]
    pub teamid: i64,
    #[serde(default)]
    pub username: String,
}

impl MemberRequest {
    /// Returns the team id and the trimmed username.
    ///
    /// # Errors
    ///
    /// Returns a client-safe message for a non-positive teamid or blank username.
    pub fn validate(&self) -> Result<(i64, String), &'static str> {
        if self.teamid <= 0 {
            return Err("invalid teamid");
        }

        match self.username.trim() {
            "" => Err("username required"),
            username => Ok((self.teamid, username.to_string())),
        }
    }
}

/// `yyyy-mm-dd` to RFC3339 midnight UTC.
pub fn normalize_deadline(date: &str) -> Option<String> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(
        day.and_time(NaiveTime::MIN)
            .and_utc()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    )
}

// ============================================================================
// Response views
// ============================================================================

/// Per-status task counts. Always carries the three known statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCounts(pub BTreeMap<String, usize>);

impl Default for StatusCounts {
    fn default() -> Self {
        Self(
            TASK_STATUSES
                .iter()
                .map(|s| ((*s).to_string(), 0))
                .collect(),
        )
    }
}

impl StatusCounts {
    /// Unknown statuses are not counted.
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            if let Some(count) = counts.0.get_mut(&task.status) {
                *count += 1;
            }
        }
        counts
    }

    pub fn get(&self, status: &str) -> usize {
        self.0.get(status).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub given_name: String,
    pub family_name: String,
    pub roles: Vec<String>,
    pub is_admin: bool,
    pub is_leader: bool,
}

impl From<&Principal> for UserView {
    fn from(p: &Principal) -> Self {
        Self {
            sub: p.sub.clone(),
            username: p.username.clone(),
            email: p.email.clone(),
            email_verified: p.email_verified,
            given_name: p.given_name.clone(),
            family_name: p.family_name.clone(),
            roles: p.sorted_roles(),
            is_admin: p.is_admin(),
            is_leader: p.is_leader(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub user: UserView,
    pub total_teams: usize,
    pub total_tasks: usize,
    pub status_counts: StatusCounts,
    pub assigned_to_me: Vec<Task>,
    pub created_by_me: Vec<Task>,
    pub teams: Vec<Team>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskPreview {
    pub taskid: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamRow {
    pub team: Team,
    pub counts: StatusCounts,
    pub total: usize,
    pub preview: Vec<TaskPreview>,
}

impl TeamRow {
    pub fn summarize(team: Team, tasks: &[Task]) -> Self {
        Self {
            team,
            counts: StatusCounts::tally(tasks),
            total: tasks.len(),
            preview: tasks
                .iter()
                .take(TEAM_PREVIEW_LIMIT)
                .map(|t| TaskPreview {
                    taskid: t.taskid,
                    title: t.title.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MyTeamsView {
    pub user: UserView,
    pub is_admin: bool,
    pub is_leader: bool,
    pub can_create: bool,
    pub can_manage: bool,
    pub rows: Vec<TeamRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MyTasksView {
    pub user: UserView,
    pub can_create: bool,
    pub can_edit: bool,
    pub can_status: bool,
    pub total_tasks: usize,
    pub status_counts: StatusCounts,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetailView {
    pub task: Task,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminTeamRow {
    pub team: Team,
    pub total_tasks: usize,
    pub status_counts: StatusCounts,
    pub preview_titles: Vec<String>,
}

impl AdminTeamRow {
    pub fn summarize(team: Team, tasks: &[Task]) -> Self {
        Self {
            team,
            total_tasks: tasks.len(),
            status_counts: StatusCounts::tally(tasks),
            preview_titles: tasks
                .iter()
                .take(TEAM_PREVIEW_LIMIT)
                .map(|t| t.title.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminTeamsView {
    pub rows: Vec<AdminTeamRow>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    /// Number of cached verification keys (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<usize>,
}

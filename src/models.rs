use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Overdue => "overdue",
        }
    }

    /// Human label, e.g. "in progress".
    pub fn label(&self) -> String {
        self.as_str().replace('-', " ")
    }

    /// Next value in the status dropdown order, wrapping around.
    pub fn cycle(&self) -> TaskStatus {
        match self {
            TaskStatus::Pending => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Overdue,
            TaskStatus::Overdue => TaskStatus::Pending,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Invalid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "overdue" => Ok(TaskStatus::Overdue),
            other => Err(Invalid(format!("unknown status: {other}"))),
        }
    }
}

/// Status filter of the tasks page: everything, or a single status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TaskStatus),
}

impl StatusFilter {
    pub fn matches(&self, status: TaskStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(s) => *s == status,
        }
    }

    pub fn as_query(&self) -> Option<&'static str> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Only(s) => Some(s.as_str()),
        }
    }

    pub fn cycle(&self) -> StatusFilter {
        match self {
            StatusFilter::All => StatusFilter::Only(TaskStatus::Pending),
            StatusFilter::Only(TaskStatus::Overdue) => StatusFilter::All,
            StatusFilter::Only(s) => StatusFilter::Only(s.cycle()),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => f.write_str("all"),
            StatusFilter::Only(s) => s.fmt(f),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = Invalid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Invalid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(Invalid(format!("unknown priority: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Mentor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Mentor => "mentor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Invalid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "mentor" => Ok(Role::Mentor),
            other => Err(Invalid(format!("unknown role: {other}"))),
        }
    }
}

/// Whoever is making a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn is_mentor(&self) -> bool {
        self.role == Role::Mentor
    }

    /// Mentors may edit anything; students only what is assigned to them.
    pub fn can_edit(&self, task: &Task) -> bool {
        self.is_mentor() || task.assigned_to == self.id
    }
}

/// Rejected input, carried up as a 400.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct Invalid(pub String);

// Task document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    pub assigned_to: String,
    #[serde(deserialize_with = "flexible_date::deserialize")]
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds a stored task from a creation request.
    pub fn create(id: String, new: NewTask, now: DateTime<Utc>) -> Result<Task, Invalid> {
        let title = required("title", &new.title)?;
        let description = required("description", &new.description)?;
        let assigned_to = required("assignedTo", &new.assigned_to)?;

        let mut task = Task {
            id,
            title,
            description,
            image: new.image.unwrap_or_default(),
            status: new.status.unwrap_or_default(),
            priority: new.priority.unwrap_or_default(),
            progress: new.progress.map(clamp_progress).unwrap_or(0),
            assigned_to,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };
        task.reconcile();
        Ok(task)
    }

    /// Applies a partial update. Nothing is written when validation fails.
    pub fn apply(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> Result<(), Invalid> {
        let title = patch.title.as_deref().map(|t| required("title", t)).transpose()?;
        let description = patch
            .description
            .as_deref()
            .map(|d| required("description", d))
            .transpose()?;
        let assigned_to = patch
            .assigned_to
            .as_deref()
            .map(|a| required("assignedTo", a))
            .transpose()?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(assigned_to) = assigned_to {
            self.assigned_to = assigned_to;
        }
        if let Some(image) = patch.image {
            self.image = image;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(progress) = patch.progress {
            self.progress = clamp_progress(progress);
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        self.reconcile();
        self.updated_at = now;
        Ok(())
    }

    /// The submission transition: done, whatever came before.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.updated_at = now;
    }

    /// Whole days until the start of the due day, rounded up. Negative once past due.
    pub fn days_until(&self, now: DateTime<Utc>) -> i64 {
        let due = self.due_date.and_time(chrono::NaiveTime::MIN).and_utc();
        let millis = (due - now).num_milliseconds();
        -((-millis).div_euclid(MILLIS_PER_DAY))
    }

    /// Past due and not done. Display only; the stored status is left alone.
    pub fn is_late(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && self.days_until(now) < 0
    }

    /// Completed always means 100%. Documents read from disk or bundled data
    /// go through here before use.
    pub fn reconcile(&mut self) {
        if self.status == TaskStatus::Completed {
            self.progress = 100;
        }
    }
}

pub fn clamp_progress(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

fn deserialize_progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    i64::deserialize(deserializer).map(clamp_progress)
}

fn required(field: &str, value: &str) -> Result<String, Invalid> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Invalid(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    pub assigned_to: String,
    #[serde(deserialize_with = "flexible_date::deserialize")]
    pub due_date: NaiveDate,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(
        default,
        deserialize_with = "flexible_date::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        TaskPatch {
            status: Some(status),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmittedFile {
    pub filename: String,
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub ok: bool,
    pub files: Vec<SubmittedFile>,
    pub task: Task,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub overdue: usize,
}

impl TaskStats {
    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Completed => self.completed,
            TaskStatus::Overdue => self.overdue,
        }
    }
}

// Mentor directory entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentor {
    pub id: String,
    pub name: String,
    pub role: String,
    pub expertise: Vec<String>,
    pub avatar: String,
    pub is_online: bool,
}

/// Accepts `2025-01-25` as well as full RFC 3339 timestamps for due dates.
mod flexible_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid date: {raw}")))
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date: {raw}"))),
        }
    }
}

pub use flexible_date::parse as parse_date;

//! Derived views over a task snapshot.
//!
//! Everything here is a pure function of its inputs. Callers read the clock
//! once per render pass and hand the same `now` to every function, so all
//! buckets agree on what "today" is.

use crate::models::{Mentor, StatusFilter, Task, TaskStats, TaskStatus};
use chrono::{DateTime, Utc};

/// Maximum number of cards in each bucket of the tasks page.
pub const BUCKET_SIZE: usize = 6;
/// Tasks with at most this many days left land in the deadline bucket.
pub const DEADLINE_WINDOW_DAYS: i64 = 3;
pub const RECENT_TASKS: usize = 5;
pub const FEATURED_MENTORS: usize = 3;
pub const ACTIVITY_POINTS: usize = 8;
pub const ACTIVITY_FALLBACK: [u64; 8] = [10, 20, 15, 25, 18, 30, 22, 28];
/// Expertise tags shown before collapsing into "+N more".
pub const EXPERTISE_SHOWN: usize = 2;

const ESSENCE_FALLBACK: [&str; 4] = [
    "Understand the problem and expected outcome",
    "Break the task into clear, achievable steps",
    "Demonstrate progress and iterate on feedback",
    "Prepare final deliverables following guidelines",
];

/// Free-text query plus status filter, as typed into the tasks page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub text: String,
    pub status: StatusFilter,
}

impl TaskQuery {
    pub fn new(text: impl Into<String>, status: StatusFilter) -> Self {
        TaskQuery {
            text: text.into(),
            status,
        }
    }

    pub fn is_search(&self) -> bool {
        !self.text.trim().is_empty()
    }

    pub fn matches(&self, task: &Task) -> bool {
        let needle = self.text.trim().to_lowercase();
        let text_hit = needle.is_empty()
            || task.title.to_lowercase().contains(&needle)
            || task.description.to_lowercase().contains(&needle)
            || task.assigned_to.to_lowercase().contains(&needle);
        text_hit && self.status.matches(task.status)
    }
}

/// Tasks matching `query`, in input order.
pub fn filter_tasks(tasks: &[Task], query: &TaskQuery) -> Vec<Task> {
    tasks.iter().filter(|t| query.matches(t)).cloned().collect()
}

/// "Time limit": due within three days or already past due, soonest first.
pub fn deadline_soon(tasks: &[Task], now: DateTime<Utc>) -> Vec<Task> {
    let mut keyed: Vec<(i64, &Task)> = tasks
        .iter()
        .map(|t| (t.days_until(now), t))
        .filter(|(days, _)| *days <= DEADLINE_WINDOW_DAYS)
        .collect();
    // sort_by_key is stable, so equal days keep input order
    keyed.sort_by_key(|(days, _)| *days);
    keyed
        .into_iter()
        .take(BUCKET_SIZE)
        .map(|(_, t)| t.clone())
        .collect()
}

/// "New tasks": most recently created first.
pub fn newest(tasks: &[Task]) -> Vec<Task> {
    let mut sorted: Vec<&Task> = tasks.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted.into_iter().take(BUCKET_SIZE).cloned().collect()
}

/// "Recommended": open work, highest priority first.
pub fn recommended(tasks: &[Task]) -> Vec<Task> {
    let mut open: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Completed)
        .collect();
    open.sort_by(|a, b| b.priority.rank().cmp(&a.priority.rank()));
    open.into_iter().take(BUCKET_SIZE).cloned().collect()
}

pub fn stats(tasks: &[Task]) -> TaskStats {
    let mut stats = TaskStats {
        total: tasks.len(),
        ..Default::default()
    };
    for task in tasks {
        match task.status {
            TaskStatus::Pending => stats.pending += 1,
            TaskStatus::InProgress => stats.in_progress += 1,
            TaskStatus::Completed => stats.completed += 1,
            TaskStatus::Overdue => stats.overdue += 1,
        }
    }
    stats
}

/// Mean progress rounded to a whole percent; 0 for no tasks.
pub fn overall_progress(tasks: &[Task]) -> u8 {
    if tasks.is_empty() {
        return 0;
    }
    let sum: u64 = tasks.iter().map(|t| u64::from(t.progress)).sum();
    let mean = sum as f64 / tasks.len() as f64;
    mean.round() as u8
}

/// Everything the tasks page shows for one render pass.
#[derive(Clone, Debug, Default)]
pub struct TaskBoard {
    pub matches: Vec<Task>,
    pub deadline_soon: Vec<Task>,
    pub newest: Vec<Task>,
    pub recommended: Vec<Task>,
}

impl TaskBoard {
    pub fn derive(tasks: &[Task], query: &TaskQuery, now: DateTime<Utc>) -> Self {
        let matches = filter_tasks(tasks, query);
        TaskBoard {
            deadline_soon: deadline_soon(&matches, now),
            newest: newest(&matches),
            recommended: recommended(&matches),
            matches,
        }
    }
}

/// Everything the dashboard shows for one render pass.
#[derive(Clone, Debug, Default)]
pub struct Dashboard {
    pub stats: TaskStats,
    pub overall_progress: u8,
    pub recent: Vec<Task>,
    pub activity: Vec<u64>,
}

impl Dashboard {
    pub fn derive(tasks: &[Task]) -> Self {
        Dashboard {
            stats: stats(tasks),
            overall_progress: overall_progress(tasks),
            recent: tasks.iter().take(RECENT_TASKS).cloned().collect(),
            activity: activity(tasks),
        }
    }
}

/// Progress of the first few tasks, or a placeholder series when there are none.
pub fn activity(tasks: &[Task]) -> Vec<u64> {
    if tasks.is_empty() {
        return ACTIVITY_FALLBACK.to_vec();
    }
    tasks
        .iter()
        .take(ACTIVITY_POINTS)
        .map(|t| u64::from(t.progress))
        .collect()
}

/// Colour band of a progress indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressBand {
    Done,
    Good,
    Halfway,
    Started,
    Barely,
}

impl ProgressBand {
    pub fn of(progress: u8) -> Self {
        match progress {
            80.. => ProgressBand::Done,
            60..=79 => ProgressBand::Good,
            40..=59 => ProgressBand::Halfway,
            20..=39 => ProgressBand::Started,
            _ => ProgressBand::Barely,
        }
    }
}

/// Up to four key points pulled out of a task description.
pub fn essence_points(description: &str) -> Vec<String> {
    let sentences: Vec<String> = description
        .split(['.', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if sentences.len() >= 3 {
        sentences.into_iter().take(4).collect()
    } else {
        ESSENCE_FALLBACK.iter().map(|s| s.to_string()).collect()
    }
}

/// Search box and expertise filter of the mentor directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MentorQuery {
    pub text: String,
    /// `None` means all expertise.
    pub expertise: Option<String>,
}

impl MentorQuery {
    pub fn matches(&self, mentor: &Mentor) -> bool {
        let needle = self.text.to_lowercase();
        let text_hit = mentor.name.to_lowercase().contains(&needle)
            || mentor.role.to_lowercase().contains(&needle);
        let expertise_hit = match &self.expertise {
            None => true,
            Some(tag) => {
                let tag = tag.to_lowercase();
                mentor
                    .expertise
                    .iter()
                    .any(|e| e.to_lowercase().contains(&tag))
            }
        };
        text_hit && expertise_hit
    }
}

pub fn filter_mentors(mentors: &[Mentor], query: &MentorQuery) -> Vec<Mentor> {
    mentors.iter().filter(|m| query.matches(m)).cloned().collect()
}

/// Distinct expertise tags in first-seen order.
pub fn all_expertise(mentors: &[Mentor]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in mentors.iter().flat_map(|m| m.expertise.iter()) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// The first couple of tags plus how many were left out.
pub fn expertise_preview(mentor: &Mentor) -> (&[String], usize) {
    let shown = mentor.expertise.len().min(EXPERTISE_SHOWN);
    (&mentor.expertise[..shown], mentor.expertise.len() - shown)
}

pub fn featured_mentors(mentors: &[Mentor]) -> &[Mentor] {
    &mentors[..mentors.len().min(FEATURED_MENTORS)]
}

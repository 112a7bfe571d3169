use crate::models::{Priority, Task, TaskStatus};
use crate::store::{StoreError, TaskStore};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

struct Sample {
    title: &'static str,
    description: &'static str,
    photo: u32,
    status: TaskStatus,
    priority: Priority,
    progress: u8,
    assigned_to: &'static str,
    due_in_days: i64,
}

const SAMPLES: [Sample; 5] = [
    Sample {
        title: "API Documentation",
        description: "Create comprehensive API documentation for the new microservices architecture. Include endpoint descriptions, request/response examples, authentication methods, and error handling.",
        photo: 1181467,
        status: TaskStatus::InProgress,
        priority: Priority::High,
        progress: 65,
        assigned_to: "student1",
        due_in_days: 7,
    },
    Sample {
        title: "Database Schema Design",
        description: "Design and implement the database schema for the user management system. Ensure proper indexing, relationships, and data validation.",
        photo: 1181345,
        status: TaskStatus::Pending,
        priority: Priority::Medium,
        progress: 0,
        assigned_to: "student2",
        due_in_days: 10,
    },
    Sample {
        title: "Frontend Component Library",
        description: "Build a reusable component library with React components including buttons, forms, modals, and navigation elements.",
        photo: 1181671,
        status: TaskStatus::Completed,
        priority: Priority::High,
        progress: 100,
        assigned_to: "student1",
        due_in_days: -2,
    },
    Sample {
        title: "Testing Strategy Implementation",
        description: "Implement comprehensive testing strategy including unit tests, integration tests, and end-to-end tests for the application.",
        photo: 1181346,
        status: TaskStatus::InProgress,
        priority: Priority::Medium,
        progress: 30,
        assigned_to: "student3",
        due_in_days: 5,
    },
    Sample {
        title: "Security Audit",
        description: "Conduct a comprehensive security audit of the application including vulnerability assessment, penetration testing, and security best practices review.",
        photo: 1181466,
        status: TaskStatus::Pending,
        priority: Priority::High,
        progress: 0,
        assigned_to: "student2",
        due_in_days: 14,
    },
];

/// The sample dataset, due dates counted from `now`.
pub fn sample_tasks(now: DateTime<Utc>) -> Vec<Task> {
    SAMPLES
        .iter()
        .map(|s| Task {
            id: Uuid::new_v4().to_string(),
            title: s.title.to_string(),
            description: s.description.to_string(),
            image: format!(
                "https://images.pexels.com/photos/{0}/pexels-photo-{0}.jpeg?auto=compress&cs=tinysrgb&w=400&h=300&fit=crop",
                s.photo
            ),
            status: s.status,
            priority: s.priority,
            progress: s.progress,
            assigned_to: s.assigned_to.to_string(),
            due_date: (now + Duration::days(s.due_in_days)).date_naive(),
            created_at: now,
            updated_at: now,
        })
        .collect()
}

/// Replaces everything in the document file with the sample dataset.
pub async fn run(data_file: &Path) -> Result<usize, StoreError> {
    let store = TaskStore::open(data_file).await?;
    let tasks = sample_tasks(Utc::now());
    let count = tasks.len();
    for task in &tasks {
        info!(title = %task.title, assigned_to = %task.assigned_to, "seeding task");
    }
    store.replace_all(tasks).await?;
    info!(path = %data_file.display(), count, "task store seeded");
    Ok(count)
}

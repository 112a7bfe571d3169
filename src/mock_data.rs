//! Built-in data for the terminal client.
//!
//! The mentor directory has no backend yet, so it always comes from here. The
//! demo tasks are shown when the API cannot be reached.

use crate::models::{Mentor, Task};

const DEMO_TASKS: &str = include_str!("fixtures/demo_tasks.json");
const MENTORS: &str = include_str!("fixtures/mentors.json");

pub fn demo_tasks() -> Result<Vec<Task>, serde_json::Error> {
    let mut tasks: Vec<Task> = serde_json::from_str(DEMO_TASKS)?;
    tasks.iter_mut().for_each(Task::reconcile);
    Ok(tasks)
}

pub fn mentors() -> Result<Vec<Mentor>, serde_json::Error> {
    serde_json::from_str(MENTORS)
}

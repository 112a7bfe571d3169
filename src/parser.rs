use crate::models::{parse_date, Priority};
use chrono::NaiveDate;
use regex::Regex;

/// Result of parsing a quick-add line such as `Write report !high @alice ^2025-02-01`.
#[derive(Debug, PartialEq)]
pub struct QuickAdd {
    pub title: String,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
}

pub struct QuickAddParser {
    marker: Regex,
    spaces: Regex,
}

impl QuickAddParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(QuickAddParser {
            marker: Regex::new(r"(^|\s)([!@^])(\S+)")?,
            spaces: Regex::new(r"\s+")?,
        })
    }

    /// Pulls `!priority`, `@assignee` and `^due-date` markers out of `input`.
    /// The first valid value of each kind wins; all markers leave the title.
    pub fn parse(&self, input: &str) -> QuickAdd {
        let mut priority = None;
        let mut assignee = None;
        let mut due_date = None;

        for caps in self.marker.captures_iter(input) {
            let (Some(kind), Some(value)) = (caps.get(2), caps.get(3)) else {
                continue;
            };
            let value = value.as_str();
            match kind.as_str() {
                "!" if priority.is_none() => priority = value.parse::<Priority>().ok(),
                "@" if assignee.is_none() => assignee = Some(value.to_string()),
                "^" if due_date.is_none() => due_date = parse_date(value),
                _ => {}
            }
        }

        let title = self.marker.replace_all(input, " ");
        let title = self.spaces.replace_all(&title, " ").trim().to_string();

        QuickAdd {
            title,
            priority,
            assignee,
            due_date,
        }
    }
}

//! Ordered step progress for a setup run

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStep {
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub current: Option<String>,
    pub steps: Vec<ProgressStep>,
}

impl Progress {
    pub fn new<S: AsRef<str>>(steps: &[S]) -> Self {
        Self {
            total: steps.len(),
            completed: 0,
            current: None,
            steps: steps
                .iter()
                .map(|name| ProgressStep {
                    name: name.as_ref().to_string(),
                    status: StepStatus::Pending,
                    message: None,
                    start_time: None,
                    end_time: None,
                })
                .collect(),
        }
    }

    /// Update a step by name. Unknown names are ignored; returns whether a
    /// step was updated.
    pub fn update(&mut self, name: &str, status: StepStatus, message: &str) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.name == name) else {
            return false;
        };

        step.status = status;
        step.message = (!message.is_empty()).then(|| message.to_string());

        match status {
            StepStatus::Running => {
                step.start_time = Some(Utc::now());
                self.current = Some(name.to_string());
            }
            StepStatus::Completed => {
                step.end_time = Some(Utc::now());
                self.completed += 1;
            }
            StepStatus::Failed => step.end_time = Some(Utc::now()),
            StepStatus::Pending => {}
        }
        true
    }

    pub fn step(&self, name: &str) -> Option<&ProgressStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Console rendering
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}\nTotal Steps: {}\nCompleted: {}\nCurrent: {}\n",
            "=== System Orchestration Progress ===".bold(),
            self.total,
            self.completed,
            self.current.as_deref().unwrap_or("None")
        );

        for step in &self.steps {
            let marker = match step.status {
                StepStatus::Completed => "✔".green(),
                StepStatus::Failed => "✘".red(),
                StepStatus::Running => "…".yellow(),
                StepStatus::Pending => "·".dimmed(),
            };
            let duration = match (step.start_time, step.end_time) {
                (Some(start), Some(end)) => format!(" ({}s)", (end - start).num_seconds()),
                _ => String::new(),
            };
            out.push_str(&format!("\n{} {}{}", marker, step.name, duration));
            if let Some(message) = &step.message {
                out.push_str(&format!("\n   {}", message.dimmed()));
            }
        }
        out
    }
}

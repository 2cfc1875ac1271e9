//! In-flight save tasks.
//!
//! A save task exists for the whole lifetime of one recording attempt,
//! recoveries included. Admission is an atomic check-and-insert so two
//! callers racing for the same target can never both get in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Identity of a recording attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SaveTask {
    pub name: String,
    pub link: String,
}

impl SaveTask {
    pub fn new(name: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            link: link.into(),
        }
    }
}

impl std::fmt::Display for SaveTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.link)
    }
}

/// Table of admitted save tasks and when they were admitted.
#[derive(Debug, Default)]
pub struct SaveTaskTable {
    tasks: RwLock<HashMap<SaveTask, DateTime<Utc>>>,
}

impl SaveTaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `task`. Returns `false` if it is already in flight.
    pub fn try_admit(&self, task: &SaveTask) -> bool {
        let mut tasks = self.tasks.write();
        if tasks.contains_key(task) {
            return false;
        }
        tasks.insert(task.clone(), Utc::now());
        true
    }

    /// Release `task`, returning its admission time.
    pub fn release(&self, task: &SaveTask) -> Option<DateTime<Utc>> {
        self.tasks.write().remove(task)
    }

    pub fn contains(&self, task: &SaveTask) -> bool {
        self.tasks.read().contains_key(task)
    }

    /// Most recently admitted task for `link`.
    pub fn find_latest(&self, link: &str) -> Option<(SaveTask, DateTime<Utc>)> {
        self.tasks
            .read()
            .iter()
            .filter(|(task, _)| task.link == link)
            .max_by_key(|(_, at)| **at)
            .map(|(task, at)| (task.clone(), *at))
    }

    /// Whether any task for `link` is in flight.
    pub fn is_saving(&self, link: &str) -> bool {
        self.tasks.read().keys().any(|task| task.link == link)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

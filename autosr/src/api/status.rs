//! Dashboard status exchange.
//!
//! A dashboard sends its selected link and gets the tracked targets back.
//! Sending [`QUERY_SELECTION`] as the selection reads the stored one instead
//! of replacing it.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::track::{TargetInfo, TargetRegistry};

/// Selection value that asks for the stored selection.
pub const QUERY_SELECTION: &str = "?";

/// Status shared with a connected dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    #[serde(default)]
    pub select_url: String,
    #[serde(default)]
    pub tracking: Vec<TargetInfo>,
}

/// Holds the dashboard selection and answers status requests.
#[derive(Debug)]
pub struct StatusBoard {
    registry: Arc<TargetRegistry>,
    select_url: RwLock<String>,
}

impl StatusBoard {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self {
            registry,
            select_url: RwLock::new(String::new()),
        }
    }

    pub fn select_url(&self) -> String {
        self.select_url.read().clone()
    }

    /// Store or read the selection, and report every tracked target.
    pub fn status(&self, req: &Dashboard) -> Dashboard {
        let select_url = if req.select_url == QUERY_SELECTION {
            self.select_url()
        } else {
            *self.select_url.write() = req.select_url.clone();
            req.select_url.clone()
        };

        Dashboard {
            select_url,
            tracking: self.registry.list(),
        }
    }
}

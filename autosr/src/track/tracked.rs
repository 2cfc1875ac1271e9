//! Registry entries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::target::{SaveStatus, Target, TargetInfo};

struct CancelSlot {
    token: CancellationToken,
    /// Set once the entry leaves the registry; later attempts start cancelled.
    retired: bool,
}

#[derive(Debug, Default)]
struct SaveState {
    status: SaveStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// A target plus the orchestration state the tracker keeps for it.
pub struct Tracked {
    target: Arc<dyn Target>,
    host: String,
    cancel: Mutex<CancelSlot>,
    state: Mutex<SaveState>,
    checking: AtomicBool,
}

impl Tracked {
    pub fn new(target: Arc<dyn Target>, host: impl Into<String>) -> Self {
        Self {
            target,
            host: host.into(),
            cancel: Mutex::new(CancelSlot {
                token: CancellationToken::new(),
                retired: false,
            }),
            state: Mutex::new(SaveState::default()),
            checking: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub fn link(&self) -> &str {
        self.target.link()
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Install a fresh cancellation token for a new recording attempt.
    ///
    /// The token of a retired entry is returned already cancelled.
    pub fn renew_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        {
            let mut slot = self.cancel.lock();
            if slot.retired {
                token.cancel();
            }
            slot.token = token.clone();
        }
        self.target.set_cancel(token.clone());
        token
    }

    /// Fire the cancellation token of the current recording attempt.
    pub fn cancel(&self) {
        self.cancel.lock().token.cancel();
    }

    /// Cancel the current attempt and every later one.
    pub fn retire(&self) {
        let mut slot = self.cancel.lock();
        slot.retired = true;
        slot.token.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().token.clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.state.lock().status
    }

    pub fn set_status(&self, status: SaveStatus) {
        self.state.lock().status = status;
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().finished_at
    }

    /// Mark the start of a new online period; clears the previous finish time.
    pub fn set_started_at(&self, at: DateTime<Utc>) {
        {
            let mut state = self.state.lock();
            state.started_at = Some(at);
            state.finished_at = None;
        }
        self.target.set_started_at(at);
        self.target.set_finished_at(None);
    }

    pub fn set_finished_at(&self, at: DateTime<Utc>) {
        self.state.lock().finished_at = Some(at);
        self.target.set_finished_at(Some(at));
    }

    /// Claim the liveness-check slot. Returns `false` if a check is running.
    pub fn try_begin_check(&self) -> bool {
        self.checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_check(&self) {
        self.checking.store(false, Ordering::Release);
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    pub fn info(&self) -> TargetInfo {
        let state = self.state.lock();
        TargetInfo {
            link: self.link().to_string(),
            name: self.name().to_string(),
            host: self.host.clone(),
            status: state.status,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

impl std::fmt::Debug for Tracked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracked")
            .field("link", &self.link())
            .field("name", &self.name())
            .field("host", &self.host)
            .field("status", &self.status())
            .finish()
    }
}

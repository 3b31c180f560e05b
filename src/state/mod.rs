//! Shared state directory used by the bridge and the hook processes.
//!
//! Layout:
//!
//! ```text
//! <state_dir>/requests/<request_id>.request    pending approval, JSON
//! <state_dir>/responses/<request_id>.response  operator decision, JSON
//! <state_dir>/thinking_msg_id.txt              current indicator message id
//! <state_dir>/plan_mode_state.txt              `1` or `0`
//! <state_dir>/bridge_running.txt               present while a bridge is up
//! <state_dir>/bridge.lock                      held by the running bridge
//! ```
//!
//! Every record is written to a temporary file in its target directory and
//! renamed into place, so readers in other processes never see a torn write.

mod lock;

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::de::DeserializeOwned;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

pub use lock::BridgeLock;

use crate::{
    errors::{AppError, Result},
    models::approval::{ApprovalDecision, ApprovalRequest, RequestStatus, validate_request_id},
};

const REQUESTS_DIR: &str = "requests";
const RESPONSES_DIR: &str = "responses";
const REQUEST_EXT: &str = "request";
const RESPONSE_EXT: &str = "response";
const INDICATOR_FILE: &str = "thinking_msg_id.txt";
const PLAN_MODE_FILE: &str = "plan_mode_state.txt";
const RUNNING_FILE: &str = "bridge_running.txt";
const LAST_SENT_FILE: &str = "last_sent_text.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Awaited {
    Decided(ApprovalDecision),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Touches nothing on disk; directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_bridge(&self) -> Result<BridgeLock> {
        BridgeLock::acquire(&self.root)
    }

    pub fn create_request(&self, request: &ApprovalRequest) -> Result<()> {
        validate_request_id(&request.request_id)?;
        let body = serde_json::to_vec_pretty(request)?;
        publish(
            &self.requests_dir(),
            &file_name(&request.request_id, REQUEST_EXT),
            &body,
            Publish::Exclusive,
        )
        .map_err(|err| match err {
            AppError::Io(io) if io.kind() == ErrorKind::AlreadyExists => {
                AppError::RequestExists(request.request_id.clone())
            }
            other => other,
        })
    }

    pub fn read_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>> {
        validate_request_id(request_id)?;
        read_json(&self.request_path(request_id))
    }

    pub fn has_pending(&self, request_id: &str) -> Result<bool> {
        Ok(self
            .read_request(request_id)?
            .is_some_and(|request| request.status == RequestStatus::Pending))
    }

    pub fn pending_requests(&self) -> Result<Vec<ApprovalRequest>> {
        let mut out = Vec::new();
        for path in list_records(&self.requests_dir(), REQUEST_EXT)? {
            match read_json::<ApprovalRequest>(&path) {
                Ok(Some(request)) if request.status == RequestStatus::Pending => out.push(request),
                Ok(_) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable request"),
            }
        }
        out.sort_by_key(|request| request.created_at);
        Ok(out)
    }

    pub fn remove_request(&self, request_id: &str) -> Result<()> {
        validate_request_id(request_id)?;
        remove_if_exists(&self.request_path(request_id))
    }

    /// Marks the request answered and deletes it.
    pub fn answer_request(&self, request_id: &str) -> Result<()> {
        self.retire_request(request_id, RequestStatus::Answered)
    }

    /// Marks the request expired, then deletes it together with any decision
    /// that arrived too late to be read.
    pub fn expire_request(&self, request_id: &str) -> Result<()> {
        self.retire_request(request_id, RequestStatus::Expired)?;
        remove_if_exists(&self.response_path(request_id))
    }

    fn retire_request(&self, request_id: &str, status: RequestStatus) -> Result<()> {
        if let Some(mut request) = self.read_request(request_id)? {
            request.status = status;
            publish(
                &self.requests_dir(),
                &file_name(request_id, REQUEST_EXT),
                &serde_json::to_vec_pretty(&request)?,
                Publish::Replace,
            )?;
        }
        remove_if_exists(&self.request_path(request_id))
    }

    /// Last write wins.
    pub fn write_decision(&self, decision: &ApprovalDecision) -> Result<()> {
        validate_request_id(&decision.request_id)?;
        publish(
            &self.responses_dir(),
            &file_name(&decision.request_id, RESPONSE_EXT),
            &serde_json::to_vec_pretty(decision)?,
            Publish::Replace,
        )
    }

    /// Reads and removes the decision for `request_id`, if one is published.
    pub fn take_decision(&self, request_id: &str) -> Result<Option<ApprovalDecision>> {
        validate_request_id(request_id)?;
        let path = self.response_path(request_id);
        let decision = match read_json::<ApprovalDecision>(&path) {
            Ok(decision) => decision,
            Err(AppError::Json(err)) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable decision record");
                remove_if_exists(&path)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let Some(decision) = decision else {
            return Ok(None);
        };
        remove_if_exists(&path)?;
        if decision.request_id != request_id {
            warn!(
                expected = request_id,
                found = %decision.request_id,
                "decision record names another request"
            );
            return Ok(None);
        }
        Ok(Some(decision))
    }

    /// Polls the response slot every `interval` until a decision shows up or
    /// `deadline` passes. Checks at least once.
    pub async fn await_decision(
        &self,
        request_id: &str,
        deadline: Instant,
        interval: Duration,
    ) -> Result<Awaited> {
        loop {
            if let Some(decision) = self.take_decision(request_id)? {
                return Ok(Awaited::Decided(decision));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(Awaited::TimedOut);
            }
            sleep(interval.min(deadline - now)).await;
        }
    }

    /// Removes decision records older than `grace` whose request is gone.
    pub fn sweep_orphaned_decisions(&self, grace: Duration) -> Result<usize> {
        let mut removed = 0;
        for path in list_records(&self.responses_dir(), RESPONSE_EXT)? {
            let Some(request_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_request_id(request_id).is_ok() && self.request_path(request_id).exists() {
                continue;
            }
            let age = fs::metadata(&path)
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .unwrap_or_default();
            if age >= grace {
                remove_if_exists(&path)?;
                debug!(request_id, "removed orphaned decision");
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn indicator(&self) -> Result<Option<i64>> {
        let Some(text) = read_text(&self.root.join(INDICATOR_FILE))? else {
            return Ok(None);
        };
        match text.trim().parse::<i64>() {
            Ok(message_id) => Ok(Some(message_id)),
            Err(_) => {
                warn!(value = %text.trim(), "ignoring malformed indicator record");
                Ok(None)
            }
        }
    }

    pub fn set_indicator(&self, message_id: Option<i64>) -> Result<()> {
        match message_id {
            Some(id) => publish(
                &self.root,
                INDICATOR_FILE,
                id.to_string().as_bytes(),
                Publish::Replace,
            ),
            None => remove_if_exists(&self.root.join(INDICATOR_FILE)),
        }
    }

    /// Reads and clears the indicator in one step.
    pub fn take_indicator(&self) -> Result<Option<i64>> {
        let current = self.indicator()?;
        remove_if_exists(&self.root.join(INDICATOR_FILE))?;
        Ok(current)
    }

    pub fn plan_mode(&self) -> Result<bool> {
        Ok(read_text(&self.root.join(PLAN_MODE_FILE))?.is_some_and(|text| text.trim() == "1"))
    }

    pub fn set_plan_mode(&self, enabled: bool) -> Result<()> {
        let value: &[u8] = if enabled { b"1" } else { b"0" };
        publish(&self.root, PLAN_MODE_FILE, value, Publish::Replace)
    }

    /// Key of the assistant text last forwarded ahead of a permission prompt.
    pub fn last_sent(&self) -> Result<Option<String>> {
        Ok(read_text(&self.root.join(LAST_SENT_FILE))?.map(|text| text.trim().to_string()))
    }

    pub fn set_last_sent(&self, key: &str) -> Result<()> {
        publish(&self.root, LAST_SENT_FILE, key.as_bytes(), Publish::Replace)
    }

    pub fn mark_bridge_running(&self) -> Result<()> {
        publish(
            &self.root,
            RUNNING_FILE,
            std::process::id().to_string().as_bytes(),
            Publish::Replace,
        )
    }

    pub fn clear_bridge_running(&self) -> Result<()> {
        remove_if_exists(&self.root.join(RUNNING_FILE))
    }

    pub fn bridge_running(&self) -> bool {
        self.root.join(RUNNING_FILE).exists()
    }

    fn requests_dir(&self) -> PathBuf {
        self.root.join(REQUESTS_DIR)
    }

    fn responses_dir(&self) -> PathBuf {
        self.root.join(RESPONSES_DIR)
    }

    fn request_path(&self, request_id: &str) -> PathBuf {
        self.requests_dir().join(file_name(request_id, REQUEST_EXT))
    }

    fn response_path(&self, request_id: &str) -> PathBuf {
        self.responses_dir().join(file_name(request_id, RESPONSE_EXT))
    }
}

pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Publish {
    /// Fail if the target already exists.
    Exclusive,
    Replace,
}

fn file_name(request_id: &str, ext: &str) -> String {
    format!("{request_id}.{ext}")
}

fn publish(dir: &Path, name: &str, contents: &[u8], mode: Publish) -> Result<()> {
    fs::create_dir_all(dir).map_err(|_| AppError::CreateDir(dir.display().to_string()))?;
    let target = dir.join(name);

    let mut staged = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;

    let persisted = match mode {
        Publish::Exclusive => staged.persist_noclobber(&target),
        Publish::Replace => staged.persist(&target),
    };
    persisted.map(|_| ()).map_err(|err| {
        if err.error.kind() == ErrorKind::AlreadyExists {
            return AppError::Io(err.error);
        }
        AppError::StateRecord {
            path: target.display().to_string(),
            reason: err.error.to_string(),
        }
    })
}

fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_text(path)? {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn list_records(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|value| value.to_str()) == Some(ext) {
            out.push(path);
        }
    }
    Ok(out)
}

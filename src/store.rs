use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MemberSeed;
use crate::stats::{SubmissionKind, SubmissionRow, VerifiedSubmissions};

const SNAPSHOT_FILE: &str = "coach_state.json";
const TEMP_FILE_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub tg_id: u64,
    pub name: String,
    pub role: String,
}

/// Captured-media descriptor. Only existence matters to the stats engine;
/// intake needs it to re-send the file for moderation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    VideoNote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub user_id: i64,
    pub kind: SubmissionKind,
    pub file_id: String,
    pub media: MediaKind,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    users: Vec<User>,
    submissions: Vec<Submission>,
    saved_at: DateTime<Utc>,
}

/// In-memory user/submission tables backed by one JSON snapshot file under
/// the data dir. All mutators are followed by an explicit persist call at
/// the call site; the store itself never writes implicitly.
pub struct Store {
    users: DashMap<i64, User>,
    submissions: DashMap<i64, Submission>,
    next_user_id: AtomicI64,
    next_submission_id: AtomicI64,
    snapshot_path: PathBuf,
}

impl Store {
    pub fn new(data_dir: &str) -> Self {
        Store {
            users: DashMap::new(),
            submissions: DashMap::new(),
            next_user_id: AtomicI64::new(1),
            next_submission_id: AtomicI64::new(1),
            snapshot_path: PathBuf::from(data_dir).join(SNAPSHOT_FILE),
        }
    }

    /// Insert config members that are not yet known, keyed by tg id. Names
    /// already in the store are never overwritten here — the membership
    /// refresh owns renames. Returns how many were inserted.
    pub fn seed_users(&self, seeds: &[MemberSeed]) -> usize {
        let mut inserted = 0;
        for seed in seeds {
            if self.user_by_tg(seed.tg_id).is_some() {
                continue;
            }
            let id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
            self.users.insert(
                id,
                User {
                    id,
                    tg_id: seed.tg_id,
                    name: seed.name.clone(),
                    role: "user".to_string(),
                },
            );
            inserted += 1;
        }
        inserted
    }

    pub fn user_by_tg(&self, tg_id: u64) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.tg_id == tg_id)
            .map(|u| u.clone())
    }

    /// All known users, ordered by local id.
    pub fn users(&self) -> Vec<User> {
        let mut out: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        out.sort_by_key(|u| u.id);
        out
    }

    /// Returns true when the stored name actually changed.
    pub fn update_name(&self, user_id: i64, name: &str) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut user) if user.name != name => {
                user.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn add_submission(
        &self,
        user_id: i64,
        kind: SubmissionKind,
        file_id: String,
        media: MediaKind,
        timestamp: DateTime<Utc>,
    ) -> i64 {
        let id = self.next_submission_id.fetch_add(1, Ordering::SeqCst);
        self.submissions.insert(
            id,
            Submission {
                id,
                user_id,
                kind,
                file_id,
                media,
                timestamp,
                verified: false,
            },
        );
        id
    }

    /// Approve a queued submission. Returns false for an unknown id (already
    /// rejected, or a stale button).
    pub fn verify_submission(&self, id: i64) -> bool {
        match self.submissions.get_mut(&id) {
            Some(mut sub) => {
                sub.verified = true;
                true
            }
            None => false,
        }
    }

    pub fn delete_submission(&self, id: i64) -> bool {
        self.submissions.remove(&id).is_some()
    }

    fn snapshot(&self) -> Snapshot {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by_key(|u| u.id);
        let mut submissions: Vec<Submission> =
            self.submissions.iter().map(|s| s.clone()).collect();
        submissions.sort_by_key(|s| s.id);
        Snapshot {
            users,
            submissions,
            saved_at: Utc::now(),
        }
    }

    pub fn persist(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.snapshot())?;
        write_atomic(&self.snapshot_path, &bytes)?;
        Ok(())
    }

    /// Fire-and-forget persist off the async path. Failures are logged, not
    /// propagated — a missed snapshot only costs state on the next restart.
    pub async fn persist_async(&self) {
        let bytes = match serde_json::to_vec_pretty(&self.snapshot()) {
            Ok(b) => b,
            Err(e) => {
                warn!("snapshot serialize failed: {e:?}");
                return;
            }
        };
        let path = self.snapshot_path.clone();
        match tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("snapshot write failed: {e:?}"),
            Err(e) => warn!("snapshot join error: {e:?}"),
        }
    }

    /// Load the snapshot if one exists. A missing file is a fresh start, not
    /// an error.
    pub fn restore(&self) -> Result<()> {
        let text = match std::fs::read_to_string(&self.snapshot_path) {
            Ok(t) => t,
            Err(_) => return Ok(()),
        };
        let snap: Snapshot = serde_json::from_str(&text)?;

        let mut max_user = 0;
        for user in snap.users {
            max_user = max_user.max(user.id);
            self.users.insert(user.id, user);
        }
        let mut max_sub = 0;
        for sub in snap.submissions {
            max_sub = max_sub.max(sub.id);
            self.submissions.insert(sub.id, sub);
        }
        self.next_user_id.store(max_user + 1, Ordering::SeqCst);
        self.next_submission_id.store(max_sub + 1, Ordering::SeqCst);
        Ok(())
    }
}

impl VerifiedSubmissions for Store {
    fn verified_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<SubmissionRow> {
        let mut rows: Vec<(DateTime<Utc>, SubmissionRow)> = self
            .submissions
            .iter()
            .filter(|s| {
                s.verified && s.user_id == user_id && s.timestamp >= start && s.timestamp <= end
            })
            .map(|s| {
                (
                    s.timestamp,
                    SubmissionRow {
                        kind: s.kind,
                        at: s.timestamp,
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(ts, _)| *ts);
        rows.into_iter().map(|(_, r)| r).collect()
    }
}

fn write_atomic(path: &PathBuf, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = PathBuf::from(format!("{}{}", path.display(), TEMP_FILE_SUFFIX));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

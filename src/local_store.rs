//! Device-local progress for visitors without an account.
//!
//! Everything lives in one JSON document under the `nrghax_progress`
//! namespace, shaped as
//! `{ "hacks": { "<id>": { "completion_count", "last_completed" } }, "routines": { ... } }`.

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::completion::{minutes_remaining, CompletionStore};
use crate::error::{ProgressError, Result};
use crate::models::{Actor, CompletionRecord, SubjectKind, SubjectRef};

pub const STORAGE_KEY: &str = "nrghax_progress";

const LOCAL_ACTOR_ID: &str = "local";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntry {
    pub completion_count: u32,
    pub last_completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProgress {
    #[serde(default)]
    pub hacks: BTreeMap<String, LocalEntry>,
    #[serde(default)]
    pub routines: BTreeMap<String, LocalEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub levels: BTreeMap<String, LocalEntry>,
}

impl LocalProgress {
    fn section(&self, kind: SubjectKind) -> &BTreeMap<String, LocalEntry> {
        match kind {
            SubjectKind::Hack => &self.hacks,
            SubjectKind::Routine => &self.routines,
            SubjectKind::Level => &self.levels,
        }
    }

    fn section_mut(&mut self, kind: SubjectKind) -> &mut BTreeMap<String, LocalEntry> {
        match kind {
            SubjectKind::Hack => &mut self.hacks,
            SubjectKind::Routine => &mut self.routines,
            SubjectKind::Level => &mut self.levels,
        }
    }

    pub fn entry(&self, subject: SubjectRef) -> Option<&LocalEntry> {
        self.section(subject.kind).get(&subject.id.to_string())
    }
}

fn to_record(subject_id: i64, entry: &LocalEntry) -> CompletionRecord {
    CompletionRecord {
        actor_id: LOCAL_ACTOR_ID.to_string(),
        subject_id,
        completion_count: entry.completion_count,
        last_completed_at: entry.last_completed,
        completed_at: None,
    }
}

/// Advisory lock on a sidecar file, held across a read, check and write of
/// the document. Released on drop.
struct ProgressLock {
    file: File,
}

impl ProgressLock {
    fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for ProgressLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub struct LocalStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
            lock_path: dir.as_ref().join(format!("{}.lock", STORAGE_KEY)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the payload. A missing or unreadable document is treated as
    /// empty progress.
    pub fn load(&self) -> Result<LocalProgress> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LocalProgress::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(progress) => Ok(progress),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "local progress is malformed, starting fresh");
                Ok(LocalProgress::default())
            }
        }
    }

    pub fn save(&self, progress: &LocalProgress) -> Result<()> {
        let data = serde_json::to_vec_pretty(progress)?;
        let dir = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Every stored record, for folding into an account.
    pub fn records(&self) -> Result<Vec<(SubjectRef, CompletionRecord)>> {
        let progress = self.load()?;
        let mut out = Vec::new();
        for kind in SubjectKind::ALL {
            for (key, entry) in progress.section(kind) {
                match key.parse::<i64>() {
                    Ok(id) => out.push((SubjectRef::new(kind, id), to_record(id, entry))),
                    Err(_) => tracing::warn!(kind = %kind, key = %key, "skipping non-numeric local progress key"),
                }
            }
        }
        Ok(out)
    }

    fn check_actor(&self, actor: &Actor) -> Result<()> {
        if actor.is_anonymous() {
            Ok(())
        } else {
            Err(ProgressError::ActorMismatch {
                store: "local",
                actor: actor.to_string(),
            })
        }
    }
}

impl CompletionStore for LocalStore {
    fn get(&self, actor: &Actor, subject: SubjectRef) -> Result<Option<CompletionRecord>> {
        self.check_actor(actor)?;
        Ok(self
            .load()?
            .entry(subject)
            .map(|entry| to_record(subject.id, entry)))
    }

    fn record_if_cooled(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<CompletionRecord>> {
        self.check_actor(actor)?;
        let _lock = ProgressLock::acquire(&self.lock_path)?;
        let mut progress = self.load()?;
        let entry = progress
            .section_mut(subject.kind)
            .entry(subject.id.to_string())
            .or_default();

        if minutes_remaining(entry.last_completed, now, cooldown) > 0 {
            return Ok(None);
        }
        entry.completion_count = entry.completion_count.saturating_add(1);
        entry.last_completed = Some(now);
        let record = to_record(subject.id, entry);

        self.save(&progress)?;
        Ok(Some(record))
    }

    fn completed_ids(&self, actor: &Actor, kind: SubjectKind) -> Result<HashSet<i64>> {
        self.check_actor(actor)?;
        Ok(self
            .load()?
            .section(kind)
            .iter()
            .filter(|(_, entry)| entry.completion_count > 0)
            .filter_map(|(key, _)| key.parse::<i64>().ok())
            .collect())
    }
}

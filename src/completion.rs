use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Actor, CompletionRecord, SubjectKind, SubjectRef};

pub const COOLDOWN_MINUTES: i64 = 30;

/// Storage for per-actor completion records.
///
/// `record_if_cooled` must check the cooldown and increment in one step so
/// that two racing completions cannot both be accepted.
pub trait CompletionStore {
    fn get(&self, actor: &Actor, subject: SubjectRef) -> Result<Option<CompletionRecord>>;

    /// Returns the updated record, or `None` when the cooldown rejected it.
    fn record_if_cooled(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<CompletionRecord>>;

    /// Ids of subjects of `kind` completed at least once.
    fn completed_ids(&self, actor: &Actor, kind: SubjectKind) -> Result<HashSet<i64>>;
}

impl<T: CompletionStore + ?Sized> CompletionStore for &T {
    fn get(&self, actor: &Actor, subject: SubjectRef) -> Result<Option<CompletionRecord>> {
        (**self).get(actor, subject)
    }

    fn record_if_cooled(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<Option<CompletionRecord>> {
        (**self).record_if_cooled(actor, subject, now, cooldown)
    }

    fn completed_ids(&self, actor: &Actor, kind: SubjectKind) -> Result<HashSet<i64>> {
        (**self).completed_ids(actor, kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    Recorded { count: u32, first: bool },
    CoolingDown { remaining_minutes: i64 },
}

pub fn cooldown() -> Duration {
    Duration::minutes(COOLDOWN_MINUTES)
}

/// Whole minutes left before `last` falls outside the cooldown, rounded up.
pub fn minutes_remaining(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> i64 {
    let Some(last) = last else {
        return 0;
    };
    let remaining = cooldown - now.signed_duration_since(last);
    if remaining <= Duration::zero() {
        return 0;
    }
    let secs = remaining.num_seconds() + i64::from(remaining.subsec_nanos() > 0);
    (secs + 59) / 60
}

pub struct CompletionCounter<S> {
    store: S,
    cooldown: Duration,
}

impl<S: CompletionStore> CompletionCounter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cooldown: cooldown(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn record(&self, actor: &Actor, subject: SubjectRef) -> Result<Option<CompletionRecord>> {
        self.store.get(actor, subject)
    }

    #[allow(dead_code)]
    pub fn completion_count(&self, actor: &Actor, subject: SubjectRef) -> Result<u32> {
        Ok(self
            .store
            .get(actor, subject)?
            .map_or(0, |r| r.completion_count))
    }

    #[allow(dead_code)]
    pub fn can_complete(&self, actor: &Actor, subject: SubjectRef, now: DateTime<Utc>) -> Result<bool> {
        Ok(self.cooldown_remaining(actor, subject, now)? == 0)
    }

    pub fn cooldown_remaining(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let last = self
            .store
            .get(actor, subject)?
            .and_then(|r| r.last_completed_at);
        Ok(minutes_remaining(last, now, self.cooldown))
    }

    pub fn record_completion(
        &self,
        actor: &Actor,
        subject: SubjectRef,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        match self
            .store
            .record_if_cooled(actor, subject, now, self.cooldown)?
        {
            Some(record) => {
                tracing::info!(
                    actor = %actor,
                    kind = %subject.kind,
                    subject = subject.id,
                    count = record.completion_count,
                    "completion recorded"
                );
                Ok(CompletionOutcome::Recorded {
                    count: record.completion_count,
                    first: record.completion_count == 1,
                })
            }
            None => {
                let remaining_minutes = self.cooldown_remaining(actor, subject, now)?;
                tracing::debug!(
                    actor = %actor,
                    subject = subject.id,
                    remaining_minutes,
                    "completion rejected by cooldown"
                );
                Ok(CompletionOutcome::CoolingDown { remaining_minutes })
            }
        }
    }
}

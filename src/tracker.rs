//! Loads the catalog, the prerequisite graph and an actor's completions and
//! turns them into per-subject status rows.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::completion::{self, CompletionCounter, CompletionOutcome, CompletionStore};
use crate::db::Database;
use crate::error::{ProgressError, Result};
use crate::gating::PrerequisiteGraph;
use crate::local_store::LocalStore;
use crate::models::{
    Actor, ChecklistItem, CompletionRecord, PrerequisiteEdge, Subject, SubjectKind, SubjectStatus,
};
use crate::progression::{
    badge_color_for_percentage, format_count, progress_percentage, BadgeColor, ProgressState, Tier,
};

/// Weight ceiling for the stochastic pick; counts above this all weigh 1.
const SUGGESTION_CEILING: u32 = 51;

/// Users keep progress in the account database, everyone else on the device.
pub fn select_store<'a>(
    actor: &Actor,
    db: &'a Database,
    local: &'a LocalStore,
) -> &'a dyn CompletionStore {
    match actor {
        Actor::User(_) => db,
        Actor::Anonymous => local,
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_subjects: usize,
    pub unlocked: usize,
    pub locked: usize,
    pub started: usize,
    pub ready_now: usize,
    pub total_completions: u64,
    pub by_tier: BTreeMap<Tier, usize>,
}

impl Stats {
    pub fn from_statuses<'s>(statuses: impl IntoIterator<Item = &'s SubjectStatus>) -> Self {
        let mut stats = Stats::default();
        for status in statuses {
            stats.total_subjects += 1;
            if status.locked {
                stats.locked += 1;
            } else {
                stats.unlocked += 1;
            }
            if status.completion_count > 0 {
                stats.started += 1;
            }
            if status.is_ready() {
                stats.ready_now += 1;
            }
            stats.total_completions += u64::from(status.completion_count);
            *stats.by_tier.entry(status.tier).or_default() += 1;
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartialProgress {
    pub done: usize,
    pub total: usize,
    pub percentage: u8,
    pub badge: BadgeColor,
}

impl PartialProgress {
    pub fn new(done: usize, total: usize) -> Self {
        let percentage = progress_percentage(done, total);
        Self {
            done,
            total,
            percentage,
            badge: badge_color_for_percentage(percentage),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistProgress {
    pub items: Vec<ChecklistItem>,
    pub progress: PartialProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub kind: SubjectKind,
    pub edges: usize,
    pub dangling: Vec<PrerequisiteEdge>,
    pub cycles: Vec<Vec<i64>>,
}

impl GraphReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.cycles.is_empty()
    }
}

pub struct Tracker<'a> {
    catalog: &'a Database,
    counter: CompletionCounter<&'a dyn CompletionStore>,
    actor: Actor,
}

impl<'a> Tracker<'a> {
    pub fn new(catalog: &'a Database, store: &'a dyn CompletionStore, actor: Actor) -> Self {
        Self {
            catalog,
            counter: CompletionCounter::new(store),
            actor,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn graph(&self, kind: SubjectKind) -> Result<PrerequisiteGraph> {
        let graph = PrerequisiteGraph::from_edges(&self.catalog.prerequisite_edges(kind)?);
        let cycles = graph.cycles();
        if !cycles.is_empty() {
            tracing::warn!(kind = %kind, ?cycles, "prerequisite cycles keep these subjects locked");
        }
        Ok(graph)
    }

    pub fn completed(&self, kind: SubjectKind) -> Result<HashSet<i64>> {
        self.counter.store().completed_ids(&self.actor, kind)
    }

    fn build_status(
        &self,
        subject: Subject,
        locked: bool,
        graph: &PrerequisiteGraph,
        completed: &HashSet<i64>,
        record: Option<CompletionRecord>,
        now: DateTime<Utc>,
    ) -> SubjectStatus {
        let count = record.as_ref().map_or(0, |r| r.completion_count);
        let last = record.and_then(|r| r.last_completed_at);
        SubjectStatus {
            missing_prerequisites: graph.missing_prerequisites(subject.id, completed),
            locked,
            completion_count: count,
            tier: ProgressState::from_parts(count, locked).tier(),
            formatted_count: format_count(count),
            cooldown_remaining: completion::minutes_remaining(last, now, completion::cooldown()),
            last_completed_at: last,
            subject,
        }
    }

    pub fn statuses(&self, kind: SubjectKind, now: DateTime<Utc>) -> Result<Vec<SubjectStatus>> {
        let graph = self.graph(kind)?;
        let completed = self.completed(kind)?;
        let subjects = self.catalog.list_subjects(Some(kind))?;
        let unlocked = graph.unlock_states(subjects.iter().map(|s| s.id), &completed);
        subjects
            .into_iter()
            .map(|subject| {
                let locked = !unlocked.get(&subject.id).copied().unwrap_or(false);
                let record = self.counter.record(&self.actor, subject.subject_ref())?;
                Ok(self.build_status(subject, locked, &graph, &completed, record, now))
            })
            .collect()
    }

    pub fn status(&self, subject_id: i64, now: DateTime<Utc>) -> Result<SubjectStatus> {
        let subject = self
            .catalog
            .get_subject(subject_id)?
            .ok_or(ProgressError::SubjectNotFound(subject_id))?;
        let graph = self.graph(subject.kind)?;
        let completed = self.completed(subject.kind)?;
        let locked = !graph.is_unlocked(subject.id, &completed);
        let record = self.counter.record(&self.actor, subject.subject_ref())?;
        Ok(self.build_status(subject, locked, &graph, &completed, record, now))
    }

    /// Records a completion unless the subject is still locked.
    pub fn complete(&self, subject_id: i64, now: DateTime<Utc>) -> Result<CompletionOutcome> {
        let status = self.status(subject_id, now)?;
        if status.locked {
            return Err(ProgressError::Locked {
                name: status.subject.name,
                missing: status.missing_prerequisites,
            });
        }
        self.counter
            .record_completion(&self.actor, status.subject.subject_ref(), now)
    }

    // Stochastic pick among ready subjects, favouring the least practiced
    pub fn suggest_next<R: Rng>(
        &self,
        kind: Option<SubjectKind>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Option<SubjectStatus>> {
        let kinds: Vec<SubjectKind> = match kind {
            Some(k) => vec![k],
            None => SubjectKind::ALL.to_vec(),
        };
        let mut candidates = Vec::new();
        for k in kinds {
            candidates.extend(self.statuses(k, now)?.into_iter().filter(|s| s.is_ready()));
        }

        if candidates.is_empty() {
            return Ok(None);
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|s| f64::from(SUGGESTION_CEILING - s.completion_count.min(SUGGESTION_CEILING - 1)))
            .collect();

        let total_weight: f64 = weights.iter().sum();
        let mut random_point = rng.gen::<f64>() * total_weight;

        for (i, weight) in weights.iter().enumerate() {
            random_point -= weight;
            if random_point <= 0.0 {
                return Ok(Some(candidates.swap_remove(i)));
            }
        }

        Ok(candidates.into_iter().next())
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Result<Stats> {
        let mut statuses = Vec::new();
        for kind in SubjectKind::ALL {
            statuses.extend(self.statuses(kind, now)?);
        }
        Ok(Stats::from_statuses(&statuses))
    }

    pub fn checklist(&self, subject_id: i64) -> Result<ChecklistProgress> {
        let user = self.actor.user_id().ok_or(ProgressError::AccountRequired)?;
        self.catalog
            .get_subject(subject_id)?
            .ok_or(ProgressError::SubjectNotFound(subject_id))?;
        let items = self.catalog.checklist(subject_id, user)?;
        let done = items.iter().filter(|i| i.checked).count();
        let progress = PartialProgress::new(done, items.len());
        Ok(ChecklistProgress { items, progress })
    }

    pub fn set_checked(
        &self,
        item_id: i64,
        checked: bool,
        now: DateTime<Utc>,
    ) -> Result<ChecklistProgress> {
        let user = self.actor.user_id().ok_or(ProgressError::AccountRequired)?;
        let subject_id = self.catalog.set_checked(item_id, user, checked, now)?;
        self.checklist(subject_id)
    }

    /// Share of a level's hacks the actor has completed at least once.
    pub fn level_progress(&self, level_id: i64) -> Result<PartialProgress> {
        self.catalog.expect_kind(level_id, SubjectKind::Level)?;
        let members = self.catalog.level_members(level_id)?;
        let completed = self.completed(SubjectKind::Hack)?;
        let done = members.iter().filter(|m| completed.contains(&m.id)).count();
        Ok(PartialProgress::new(done, members.len()))
    }

    pub fn diagnose(&self) -> Result<Vec<GraphReport>> {
        let catalog: HashSet<i64> = self
            .catalog
            .list_subjects(None)?
            .iter()
            .map(|s| s.id)
            .collect();
        SubjectKind::ALL
            .into_iter()
            .map(|kind| {
                let graph = PrerequisiteGraph::from_edges(&self.catalog.prerequisite_edges(kind)?);
                Ok(GraphReport {
                    kind,
                    edges: graph.edge_count(),
                    dangling: graph.dangling_edges(&catalog),
                    cycles: graph.cycles(),
                })
            })
            .collect()
    }
}

/// Folds device-local progress into a user's account. Returns how many
/// records were merged. Entries whose id is not in the catalog, or that sit
/// in the wrong section for their kind, are skipped. The local document is
/// left in place.
pub fn import_local_progress(db: &Database, local: &LocalStore, actor: &Actor) -> Result<usize> {
    if actor.is_anonymous() {
        return Err(ProgressError::AccountRequired);
    }
    let mut merged = 0;
    for (subject, record) in local.records()? {
        if record.completion_count == 0 {
            continue;
        }
        match db.get_subject(subject.id)? {
            Some(found) if found.kind == subject.kind => {}
            Some(found) => {
                tracing::warn!(
                    subject = subject.id,
                    section = %subject.kind,
                    actual = %found.kind,
                    "skipping local progress filed under the wrong kind"
                );
                continue;
            }
            None => {
                tracing::warn!(kind = %subject.kind, subject = subject.id, "skipping local progress for unknown subject");
                continue;
            }
        }
        let count = db.merge_completion(actor, subject, &record)?;
        tracing::debug!(kind = %subject.kind, subject = subject.id, count, "merged local progress");
        merged += 1;
    }
    Ok(merged)
}

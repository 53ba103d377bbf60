//! Prerequisite gating over the subject dependency graph.
//!
//! A subject is unlocked when every subject it requires appears in the
//! actor's completed set. Unknown or dangling targets simply never count as
//! completed, and cycles lock every subject on them. The diagnostics below
//! report both conditions without changing the outcome.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::PrerequisiteEdge;

#[allow(dead_code)]
pub fn is_unlocked(
    subject_id: i64,
    edges: &[PrerequisiteEdge],
    completed: &HashSet<i64>,
) -> bool {
    edges
        .iter()
        .filter(|e| e.subject_id == subject_id)
        .all(|e| completed.contains(&e.required_id))
}

#[derive(Debug, Clone, Default)]
pub struct PrerequisiteGraph {
    requires: BTreeMap<i64, BTreeSet<i64>>,
}

impl PrerequisiteGraph {
    pub fn from_edges(edges: &[PrerequisiteEdge]) -> Self {
        let mut requires: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for edge in edges {
            requires
                .entry(edge.subject_id)
                .or_default()
                .insert(edge.required_id);
        }
        Self { requires }
    }

    pub fn edge_count(&self) -> usize {
        self.requires.values().map(BTreeSet::len).sum()
    }

    pub fn prerequisites_of(&self, subject_id: i64) -> Vec<i64> {
        self.requires
            .get(&subject_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, subject_id: i64) -> Vec<i64> {
        self.requires
            .iter()
            .filter(|(_, required)| required.contains(&subject_id))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn missing_prerequisites(&self, subject_id: i64, completed: &HashSet<i64>) -> Vec<i64> {
        self.requires
            .get(&subject_id)
            .map(|set| {
                set.iter()
                    .filter(|id| !completed.contains(id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_unlocked(&self, subject_id: i64, completed: &HashSet<i64>) -> bool {
        self.requires
            .get(&subject_id)
            .map_or(true, |set| set.iter().all(|id| completed.contains(id)))
    }

    pub fn unlock_states(
        &self,
        subject_ids: impl IntoIterator<Item = i64>,
        completed: &HashSet<i64>,
    ) -> BTreeMap<i64, bool> {
        subject_ids
            .into_iter()
            .map(|id| (id, self.is_unlocked(id, completed)))
            .collect()
    }

    /// Edges whose required subject is missing from the catalog.
    pub fn dangling_edges(&self, catalog: &HashSet<i64>) -> Vec<PrerequisiteEdge> {
        self.requires
            .iter()
            .flat_map(|(subject, required)| {
                required
                    .iter()
                    .filter(|r| !catalog.contains(r))
                    .map(move |r| PrerequisiteEdge::new(*subject, *r))
            })
            .collect()
    }

    /// Groups of subjects that (transitively) require each other.
    pub fn cycles(&self) -> Vec<Vec<i64>> {
        let reach: BTreeMap<i64, BTreeSet<i64>> = self
            .requires
            .keys()
            .map(|id| (*id, self.reachable_from(*id)))
            .collect();

        let mut seen = BTreeSet::new();
        let mut groups = Vec::new();
        for (id, reachable) in &reach {
            if seen.contains(id) || !reachable.contains(id) {
                continue;
            }
            let group: Vec<i64> = reachable
                .iter()
                .filter(|other| {
                    reach
                        .get(other)
                        .map_or(false, |back| back.contains(id))
                })
                .copied()
                .collect();
            seen.extend(group.iter().copied());
            groups.push(group);
        }
        groups
    }

    fn reachable_from(&self, start: i64) -> BTreeSet<i64> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<i64> = self.prerequisites_of(start);
        while let Some(next) = stack.pop() {
            if visited.insert(next) {
                stack.extend(self.prerequisites_of(next));
            }
        }
        visited
    }
}

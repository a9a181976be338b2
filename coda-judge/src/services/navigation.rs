//! Filter/navigation index over a dynamically-judged subject collection
//!
//! The filtered list is a pure function of (subjects, ai judgments, human
//! judgments, filter). Indices into it are valid only until the filter
//! changes; a filter change recomputes the list and resets the position.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::Subject;

/// Judgment-presence filter over the subject list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectFilter {
    /// Every subject in the context
    All,
    /// Judged by neither rater
    Unrated,
    /// Judged by the AI rater
    AiRated,
    /// Judged by the human rater
    HumanRated,
}

/// Compute the ordered filtered view
///
/// Pure: depends only on the arguments. Unrated means judged by neither
/// rater.
pub fn filtered_subjects(
    subjects: &[Subject],
    ai_judged: &HashSet<Uuid>,
    human_judged: &HashSet<Uuid>,
    filter: SubjectFilter,
) -> Vec<Uuid> {
    subjects
        .iter()
        .filter(|s| match filter {
            SubjectFilter::All => true,
            SubjectFilter::Unrated => !ai_judged.contains(&s.id) && !human_judged.contains(&s.id),
            SubjectFilter::AiRated => ai_judged.contains(&s.id),
            SubjectFilter::HumanRated => human_judged.contains(&s.id),
        })
        .map(|s| s.id)
        .collect()
}

/// Session-local cursor over the filtered list
///
/// All movement is bounds-clamped; the cursor never wraps.
#[derive(Debug, Clone)]
pub struct NavigationState {
    filter: SubjectFilter,
    list: Vec<Uuid>,
    index: usize,
}

impl NavigationState {
    pub fn new(filter: SubjectFilter, list: Vec<Uuid>) -> Self {
        Self {
            filter,
            list,
            index: 0,
        }
    }

    /// Active filter
    pub fn filter(&self) -> SubjectFilter {
        self.filter
    }

    /// Filtered list length
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Current position within the filtered list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Subject under the cursor, None when the filtered set is empty
    pub fn current(&self) -> Option<Uuid> {
        self.list.get(self.index).copied()
    }

    /// Recompute the list for (possibly new) judgment state
    ///
    /// A filter change resets the position to 0. Otherwise the cursor
    /// re-anchors on `anchor` when it survives the recompute, and clamps
    /// when it does not (a vanished subject leaves the cursor on its
    /// successor).
    pub fn rebuild(
        &mut self,
        subjects: &[Subject],
        ai_judged: &HashSet<Uuid>,
        human_judged: &HashSet<Uuid>,
        filter: SubjectFilter,
        anchor: Option<Uuid>,
    ) {
        let filter_changed = filter != self.filter;
        self.list = filtered_subjects(subjects, ai_judged, human_judged, filter);
        self.filter = filter;

        if filter_changed {
            self.index = 0;
        } else if let Some(pos) = anchor.and_then(|id| self.list.iter().position(|s| *s == id)) {
            self.index = pos;
        } else {
            self.index = self.index.min(self.list.len().saturating_sub(1));
        }
    }

    /// Advance one position, clamped at the end
    pub fn next(&mut self) -> Option<Uuid> {
        if !self.list.is_empty() {
            self.index = (self.index + 1).min(self.list.len() - 1);
        }
        self.current()
    }

    /// Step back one position, clamped at the start
    pub fn prev(&mut self) -> Option<Uuid> {
        self.index = self.index.saturating_sub(1);
        self.current()
    }

    /// Jump to an index, clamped into bounds
    pub fn jump_to(&mut self, index: usize) -> Option<Uuid> {
        if !self.list.is_empty() {
            self.index = index.min(self.list.len() - 1);
        }
        self.current()
    }

    /// Focus a specific subject, recomputing its index under the active filter
    ///
    /// Returns None (cursor unchanged) when the subject is not in the
    /// filtered list.
    pub fn jump_to_subject(&mut self, subject_id: Uuid) -> Option<usize> {
        let pos = self.list.iter().position(|s| *s == subject_id)?;
        self.index = pos;
        Some(pos)
    }
}

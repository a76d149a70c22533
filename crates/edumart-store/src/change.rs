//! Change events observed on the primary store.
//!
//! Watchers receive these from [`crate::DocumentStore::watch_courses`] /
//! [`crate::DocumentStore::watch_enquiries`] in commit order per
//! collection. Events are ephemeral: consumed once, never stored.

use std::collections::BTreeSet;

/// Mutation kind carried by a change event.
///
/// The course stream is filtered server-side to `Update`/`Replace`; the
/// enquiry stream delivers `Insert` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
}

/// A single committed mutation with its post-mutation snapshot.
#[derive(Debug, Clone)]
pub struct ChangeEvent<T> {
    /// What kind of mutation occurred
    pub operation: ChangeOperation,
    /// ID of the mutated document
    pub document_id: String,
    /// Dotted field paths touched by the mutation (`courseViews`,
    /// `viewsRollups.2026-08`, ...). Empty for inserts.
    pub changed_paths: BTreeSet<String>,
    /// Full document as of after the mutation
    pub document: T,
}

impl<T> ChangeEvent<T> {
    /// Whether a top-level field changed.
    pub fn path_changed(&self, path: &str) -> bool {
        self.changed_paths.contains(path)
    }

    /// Whether any path under `prefix.` changed (e.g. `viewsRollups`).
    pub fn path_group_changed(&self, prefix: &str) -> bool {
        let dotted = format!("{}.", prefix);
        self.changed_paths.iter().any(|p| p.starts_with(&dotted))
    }
}

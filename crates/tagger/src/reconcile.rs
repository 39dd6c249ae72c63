//! Decides which person tags a file still needs and writes only those.

use crate::metadata::{MetadataError, MetadataTool, TagField, TagUpdate};
use std::collections::BTreeSet;
use std::path::Path;
use tagger_core::Label;

/// Why a file's metadata was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Recognition failed for this file.
    Warning(String),
    /// No faces were found, or nothing was analyzed.
    NoPeople,
    /// Every face found was unrecognized.
    OnlyUnknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Every recognized person was already tagged.
    UpToDate,
    /// Tags were appended (or would have been, in a dry run).
    Tagged { added: Vec<String>, category_added: bool },
}

/// Result of reconciling one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: Outcome,
    pub unknown_faces: usize,
    pub already_tagged: Vec<String>,
}

impl Reconciliation {
    fn skipped(reason: SkipReason, unknown_faces: usize) -> Self {
        Self {
            outcome: Outcome::Skipped(reason),
            unknown_faces,
            already_tagged: Vec::new(),
        }
    }
}

/// Applies the tagging policy for one file at a time.
pub struct Reconciler<'a, T: MetadataTool + ?Sized> {
    tool: &'a T,
    category: String,
    dry_run: bool,
}

impl<'a, T: MetadataTool + ?Sized> Reconciler<'a, T> {
    pub fn new(tool: &'a T, category: impl Into<String>) -> Self {
        Self {
            tool,
            category: category.into(),
            dry_run: false,
        }
    }

    /// Log intended writes instead of performing them.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reconcile(
        &self,
        path: &Path,
        labels: &[Label],
    ) -> Result<Reconciliation, MetadataError> {
        if let Some(message) = labels.iter().find_map(|l| match l {
            Label::ProcessingWarning(message) => Some(message),
            _ => None,
        }) {
            tracing::warn!(
                path = %path.display(),
                warning = %message,
                "analysis failed, metadata left untouched"
            );
            return Ok(Reconciliation::skipped(SkipReason::Warning(message.clone()), 0));
        }

        if labels.iter().all(|l| *l == Label::NoFacesFound) {
            tracing::info!(path = %path.display(), "no persons, not even unknown ones, identified");
            return Ok(Reconciliation::skipped(SkipReason::NoPeople, 0));
        }

        let unknown_faces = labels.iter().filter(|l| **l == Label::Unknown).count();
        if unknown_faces > 0 {
            tracing::warn!(
                path = %path.display(),
                count = unknown_faces,
                "{unknown_faces} unknown person(s) detected, please check manually"
            );
        }

        let mut recognized: Vec<&str> = Vec::new();
        for name in labels.iter().filter_map(Label::known_name) {
            if !recognized.contains(&name) {
                recognized.push(name);
            }
        }
        if recognized.is_empty() {
            return Ok(Reconciliation::skipped(SkipReason::OnlyUnknown, unknown_faces));
        }

        let current = self.tool.read_tags(path)?;
        let (already_tagged, added): (Vec<&str>, Vec<&str>) =
            recognized.into_iter().partition(|name| self.is_tagged(&current, name));

        for name in &already_tagged {
            tracing::info!(
                path = %path.display(),
                person = %name,
                "already tagged, not adding again"
            );
        }

        let already_tagged: Vec<String> = already_tagged.into_iter().map(str::to_owned).collect();
        if added.is_empty() {
            return Ok(Reconciliation {
                outcome: Outcome::UpToDate,
                unknown_faces,
                already_tagged,
            });
        }

        let category_added = !current.contains(&self.category);
        let updates = self.updates_for(&added, category_added);

        if self.dry_run {
            for update in &updates {
                tracing::info!(
                    path = %path.display(),
                    field = %update.field,
                    value = %update.value,
                    "dry run: would append tag"
                );
            }
        } else {
            self.tool.append_tags(path, &updates)?;
            for name in &added {
                tracing::info!(path = %path.display(), person = %name, "tagged newly found person");
            }
        }

        Ok(Reconciliation {
            outcome: Outcome::Tagged {
                added: added.into_iter().map(str::to_owned).collect(),
                category_added,
            },
            unknown_faces,
            already_tagged,
        })
    }

    fn hierarchical(&self, name: &str) -> String {
        format!("{}|{}", self.category, name)
    }

    fn is_tagged(&self, current: &BTreeSet<String>, name: &str) -> bool {
        current.contains(name) || current.contains(&self.hierarchical(name))
    }

    fn updates_for(&self, names: &[&str], with_category: bool) -> Vec<TagUpdate> {
        let mut updates = Vec::with_capacity(names.len() * 3 + 3);
        if with_category {
            updates.extend(
                TagField::ALL
                    .iter()
                    .map(|&field| TagUpdate::new(field, self.category.as_str())),
            );
        }
        for name in names {
            updates.push(TagUpdate::new(TagField::Keywords, *name));
            updates.push(TagUpdate::new(TagField::HierarchicalSubject, self.hierarchical(name)));
            updates.push(TagUpdate::new(TagField::Subject, *name));
        }
        updates
    }
}

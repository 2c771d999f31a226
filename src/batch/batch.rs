use crate::mapping::mapping::PathMappingTable;
use crate::rewriter::rewriter::{BinaryPathRewriter, PatchResult};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What happened to one target file.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// At least one candidate matched (and the file was rewritten unless this is a dry run).
    Patched { results: Vec<PatchResult> },
    /// No candidate matched, the file was not written.
    Unchanged { results: Vec<PatchResult> },
    /// The file could not be read or written.
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| predicate(&f.outcome)).count()
    }

    pub fn patched(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Patched { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    /// Total number of replaced (or, in a dry run, replaceable) occurrences.
    pub fn occurrences(&self) -> usize {
        self.files
            .iter()
            .filter_map(|f| match &f.outcome {
                FileOutcome::Patched { results } => Some(results),
                _ => None,
            })
            .flatten()
            .map(|r| r.occurrences)
            .sum()
    }
}

/// Batch drives the rewriter over a list of target files, one file at a time.
///
/// A file that cannot be read or written is reported and skipped, it never aborts the batch.
pub struct Batch<'a> {
    rewriter: &'a BinaryPathRewriter,
    table: &'a PathMappingTable,
    dry_run: bool,
}

impl<'a> Batch<'a> {
    pub fn new(rewriter: &'a BinaryPathRewriter, table: &'a PathMappingTable) -> Self {
        Self {
            rewriter,
            table,
            dry_run: false,
        }
    }

    /// Only count occurrences, never write.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self, targets: &[PathBuf]) -> BatchReport {
        if self.table.is_empty() {
            warn!("Mapping table is empty, nothing will be patched");
        }
        let files = targets.iter().map(|t| self.process(t)).collect();
        BatchReport {
            dry_run: self.dry_run,
            files,
        }
    }

    fn process(&self, target: &Path) -> FileReport {
        info!("Patching: {}", target.display());
        let applied = if self.dry_run {
            self.rewriter.scan(target, self.table)
        } else {
            self.rewriter.patch_table(target, self.table)
        };

        let outcome = match applied {
            Ok(results) => {
                for result in results.iter() {
                    info!(
                        "  Found {} occurrences of '{}'",
                        result.occurrences,
                        result.candidate.old_lossy()
                    );
                }
                let total: usize = results.iter().map(|r| r.occurrences).sum();
                if total == 0 {
                    FileOutcome::Unchanged { results }
                } else {
                    if !self.dry_run {
                        info!("  Replaced {} occurrences", total);
                    }
                    FileOutcome::Patched { results }
                }
            }
            Err(err) => {
                warn!("Skipping {} ({})", err.path().display(), err);
                FileOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        };

        FileReport {
            path: target.to_path_buf(),
            outcome,
        }
    }
}

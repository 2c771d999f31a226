use super::{PatchError, Result};
use crate::mapping::mapping::{PathCandidate, PathMappingTable};
use log::debug;
use memchr::memmem;
use serde::Serialize;
use std::cmp::Reverse;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// How a rewritten file reaches the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Write the whole new content to a temporary file next to the target, then rename it over
    /// the target. The original stays intact if anything fails before the rename.
    #[default]
    Atomic,
    /// Seek to every match in the original file and overwrite it there.
    InPlace,
}

/// The outcome of applying one candidate to one target file.
///
/// * `occurrences`: number of non-overlapping matches of the old path that were replaced
/// * `offsets`: file offset of each match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    pub candidate: PathCandidate,
    pub occurrences: usize,
    pub offsets: Vec<u64>,
}

// a single match of candidates[candidate].old at offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edit {
    offset: usize,
    candidate: usize,
}

/// BinaryPathRewriter is responsible for redirecting embedded paths in a target file without
/// changing the file's length.
///
/// It knows nothing about the file format: the file is a plain byte sequence and a match is any
/// run of bytes equal to a candidate's old path.
pub struct BinaryPathRewriter {
    mode: WriteMode,
}

impl BinaryPathRewriter {
    pub fn new(mode: WriteMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Replace every occurrence of `candidate`'s old path in `file`.
    ///
    /// The file is only written when at least one occurrence was found. A read-only file with
    /// occurrences fails with [`PatchError::PermissionDenied`] in either write mode.
    pub fn patch(&self, file: &Path, candidate: &PathCandidate) -> Result<PatchResult> {
        let mut results = self.apply(file, std::slice::from_ref(candidate), true)?;
        Ok(results.remove(0))
    }

    /// Apply the whole table to `file` with a single read and at most one write.
    ///
    /// All candidates are matched against the unmodified content. Where matches of different
    /// candidates overlap, the leftmost wins, then the longest, then the earliest in the table.
    /// Returns one result per candidate, in table order.
    pub fn patch_table(&self, file: &Path, table: &PathMappingTable) -> Result<Vec<PatchResult>> {
        self.apply(file, table.candidates(), true)
    }

    /// Same as [`BinaryPathRewriter::patch_table`] but never writes.
    pub fn scan(&self, file: &Path, table: &PathMappingTable) -> Result<Vec<PatchResult>> {
        self.apply(file, table.candidates(), false)
    }

    fn apply(
        &self,
        file: &Path,
        candidates: &[PathCandidate],
        write: bool,
    ) -> Result<Vec<PatchResult>> {
        let mut data = fs::read(file).map_err(|err| PatchError::from_io(file, err))?;
        let edits = locate_edits(&data, candidates);
        let results = summarize(&edits, candidates);

        if edits.is_empty() || !write {
            return Ok(results);
        }

        // a rename would replace a read-only file that an in-place write cannot open,
        // so both modes refuse it up front
        let readonly = fs::metadata(file)
            .map_err(|err| PatchError::from_io(file, err))?
            .permissions()
            .readonly();
        if readonly {
            return Err(PatchError::PermissionDenied {
                path: file.to_path_buf(),
            });
        }

        debug!(
            "Writing {} edits to {} ({:?})",
            edits.len(),
            file.display(),
            self.mode
        );
        match self.mode {
            WriteMode::Atomic => {
                apply_edits(&mut data, &edits, candidates);
                write_atomic(file, &data)?;
            }
            WriteMode::InPlace => write_in_place(file, &edits, candidates)?,
        }
        Ok(results)
    }
}

impl Default for BinaryPathRewriter {
    fn default() -> Self {
        Self::new(WriteMode::default())
    }
}

/// Find the edits the candidates make in `data`, ordered by offset and never overlapping.
///
/// For a single candidate this is the usual left-to-right non-overlapping search: after a match
/// at `p` the next match starts at `p + len(old)` or later.
fn locate_edits(data: &[u8], candidates: &[PathCandidate]) -> Vec<Edit> {
    let mut matches = vec![];
    for (index, candidate) in candidates.iter().enumerate() {
        let finder = memmem::Finder::new(candidate.old());
        let mut start = 0;
        // every match, overlapping ones included, the sweep below picks the winners
        while let Some(pos) = finder.find(&data[start..]) {
            matches.push(Edit {
                offset: start + pos,
                candidate: index,
            });
            start += pos + 1;
        }
    }

    matches.sort_by_key(|m| {
        (
            m.offset,
            Reverse(candidates[m.candidate].byte_len()),
            m.candidate,
        )
    });

    let mut edits = Vec::with_capacity(matches.len());
    let mut cursor = 0;
    for m in matches {
        if m.offset < cursor {
            continue;
        }
        cursor = m.offset + candidates[m.candidate].byte_len();
        edits.push(m);
    }
    edits
}

fn apply_edits(data: &mut [u8], edits: &[Edit], candidates: &[PathCandidate]) {
    for edit in edits {
        let new = candidates[edit.candidate].new_path();
        data[edit.offset..edit.offset + new.len()].copy_from_slice(new);
    }
}

fn summarize(edits: &[Edit], candidates: &[PathCandidate]) -> Vec<PatchResult> {
    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let offsets: Vec<u64> = edits
                .iter()
                .filter(|e| e.candidate == index)
                .map(|e| e.offset as u64)
                .collect();
            PatchResult {
                candidate: candidate.clone(),
                occurrences: offsets.len(),
                offsets,
            }
        })
        .collect()
}

// The temporary file must live on the same filesystem as the target for the rename to be atomic,
// and the rename must replace the real file rather than a symlink pointing at it.
fn write_atomic(file: &Path, data: &[u8]) -> Result<()> {
    let io_err = |err| PatchError::from_io(file, err);

    let target = fs::canonicalize(file).map_err(io_err)?;
    let dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let permissions = fs::metadata(&target).map_err(io_err)?.permissions();

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().set_permissions(permissions).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(&target).map_err(|err| io_err(err.error))?;
    Ok(())
}

fn write_in_place(file: &Path, edits: &[Edit], candidates: &[PathCandidate]) -> Result<()> {
    let io_err = |err| PatchError::from_io(file, err);

    let mut handle = OpenOptions::new().write(true).open(file).map_err(io_err)?;
    for edit in edits {
        handle
            .seek(SeekFrom::Start(edit.offset as u64))
            .map_err(io_err)?;
        handle
            .write_all(candidates[edit.candidate].new_path())
            .map_err(io_err)?;
    }
    handle.sync_all().map_err(io_err)?;
    Ok(())
}

use super::{ConfigurationError, Result};
use log::debug;
use memchr::memmem;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single substitution rule: every occurrence of `old` in a target file is overwritten by `new`.
///
/// Both paths have the same length in bytes, so a rewrite never shifts the bytes that follow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CandidateEntry", into = "CandidateEntry")]
pub struct PathCandidate {
    old: Vec<u8>,
    new: Vec<u8>,
}

// on-disk shape of a candidate, paths are plain strings in the configuration file
#[derive(Serialize, Deserialize)]
struct CandidateEntry {
    old: String,
    new: String,
}

impl PathCandidate {
    /// Create a new candidate, checking that both paths have the same byte length.
    /// * `old`: the path compiled into the binary
    /// * `new`: the path it is redirected to
    pub fn new(old: impl Into<Vec<u8>>, new: impl Into<Vec<u8>>) -> Result<Self> {
        let candidate = Self {
            old: old.into(),
            new: new.into(),
        };
        candidate.check()?;
        Ok(candidate)
    }

    pub fn old(&self) -> &[u8] {
        &self.old
    }

    pub fn new_path(&self) -> &[u8] {
        &self.new
    }

    /// Length of the old (and new) path in bytes.
    pub fn byte_len(&self) -> usize {
        self.old.len()
    }

    pub fn old_lossy(&self) -> String {
        String::from_utf8_lossy(&self.old).into_owned()
    }

    pub fn new_lossy(&self) -> String {
        String::from_utf8_lossy(&self.new).into_owned()
    }

    fn check(&self) -> Result<()> {
        if self.old.is_empty() {
            return Err(ConfigurationError::EmptyPattern {
                new: self.new_lossy(),
            });
        }
        if self.old.len() != self.new.len() {
            return Err(ConfigurationError::LengthMismatch {
                old: self.old_lossy(),
                new: self.new_lossy(),
                old_len: self.old.len(),
                new_len: self.new.len(),
            });
        }
        Ok(())
    }

    // Rewrite every occurrence of `inner.old` inside our old path and compare with our new path.
    // When they agree, the two candidates produce the same bytes whichever one is applied first.
    fn nests_consistently(&self, inner: &PathCandidate) -> bool {
        let mut rewritten = self.old.clone();
        let offsets: Vec<usize> = memmem::find_iter(&self.old, &inner.old).collect();
        for offset in offsets {
            rewritten[offset..offset + inner.byte_len()].copy_from_slice(&inner.new);
        }
        rewritten == self.new
    }

    // Length of a piece of `other.old` that our rewrite glues onto the surrounding bytes: a
    // suffix of our new path that starts `other.old`, or a prefix of it that ends `other.old`.
    // Pieces already at the same edge of our old path are ignored, since those matches were
    // there before the rewrite.
    fn forms_at_edge(&self, other: &PathCandidate) -> Option<usize> {
        let max = self.new.len().min(other.old.len()) - 1;
        (1..=max).find(|&k| {
            let head = &other.old[..k];
            let tail = &other.old[other.old.len() - k..];
            (self.new.ends_with(head) && !self.old.ends_with(head))
                || (self.new.starts_with(tail) && !self.old.starts_with(tail))
        })
    }
}

impl TryFrom<CandidateEntry> for PathCandidate {
    type Error = ConfigurationError;

    fn try_from(entry: CandidateEntry) -> Result<Self> {
        PathCandidate::new(entry.old, entry.new)
    }
}

impl From<PathCandidate> for CandidateEntry {
    fn from(candidate: PathCandidate) -> Self {
        CandidateEntry {
            old: candidate.old_lossy(),
            new: candidate.new_lossy(),
        }
    }
}

impl fmt::Display for PathCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' -> '{}'", self.old_lossy(), self.new_lossy())
    }
}

/// The ordered set of candidates tried against every target file, one or more per known upstream
/// build layout.
///
/// A table can only be obtained through [`PathMappingTable::new`] or deserialization, both of
/// which validate it, so a rewriter never sees a table that could change a file's length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PathCandidate>", into = "Vec<PathCandidate>")]
pub struct PathMappingTable {
    candidates: Vec<PathCandidate>,
}

impl PathMappingTable {
    /// Build a table from the given candidates and validate it.
    pub fn new(candidates: Vec<PathCandidate>) -> Result<Self> {
        let table = Self { candidates };
        table.validate()?;
        Ok(table)
    }

    /// The WebKitGTK 4.1 layouts shipped by Fedora/RHEL and Ubuntu/Debian, redirected to the
    /// staging directory the bundle launcher populates with symlinks.
    pub fn webkit2gtk_4_1() -> Result<Self> {
        Self::new(vec![
            // Fedora/RHEL
            PathCandidate::new("/usr/libexec/webkit2gtk-4.1", "/tmp/scumbag-webkit/libexec")?,
            PathCandidate::new(
                "/usr/lib64/webkit2gtk-4.1/injected-bundle/",
                "/tmp/scumbag-webkit/lib64/injected-bundle/",
            )?,
            // Ubuntu/Debian
            PathCandidate::new(
                "/usr/lib/x86_64-linux-gnu/webkit2gtk-4.1",
                "/tmp/scumbag-webkit/lib/x86_64-linux-gnu",
            )?,
            PathCandidate::new(
                "/usr/lib/x86_64-linux-gnu/webkit2gtk-4.1/injected-bundle/",
                "/tmp/scumbag-webkit/lib/x86_64-linux-gnu/injected-bundle/",
            )?,
        ])
    }

    /// Check every candidate and every pair of candidates.
    ///
    /// Fails when a candidate changes the byte length, when two candidates share an old path,
    /// when one old path embeds another and the two rewrites disagree, or when a new path
    /// contains an old path or can complete one together with the bytes around it.
    ///
    /// The last check keeps a second run from finding anything new: it can then only match
    /// where two old paths already overlapped each other in the original content.
    pub fn validate(&self) -> Result<()> {
        for candidate in self.candidates.iter() {
            candidate.check()?;
        }

        for (i, outer) in self.candidates.iter().enumerate() {
            for (j, inner) in self.candidates.iter().enumerate() {
                if memmem::find(&outer.new, &inner.old).is_some() {
                    return Err(ConfigurationError::ChainedCandidate {
                        candidate: outer.new_lossy(),
                        old: inner.old_lossy(),
                    });
                }
                if let Some(k) = outer.forms_at_edge(inner) {
                    debug!("{} shares {} edge bytes with {}", outer, k, inner);
                    return Err(ConfigurationError::ChainedCandidate {
                        candidate: outer.new_lossy(),
                        old: inner.old_lossy(),
                    });
                }
                if i == j {
                    continue;
                }
                if outer.old == inner.old {
                    return Err(ConfigurationError::DuplicateCandidate(outer.old_lossy()));
                }
                if memmem::find(&outer.old, &inner.old).is_some() {
                    if !outer.nests_consistently(inner) {
                        return Err(ConfigurationError::OverlappingCandidates {
                            outer: outer.old_lossy(),
                            inner: inner.old_lossy(),
                        });
                    }
                    debug!("Candidate {} is subsumed by {}", outer, inner);
                }
            }
        }
        Ok(())
    }

    pub fn candidates(&self) -> &[PathCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl TryFrom<Vec<PathCandidate>> for PathMappingTable {
    type Error = ConfigurationError;

    fn try_from(candidates: Vec<PathCandidate>) -> Result<Self> {
        PathMappingTable::new(candidates)
    }
}

impl From<PathMappingTable> for Vec<PathCandidate> {
    fn from(table: PathMappingTable) -> Self {
        table.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_names_both_lengths() {
        let err = PathCandidate::new("/usr/libexec/webkit2gtk-4.1", "/tmp/short").unwrap_err();
        match err {
            ConfigurationError::LengthMismatch {
                old,
                old_len,
                new_len,
                ..
            } => {
                assert_eq!(old, "/usr/libexec/webkit2gtk-4.1");
                assert_eq!(old_len, 27);
                assert_eq!(new_len, 10);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err_message_contains("/a", "/bc", "2 != 3"));
    }

    fn err_message_contains(old: &str, new: &str, needle: &str) -> bool {
        PathCandidate::new(old, new)
            .unwrap_err()
            .to_string()
            .contains(needle)
    }

    #[test]
    fn test_length_is_measured_in_bytes() {
        // "é" is two bytes in UTF-8, so these have equal char counts but different byte lengths
        let err = PathCandidate::new("/opt/é", "/opt/e").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::LengthMismatch {
                old_len: 7,
                new_len: 6,
                ..
            }
        ));
        assert!(PathCandidate::new("/opt/é", "/opt/ab").is_ok());
    }

    #[test]
    fn test_empty_old_path_rejected() {
        let err = PathCandidate::new("", "").unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyPattern { .. }));
    }

    #[test]
    fn test_webkit_table_is_valid() {
        let table = PathMappingTable::webkit2gtk_4_1().unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.validate().is_ok());
        for candidate in table.candidates() {
            assert_eq!(candidate.old().len(), candidate.new_path().len());
        }
    }

    #[test]
    fn test_duplicate_old_path_rejected() {
        let err = PathMappingTable::new(vec![
            PathCandidate::new("/usr/lib/foo", "/tmp/lib/foo").unwrap(),
            PathCandidate::new("/usr/lib/foo", "/tmp/lib/bar").unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateCandidate(ref old) if old == "/usr/lib/foo"));
    }

    #[test]
    fn test_inconsistent_nesting_rejected() {
        let err = PathMappingTable::new(vec![
            PathCandidate::new("/usr/lib/foo", "/tmp/lib/foo").unwrap(),
            PathCandidate::new("/usr/lib/foo/bar", "/opt/xx/yyy/zzzz").unwrap(),
        ])
        .unwrap_err();
        match err {
            ConfigurationError::OverlappingCandidates { outer, inner } => {
                assert_eq!(outer, "/usr/lib/foo/bar");
                assert_eq!(inner, "/usr/lib/foo");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_consistent_nesting_accepted() {
        let table = PathMappingTable::new(vec![
            PathCandidate::new("/usr/lib/foo", "/tmp/lib/foo").unwrap(),
            PathCandidate::new("/usr/lib/foo/bar", "/tmp/lib/foo/bar").unwrap(),
        ]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_new_path_containing_old_path_rejected() {
        let err = PathMappingTable::new(vec![
            PathCandidate::new("/usr/a", "/x/usr").unwrap(),
            PathCandidate::new("/usr", "/opt").unwrap(),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::ChainedCandidate { .. }));
    }

    #[test]
    fn test_new_path_ending_in_old_prefix_rejected() {
        let candidate = PathCandidate::new("/usr/lib/a", "/tmp/x/usr").unwrap();
        let err = PathMappingTable::new(vec![candidate]).unwrap_err();
        match err {
            ConfigurationError::ChainedCandidate { candidate, old } => {
                assert_eq!(candidate, "/tmp/x/usr");
                assert_eq!(old, "/usr/lib/a");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_new_path_starting_with_old_suffix_rejected() {
        // "x/tmp/share/" placed after "/usr/share/" would complete "/usr/share/x"
        let candidate = PathCandidate::new("/usr/share/x", "x/tmp/share/").unwrap();
        let err = PathMappingTable::new(vec![candidate]).unwrap_err();
        assert!(matches!(err, ConfigurationError::ChainedCandidate { .. }));
    }

    #[test]
    fn test_shared_separator_edge_accepted() {
        // both paths end in '/', so a rewrite cannot glue a new '/' onto what follows
        let table = PathMappingTable::new(vec![
            PathCandidate::new("/usr/lib/a/", "/tmp/lib/a/").unwrap(),
            PathCandidate::new("/usr/share", "/tmp/share").unwrap(),
        ]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_deserialize_rejects_mismatched_candidate() {
        let json = r#"[{"old": "/usr/libexec/webkit2gtk-4.1", "new": "/tmp/x"}]"#;
        let err = serde_json::from_str::<PathMappingTable>(json).unwrap_err();
        assert!(err.to_string().contains("27 != 6"));
    }

    #[test]
    fn test_deserialize_keeps_order() {
        let json = r#"[
            {"old": "/usr/libexec/webkit2gtk-4.1", "new": "/tmp/scumbag-webkit/libexec"},
            {"old": "/usr/share/foo", "new": "/tmp/share/foo"}
        ]"#;
        let table: PathMappingTable = serde_json::from_str(json).unwrap();
        let olds: Vec<String> = table.candidates().iter().map(|c| c.old_lossy()).collect();
        assert_eq!(olds, vec!["/usr/libexec/webkit2gtk-4.1", "/usr/share/foo"]);
    }
}

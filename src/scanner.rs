//! Input expansion: positional arguments to an ordered candidate set.
//!
//! Arguments may be literal paths, directories, or glob patterns. Expansion
//! honors the ignore engine, deduplicates by canonical path while keeping
//! first-encounter order, and reads each file exactly once.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::classify;
use crate::error::Fatal;
use crate::gitignore::{self, IgnoreSet};
use crate::pathmatch::{self, MatchOptions};
use crate::stdin::{ContentKind, StdinBlob, STDIN_FILE_NAME};

/// A file that survived expansion and filtering, eligible for emission.
#[derive(Clone, Debug)]
pub struct CandidateFile {
    /// Canonicalized on-disk location (synthetic for stdin).
    pub path: PathBuf,
    /// `/`-separated path relative to the invocation root, used in output.
    pub display_path: String,
    pub size_bytes: u64,
    pub is_binary: bool,
    /// Body text; `None` for binary files.
    pub content: Option<String>,
    /// Filled in by the ranker.
    pub score: f64,
    pub hit_count: usize,
}

impl CandidateFile {
    /// Wrap captured stdin as the synthetic `stdin_content` candidate.
    pub fn from_stdin(blob: &StdinBlob) -> CandidateFile {
        let is_binary = blob.content_kind == ContentKind::Binary;
        CandidateFile {
            path: PathBuf::from(STDIN_FILE_NAME),
            display_path: STDIN_FILE_NAME.to_string(),
            size_bytes: blob.bytes.len() as u64,
            is_binary,
            content: if is_binary {
                None
            } else {
                Some(String::from_utf8_lossy(&blob.bytes).into_owned())
            },
            score: 0.0,
            hit_count: 0,
        }
    }

    /// Body for matching purposes; empty for binary files.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Expansion context shared across all arguments of one invocation.
pub struct Planner<'a> {
    root: PathBuf,
    ignore: Option<&'a IgnoreSet>,
    match_options: MatchOptions,
    seen: HashSet<PathBuf>,
    files: Vec<CandidateFile>,
}

impl<'a> Planner<'a> {
    /// `ignore` is `None` under `--no-gitignore`, which also switches the
    /// matcher into permissive-dot mode.
    pub fn new(root: &Path, ignore: Option<&'a IgnoreSet>) -> Self {
        Planner {
            root: root.to_path_buf(),
            ignore,
            match_options: MatchOptions {
                permissive_dot: ignore.is_none(),
            },
            seen: HashSet::new(),
            files: Vec::new(),
        }
    }

    /// Expand every argument and return the ordered candidate list.
    pub fn plan(mut self, args: &[String]) -> Result<Vec<CandidateFile>> {
        let sole_input = args.len() == 1;

        for arg in args {
            if pathmatch::has_wildcards(arg) {
                if malformed_pattern(arg) {
                    tracing::warn!("malformed pattern {arg:?}; treating it as a literal path");
                    self.add_literal(arg, sole_input)?;
                } else {
                    self.add_pattern(arg);
                }
            } else {
                self.add_literal(arg, sole_input)?;
            }
        }

        Ok(self.files)
    }

    // ------------------------------------------------------------------
    // Argument forms
    // ------------------------------------------------------------------

    fn add_literal(&mut self, arg: &str, sole_input: bool) -> Result<()> {
        let path = self.absolute(arg);

        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(err) => {
                if sole_input {
                    return Err(Fatal::Io(format!("cannot read {arg}: {err}")).into());
                }
                tracing::warn!("skipping {arg}: {err}");
                return Ok(());
            }
        };

        if meta.is_dir() {
            self.walk_directory(&path);
        } else if meta.is_file() {
            self.push_file(&path);
        } else {
            tracing::warn!("skipping non-regular file {arg}");
        }
        Ok(())
    }

    fn add_pattern(&mut self, pattern: &str) {
        let anchor = self.root.join(literal_prefix(pattern));
        if !anchor.exists() {
            tracing::warn!("pattern {pattern:?} matched nothing");
            return;
        }

        let walker = WalkDir::new(&anchor)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if pathmatch::matches(pattern, &unix_path(rel), self.match_options) {
                self.push_file(entry.path());
            }
        }
    }

    fn walk_directory(&mut self, dir: &Path) {
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                self.push_file(entry.path());
            }
        }
    }

    // ------------------------------------------------------------------
    // Candidate construction
    // ------------------------------------------------------------------

    fn push_file(&mut self, path: &Path) {
        if self.is_ignored(path) {
            return;
        }

        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.seen.insert(canonical.clone()) {
            return;
        }

        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(err) => {
                tracing::warn!("skipping unreadable {}: {}", path.display(), err);
                return;
            }
        };

        let is_binary = classify::is_binary_bytes(&bytes);
        let display_path = match path.strip_prefix(&self.root) {
            Ok(rel) => unix_path(rel),
            Err(_) => unix_path(path),
        };

        self.files.push(CandidateFile {
            path: canonical,
            display_path,
            size_bytes: bytes.len() as u64,
            is_binary,
            content: if is_binary {
                None
            } else {
                Some(String::from_utf8_lossy(&bytes).into_owned())
            },
            score: 0.0,
            hit_count: 0,
        });
    }

    fn is_ignored(&self, path: &Path) -> bool {
        match self.ignore {
            Some(set) => set.should_ignore(path, false),
            // `.git/` stays excluded even under --no-gitignore.
            None => gitignore::contains_git_component(path),
        }
    }

    fn absolute(&self, arg: &str) -> PathBuf {
        let p = Path::new(arg);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

/// `/`-separated rendering of a path.
pub fn unix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Directory segments of `pattern` before the first wildcard, used to
/// anchor the walk.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    for segment in pattern.split('/') {
        if pathmatch::has_wildcards(segment) {
            break;
        }
        prefix.push(segment);
    }
    // A bare file name is not a directory prefix.
    if prefix == Path::new(pattern) {
        prefix.pop();
    }
    prefix
}

/// Unclosed `[` or `{` constructs degrade the whole argument to a literal.
fn malformed_pattern(pattern: &str) -> bool {
    let mut in_class = false;
    let mut brace_depth = 0usize;
    for c in pattern.chars() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '{' if !in_class => brace_depth += 1,
            '}' if !in_class => brace_depth = brace_depth.saturating_sub(1),
            _ => {}
        }
    }
    in_class || brace_depth != 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

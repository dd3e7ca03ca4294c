//! Layered `.gitignore` evaluation.
//!
//! Rules from every `.gitignore` discovered under the invocation root are
//! concatenated into one ordered list; within that list the last matching
//! rule decides, and a negation (`!pattern`) un-ignores. CLI exclusions are
//! seeded as if they were rules at the invocation root.

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::pathmatch::{self, MatchOptions};

/// A normalized ignore pattern.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Pattern text after stripping `!`, a leading `/`, and a trailing `/`.
    pub text: String,
    /// Contains a `**` segment.
    pub is_recursive: bool,
    /// Had a trailing `/`: matches directories (and their contents) only.
    pub is_directory_only: bool,
    /// Line started with `!`.
    pub is_negation: bool,
    /// Aligned at the `.gitignore`'s own directory. A leading or interior
    /// `/` anchors; a bare name floats to any depth.
    pub is_anchored: bool,
}

impl Pattern {
    /// Parse one `.gitignore` line. Returns `None` for blanks and comments.
    pub fn parse(line: &str) -> Option<Pattern> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let (text, is_negation) = match trimmed.strip_prefix('!') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        if text.is_empty() {
            return None;
        }

        let (text, is_directory_only) = match text.strip_suffix('/') {
            Some(rest) => (rest, true),
            None => (text, false),
        };
        let (text, had_leading_slash) = match text.strip_prefix('/') {
            Some(rest) => (rest, true),
            None => (text, false),
        };
        if text.is_empty() {
            return None;
        }

        Some(Pattern {
            text: text.to_string(),
            is_recursive: text.split('/').any(|s| s == "**"),
            is_directory_only,
            is_negation,
            is_anchored: had_leading_slash || text.contains('/'),
        })
    }
}

/// One rule together with its directory of origin.
#[derive(Clone, Debug)]
pub struct IgnoreRule {
    pub source_dir: PathBuf,
    pub pattern: Pattern,
    pub order_index: usize,
}

/// Ordered set of ignore rules rooted at the invocation directory.
#[derive(Debug, Default)]
pub struct IgnoreSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of loaded rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Discover and parse every `.gitignore` under `root`, appending rules
    /// in encounter order (parents before children, siblings sorted).
    pub fn load_tree(&mut self, root: &Path) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(|e| e.ok());

        for entry in walker {
            if entry.file_type().is_file() && entry.file_name() == ".gitignore" {
                self.load_file(entry.path());
            }
        }
    }

    /// Parse a single `.gitignore` file. Unreadable files are logged and
    /// skipped; this is never fatal.
    pub fn load_file(&mut self, path: &Path) {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(err) => {
                tracing::warn!("skipping unreadable {}: {}", path.display(), err);
                return;
            }
        };

        let source_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let reader = std::io::BufReader::new(file);
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => continue,
            };
            if let Some(pattern) = Pattern::parse(&line) {
                self.push(source_dir.clone(), pattern);
            }
        }
    }

    /// Seed rules from CLI exclusion patterns, treated as if they came from
    /// a `.gitignore` at `root`.
    pub fn seed(&mut self, patterns: &[String], root: &Path) {
        for raw in patterns {
            if let Some(pattern) = Pattern::parse(raw) {
                self.push(root.to_path_buf(), pattern);
            }
        }
    }

    fn push(&mut self, source_dir: PathBuf, pattern: Pattern) {
        let order_index = self.rules.len();
        tracing::debug!(
            "ignore rule #{order_index} from {}: {:?}",
            source_dir.display(),
            pattern.text
        );
        self.rules.push(IgnoreRule {
            source_dir,
            pattern,
            order_index,
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Returns `true` if `path` should be ignored. `is_dir` tells whether
    /// the tested path is a directory (directory-only rules need it).
    ///
    /// The `.git` directory is ignored implicitly, regardless of rules.
    pub fn should_ignore(&self, path: &Path, is_dir: bool) -> bool {
        if contains_git_component(path) {
            return true;
        }

        let mut ignored = false;
        for rule in &self.rules {
            if rule_matches(rule, path, is_dir) {
                ignored = !rule.pattern.is_negation;
            }
        }
        ignored
    }
}

/// Returns `true` if any component of `path` is `.git`.
pub fn contains_git_component(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_str() == Some(".git"))
}

/// Evaluate one rule against one path.
fn rule_matches(rule: &IgnoreRule, path: &Path, is_dir: bool) -> bool {
    let rel = match path.strip_prefix(&rule.source_dir) {
        Ok(r) => r,
        Err(_) => return false,
    };

    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        return false;
    }

    // Gitignore patterns are not dotfile-protective: `*.log` ignores
    // `.hidden.log` too.
    let options = MatchOptions {
        permissive_dot: true,
    };

    let effective = if rule.pattern.is_anchored {
        rule.pattern.text.clone()
    } else {
        format!("**/{}", rule.pattern.text)
    };

    // A match on any strict ancestor means the path lives inside an ignored
    // directory; directory-only rules can only apply this way to files.
    for k in 1..segments.len() {
        if pathmatch::matches(&effective, &segments[..k].join("/"), options) {
            return true;
        }
    }

    if rule.pattern.is_directory_only && !is_dir {
        return false;
    }
    pathmatch::matches(&effective, &segments.join("/"), options)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Helper: build a temp tree with a root `.gitignore`, a nested one, and
    /// a few files.
    fn setup_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("build/output")).unwrap();
        fs::create_dir_all(root.join("logs")).unwrap();

        fs::write(
            root.join(".gitignore"),
            "# build artifacts\nbuild/\n*.log\n!important.log\n",
        )
        .unwrap();
        fs::write(root.join("src/.gitignore"), "*.tmp\n").unwrap();

        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("src/temp.tmp"), "temp").unwrap();
        fs::write(root.join("logs/debug.log"), "log").unwrap();
        fs::write(root.join("logs/important.log"), "important").unwrap();
        fs::write(root.join("build/output/result.bin"), "bin").unwrap();

        dir
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        assert!(Pattern::parse("# comment").is_none());
        assert!(Pattern::parse("").is_none());
        assert!(Pattern::parse("   ").is_none());
        assert!(Pattern::parse("!").is_none());
    }

    #[test]
    fn test_parse_flags() {
        let p = Pattern::parse("!build/").unwrap();
        assert!(p.is_negation);
        assert!(p.is_directory_only);
        assert!(!p.is_anchored);
        assert_eq!(p.text, "build");

        let p = Pattern::parse("/docs/**/*.md").unwrap();
        assert!(p.is_anchored);
        assert!(p.is_recursive);
        assert!(!p.is_negation);

        // Interior slash anchors even without a leading one.
        let p = Pattern::parse("src/gen.rs").unwrap();
        assert!(p.is_anchored);
    }

    #[test]
    fn test_basic_ignore_and_negation() {
        let dir = setup_tree();
        let root = dir.path();
        let mut set = IgnoreSet::new();
        set.load_tree(root);

        assert!(set.should_ignore(&root.join("build"), true));
        assert!(set.should_ignore(&root.join("build/output/result.bin"), false));
        assert!(set.should_ignore(&root.join("logs/debug.log"), false));
        assert!(!set.should_ignore(&root.join("logs/important.log"), false));
        assert!(!set.should_ignore(&root.join("src/main.rs"), false));
        assert!(set.should_ignore(&root.join("src/temp.tmp"), false));
    }

    #[test]
    fn test_last_matching_rule_wins_both_orders() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::write(root.join(".gitignore"), "*.log\n!keep.log\n").unwrap();
        let mut set = IgnoreSet::new();
        set.load_tree(root);
        assert!(set.should_ignore(&root.join("drop.log"), false));
        assert!(!set.should_ignore(&root.join("keep.log"), false));

        // Reversed order flips the outcome for keep.log.
        fs::write(root.join(".gitignore"), "!keep.log\n*.log\n").unwrap();
        let mut set = IgnoreSet::new();
        set.load_tree(root);
        assert!(set.should_ignore(&root.join("drop.log"), false));
        assert!(set.should_ignore(&root.join("keep.log"), false));
    }

    #[test]
    fn test_anchored_rule_only_matches_at_source_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("vendor/build")).unwrap();
        fs::write(root.join(".gitignore"), "/build\n").unwrap();

        let mut set = IgnoreSet::new();
        set.load_tree(root);
        assert!(set.should_ignore(&root.join("build"), true));
        assert!(!set.should_ignore(&root.join("vendor/build"), true));
    }

    #[test]
    fn test_directory_only_rule_skips_plain_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join(".gitignore"), "cache/\n").unwrap();

        let mut set = IgnoreSet::new();
        set.load_tree(root);
        // A plain file named like the directory rule is not ignored...
        assert!(!set.should_ignore(&root.join("cache"), false));
        // ...but the directory and anything inside it is.
        assert!(set.should_ignore(&root.join("cache"), true));
        assert!(set.should_ignore(&root.join("cache/entry.bin"), false));
    }

    #[test]
    fn test_git_dir_always_ignored() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let set = IgnoreSet::new();
        assert!(set.should_ignore(&root.join(".git"), true));
        assert!(set.should_ignore(&root.join(".git/config"), false));
        assert!(!set.should_ignore(&root.join("gitlog.txt"), false));
    }

    #[test]
    fn test_seeded_cli_rules() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let mut set = IgnoreSet::new();
        set.seed(&["*.secret".to_string(), "tmp/".to_string()], root);

        assert!(set.should_ignore(&root.join("a.secret"), false));
        assert!(set.should_ignore(&root.join("tmp/scratch"), false));
        assert!(!set.should_ignore(&root.join("a.txt"), false));
    }

    #[test]
    fn test_immaterial_rules_do_not_change_outcome() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::write(root.join(".gitignore"), "*.log\nunrelated.xyz\n!keep.log\n").unwrap();
        let mut with_noise = IgnoreSet::new();
        with_noise.load_tree(root);

        fs::write(root.join(".gitignore"), "*.log\n!keep.log\n").unwrap();
        let mut without_noise = IgnoreSet::new();
        without_noise.load_tree(root);

        for name in ["drop.log", "keep.log", "other.txt"] {
            assert_eq!(
                with_noise.should_ignore(&root.join(name), false),
                without_noise.should_ignore(&root.join(name), false),
            );
        }
    }

    #[test]
    fn test_hidden_files_are_matched_by_ignore_globs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();

        let mut set = IgnoreSet::new();
        set.load_tree(root);
        assert!(set.should_ignore(&root.join(".hidden.log"), false));
    }
}

//! Document assembly: tagged sections, file tree, and fenced file bodies.
//!
//! Section order is fixed and consumed downstream; tag names, fence style,
//! and the 40-dash separator are part of the stable output format.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::codemap::PackRegistry;
use crate::gitignore::IgnoreSet;
use crate::scanner::{unix_path, CandidateFile};
use crate::stdin::{ContentKind, STDIN_FILE_NAME};

/// Placeholder body for binary files.
pub const BINARY_PLACEHOLDER: &str = "[Binary file content skipped]";

/// Separator between file blocks: exactly 40 dashes.
pub const FILE_SEPARATOR: &str = "----------------------------------------";

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    SystemInstructions,
    UserInstructions,
    ResponseGuide,
    FileTree,
    CodeMap,
    FileContext,
}

impl SectionKind {
    pub fn tag(self) -> &'static str {
        match self {
            SectionKind::SystemInstructions => "system_instructions",
            SectionKind::UserInstructions => "user_instructions",
            SectionKind::ResponseGuide => "response_guide",
            SectionKind::FileTree => "file_tree",
            SectionKind::CodeMap => "code_map",
            SectionKind::FileContext => "file_context",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Section {
    pub kind: SectionKind,
    pub body: String,
}

/// Ordered list of sections; each kind appears at most once.
#[derive(Clone, Debug, Default)]
pub struct Document {
    pub sections: Vec<Section>,
}

impl Document {
    /// Append a section unless its body is empty.
    fn push(&mut self, kind: SectionKind, body: String) {
        if !body.trim().is_empty() {
            self.sections.push(Section { kind, body });
        }
    }

    /// Render the full tagged document.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let tag = section.kind.tag();
            let body = section.body.trim_end_matches('\n');
            parts.push(format!("<{tag}>\n{body}\n</{tag}>\n"));
        }
        parts.join("\n")
    }
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TreeMode {
    Full,
    #[default]
    Filtered,
}

/// Section inputs resolved by the CLI layer.
#[derive(Debug, Default)]
pub struct EmitOptions {
    pub system_instructions: Option<String>,
    pub user_instructions: Option<String>,
    /// Custom response-guide body from `-e@file` / `-e"inline"`.
    pub response_guide_body: Option<String>,
    /// `-e` was given: ask for PR-style review comments.
    pub editor_comments: bool,
    pub tree_mode: TreeMode,
    pub include_codemap: bool,
    /// Fence info strings are attached only for the file sink.
    pub lang_hints: bool,
    /// Sniffed kind of the stdin blob, for its fence hint.
    pub stdin_kind: Option<ContentKind>,
}

pub struct Emitter<'a> {
    pub files: &'a [CandidateFile],
    pub registry: &'a PackRegistry,
    pub ignore: Option<&'a IgnoreSet>,
    /// Invocation root; full tree mode walks from here.
    pub root: &'a Path,
    pub options: EmitOptions,
}

impl Emitter<'_> {
    /// Assemble the document in the fixed section order.
    pub fn build(&self) -> Document {
        let mut document = Document::default();

        if let Some(text) = &self.options.system_instructions {
            document.push(SectionKind::SystemInstructions, text.clone());
        }
        if let Some(text) = &self.options.user_instructions {
            document.push(SectionKind::UserInstructions, text.clone());
        }
        if self.options.editor_comments || self.options.user_instructions.is_some() {
            document.push(SectionKind::ResponseGuide, self.response_guide());
        }
        if !self.files.is_empty() {
            document.push(SectionKind::FileTree, self.file_tree());
            if self.options.include_codemap {
                document.push(SectionKind::CodeMap, self.code_map());
            }
            document.push(SectionKind::FileContext, self.file_context());
        }

        document
    }

    fn response_guide(&self) -> String {
        if let Some(body) = &self.options.response_guide_body {
            return body.clone();
        }
        if self.options.editor_comments {
            "Provide PR-style code review comments on the supplied files: cite the \
             file and line, describe the problem, and suggest a concrete fix. Order \
             findings by severity."
                .to_string()
        } else {
            "No code review required. Answer the user instructions directly, \
             referencing the supplied files as needed."
                .to_string()
        }
    }

    // ------------------------------------------------------------------
    // File tree
    // ------------------------------------------------------------------

    fn file_tree(&self) -> String {
        let paths: Vec<&str> = self.files.iter().map(|f| f.display_path.as_str()).collect();
        let ancestor = common_ancestor(&paths);

        let mut nodes = match self.options.tree_mode {
            TreeMode::Filtered => {
                let mut nodes = Vec::new();
                for path in &paths {
                    let segments: Vec<&str> = path
                        .split('/')
                        .skip(ancestor.len())
                        .filter(|s| !s.is_empty())
                        .collect();
                    insert_path(&mut nodes, &segments);
                }
                nodes
            }
            TreeMode::Full => self.walk_full_tree(&ancestor),
        };

        sort_nodes(&mut nodes);

        let header = if ancestor.is_empty() {
            ".".to_string()
        } else {
            ancestor.join("/")
        };

        let mut lines = vec![header];
        render_tree_lines(&nodes, "", &mut lines);
        lines.join("\n")
    }

    /// Full mode: every non-ignored entry below the common ancestor.
    fn walk_full_tree(&self, ancestor: &[String]) -> Vec<TreeNode> {
        let mut base = self.root.to_path_buf();
        for segment in ancestor {
            base.push(segment);
        }

        let mut nodes = Vec::new();
        let walker = WalkDir::new(&base)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git");

        for entry in walker.filter_map(|e| e.ok()) {
            if entry.path() == base {
                continue;
            }
            let is_dir = entry.file_type().is_dir();
            if let Some(set) = self.ignore {
                if set.should_ignore(entry.path(), is_dir) {
                    continue;
                }
            }
            let rel = match entry.path().strip_prefix(&base) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let rel = unix_path(rel);
            let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
            if is_dir {
                insert_dir_path(&mut nodes, &segments);
            } else {
                insert_path(&mut nodes, &segments);
            }
        }

        // The synthetic stdin entry has no on-disk counterpart.
        if self.files.iter().any(|f| f.display_path == STDIN_FILE_NAME) {
            insert_path(&mut nodes, &[STDIN_FILE_NAME]);
        }

        nodes
    }

    // ------------------------------------------------------------------
    // Code map
    // ------------------------------------------------------------------

    fn code_map(&self) -> String {
        let mut lines = Vec::new();
        for file in self.files {
            if file.is_binary {
                continue;
            }
            let extension = Path::new(&file.display_path)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");

            match self.registry.pack_for(extension) {
                Some(pack) => {
                    lines.push(file.display_path.clone());
                    let entries = pack.parse(Path::new(&file.display_path), file.text());
                    for entry in entries {
                        let qualified = match &entry.container {
                            Some(container) => format!("{container}::{}", entry.signature),
                            None => entry.signature.clone(),
                        };
                        lines.push(format!("  [{}] {}", entry.kind, qualified));
                    }
                }
                None if extension.is_empty() => {
                    lines.push(format!("{}: [no language pack]", file.display_path));
                }
                None => {
                    lines.push(format!(
                        "{}: [no language pack for .{extension}]",
                        file.display_path
                    ));
                }
            }
        }
        lines.join("\n")
    }

    // ------------------------------------------------------------------
    // File context
    // ------------------------------------------------------------------

    fn file_context(&self) -> String {
        let mut blocks = Vec::with_capacity(self.files.len());
        for file in self.files {
            blocks.push(self.file_block(file));
        }
        blocks.join("\n\n")
    }

    fn file_block(&self, file: &CandidateFile) -> String {
        let mut block = format!("File: {}\n", file.display_path);

        if file.is_binary {
            block.push_str(BINARY_PLACEHOLDER);
            block.push('\n');
        } else {
            let hint = if self.options.lang_hints {
                self.fence_hint(file)
            } else {
                None
            };
            block.push_str("```");
            if let Some(hint) = hint {
                block.push_str(hint);
            }
            block.push('\n');
            let body = file.text();
            block.push_str(body);
            if !body.is_empty() && !body.ends_with('\n') {
                block.push('\n');
            }
            block.push_str("```\n");
        }

        block.push_str(FILE_SEPARATOR);
        block
    }

    fn fence_hint(&self, file: &CandidateFile) -> Option<&'static str> {
        if file.display_path == STDIN_FILE_NAME {
            return self.options.stdin_kind.and_then(ContentKind::fence_hint);
        }
        Path::new(&file.display_path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(language_tag)
    }
}

/// Fence info string for an extension, when one is conventional.
fn language_tag(extension: &str) -> Option<&'static str> {
    let tag = match extension.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "toml" => "toml",
        "md" => "markdown",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "jsx" => "jsx",
        "tsx" => "tsx",
        "py" => "python",
        "sh" | "bash" => "bash",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "rb" => "ruby",
        "php" => "php",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "xml" => "xml",
        "proto" => "proto",
        "ini" => "ini",
        "txt" => "text",
        _ => return None,
    };
    Some(tag)
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct TreeNode {
    name: String,
    is_dir: bool,
    children: Vec<TreeNode>,
}

/// Insert a file path; intermediate segments become directories.
fn insert_path(nodes: &mut Vec<TreeNode>, segments: &[&str]) {
    insert_segments(nodes, segments, false);
}

/// Insert a directory path (full-tree mode records empty directories too).
fn insert_dir_path(nodes: &mut Vec<TreeNode>, segments: &[&str]) {
    insert_segments(nodes, segments, true);
}

fn insert_segments(nodes: &mut Vec<TreeNode>, segments: &[&str], leaf_is_dir: bool) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let is_dir = leaf_is_dir || !rest.is_empty();

    let index = match nodes.iter().position(|n| n.name == *head) {
        Some(index) => {
            nodes[index].is_dir |= is_dir;
            index
        }
        None => {
            nodes.push(TreeNode {
                name: (*head).to_string(),
                is_dir,
                children: Vec::new(),
            });
            nodes.len() - 1
        }
    };

    if !rest.is_empty() {
        insert_segments(&mut nodes[index].children, rest, leaf_is_dir);
    }
}

/// Directories before files; each group alphabetical, case-insensitive.
fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    for node in nodes.iter_mut() {
        sort_nodes(&mut node.children);
    }
}

/// Draw box connectors: `├── `, `└── `, with `│   ` / `    ` prefixes.
fn render_tree_lines(nodes: &[TreeNode], prefix: &str, lines: &mut Vec<String>) {
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        let connector = if is_last { "└── " } else { "├── " };
        lines.push(format!("{prefix}{connector}{}", node.name));

        if !node.children.is_empty() {
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            render_tree_lines(&node.children, &child_prefix, lines);
        }
    }
}

/// Shared leading directory segments of a path set.
fn common_ancestor(paths: &[&str]) -> Vec<String> {
    let mut prefix: Option<Vec<&str>> = None;
    for path in paths {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let dirs = &segments[..segments.len().saturating_sub(1)];
        match &mut prefix {
            None => prefix = Some(dirs.to_vec()),
            Some(current) => {
                let shared = current
                    .iter()
                    .zip(dirs.iter())
                    .take_while(|(a, b)| a == b)
                    .count();
                current.truncate(shared);
            }
        }
    }
    prefix
        .unwrap_or_default()
        .into_iter()
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Output sinks
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputSink {
    Stdout,
    File(PathBuf),
}

/// Write the rendered document. File sinks confirm on stderr so stdout
/// carries nothing but the document itself.
pub fn write_output(document: &str, sink: &OutputSink) -> io::Result<()> {
    match sink {
        OutputSink::Stdout => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let result = handle.write_all(document.as_bytes()).and_then(|()| handle.flush());
            match result {
                // A closed pipe (e.g. piped into `head`) is a normal exit.
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        }
        OutputSink::File(path) => {
            fs::write(path, document)?;
            eprintln!("Content written to {}", path.display());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

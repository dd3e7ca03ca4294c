//! Shell-style glob matching over `/`-separated paths.
//!
//! Supports `*`, `?`, `[...]` / `[!...]` character classes, `{a,b}`
//! alternation, and `**` spanning whole directory segments. Matching is
//! segment-aware: `*` and `?` never cross a `/`.

/// Options controlling wildcard behavior.
#[derive(Clone, Copy, Debug, Default)]
pub struct MatchOptions {
    /// When true, `*` and `?` may match a leading `.` in a path segment.
    /// Active under `--no-gitignore`; a pattern segment that itself begins
    /// with `.` always matches dotfiles regardless of this flag.
    pub permissive_dot: bool,
}

/// Returns `true` if `pattern` contains any glob metacharacter.
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Match `path` against `pattern`. Both use `/` separators; leading and
/// trailing separators are insignificant.
pub fn matches(pattern: &str, path: &str, options: MatchOptions) -> bool {
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    for alternative in expand_braces(pattern) {
        let pattern_segments: Vec<&str> = alternative
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if match_segments(&pattern_segments, &path_segments, options) {
            return true;
        }
    }

    false
}

// ---------------------------------------------------------------------------
// Brace alternation
// ---------------------------------------------------------------------------

/// Expand `{a,b,c}` groups into the list of brace-free alternatives.
///
/// Groups may nest; commas inside a nested group belong to that group. An
/// unmatched `{` is kept as a literal character.
fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let bytes = pattern.as_bytes();
    let mut depth = 0usize;
    let mut close = None;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    let Some(close) = close else {
        // Unmatched brace: degrade to a literal.
        return vec![pattern.to_string()];
    };

    let mut out = Vec::new();
    for alternative in split_top_level(&pattern[open + 1..close]) {
        let candidate = format!("{}{}{}", &pattern[..open], alternative, &pattern[close + 1..]);
        out.extend(expand_braces(&candidate));
    }
    out
}

/// Split on commas at nesting depth zero.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

// ---------------------------------------------------------------------------
// Segment recursion
// ---------------------------------------------------------------------------

/// Recursive segment-by-segment match. A `**` segment opens a branch over
/// every possible number of consumed path segments, leftmost first.
fn match_segments(pattern: &[&str], path: &[&str], options: MatchOptions) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => {
            (0..=path.len()).any(|skip| match_segments(&pattern[1..], &path[skip..], options))
        }
        Some(segment_pattern) => match path.first() {
            None => false,
            Some(segment) => {
                match_segment(segment_pattern, segment, options)
                    && match_segments(&pattern[1..], &path[1..], options)
            }
        },
    }
}

/// Match a single path segment against a single pattern segment.
fn match_segment(pattern: &str, segment: &str, options: MatchOptions) -> bool {
    // A leading dot is only matched literally unless we are permissive.
    if segment.starts_with('.') && !pattern.starts_with('.') && !options.permissive_dot {
        return false;
    }

    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = segment.chars().collect();
    match_chars(&pat, &txt)
}

/// Classic glob backtracking over a single segment.
fn match_chars(pat: &[char], txt: &[char]) -> bool {
    let mut p = 0usize;
    let mut t = 0usize;
    // Position of the most recent `*`: (pattern index after it, text index it
    // has consumed up to). On mismatch we rewind here and let the star eat
    // one more character.
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        let mut advanced = false;
        if p < pat.len() {
            match pat[p] {
                '*' => {
                    star = Some((p + 1, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    advanced = true;
                }
                '[' => match match_class(&pat[p..], txt[t]) {
                    Some((consumed, true)) => {
                        p += consumed;
                        t += 1;
                        advanced = true;
                    }
                    Some((_, false)) => {}
                    // Unterminated class degrades to a literal `[`.
                    None => {
                        if txt[t] == '[' {
                            p += 1;
                            t += 1;
                            advanced = true;
                        }
                    }
                },
                c => {
                    if c == txt[t] {
                        p += 1;
                        t += 1;
                        advanced = true;
                    }
                }
            }
        }

        if advanced {
            continue;
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

/// Match `ch` against the character class starting at `pat[0] == '['`.
///
/// Returns `(chars consumed including the closing bracket, matched)`, or
/// `None` when the class is unterminated.
fn match_class(pat: &[char], ch: char) -> Option<(usize, bool)> {
    let negated = matches!(pat.get(1).copied(), Some('!' | '^'));
    let mut i = if negated { 2 } else { 1 };
    let mut matched = false;
    let mut first = true;

    while i < pat.len() {
        let c = pat[i];
        if c == ']' && !first {
            return Some((i + 1, matched != negated));
        }
        first = false;

        // Range form `a-z` (a trailing `-` before `]` is a literal dash).
        if let (Some('-'), Some(&hi)) = (pat.get(i + 1).copied(), pat.get(i + 2)) {
            if hi != ']' {
                if c <= ch && ch <= hi {
                    matched = true;
                }
                i += 3;
                continue;
            }
        }

        if c == ch {
            matched = true;
        }
        i += 1;
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

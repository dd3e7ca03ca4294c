//! Query-relevance scoring and cutoff for candidate files.
//!
//! Active only when user instructions carry a query. Scoring combines raw
//! case-insensitive hit counts in path and body, a TF-IDF term over the
//! candidate set, and a logarithmic size penalty; the sorted list is then
//! trimmed by the configured cutoff policy.

use std::collections::HashMap;

use crate::error::Fatal;
use crate::scanner::CandidateFile;

/// Weight vector for the composite score. Negative or absent overrides fall
/// back to the defaults.
#[derive(Clone, Copy, Debug)]
pub struct RankingWeights {
    pub path: f64,
    pub content: f64,
    pub size: f64,
    pub tfidf: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingWeights {
            path: 2.0,
            content: 1.0,
            size: 0.1,
            tfidf: 1.0,
        }
    }
}

impl RankingWeights {
    /// Parse `--filerank-weight path:x,content:y,size:z,tfidf:w`. Fields may
    /// appear in any order and any subset.
    pub fn parse(spec: &str) -> Result<RankingWeights, Fatal> {
        let mut weights = RankingWeights::default();
        for entry in spec.split(',').filter(|e| !e.trim().is_empty()) {
            let (key, value) = entry
                .split_once(':')
                .ok_or_else(|| Fatal::Usage(format!("invalid weight entry {entry:?}")))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| Fatal::Usage(format!("invalid weight value {entry:?}")))?;
            if !value.is_finite() {
                return Err(Fatal::Usage(format!("invalid weight value {entry:?}")));
            }
            let slot = match key.trim() {
                "path" => &mut weights.path,
                "content" => &mut weights.content,
                "size" => &mut weights.size,
                "tfidf" => &mut weights.tfidf,
                other => {
                    return Err(Fatal::Usage(format!("unknown weight field {other:?}")));
                }
            };
            // Negative means "use the default".
            if value >= 0.0 {
                *slot = value;
            }
        }
        Ok(weights)
    }
}

/// How the ranked list is trimmed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CutoffPolicy {
    /// Keep scores within `r * max_score`.
    Ratio(f64),
    /// Keep the first `k`.
    TopK(usize),
    /// Keep the top `p` percent, rounded up.
    Percentile(f64),
    /// Cut at the knee of the score curve.
    Auto,
    /// Keep everything.
    None,
}

impl CutoffPolicy {
    /// Parse `--filerank-cutoff ratio:v | topk:n | percentile:p | auto`.
    pub fn parse(spec: &str) -> Result<CutoffPolicy, Fatal> {
        let spec = spec.trim();
        if spec == "auto" {
            return Ok(CutoffPolicy::Auto);
        }
        if let Some(value) = spec.strip_prefix("ratio:") {
            let r: f64 = value
                .parse()
                .map_err(|_| Fatal::Usage(format!("invalid cutoff ratio {value:?}")))?;
            if !(0.0..=1.0).contains(&r) {
                return Err(Fatal::Usage(format!(
                    "cutoff ratio must be in [0,1], got {value}"
                )));
            }
            return Ok(CutoffPolicy::Ratio(r));
        }
        if let Some(value) = spec.strip_prefix("topk:") {
            let k: usize = value
                .parse()
                .map_err(|_| Fatal::Usage(format!("invalid cutoff topk {value:?}")))?;
            return Ok(CutoffPolicy::TopK(k));
        }
        if let Some(value) = spec.strip_prefix("percentile:") {
            let p: f64 = value
                .parse()
                .map_err(|_| Fatal::Usage(format!("invalid cutoff percentile {value:?}")))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(Fatal::Usage(format!(
                    "cutoff percentile must be in [0,100], got {value}"
                )));
            }
            return Ok(CutoffPolicy::Percentile(p));
        }
        Err(Fatal::Usage(format!("unknown cutoff policy {spec:?}")))
    }

    fn is_active(&self) -> bool {
        !matches!(self, CutoffPolicy::None)
    }
}

/// Per-token score multipliers from `-k tok:factor,...`.
#[derive(Clone, Debug, Default)]
pub struct KeywordBoosts {
    factors: HashMap<String, f64>,
}

/// Upper bound on boosted tokens.
pub const MAX_BOOSTS: usize = 32;

impl KeywordBoosts {
    /// Parse the `-k` argument. Duplicate tokens warn and take the last
    /// value; unusable factors warn and fall back to 1.0.
    pub fn parse(spec: &str) -> Result<KeywordBoosts, Fatal> {
        let mut factors = HashMap::new();
        for entry in spec.split(',').filter(|e| !e.trim().is_empty()) {
            let (token, raw_factor) = entry
                .split_once(':')
                .ok_or_else(|| Fatal::Usage(format!("invalid keyword boost {entry:?}")))?;
            let token = token.trim().to_lowercase();
            if token.is_empty() {
                return Err(Fatal::Usage(format!("invalid keyword boost {entry:?}")));
            }

            let factor = match raw_factor.trim().parse::<f64>() {
                Ok(f) if f.is_finite() && f >= 0.0 => f,
                _ => {
                    tracing::warn!(
                        "keyword boost {entry:?} has an unusable factor; using 1.0"
                    );
                    1.0
                }
            };

            if factors.insert(token.clone(), factor).is_some() {
                tracing::warn!("duplicate keyword boost for {token:?}; last value wins");
            }
            if factors.len() > MAX_BOOSTS {
                return Err(Fatal::Usage(format!(
                    "too many keyword boosts (max {MAX_BOOSTS})"
                )));
            }
        }
        Ok(KeywordBoosts { factors })
    }

    fn factor(&self, token: &str) -> f64 {
        self.factors.get(token).copied().unwrap_or(1.0)
    }
}

/// Split on non-alphanumeric boundaries, lowercase, drop empties. The same
/// splitting serves queries, paths, and contents.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Score, sort, and trim `files` in place against `query`.
pub fn rank_files(
    files: &mut Vec<CandidateFile>,
    query: &str,
    weights: &RankingWeights,
    boosts: &KeywordBoosts,
    cutoff: &CutoffPolicy,
    debug: bool,
) {
    let tokens = tokenize(query);
    if tokens.is_empty() || files.is_empty() {
        return;
    }

    let n = files.len();

    // Raw per-file, per-token hit counts.
    let mut path_hits = vec![vec![0usize; tokens.len()]; n];
    let mut content_hits = vec![vec![0usize; tokens.len()]; n];
    for (i, file) in files.iter().enumerate() {
        let path_lower = file.display_path.to_lowercase();
        let body_lower = file.text().to_lowercase();
        for (j, token) in tokens.iter().enumerate() {
            path_hits[i][j] = count_occurrences(&path_lower, token);
            content_hits[i][j] = count_occurrences(&body_lower, token);
        }
    }

    // Document frequency per token over the candidate set.
    let df: Vec<usize> = (0..tokens.len())
        .map(|j| (0..n).filter(|&i| content_hits[i][j] > 0).count())
        .collect();
    let idf: Vec<f64> = df
        .iter()
        .map(|&d| (1.0 + n as f64 / (1.0 + d as f64)).ln())
        .collect();

    for (i, file) in files.iter_mut().enumerate() {
        let total_content_hits: usize = content_hits[i].iter().sum();

        let mut boosted_path = 0.0;
        let mut boosted_content = 0.0;
        let mut tfidf = 0.0;
        let mut raw_hits = 0usize;
        for (j, token) in tokens.iter().enumerate() {
            let factor = boosts.factor(token);
            boosted_path += path_hits[i][j] as f64 * factor;
            boosted_content += content_hits[i][j] as f64 * factor;
            raw_hits += path_hits[i][j] + content_hits[i][j];

            let tf = content_hits[i][j] as f64 / total_content_hits.max(1) as f64;
            tfidf += tf * idf[j];
        }

        let size_penalty = (1.0 + file.size_bytes as f64 / 1024.0).log2();
        file.hit_count = raw_hits;
        file.score = weights.path * boosted_path
            + weights.content * boosted_content
            + weights.tfidf * tfidf
            - weights.size * size_penalty;
    }

    // Stable: ties keep input order.
    files.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let scores: Vec<f64> = files.iter().map(|f| f.score).collect();
    let keep = cutoff_count(&scores, cutoff);

    if debug {
        eprintln!("FileRank (query: \"{query}\")");
        for file in files.iter() {
            eprintln!("{:.4}\t{}", file.score, file.display_path);
        }
    }

    files.truncate(keep);
    if cutoff.is_active() {
        files.retain(|f| f.score != 0.0);
    }

    if debug {
        eprintln!("kept {}/{} files", files.len(), n);
    }
}

/// Non-overlapping occurrence count; both sides already lowercased.
fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

/// Number of leading entries the policy keeps from a descending score list.
fn cutoff_count(scores: &[f64], policy: &CutoffPolicy) -> usize {
    let n = scores.len();
    match *policy {
        CutoffPolicy::None => n,
        CutoffPolicy::TopK(k) => n.min(k),
        CutoffPolicy::Percentile(p) => n.min(((n as f64) * p / 100.0).ceil() as usize),
        CutoffPolicy::Ratio(r) => {
            let max = scores.first().copied().unwrap_or(0.0);
            if max <= 0.0 {
                return n.min(1);
            }
            scores.iter().take_while(|&&s| s >= r * max).count()
        }
        CutoffPolicy::Auto => knee(scores),
    }
}

/// Knee detection: with gaps gᵢ = sᵢ − sᵢ₊₁, cut after the index where the
/// drop accelerates the most. A flat or steadily decaying curve keeps all.
fn knee(scores: &[f64]) -> usize {
    let n = scores.len();
    if n < 3 {
        return n;
    }

    let gaps: Vec<f64> = scores.windows(2).map(|w| w[0] - w[1]).collect();
    let mut best_index = 0usize;
    let mut best_drop = 0.0f64;
    for i in 1..gaps.len() {
        let drop = gaps[i] - gaps[i - 1];
        if drop > best_drop {
            best_drop = drop;
            best_index = i;
        }
    }

    if best_drop <= f64::EPSILON {
        return n;
    }
    best_index + 1
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

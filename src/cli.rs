//! Command-line surface and argument resolution.
//!
//! Instruction arguments accept four forms: inline text, `@file`,
//! `@-` (piped stdin), and a leading `=` forcing the rest literal. Short
//! options take glued values (`-sglued`, `-c@-`, `-o@out.md`).

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::Fatal;
use crate::rank::{CutoffPolicy, KeywordBoosts, RankingWeights};
use crate::renderer::{OutputSink, TreeMode};
use crate::tokenizer::DEFAULT_MODEL;

/// Assemble a context package for LLM consumption.
#[derive(Parser, Debug)]
#[command(name = "llm_ctx")]
#[command(version)]
#[command(about = "Assemble a tagged, token-budgeted context package from files, globs, and stdin")]
pub struct Cli {
    /// File paths and glob patterns to ingest (everything after -f)
    #[arg(short = 'f', long = "files", num_args = 0.., value_name = "PATH")]
    pub files: Vec<String>,

    /// User instructions: inline text, @file, @- for stdin, or =literal
    #[arg(short = 'c', long = "command", value_name = "ARG")]
    pub command: Option<String>,

    /// Read user instructions from stdin (alias for -c @-)
    #[arg(short = 'C', long = "command-stdin", conflicts_with = "command")]
    pub command_stdin: bool,

    /// System instructions: inline text, @file, @- for stdin, or =literal
    #[arg(short = 's', long = "system", value_name = "ARG")]
    pub system: Option<String>,

    /// Ask for PR-style review comments; optional inline or @file body
    #[arg(
        short = 'e',
        long = "editor-comments",
        num_args = 0..=1,
        default_missing_value = "",
        value_name = "BODY"
    )]
    pub editor_comments: Option<String>,

    /// Emit the full file tree of the common ancestor
    #[arg(short = 't', long = "tree", conflicts_with = "tree_filtered")]
    pub tree_full: bool,

    /// Emit only ancestors of included files in the tree (default)
    #[arg(short = 'T', long = "tree-filtered")]
    pub tree_filtered: bool,

    /// Emit the code map section
    #[arg(short = 'm', long = "codemap")]
    pub codemap: bool,

    /// Output sink: bare -o for stdout, -o@PATH or --output=@PATH for a file
    #[arg(
        short = 'o',
        long = "output",
        num_args = 0..=1,
        default_missing_value = "",
        value_name = "@PATH"
    )]
    pub output: Option<String>,

    /// Disable gitignore filtering (the .git directory stays excluded)
    #[arg(long = "no-gitignore")]
    pub no_gitignore: bool,

    /// Extra exclusion patterns, applied as ignore rules at the root
    #[arg(short = 'x', long = "exclude", value_delimiter = ',', value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Keyword boosts for ranking: tok:factor,tok:factor
    #[arg(short = 'k', long = "keywords", value_name = "TOK:FACTOR,...")]
    pub keywords: Option<String>,

    /// Scoring weight overrides: path:x,content:y,size:z,tfidf:w
    #[arg(long = "filerank-weight", value_name = "FIELD:VALUE,...")]
    pub filerank_weight: Option<String>,

    /// Cutoff policy: ratio:v | topk:n | percentile:p | auto
    #[arg(long = "filerank-cutoff", value_name = "POLICY")]
    pub filerank_cutoff: Option<String>,

    /// Print the ranked score table to stderr
    #[arg(long = "filerank-debug")]
    pub filerank_debug: bool,

    /// Token budget for the rendered document (0 = unbounded)
    #[arg(short = 'b', long = "token-budget", value_name = "N")]
    pub token_budget: Option<usize>,

    /// Tokenizer model
    #[arg(long = "token-model", value_name = "M")]
    pub token_model: Option<String>,

    /// Print the per-section token table to stderr
    #[arg(short = 'D', long = "token-diagnostics")]
    pub token_diagnostics: bool,

    /// Verbose debug logging
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

/// Flag and config values folded into the pipeline's inputs.
#[derive(Debug)]
pub struct ResolvedArgs {
    pub system_instructions: Option<String>,
    pub user_instructions: Option<String>,
    pub response_guide_body: Option<String>,
    pub editor_comments: bool,
    pub tree_mode: TreeMode,
    pub sink: OutputSink,
    pub lang_hints: bool,
    pub weights: RankingWeights,
    pub cutoff: CutoffPolicy,
    pub boosts: KeywordBoosts,
    pub token_model: String,
    pub token_budget: usize,
    /// An `@-` argument claimed the piped stdin bytes.
    pub stdin_consumed: bool,
}

/// Fold CLI flags over config defaults. `stdin_text` carries the captured
/// stdin for `@-` forms; resolution records whether it was claimed.
pub fn resolve(cli: &Cli, config: &Config, stdin_text: Option<&str>) -> Result<ResolvedArgs, Fatal> {
    let mut stdin_consumed = false;

    let command_arg = if cli.command_stdin {
        Some("@-".to_string())
    } else {
        cli.command.clone()
    };
    let user_instructions = command_arg
        .as_deref()
        .map(|arg| resolve_text_arg("-c", arg, stdin_text, &mut stdin_consumed))
        .transpose()?;

    let system_arg = cli.system.clone().or_else(|| config.system_instructions.clone());
    let system_instructions = system_arg
        .as_deref()
        .map(|arg| resolve_text_arg("-s", arg, stdin_text, &mut stdin_consumed))
        .transpose()?;

    let editor_comments =
        cli.editor_comments.is_some() || config.editor_comments.unwrap_or(false);
    let response_guide_body = match cli.editor_comments.as_deref() {
        Some("") | None => None,
        Some(body) => Some(resolve_text_arg("-e", body, stdin_text, &mut stdin_consumed)?),
    };

    let (sink, lang_hints) = resolve_sink(cli.output.as_deref())?;

    let weights = match &cli.filerank_weight {
        Some(spec) => RankingWeights::parse(spec)?,
        None => config
            .filerank
            .weights
            .as_deref()
            .map(parse_config_weights)
            .unwrap_or_default(),
    };
    let cutoff = match &cli.filerank_cutoff {
        Some(spec) => CutoffPolicy::parse(spec)?,
        None => config
            .filerank
            .cutoff
            .as_deref()
            .map(parse_config_cutoff)
            .unwrap_or(CutoffPolicy::None),
    };
    let boosts = match &cli.keywords {
        Some(spec) => KeywordBoosts::parse(spec)?,
        None => config
            .filerank
            .keywords
            .as_deref()
            .map(parse_config_keywords)
            .unwrap_or_default(),
    };

    Ok(ResolvedArgs {
        system_instructions,
        user_instructions,
        response_guide_body,
        editor_comments,
        tree_mode: if cli.tree_full {
            TreeMode::Full
        } else {
            TreeMode::Filtered
        },
        sink,
        lang_hints,
        weights,
        cutoff,
        boosts,
        token_model: cli
            .token_model
            .clone()
            .or_else(|| config.token_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        token_budget: cli.token_budget.or(config.token_budget).unwrap_or(0),
        stdin_consumed,
    })
}

/// Resolve one instruction argument through its `@file` / `@-` / `=literal`
/// / inline forms.
fn resolve_text_arg(
    flag: &str,
    arg: &str,
    stdin_text: Option<&str>,
    stdin_consumed: &mut bool,
) -> Result<String, Fatal> {
    if let Some(rest) = arg.strip_prefix('@') {
        if rest == "-" {
            let Some(text) = stdin_text else {
                return Err(Fatal::Usage(format!("{flag} @- requires piped standard input")));
            };
            *stdin_consumed = true;
            return Ok(text.to_string());
        }
        return fs::read_to_string(rest)
            .map_err(|err| Fatal::Io(format!("cannot read {rest}: {err}")));
    }

    let text = arg.strip_prefix('=').unwrap_or(arg);
    if text.is_empty() {
        return Err(Fatal::Usage(format!("empty {flag} value")));
    }
    Ok(text.to_string())
}

/// `-o` forms: absent = default stdout, bare = explicit stdout, `@path` =
/// file sink (which also enables fence language hints).
fn resolve_sink(output: Option<&str>) -> Result<(OutputSink, bool), Fatal> {
    match output {
        None | Some("") => Ok((OutputSink::Stdout, false)),
        Some(arg) => match arg.strip_prefix('@') {
            Some(path) if !path.is_empty() => {
                Ok((OutputSink::File(PathBuf::from(path)), true))
            }
            _ => Err(Fatal::Usage(format!(
                "output sink must be @<path>, got {arg:?}"
            ))),
        },
    }
}

// Config-supplied ranking values must not abort the run: warn and fall back.

fn parse_config_weights(spec: &str) -> RankingWeights {
    RankingWeights::parse(spec).unwrap_or_else(|err| {
        tracing::warn!("ignoring filerank.weights from config: {err}");
        RankingWeights::default()
    })
}

fn parse_config_cutoff(spec: &str) -> CutoffPolicy {
    CutoffPolicy::parse(spec).unwrap_or_else(|err| {
        tracing::warn!("ignoring filerank.cutoff from config: {err}");
        CutoffPolicy::None
    })
}

fn parse_config_keywords(spec: &str) -> KeywordBoosts {
    KeywordBoosts::parse(spec).unwrap_or_else(|err| {
        tracing::warn!("ignoring filerank.keywords from config: {err}");
        KeywordBoosts::default()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

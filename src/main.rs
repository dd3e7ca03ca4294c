mod budget;
mod classify;
mod cli;
mod codemap;
mod config;
mod error;
mod gitignore;
mod pathmatch;
mod rank;
mod renderer;
mod scanner;
mod stdin;
mod tokenizer;

use clap::Parser;

use crate::error::Fatal;
use crate::gitignore::IgnoreSet;
use crate::scanner::CandidateFile;

fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(&cli) {
        match err.downcast_ref::<Fatal>() {
            Some(fatal) => {
                eprintln!("error: {fatal}");
                std::process::exit(fatal.exit_code());
            }
            None => {
                eprintln!("error: {err:#}");
                std::process::exit(1);
            }
        }
    }
}

/// Diagnostics go to stderr; `-d` or `LLMCTX_DEBUG` raise the level.
fn init_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if debug || std::env::var_os("LLMCTX_DEBUG").is_some() {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// The pipeline: capture stdin, expand inputs, classify, rank, render,
/// audit, write. Strictly sequential; stdin is read at most once.
fn run(cli: &cli::Cli) -> anyhow::Result<()> {
    let config = config::load()?;
    let root = std::env::current_dir()?;

    let stdin_blob = if atty::is(atty::Stream::Stdin) {
        None
    } else {
        stdin::capture(std::io::stdin().lock())?
    };
    let stdin_text = stdin_blob
        .as_ref()
        .map(|blob| String::from_utf8_lossy(&blob.bytes).into_owned());

    let resolved = cli::resolve(cli, &config, stdin_text.as_deref())?;

    let ignore = if cli.no_gitignore {
        None
    } else {
        let mut set = IgnoreSet::new();
        set.load_tree(&root);
        set.seed(&cli.exclude, &root);
        tracing::debug!("loaded {} ignore rules", set.len());
        Some(set)
    };

    let mut files = scanner::Planner::new(&root, ignore.as_ref()).plan(&cli.files)?;

    // Unclaimed piped input becomes the first candidate.
    let mut stdin_kind = None;
    if let Some(blob) = &stdin_blob {
        if !resolved.stdin_consumed {
            stdin_kind = Some(blob.content_kind);
            files.insert(0, CandidateFile::from_stdin(blob));
        }
    }

    if files.is_empty()
        && resolved.user_instructions.is_none()
        && resolved.system_instructions.is_none()
    {
        return Err(Fatal::Usage("No input provided.".into()).into());
    }

    if let Some(query) = &resolved.user_instructions {
        rank::rank_files(
            &mut files,
            query,
            &resolved.weights,
            &resolved.boosts,
            &resolved.cutoff,
            cli.filerank_debug,
        );
    }

    let registry = codemap::PackRegistry::new();
    let emitter = renderer::Emitter {
        files: &files,
        registry: &registry,
        ignore: ignore.as_ref(),
        root: &root,
        options: renderer::EmitOptions {
            system_instructions: resolved.system_instructions.clone(),
            user_instructions: resolved.user_instructions.clone(),
            response_guide_body: resolved.response_guide_body.clone(),
            editor_comments: resolved.editor_comments,
            tree_mode: resolved.tree_mode,
            include_codemap: cli.codemap,
            lang_hints: resolved.lang_hints,
            stdin_kind,
        },
    };
    let document = emitter.build();
    let rendered = document.render();

    // Audit before writing: an over-budget document is never emitted.
    if resolved.token_budget > 0 || cli.token_diagnostics {
        let tokenizer = tokenizer::Tokenizer::for_model(&resolved.token_model);
        budget::audit(
            &document,
            &rendered,
            &files,
            &tokenizer,
            resolved.token_budget,
            cli.token_diagnostics,
        )?;
    }

    renderer::write_output(&rendered, &resolved.sink)
        .map_err(|err| Fatal::Io(format!("failed to write output: {err}")))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline tests: the stages composed end to end
// ---------------------------------------------------------------------------

#[cfg(test)]
mod pipeline_tests {
    use super::*;
    use crate::codemap::PackRegistry;
    use crate::rank::{CutoffPolicy, KeywordBoosts, RankingWeights};
    use crate::renderer::{EmitOptions, Emitter, TreeMode, FILE_SEPARATOR};
    use crate::stdin::ContentKind;
    use crate::tokenizer::{Tokenizer, DEFAULT_MODEL};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Expand inputs and render a document, the way `run` wires the stages.
    fn render_pipeline(
        root: &Path,
        args: &[&str],
        use_gitignore: bool,
        query: Option<&str>,
        cutoff: CutoffPolicy,
    ) -> String {
        let ignore = if use_gitignore {
            let mut set = IgnoreSet::new();
            set.load_tree(root);
            Some(set)
        } else {
            None
        };

        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut files = scanner::Planner::new(root, ignore.as_ref())
            .plan(&args)
            .unwrap();

        if let Some(query) = query {
            rank::rank_files(
                &mut files,
                query,
                &RankingWeights::default(),
                &KeywordBoosts::default(),
                &cutoff,
                false,
            );
        }

        let registry = PackRegistry::new();
        let emitter = Emitter {
            files: &files,
            registry: &registry,
            ignore: ignore.as_ref(),
            root,
            options: EmitOptions {
                user_instructions: query.map(str::to_string),
                tree_mode: TreeMode::Filtered,
                ..EmitOptions::default()
            },
        };
        emitter.build().render()
    }

    #[test]
    fn test_gitignore_filters_glob_expansion() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("b.log"), "world").unwrap();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();

        let rendered = render_pipeline(root, &["**/*"], true, None, CutoffPolicy::None);

        assert!(rendered.contains("File: a.txt"));
        assert!(!rendered.contains("File: b.log"));
        assert!(!rendered.contains("File: .gitignore"));
    }

    #[test]
    fn test_no_gitignore_emits_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("b.log"), "world").unwrap();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();

        let rendered = render_pipeline(root, &["**/*"], false, None, CutoffPolicy::None);

        assert!(rendered.contains("File: a.txt"));
        assert!(rendered.contains("File: b.log"));
        assert!(rendered.contains("File: .gitignore"));
    }

    #[test]
    fn test_negation_order_swaps_outcome() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("drop.log"), "x").unwrap();
        fs::write(root.join("keep.log"), "x").unwrap();

        fs::write(root.join(".gitignore"), "*.log\n!keep.log\n").unwrap();
        let rendered = render_pipeline(root, &["**/*"], true, None, CutoffPolicy::None);
        assert!(rendered.contains("File: keep.log"));
        assert!(!rendered.contains("File: drop.log"));

        fs::write(root.join(".gitignore"), "!keep.log\n*.log\n").unwrap();
        let rendered = render_pipeline(root, &["**/*"], true, None, CutoffPolicy::None);
        assert!(!rendered.contains("File: keep.log"));
        assert!(!rendered.contains("File: drop.log"));
    }

    #[test]
    fn test_ranked_emission_order_and_cutoff() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("x.c"), "search search search").unwrap();
        fs::write(root.join("y.c"), "search").unwrap();
        fs::write(root.join("z.c"), "nothing").unwrap();

        let rendered = render_pipeline(
            root,
            &["*.c"],
            true,
            Some("search"),
            CutoffPolicy::Ratio(0.4),
        );

        let x = rendered.find("File: x.c").expect("x.c present");
        let y = rendered.find("File: y.c").expect("y.c present");
        assert!(x < y);
        assert!(!rendered.contains("File: z.c"));
    }

    #[test]
    fn test_stdin_blob_flows_to_emission() {
        let blob = stdin::capture(std::io::Cursor::new(b"# Notes\n\nbody\n".to_vec()))
            .unwrap()
            .expect("non-empty");
        assert_eq!(blob.content_kind, ContentKind::Markdown);

        let files = vec![CandidateFile::from_stdin(&blob)];
        let registry = PackRegistry::new();
        let root = std::path::PathBuf::from(".");
        let emitter = Emitter {
            files: &files,
            registry: &registry,
            ignore: None,
            root: &root,
            options: EmitOptions {
                stdin_kind: Some(blob.content_kind),
                ..EmitOptions::default()
            },
        };
        let rendered = emitter.build().render();

        assert!(rendered.contains("File: stdin_content"));
        assert!(rendered.contains("# Notes"));
        // The closing separator is present after the stdin block.
        let block_start = rendered.find("File: stdin_content").unwrap();
        assert!(rendered[block_start..].contains(FILE_SEPARATOR));
    }

    #[test]
    fn test_over_budget_document_fails_before_output() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("big.txt"), "alpha beta gamma delta ".repeat(40)).unwrap();

        let ignore = None;
        let args = vec!["big.txt".to_string()];
        let files = scanner::Planner::new(root, ignore).plan(&args).unwrap();

        let registry = PackRegistry::new();
        let emitter = Emitter {
            files: &files,
            registry: &registry,
            ignore,
            root,
            options: EmitOptions::default(),
        };
        let document = emitter.build();
        let rendered = document.render();

        let tokenizer = Tokenizer::for_model(DEFAULT_MODEL);
        let err = budget::audit(&document, &rendered, &files, &tokenizer, 10, false)
            .expect_err("budget of 10 tokens must be exceeded");
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("over budget 10"));
    }
}

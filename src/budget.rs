//! Token accounting over the assembled document.
//!
//! The audit runs after rendering and before any output is written: an
//! over-budget document is never emitted. With `-D` a per-section and
//! per-file breakdown goes to the diagnostic stream; the gap between the
//! section sum and the whole-document count is reported as `<other>`.

use crate::error::Fatal;
use crate::renderer::{Document, SectionKind, BINARY_PLACEHOLDER};
use crate::scanner::CandidateFile;
use crate::tokenizer::Tokenizer;

/// Result of one audit pass.
#[derive(Clone, Debug)]
pub struct TokenAccount {
    pub total_tokens: usize,
    pub per_section_tokens: Vec<(String, usize)>,
    pub per_file_tokens: Vec<(String, usize)>,
    pub other_tokens: usize,
    pub budget: usize,
    pub over_budget: bool,
}

/// Audit `rendered` against `budget` (0 = unbounded). Returns `None` when
/// nothing was measured (no budget and no diagnostics requested, or the
/// tokenizer is unavailable).
pub fn audit(
    document: &Document,
    rendered: &str,
    files: &[CandidateFile],
    tokenizer: &Tokenizer,
    budget: usize,
    diagnostics: bool,
) -> Result<Option<TokenAccount>, Fatal> {
    if budget == 0 && !diagnostics {
        return Ok(None);
    }

    // The tokenizer warns once on its own when the model is missing.
    let Some(total_tokens) = tokenizer.count_tokens(rendered) else {
        return Ok(None);
    };

    if total_tokens > rendered.len() {
        tracing::warn!(
            "suspicious token count {total_tokens} exceeds text length {}",
            rendered.len()
        );
    }

    let per_section_tokens: Vec<(String, usize)> = document
        .sections
        .iter()
        .map(|section| {
            let count = tokenizer.count_tokens(&section.body).unwrap_or(0);
            (section.kind.tag().to_string(), count)
        })
        .collect();

    let section_sum: usize = per_section_tokens.iter().map(|(_, n)| n).sum();
    let other_tokens = total_tokens.saturating_sub(section_sum);

    let per_file_tokens: Vec<(String, usize)> = files
        .iter()
        .map(|file| {
            let body = if file.is_binary {
                BINARY_PLACEHOLDER
            } else {
                file.text()
            };
            let count = tokenizer.count_tokens(body).unwrap_or(0);
            (file.display_path.clone(), count)
        })
        .collect();

    let over_budget = budget > 0 && total_tokens > budget;
    let account = TokenAccount {
        total_tokens,
        per_section_tokens,
        per_file_tokens,
        other_tokens,
        budget,
        over_budget,
    };

    if diagnostics {
        print_table(&account, tokenizer.model());
    }

    if over_budget {
        return Err(Fatal::BudgetExceeded {
            used: total_tokens,
            budget,
        });
    }

    Ok(Some(account))
}

/// Diagnostic breakdown on stderr.
fn print_table(account: &TokenAccount, model: &str) {
    eprintln!("Token usage (model: {model})");
    for (tag, count) in &account.per_section_tokens {
        eprintln!("  {tag:<28}{count:>10}");
        if tag == SectionKind::FileContext.tag() {
            for (path, file_count) in &account.per_file_tokens {
                eprintln!("    {path:<26}{file_count:>10}");
            }
        }
    }
    eprintln!("  {:<28}{:>10}", "<other>", account.other_tokens);
    eprintln!("  {:<28}{:>10}", "total", account.total_tokens);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Run command implementation for the cellar CLI.
//!
//! Splits a file into snippets at `# %%` markers, submits them all at once and
//! prints each outcome in submission order.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::Context;
use cellar_core::Outcome;

use crate::colors::{self, paint};
use crate::executor::{Backend, runtime_config};

/// Line prefix that starts a new snippet.
pub const SNIPPET_MARKER: &str = "# %%";

/// Split `source` into snippets, dropping ones that are blank.
pub fn split_snippets(source: &str) -> Vec<String> {
    let mut snippets = Vec::new();
    let mut current = String::new();
    for line in source.lines() {
        if line.trim_start().starts_with(SNIPPET_MARKER) {
            snippets.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    snippets.push(current);
    snippets.retain(|s| !s.trim().is_empty());
    snippets
}

/// Execute a snippet file.
pub async fn execute(path: &str, packages: Vec<String>, isolated: bool) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read {path}"))?;
    let snippets = split_snippets(&source);
    let config = runtime_config(packages)?;
    let color = std::io::stdout().is_terminal();

    let backend = Backend::start(&config, isolated)?;

    // Submit everything first; results still arrive in order.
    let mut pending = Vec::with_capacity(snippets.len());
    for snippet in snippets {
        pending.push(backend.gateway().submit(snippet).await?);
    }

    let total = pending.len();
    let mut failed = 0;
    for (index, result) in pending.into_iter().enumerate() {
        match result.outcome().await? {
            Outcome::Error(message) => {
                failed += 1;
                eprintln!(
                    "{}error{} in snippet {}: {}",
                    paint(colors::RED, color),
                    paint(colors::RESET, color),
                    index + 1,
                    message
                );
            }
            Outcome::Value(serde_json::Value::Null) => {}
            outcome => println!("{outcome}"),
        }
    }

    backend.finish().await?;

    if failed > 0 {
        anyhow::bail!("{failed} of {total} snippet(s) failed");
    }
    tracing::debug!("{} snippet(s) completed", total);
    Ok(())
}

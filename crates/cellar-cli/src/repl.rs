//! Interactive session: one snippet per line of stdin.

use std::io::{IsTerminal, Write};

use cellar_core::Outcome;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::colors::{self, paint};
use crate::executor::{Backend, runtime_config};

pub async fn execute(packages: Vec<String>, isolated: bool) -> anyhow::Result<()> {
    let config = runtime_config(packages)?;
    let interactive = std::io::stdin().is_terminal();
    let backend = Backend::start(&config, isolated)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            print!("{}>>>{} ", paint(colors::BOLD, true), paint(colors::RESET, true));
            std::io::stdout().flush()?;
        }
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match backend.gateway().execute(line).await? {
            Outcome::Error(message) => eprintln!(
                "{}error{}: {}",
                paint(colors::RED, interactive),
                paint(colors::RESET, interactive),
                message
            ),
            Outcome::Value(serde_json::Value::Null) => {}
            outcome => println!("{outcome}"),
        }
    }

    if interactive {
        println!("{}bye{}", paint(colors::DIM, true), paint(colors::RESET, true));
    }
    backend.finish().await
}

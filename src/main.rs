use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use changemark::{PluginConfig, Session};

/// Replay an edit script against the simulated host and report the
/// resulting change-marker state.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Script file to replay; stdin when omitted
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// Configuration file (created with defaults if missing)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the final state of every document
    #[arg(short, long)]
    summary: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let config = PluginConfig::load(path)?;
            config.store()?;
            config
        }
        None => PluginConfig::default(),
    };

    let script = match &args.script {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            text
        }
    };

    let mut session = Session::new(&config)?;
    for line in session.run_script(&script)? {
        println!("{}", line);
    }

    if args.summary {
        for (name, doc) in session.documents() {
            println!("{}: {}", name, session.describe(doc));
        }
        let counters = session.tracker.counters();
        if counters != Default::default() {
            println!("inconsistencies: {:?}", counters);
        }
    }

    Ok(())
}

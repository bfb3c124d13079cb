use clap::{Args, Parser, Subcommand};
use mailsort_classifiers::KeywordLabeler;
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mailsort")]
#[command(author, version, about = "Email classification service")]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server options used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP prediction server (default)
    Serve(ServeArgs),

    /// Classify a single text and print the result as JSON
    Predict {
        /// Email text to classify
        text: String,

        /// Minimum top-label probability; lower results become "unknown"
        #[arg(short, long, env = "CONFIDENCE_THRESHOLD", default_value = "0.5")]
        threshold: f32,
    },

    /// Weak-label stdin lines with keyword rules, writing JSON lines to stdout
    Label,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Configuration file path (defaults to ./mailsort.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Confidence threshold for the returned category
    #[arg(long, env = "CONFIDENCE_THRESHOLD")]
    pub confidence_threshold: Option<f32>,

    /// Largest accepted email body, in bytes
    #[arg(long, env = "MAX_EMAIL_BYTES")]
    pub max_email_bytes: Option<usize>,

    /// Load the model before accepting traffic
    #[arg(long)]
    pub preload: bool,
}

#[derive(Debug, Serialize)]
struct LabelledLine<'a> {
    text: &'a str,
    label: &'static str,
}

/// Counts from one weak-labelling run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LabelStats {
    pub read: usize,
    pub labelled: usize,
}

/// Label each non-blank line of `input`, writing `{"text","label"}` JSON
/// lines for the ones a keyword rule matches. Unmatched lines are skipped.
pub fn run_label<R: BufRead, W: Write>(
    labeler: &KeywordLabeler,
    input: R,
    mut output: W,
) -> anyhow::Result<LabelStats> {
    let mut stats = LabelStats::default();

    for line in input.lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        stats.read += 1;

        if let Some(label) = labeler.assign(text) {
            serde_json::to_writer(&mut output, &LabelledLine { text, label })?;
            output.write_all(b"\n")?;
            stats.labelled += 1;
        }
    }

    output.flush()?;
    Ok(stats)
}

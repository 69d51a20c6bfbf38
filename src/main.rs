//! Coachalign command-line driver.
//!
//! **Usage:**
//! ```bash
//! coachalign analyze --input dialogues.json --prompt prompt.txt [--backend claude] [--output out.json]
//! coachalign align --records records.json --reference expert --candidate deepseek-chat --fields fields.txt
//! coachalign summary --records records.json
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use coachalign_lib::alignment;
use coachalign_lib::config::{self, APP_NAME, APP_VERSION};
use coachalign_lib::pipeline::{
    AnalysisPipeline, BackendConfig, BackendKind, FileArchiver, NullArchiver, RawOutputSink,
    RetryPolicy,
};
use coachalign_lib::records::{self, FieldMapping};

#[derive(Parser, Debug)]
#[command(name = "coachalign")]
#[command(about = "Annotate coaching dialogues with LLMs and measure agreement with expert annotations")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every dialogue through the configured model backend
    Analyze {
        /// JSON array of dialogue objects, each with a `dialogue_id`
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Prompt template containing the {{TRANSACTION}} placeholder
        #[arg(long, value_name = "FILE", env = config::ENV_PROMPT_FILE)]
        prompt: PathBuf,

        /// deepseek, claude, gemini, qwen or ollama (default: COACHALIGN_BACKEND or deepseek)
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Write records here instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Do not archive raw model output
        #[arg(long)]
        no_archive: bool,
    },

    /// Compare a candidate submitter's annotations against a reference submitter
    Align {
        /// JSON array of annotation records
        #[arg(long, value_name = "FILE")]
        records: PathBuf,

        /// Submitter treated as ground truth
        #[arg(long)]
        reference: String,

        /// Submitter being evaluated
        #[arg(long)]
        candidate: String,

        /// File listing the fields to compare, one per line
        #[arg(long, value_name = "FILE")]
        fields: Option<PathBuf>,

        /// Field to compare (repeatable)
        #[arg(long = "field", value_name = "NAME")]
        field: Vec<String>,

        /// Also log every compared field
        #[arg(long)]
        detailed: bool,

        /// Write the report here instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Record counts per submitter and field fill rates
    Summary {
        #[arg(long, value_name = "FILE")]
        records: PathBuf,
    },
}

fn main() -> Result<()> {
    coachalign_lib::init_tracing();
    tracing::info!("{} v{}", APP_NAME, APP_VERSION);

    match Args::parse().command {
        Command::Analyze {
            input,
            prompt,
            backend,
            output,
            no_archive,
        } => run_analyze(&input, &prompt, backend, output.as_deref(), no_archive),
        Command::Align {
            records,
            reference,
            candidate,
            fields,
            field,
            detailed,
            output,
        } => run_align(
            &records,
            &reference,
            &candidate,
            fields.as_deref(),
            field,
            detailed,
            output.as_deref(),
        ),
        Command::Summary { records } => run_summary(&records),
    }
}

fn run_analyze(
    input: &Path,
    prompt: &Path,
    backend: Option<BackendKind>,
    output: Option<&Path>,
    no_archive: bool,
) -> Result<()> {
    let template = std::fs::read_to_string(prompt)
        .with_context(|| format!("Failed to read prompt template {}", prompt.display()))?;
    let kind = match backend {
        Some(kind) => kind,
        None => BackendKind::from_env()?,
    };
    let backend_config = BackendConfig::from_env(kind, &template)?;

    let archiver: Box<dyn RawOutputSink> = if no_archive {
        Box::new(NullArchiver)
    } else {
        Box::new(FileArchiver::from_env())
    };
    let pipeline =
        AnalysisPipeline::from_config(&backend_config, RetryPolicy::default(), archiver)?;

    let dialogues = records::load_dialogues(input)?;
    tracing::info!(count = dialogues.len(), model = %pipeline.model_name(), "Dialogues loaded");

    let outcome = pipeline.analyze_batch(dialogues.iter().map(|(k, p)| (k.as_str(), p.as_str())));
    write_json(output, &outcome.records)?;

    if !outcome.failed.is_empty() {
        tracing::warn!(dialogues = ?outcome.failed, "Some dialogues produced error records");
    }
    if let Some((dialogue_id, error)) = outcome.aborted {
        bail!(
            "Batch stopped at dialogue {dialogue_id} after {} completed: {error}",
            outcome.processed
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_align(
    records_path: &Path,
    reference: &str,
    candidate: &str,
    fields_path: Option<&Path>,
    mut fields: Vec<String>,
    detailed: bool,
    output: Option<&Path>,
) -> Result<()> {
    if let Some(path) = fields_path {
        let mut listed = records::load_field_list(path)?;
        listed.append(&mut fields);
        fields = listed;
    }
    if fields.is_empty() {
        bail!("No comparison fields given: use --fields FILE or --field NAME");
    }

    let records = records::load_records(records_path, &FieldMapping::default())?;
    let report = alignment::compute(&records, reference, candidate, &fields);
    alignment::log_report(&report);
    if detailed {
        alignment::log_comparisons(&alignment::compare_dialogues(
            &records, reference, candidate, &fields,
        ));
    }

    write_json(output, &report)
}

fn run_summary(records_path: &Path) -> Result<()> {
    let records = records::load_records(records_path, &FieldMapping::default())?;
    let summary = records::summarize(&records);
    records::log_summary(&summary);
    write_json(None, &summary)
}

/// Pretty-print `value` to `path`, or to stdout when no path is given.
fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "Output written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, value)?;
            writeln!(lock)?;
        }
    }
    Ok(())
}

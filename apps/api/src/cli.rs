use clap::{Args, Parser, Subcommand};

use crate::pipeline::reprocess::{ReprocessSelection, ReprocessSummary, DEFAULT_LIMIT};

#[derive(Parser, Debug)]
#[command(
    name = "equihire-api",
    about = "Score, audit and explain job applications",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Re-run the pipeline over stored applications
    Reprocess(ReprocessArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct ReprocessArgs {
    /// Reprocess all applications, not only those without a score
    #[arg(long)]
    pub all: bool,
    /// Maximum number of applications to process
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,
    /// Worker count; defaults to PIPELINE_CONCURRENCY
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl ReprocessArgs {
    pub fn selection(&self) -> ReprocessSelection {
        ReprocessSelection {
            all: self.all,
            limit: self.limit,
        }
    }
}

impl Cli {
    pub fn command(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    }
}

/// One line per application plus the final tally.
pub fn render_summary(summary: &ReprocessSummary) -> String {
    let mut lines: Vec<String> = summary
        .items
        .iter()
        .map(|item| match (&item.error, item.score) {
            (Some(e), _) => format!("✗ Error processing application {}: {e}", item.application_id),
            (None, Some(score)) => format!(
                "✓ Processed application {} (score: {score:.2})",
                item.application_id
            ),
            (None, None) => format!(
                "✓ Processed application {} (no score)",
                item.application_id
            ),
        })
        .collect();
    lines.push(format!(
        "Successfully processed {}/{} applications",
        summary.processed, summary.total
    ));
    lines.join("\n")
}

//! Shoov - visual regression reporter CLI
//!
//! The `shoov` command feeds screenshot comparison results into a reporting
//! session, uploads the new regressions and prints where to review them.
//!
//! ## Commands
//!
//! - `report`: evaluate result batches from JSON files, or NDJSON on stdin
//! - `fingerprint`: print the fingerprint of an artifact triple
//! - `config`: show the resolved configuration (token redacted)
//!
//! Exit status: 0 without regressions, 1 when regressions were found,
//! 2 when the session could not run.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shoov_core::{
    fingerprint_artifacts, AggregatedReport, ArtifactSet, ConfigLayer, GitMetadata,
    RegressionReporter, ResultBatch, ShoovConfig, UNSCOPED,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn, Level};

const EXIT_REGRESSIONS: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "shoov")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Report visual regressions to Shoov", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Backend URL (overrides environment and config file)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Web client URL used for the regression link
    #[arg(long, global = true)]
    client_url: Option<String>,

    /// Open the regression link in a browser when done
    #[arg(long, global = true)]
    open: bool,

    /// Debug mode: verbose logs and raw upload responses
    #[arg(long, global = true)]
    debug: bool,

    /// Config file (default: ~/.shoov.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Flags given on the command line, as the highest-precedence layer.
    fn overrides(&self) -> ConfigLayer {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(url) = &self.backend_url {
            pairs.push(("backend_url", url.clone()));
        }
        if let Some(url) = &self.client_url {
            pairs.push(("client_url", url.clone()));
        }
        if self.open {
            pairs.push(("open_link", "true".to_string()));
        }
        if self.debug {
            pairs.push(("debug", "true".to_string()));
        }
        ConfigLayer::from_pairs("command line", pairs)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate comparison results and upload new regressions
    Report {
        /// Result batch files (JSON); reads one batch per stdin line if omitted
        files: Vec<PathBuf>,

        /// Git work tree the screenshots belong to
        #[arg(long, default_value = ".")]
        repo_dir: PathBuf,

        /// Print the aggregated report as JSON on stdout
        #[arg(long)]
        report_json: bool,
    },

    /// Print the fingerprint of a baseline/regression/diff triple
    Fingerprint {
        baseline: PathBuf,
        regression: PathBuf,
        diff: PathBuf,

        /// Build id the fingerprint is scoped to
        #[arg(long, default_value = UNSCOPED)]
        scope: String,
    },

    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "shoov failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = ShoovConfig::load(cli.overrides(), cli.config.as_deref())
        .context("Failed to load configuration")?;

    let level = if cli.verbose || config.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    shoov_core::telemetry::init_tracing(cli.json, level);
    debug!(config = ?config, "Configuration resolved");

    match cli.command {
        Commands::Report {
            files,
            repo_dir,
            report_json,
        } => cmd_report(config, &files, &repo_dir, report_json).await,
        Commands::Fingerprint {
            baseline,
            regression,
            diff,
            scope,
        } => {
            cmd_fingerprint(ArtifactSet::new(baseline, regression, diff), &scope).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            println!("{config:#?}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run one reporting session over every batch, then print the link.
async fn cmd_report(
    config: ShoovConfig,
    files: &[PathBuf],
    repo_dir: &Path,
    report_json: bool,
) -> Result<ExitCode> {
    config.require_token()?;
    let open_link_when_done = config.open_link;
    let git = GitMetadata::collect(repo_dir)
        .await
        .with_context(|| format!("Failed to read git metadata in {}", repo_dir.display()))?;
    info!(repository = %git.repository(), branch = %git.branch, "Reporting session started");

    let mut reporter = RegressionReporter::connect(config, git)?;

    let fed = if files.is_empty() {
        feed_stdin(&mut reporter).await
    } else {
        feed_files(&mut reporter, files).await
    };

    let finished = reporter.finish().await;
    let (aggregated, fed) = match (finished, fed) {
        (Ok(aggregated), fed) => (aggregated, fed),
        (Err(e), _) => {
            error!(error = %e, "Reporting stopped");
            eprintln!("Error: {e}");
            return Ok(ExitCode::from(EXIT_FATAL));
        }
    };
    if let Err(e) = fed {
        error!(error = %format!("{e:#}"), "Reporting stopped");
        eprintln!("Error: {e:#}");
        print_report(&aggregated, report_json)?;
        return Ok(ExitCode::from(EXIT_FATAL));
    }

    print_report(&aggregated, report_json)?;
    if open_link_when_done {
        if let Some(link) = &aggregated.link {
            if let Err(e) = open_link(link) {
                warn!(error = %e, "Could not open the regression link");
            }
        }
    }

    Ok(ExitCode::from(exit_status(&aggregated)))
}

async fn feed_files(reporter: &mut RegressionReporter, files: &[PathBuf]) -> Result<()> {
    for path in files {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        feed_batch(reporter, &path.display().to_string(), &content).await?;
    }
    Ok(())
}

/// One batch per non-empty line, processed as it arrives.
async fn feed_stdin(reporter: &mut RegressionReporter) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        feed_batch(reporter, &format!("stdin:{line_no}"), &line).await?;
    }
    Ok(())
}

/// Malformed input skips the batch; only session-fatal errors stop the run.
async fn feed_batch(reporter: &mut RegressionReporter, source: &str, json: &str) -> Result<()> {
    let batch = match ResultBatch::from_json(json) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(source = %source, error = %e, "Skipping malformed result batch");
            return Ok(());
        }
    };

    let report = reporter
        .process_results(&batch)
        .await
        .with_context(|| format!("Failed to report results from {source}"))?;
    debug!(
        source = %source,
        new_keys = report.new_keys,
        already_seen = report.already_seen,
        regressions = report.regressions.len(),
        "Batch evaluated"
    );
    Ok(())
}

fn print_report(report: &AggregatedReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if let Some(link) = &report.link {
        println!("See regressions in: {link}");
    }
    Ok(())
}

fn exit_status(report: &AggregatedReport) -> u8 {
    if report.has_regressions() {
        EXIT_REGRESSIONS
    } else {
        0
    }
}

async fn cmd_fingerprint(artifacts: ArtifactSet, scope: &str) -> Result<()> {
    let fingerprint = fingerprint_artifacts(&artifacts, scope)
        .await
        .context("Failed to fingerprint artifacts")?;
    println!("{fingerprint}");
    Ok(())
}

/// Hand the link to the platform's URL opener without waiting for it.
fn open_link(link: &str) -> Result<()> {
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(windows) {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        std::process::Command::new("xdg-open")
    };

    command
        .arg(link)
        .spawn()
        .with_context(|| format!("Failed to open {link}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoov_core::{SessionContext, ShoovError};

    fn report_with(regressions_found: usize) -> AggregatedReport {
        let session = SessionContext::new();
        AggregatedReport {
            session_id: session.id,
            build_id: None,
            regressions_found,
            upload_count: 0,
            enqueued: 0,
            failed_uploads: 0,
            failed_checks: 0,
            link: None,
            started_at: session.started_at,
            finished_at: session.started_at,
        }
    }

    #[test]
    fn test_report_defaults_to_stdin_and_current_dir() {
        let cli = Cli::try_parse_from(["shoov", "report"]).unwrap();
        match cli.command {
            Commands::Report {
                files,
                repo_dir,
                report_json,
            } => {
                assert!(files.is_empty());
                assert_eq!(repo_dir, PathBuf::from("."));
                assert!(!report_json);
            }
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn test_flags_become_highest_layer() {
        let cli = Cli::try_parse_from([
            "shoov",
            "--backend-url",
            "https://backend.test/",
            "--open",
            "config",
        ])
        .unwrap();

        let config = ShoovConfig::resolve(&[
            cli.overrides(),
            ConfigLayer::from_pairs(
                "file",
                [
                    ("backend_url", "https://ignored.test"),
                    ("client_url", "https://client.test"),
                ],
            ),
        ]);
        assert_eq!(config.backend_url, "https://backend.test");
        assert_eq!(config.client_url, "https://client.test");
        assert!(config.open_link);
        assert!(!config.debug);
    }

    #[test]
    fn test_fingerprint_scope_defaults_to_unscoped() {
        let cli = Cli::try_parse_from(["shoov", "fingerprint", "b.png", "r.png", "d.png"]).unwrap();
        match cli.command {
            Commands::Fingerprint { scope, diff, .. } => {
                assert_eq!(scope, UNSCOPED);
                assert_eq!(diff, PathBuf::from("d.png"));
            }
            _ => panic!("expected fingerprint"),
        }
    }

    #[test]
    fn test_exit_status_follows_regressions() {
        assert_eq!(exit_status(&report_with(0)), 0);
        assert_eq!(exit_status(&report_with(3)), EXIT_REGRESSIONS);

        // Failed uploads do not hide regressions.
        let mut failed = report_with(2);
        failed.failed_uploads = 2;
        assert_eq!(exit_status(&failed), EXIT_REGRESSIONS);
    }

    #[tokio::test]
    async fn test_report_without_token_fails_before_git() {
        let not_a_repo = tempfile::tempdir().unwrap();
        let err = cmd_report(ShoovConfig::default(), &[], not_a_repo.path(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ShoovError>(),
            Some(ShoovError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_cmd_fingerprint_reads_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let set = ArtifactSet::new(
            dir.path().join("home.baseline.png"),
            dir.path().join("home.regression.png"),
            dir.path().join("home.diff.png"),
        );
        for path in set.paths() {
            std::fs::write(path, b"pixels").unwrap();
        }

        assert!(cmd_fingerprint(set.clone(), "42").await.is_ok());

        std::fs::remove_file(&set.diff).unwrap();
        let err = cmd_fingerprint(set, "42").await.unwrap_err();
        assert!(format!("{err:#}").contains("home.diff.png"));
    }
}

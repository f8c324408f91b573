//! robotlog2rqm - Robot Framework results to IBM RQM importer
//!
//! Imports `output.xml` result files generated by Robot Framework into an
//! IBM Rational Quality Manager (Engineering Test Management) project:
//!
//! 1. Discover and parse the result file(s)
//! 2. Log in and resolve the project
//! 3. Reconcile test environment, build record, test cases, TCERs and results
//! 4. Link every imported test case to the given test plan

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rqm_http::{RqmClient, RqmConfig};
use rqm_import_core::{
    init_tracing, ConsoleReporter, FanoutSink, ImportReport, MemorySink, Policy,
    ReconciliationEngine, TemplateSet, TracingSink,
};
use rqm_state::ResourceId;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "robotlog2rqm")]
#[command(author = "Stevedores Org")]
#[command(version = concat!("v", env!("CARGO_PKG_VERSION")))]
#[command(disable_version_flag = true)]
#[command(
    about = "RobotLog2RQM imports XML result files (default: output.xml) generated by the Robot Framework into an IBM Rational Quality Manager.",
    long_about = None
)]
struct Cli {
    /// Version of the RobotLog2RQM importer.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    /// Absolute or relative path to the xml result file or directory of result files to be imported.
    resultxmlfile: PathBuf,

    /// RQM host url.
    host: String,

    /// Project on RQM.
    project: String,

    /// User for RQM login.
    user: String,

    /// Password for RQM login.
    password: String,

    /// Testplan ID for this execution.
    testplan: String,

    /// If set, then the path is searched recursively for log files to be imported.
    #[arg(long)]
    recursive: bool,

    /// If set, then all testcases without tcid are created when importing.
    #[arg(long)]
    createmissing: bool,

    /// If set, then testcase information on RQM will be updated bases on robot testfile.
    #[arg(long)]
    updatetestcase: bool,

    /// If set, then verify all input arguments (includes RQM authentication) and show what would be done.
    #[arg(long)]
    dryrun: bool,

    /// Directory with `<resource>.xml` templates overriding the built-in ones
    #[arg(long, env = "RQM_TEMPLATES_DIR")]
    templates: Option<PathBuf>,

    /// Write a JSON report of every import decision to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    log_json: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn policy(&self) -> Policy {
        Policy::new()
            .create_missing(self.createmissing)
            .update_existing(self.updatetestcase)
            .dry_run(self.dryrun)
            .recursive(self.recursive)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.log_json, level);

    let policy = cli.policy();
    let run = robot_log::load_run(&cli.resultxmlfile, policy.recursive).with_context(|| {
        format!(
            "could not read robot results from '{}'",
            cli.resultxmlfile.display()
        )
    })?;
    info!(
        files = run.sources.len(),
        tests = run.tests.len(),
        "parsed robot results"
    );

    let templates = match &cli.templates {
        Some(dir) => TemplateSet::from_dir(dir)
            .with_context(|| format!("invalid templates in '{}'", dir.display()))?,
        None => TemplateSet::builtin()?,
    };

    let config =
        RqmConfig::new(&cli.host, &cli.project, &cli.user, &cli.password).with_env_overrides();
    let client = RqmClient::connect(config)
        .await
        .with_context(|| format!("could not login to RQM at '{}'", cli.host))?;
    info!(user = %cli.user, project = %cli.project, "logged in to RQM");

    let events = Arc::new(MemorySink::new());
    let mut sink = FanoutSink::new()
        .with(Arc::new(ConsoleReporter::stdout(policy.dry_run)))
        .with(events.clone());
    if cli.log_json {
        sink = sink.with(Arc::new(TracingSink));
    }

    let engine = ReconciliationEngine::new(Arc::new(client), policy, Arc::new(sink))?
        .with_templates(templates);
    let result = engine
        .import(&run, &ResourceId::from(cli.testplan.as_str()))
        .await;

    if let Some(path) = &cli.report {
        let mut report = ImportReport::from_events(events.events());
        if let Err(e) = &result {
            report = report.with_error(e);
        }
        report
            .write_json(path)
            .with_context(|| format!("could not write report to '{}'", path.display()))?;
    }

    let outcome = result.context("could not import results to RQM")?;
    if outcome.summary.tests_failed > 0 {
        warn!(
            failed = outcome.summary.tests_failed,
            "some test cases could not be imported"
        );
    }
    Ok(())
}

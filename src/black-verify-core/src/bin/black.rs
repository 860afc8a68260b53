//! black CLI - verify the provenance of published release artifacts.
//!
//! Checks checksums, signatures, attestations, SBOMs and vulnerability
//! reports for a local directory of release assets or a GitHub release.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use black_verify_core::config::{Policy, Target, VerifyConfig, DEFAULT_API_URL};
use black_verify_core::error::EXIT_FATAL;
use black_verify_core::{CheckRegistry, Severity, VerificationEngine, VerifyError, VERSION};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// black - release provenance verification.
///
/// Every artifact is run through a fixed, versioned set of checks:
/// - Digest: the bytes match the published checksums manifest
/// - Signature: a trusted identity signed the bytes under an intact chain
/// - Attestation: a trusted builder produced exactly these bytes, recently
/// - SBOM / vulnerabilities: the bill of materials exists and scans clean
#[derive(Parser)]
#[command(name = "black")]
#[command(version = VERSION)]
#[command(about = "Verify the provenance of published release artifacts")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify release artifacts
    Verify(VerifyArgs),

    /// List the check registry
    Checks {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct VerifyArgs {
    /// Artifact file or directory of release assets
    path: Option<PathBuf>,

    /// Repository identifier (owner/name)
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repo: Option<String>,

    /// Release tag; also the declared version for local targets
    #[arg(long)]
    tag: Option<String>,

    /// Verify the published release for --repo and --tag instead of local files
    #[arg(long, requires = "tag")]
    remote: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Exit non-zero on WARN
    #[arg(long)]
    strict: bool,

    /// Make a check's skip affect the verdict (repeatable)
    #[arg(long = "require", value_name = "ID")]
    require: Vec<String>,

    /// Make a check advisory (repeatable)
    #[arg(long = "advisory", value_name = "ID")]
    advisory: Vec<String>,

    /// Lowest vulnerability severity that fails
    #[arg(long, default_value = "high")]
    severity_threshold: Severity,

    /// Maximum vulnerability report age in days
    #[arg(long, default_value = "7")]
    max_scan_age_days: u64,

    /// Maximum attestation age in days
    #[arg(long, default_value = "365")]
    max_attestation_age_days: u64,

    /// Maximum artifact size in bytes
    #[arg(long)]
    max_artifact_size: Option<u64>,

    /// Trusted signer identity; a trailing / or @ makes it a prefix (repeatable)
    #[arg(long = "trusted-identity", value_name = "IDENTITY")]
    trusted_identities: Vec<String>,

    /// Trusted attestation builder prefix (repeatable)
    #[arg(long = "trusted-builder", value_name = "PREFIX")]
    trusted_builders: Vec<String>,

    /// Trusted root key SHA-256 fingerprint (repeatable)
    #[arg(long = "trusted-root", value_name = "SHA256")]
    trusted_roots: Vec<String>,

    /// Per-fetch timeout in seconds
    #[arg(long, default_value = "30")]
    fetch_timeout: u64,

    /// Whole-run timeout in seconds
    #[arg(long)]
    run_timeout: Option<u64>,

    /// Artifacts verified concurrently
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Run osv-scanner on the SBOM when no report is published
    #[arg(long)]
    osv_scanner: bool,

    /// Release API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Release API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

impl VerifyArgs {
    fn into_config(self, registry: &CheckRegistry) -> Result<VerifyConfig, VerifyError> {
        let target = if self.remote {
            let repository = self.repo.clone().ok_or_else(|| {
                VerifyError::configuration("--remote needs --repo or GITHUB_REPOSITORY")
            })?;
            let tag = self
                .tag
                .clone()
                .ok_or_else(|| VerifyError::configuration("--remote needs --tag"))?;
            Target::Release { repository, tag }
        } else {
            Target::Local(self.path.unwrap_or_else(|| PathBuf::from(".")))
        };

        let defaults = Policy::default();
        let policy = Policy {
            severity_threshold: self.severity_threshold,
            max_scan_age: days(self.max_scan_age_days, "--max-scan-age-days")?,
            max_attestation_age: days(self.max_attestation_age_days, "--max-attestation-age-days")?,
            max_artifact_size: self.max_artifact_size.unwrap_or(defaults.max_artifact_size),
            trusted_identities: self.trusted_identities,
            trusted_builders: self.trusted_builders,
            trusted_roots: self.trusted_roots,
            ..defaults
        }
        .with_overrides(&self.require, &self.advisory, registry)?;

        Ok(VerifyConfig {
            target,
            repository: self.repo,
            tag: self.tag,
            api_url: self.api_url,
            token: self.token.or_else(|| std::env::var("GH_TOKEN").ok()),
            fetch_timeout: Duration::from_secs(self.fetch_timeout),
            run_timeout: self.run_timeout.map(Duration::from_secs),
            workers: self.workers,
            strict: self.strict,
            osv_scanner: self.osv_scanner,
            policy,
        })
    }
}

fn days(count: u64, flag: &str) -> Result<Duration, VerifyError> {
    count
        .checked_mul(SECS_PER_DAY)
        .map(Duration::from_secs)
        .ok_or_else(|| VerifyError::configuration(format!("{flag} {count} is out of range")))
}

fn init_logging(json: bool, verbose: bool) {
    let level = if json {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_verify(args: VerifyArgs) -> i32 {
    let registry = Arc::new(CheckRegistry::standard());
    let format = args.format;
    let output = args.output.clone();

    let engine = match args
        .into_config(&registry)
        .and_then(|config| VerificationEngine::new(config, registry))
    {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        },
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling verification");
            interrupt.cancel();
        }
    });

    let report = match engine.run(cancel).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        },
    };

    let json = match report.to_json() {
        Ok(json) => json,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_FATAL;
        },
    };
    if let Some(path) = output {
        if let Err(e) = tokio::fs::write(&path, &json).await {
            eprintln!("error: failed to write {}: {e}", path.display());
            return EXIT_FATAL;
        }
    }

    match format {
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Text => print!("{}", report.render_text(std::io::stdout().is_terminal())),
    }
    report.exit_code(engine.config().strict)
}

fn print_checks(format: OutputFormat) -> i32 {
    let registry = CheckRegistry::standard();
    let policy = Policy::default();

    if format == OutputFormat::Json {
        let checks: Vec<serde_json::Value> = registry
            .checks()
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id(),
                    "name": c.name(),
                    "needs": c.requires(),
                    "severity": c.severity(),
                    "required": policy.is_required(c.id()),
                })
            })
            .collect();
        let doc = serde_json::json!({
            "registry_version": registry.version(),
            "checks": checks,
        });
        match serde_json::to_string_pretty(&doc) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("error: {e}");
                return EXIT_FATAL;
            },
        }
        return 0;
    }

    println!("CHECK REGISTRY {}", registry.version());
    println!("===================\n");
    for check in registry.checks() {
        let needs: Vec<&str> = check.requires().iter().map(|k| k.as_str()).collect();
        let required = if policy.is_required(check.id()) {
            "required"
        } else {
            "advisory"
        };
        println!(
            "  {:<28} {:<8} {:<8} {:<26} {}",
            check.id(),
            check.severity(),
            required,
            needs.join(", "),
            check.name()
        );
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let json_output = match &cli.command {
        Commands::Verify(args) => args.format == OutputFormat::Json,
        Commands::Checks { format } => *format == OutputFormat::Json,
    };
    init_logging(json_output, cli.verbose);

    let code = match cli.command {
        Commands::Verify(args) => run_verify(args).await,
        Commands::Checks { format } => print_checks(format),
    };
    std::process::exit(code);
}

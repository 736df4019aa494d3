// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use authscope::cli;
use authscope::config::{AnalysisMode, ConfigOverrides};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "authscope",
    about = "Authscope: audit websites for login entry points and OAuth providers",
    version,
    after_help = "Run 'authscope <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every site in an input list
    Analyze {
        /// Input file, one URL or domain per line
        #[arg(long, short, default_value = "test.txt")]
        input: PathBuf,
        #[command(flatten)]
        run: RunArgs,
        /// Attempts per site before recording a failure
        #[arg(long)]
        retries: Option<u32>,
    },
    /// Analyze a single site and print its result
    Single {
        /// URL or bare domain
        url: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Write a sample input list
    Init {
        /// Where to write the list
        #[arg(default_value = "test.txt")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

/// Options shared by the commands that drive a browser.
#[derive(Args)]
struct RunArgs {
    /// Directory for result files
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Detections to run: both, oauth
    #[arg(long, short)]
    mode: Option<AnalysisMode>,
    /// Show the browser window
    #[arg(long)]
    no_headless: bool,
    /// Navigation timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Chromium binary to launch
    #[arg(long)]
    chromium: Option<PathBuf>,
    /// Replace the built-in provider registry with this JSON file
    #[arg(long)]
    providers: Option<PathBuf>,
    /// Replace the built-in detection patterns with this JSON file
    #[arg(long)]
    patterns: Option<PathBuf>,
}

impl RunArgs {
    fn into_overrides(self, max_retries: Option<u32>) -> ConfigOverrides {
        ConfigOverrides {
            output_dir: self.output,
            mode: self.mode,
            headless: self.no_headless.then_some(false),
            max_retries,
            nav_timeout_ms: self.timeout,
            chromium_path: self.chromium,
            providers_file: self.providers,
            patterns_file: self.patterns,
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let directive = if verbose {
        "authscope=debug"
    } else if quiet {
        "authscope=warn"
    } else {
        "authscope=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    cli::output::init(cli.json, cli.quiet);
    init_tracing(cli.verbose, cli.quiet || cli.json)?;

    let result = match cli.command {
        Commands::Analyze {
            input,
            run,
            retries,
        } => cli::analyze_cmd::run(&input, run.into_overrides(retries)).await,
        Commands::Single { url, run } => cli::single_cmd::run(&url, run.into_overrides(None)).await,
        Commands::Init { path, force } => cli::init_cmd::run(&path, force).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "authscope", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

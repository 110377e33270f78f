//! stata-bridge - drive a Stata engine from the command line
//!
//! ## Commands
//!
//! - `discover`: Locate the Stata installation
//! - `run`: Execute code in a managed session
//! - `do-file`: Execute an existing do-file
//! - `results`: Read stored r(), e() or c() results
//! - `repl`: Line-by-line loop over one session

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stata_bridge_core::{
    discover, ExecutionResult, Installation, SessionConfig, SessionMode, SessionRegistry,
    DEFAULT_SESSION_ID,
};
use stata_results::{ResultClass, ResultExtractor};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::{info, Level};

/// Default timeout for `do-file`, which usually runs longer than ad-hoc code.
const DO_FILE_TIMEOUT_SECS: u64 = 300;

#[derive(Parser)]
#[command(name = "stata-bridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Stata code through a managed console session", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Full path to the Stata executable (skips discovery)
    #[arg(long, global = true, env = "STATA_PATH")]
    stata: Option<PathBuf>,

    /// Base directory for session scratch directories
    #[arg(long, global = true, env = "STATA_BRIDGE_TEMP")]
    temp_dir: Option<PathBuf>,

    /// Session implementation: interactive or batch
    #[arg(long, global = true, env = "STATA_BRIDGE_MODE")]
    mode: Option<SessionMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate the Stata installation and describe it
    Discover {
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Execute Stata code; reads stdin when CODE is omitted or `-`
    Run {
        code: Option<String>,

        /// Session to run in
        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,

        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Copy produced graphs into this directory
        #[arg(long)]
        save_graphs: Option<PathBuf>,
    },

    /// Execute an existing .do file
    DoFile {
        path: PathBuf,

        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,

        /// Timeout in seconds
        #[arg(short, long, default_value_t = DO_FILE_TIMEOUT_SECS)]
        timeout: u64,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        #[arg(long)]
        save_graphs: Option<PathBuf>,
    },

    /// Read stored results, optionally after running setup code
    Results {
        /// Result class: r, e or c
        class: ResultClass,

        /// Single result to read; all results when omitted
        #[arg(long)]
        name: Option<String>,

        /// What kind of result `--name` refers to
        #[arg(long, value_enum, default_value = "scalar")]
        kind: ResultKind,

        /// Code to run first, e.g. "sysuse auto, clear\nsummarize price"
        #[arg(long)]
        setup: Option<String>,

        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,

        #[arg(short, long)]
        timeout: Option<u64>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Read commands from stdin and run them one at a time
    Repl {
        #[arg(short, long, default_value = DEFAULT_SESSION_ID)]
        session: String,

        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResultKind {
    Scalar,
    Macro,
    Matrix,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    stata_bridge_core::init_tracing(cli.json, level);

    if let Commands::Discover { format } = cli.command {
        return cmd_discover(cli.stata.as_deref(), format);
    }

    let installation = resolve_installation(cli.stata.as_deref())?;
    let config = build_config(cli.temp_dir, cli.mode);
    info!(installation = %installation, mode = config.mode.as_str(), "using installation");
    let registry = SessionRegistry::new(installation, config);

    let outcome = match cli.command {
        Commands::Discover { .. } => unreachable!("handled above"),
        Commands::Run {
            code,
            session,
            timeout,
            format,
            save_graphs,
        } => {
            let code = match code.as_deref() {
                None | Some("-") => read_stdin().await?,
                Some(code) => code.to_string(),
            };
            cmd_run(
                &registry,
                &session,
                &code,
                timeout.map(Duration::from_secs),
                format,
                save_graphs.as_deref(),
            )
            .await
        }
        Commands::DoFile {
            path,
            session,
            timeout,
            format,
            save_graphs,
        } => {
            let code = do_file_directive(&path)?;
            cmd_run(
                &registry,
                &session,
                &code,
                Some(Duration::from_secs(timeout)),
                format,
                save_graphs.as_deref(),
            )
            .await
        }
        Commands::Results {
            class,
            name,
            kind,
            setup,
            session,
            timeout,
            format,
        } => {
            cmd_results(
                &registry,
                &session,
                class,
                name.as_deref(),
                kind,
                setup.as_deref(),
                timeout.map(Duration::from_secs),
                format,
            )
            .await
        }
        Commands::Repl { session, timeout } => {
            cmd_repl(&registry, &session, timeout.map(Duration::from_secs)).await
        }
    };

    registry.close_all().await;
    outcome
}

fn resolve_installation(explicit: Option<&Path>) -> Result<Installation> {
    match explicit {
        Some(path) => Installation::from_path(path)
            .with_context(|| format!("Invalid Stata executable {}", path.display())),
        None => discover().context("Failed to locate Stata"),
    }
}

fn build_config(temp_dir: Option<PathBuf>, mode: Option<SessionMode>) -> SessionConfig {
    let mut config = SessionConfig::from_env();
    if let Some(dir) = temp_dir {
        config.scratch_base = Some(dir);
    }
    if let Some(mode) = mode {
        config.mode = mode;
    }
    config
}

async fn read_stdin() -> Result<String> {
    let mut code = String::new();
    tokio::io::stdin()
        .read_to_string(&mut code)
        .await
        .context("Failed to read code from stdin")?;
    Ok(code)
}

/// `do "<absolute path>"` for an existing `.do` file.
fn do_file_directive(path: &Path) -> Result<String> {
    let is_do = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("do"));
    if !is_do {
        bail!("File must have a .do extension: {}", path.display());
    }
    if !path.is_file() {
        bail!("File not found: {}", path.display());
    }
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    Ok(format!("do \"{}\"", absolute.display()))
}

fn exit_code(result: &ExecutionResult) -> ExitCode {
    if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[derive(Serialize)]
struct DiscoverReport<'a> {
    #[serde(flatten)]
    installation: &'a Installation,
    supports_unicode: bool,
    supports_frames: bool,
}

/// Locate and describe the installation
fn cmd_discover(explicit: Option<&Path>, format: Format) -> Result<ExitCode> {
    let installation = resolve_installation(explicit)?;
    match format {
        Format::Json => {
            let report = DiscoverReport {
                installation: &installation,
                supports_unicode: installation.supports_unicode(),
                supports_frames: installation.supports_frames(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Format::Text => {
            let yes_no = |b: bool| if b { "yes" } else { "no" };
            println!("{installation}");
            println!("  Edition: {}", installation.edition.as_str());
            match installation.version {
                Some(version) => println!("  Version: {version}"),
                None => println!("  Version: unknown"),
            }
            println!("  Unicode: {}", yes_no(installation.supports_unicode()));
            println!("  Frames:  {}", yes_no(installation.supports_frames()));
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Execute code in a session and print the result
async fn cmd_run(
    registry: &SessionRegistry,
    session_id: &str,
    code: &str,
    timeout: Option<Duration>,
    format: Format,
    save_graphs: Option<&Path>,
) -> Result<ExitCode> {
    if code.trim().is_empty() {
        bail!("No code to execute");
    }
    let result = registry
        .execute(session_id, code, timeout)
        .await
        .context("Failed to start Stata session")?;

    if let Some(dir) = save_graphs {
        copy_graphs(&result, dir)?;
    }
    print_result(&result, format)?;
    Ok(exit_code(&result))
}

fn copy_graphs(result: &ExecutionResult, dir: &Path) -> Result<()> {
    if result.graphs.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    for graph in &result.graphs {
        let Some(name) = graph.path.file_name() else {
            continue;
        };
        let target = dir.join(name);
        std::fs::copy(&graph.path, &target)
            .with_context(|| format!("Failed to copy graph to {}", target.display()))?;
        info!(graph = %target.display(), "saved graph");
    }
    Ok(())
}

fn print_result(result: &ExecutionResult, format: Format) -> Result<()> {
    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    for graph in &result.graphs {
        match (graph.width, graph.height) {
            (Some(w), Some(h)) => {
                println!("[graph] {} ({}, {w}x{h})", graph.path.display(), graph.format)
            }
            _ => println!("[graph] {} ({})", graph.path.display(), graph.format),
        }
    }
    if let Some(message) = &result.error_message {
        match result.error_code {
            Some(code) => eprintln!("--- Stata Error ---\n{message} [r({code})]"),
            None => eprintln!("--- Stata Error ---\n{message}"),
        }
    }
    Ok(())
}

/// Read stored results from a session
#[allow(clippy::too_many_arguments)]
async fn cmd_results(
    registry: &SessionRegistry,
    session_id: &str,
    class: ResultClass,
    name: Option<&str>,
    kind: ResultKind,
    setup: Option<&str>,
    timeout: Option<Duration>,
    format: Format,
) -> Result<ExitCode> {
    let timeout = timeout.unwrap_or(registry.config().default_timeout);
    let session = registry
        .get_or_create(session_id)
        .await
        .context("Failed to start Stata session")?;
    let mut guard = session.lock().await;

    if let Some(setup) = setup {
        let result = guard.execute(setup, timeout).await;
        if !result.success() {
            print_result(&result, Format::Text)?;
            bail!("Setup code failed");
        }
    }

    let mut extractor = ResultExtractor::new(&mut **guard).with_timeout(timeout);
    let Some(name) = name else {
        let all = extractor.get_all(class).await;
        match format {
            Format::Json => println!("{}", serde_json::to_string_pretty(&all)?),
            Format::Text => {
                for (key, value) in &all.scalars {
                    match value {
                        Some(value) => println!("{class}({key}) = {}", serde_json::to_string(value)?),
                        None => println!("{class}({key}) = ."),
                    }
                }
                for (key, value) in &all.macros {
                    println!("{class}({key}) : \"{value}\"");
                }
                for (key, shape) in &all.matrices {
                    println!("{class}({key}) : {} x {}", shape.rows, shape.cols);
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    };

    let value = match kind {
        ResultKind::Scalar => serde_json::to_value(extractor.get_scalar(name, class).await?)?,
        ResultKind::Macro => serde_json::to_value(extractor.get_macro(name, class).await?)?,
        ResultKind::Matrix => serde_json::to_value(extractor.get_matrix(name, class).await?)?,
    };
    let found = !value.is_null();
    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "class": class,
                "name": name,
                "value": value,
            }))?
        ),
        Format::Text => match &value {
            serde_json::Value::Null => eprintln!("{class}({name}) is not set"),
            serde_json::Value::String(text) => println!("{text}"),
            other => println!("{other}"),
        },
    }
    Ok(if found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Line-oriented loop over one session
///
/// Lines ending in `///` are joined with the next line, as in a do-file.
async fn cmd_repl(
    registry: &SessionRegistry,
    session_id: &str,
    timeout: Option<Duration>,
) -> Result<ExitCode> {
    registry
        .get_or_create(session_id)
        .await
        .context("Failed to start Stata session")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = String::new();
    eprint!(". ");
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if pending.is_empty() && matches!(line.trim(), "exit" | "quit") {
            break;
        }

        pending.push_str(&line);
        pending.push('\n');
        if line.trim_end().ends_with("///") {
            eprint!("> ");
            continue;
        }

        let code = std::mem::take(&mut pending);
        if !code.trim().is_empty() {
            let result = registry
                .execute(session_id, &code, timeout)
                .await
                .context("Failed to start Stata session")?;
            print_result(&result, Format::Text)?;
        }
        eprint!(". ");
    }
    Ok(ExitCode::SUCCESS)
}

mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Session, EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "lifeline",
    version,
    about = "Drive host-component lifecycles of a managed cluster"
)]
struct Cli {
    /// Path to the Lifeline store directory.
    #[arg(long, default_value = "~/.local/share/lifeline", global = true)]
    store: String,

    /// Path to the cluster manifest TOML file.
    #[arg(long, default_value = "lifeline.toml", global = true)]
    manifest: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Persist every host component declared in the manifest.
    Init,
    /// List host components with their current and desired state.
    List,
    /// Show one host component in detail.
    Inspect {
        /// Host component as SERVICE/COMPONENT@HOST.
        target: String,
    },
    /// Print the debug dump of the whole cluster.
    Dump,
    /// Deliver a lifecycle event to a host component.
    Event {
        /// Host component as SERVICE/COMPONENT@HOST.
        target: String,
        /// Event kind, e.g. install, op-succeeded, start, stopped.
        kind: String,
        /// Stack to install (INSTALL only), e.g. HDP-1.3.0.
        #[arg(long)]
        stack: Option<String>,
        /// Config version to start with (START only), as type=tag. Repeatable.
        #[arg(long = "config")]
        configs: Vec<String>,
        /// Operation timestamp in milliseconds; defaults to now.
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Assign the current state directly.
    SetState {
        /// Host component as SERVICE/COMPONENT@HOST.
        target: String,
        /// New state, e.g. INSTALLED.
        state: String,
        /// Skip the predecessor check.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Change the desired (target) state.
    SetDesired {
        /// Host component as SERVICE/COMPONENT@HOST.
        target: String,
        /// Desired state: INIT, INSTALLED, STARTED, UNINSTALLED or MAINTENANCE.
        state: String,
        /// Skip the desired-transition check.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Delete a host component whose state allows removal.
    Remove {
        /// Host component as SERVICE/COMPONENT@HOST.
        target: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LIFELINE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let session = Session::new(expand_tilde(&cli.store), cli.manifest);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Init => commands::init::run(&session, json_output),
        Commands::List => commands::list::run(&session, json_output),
        Commands::Inspect { target } => commands::inspect::run(&session, &target, json_output),
        Commands::Dump => commands::dump::run(&session, json_output),
        Commands::Event {
            target,
            kind,
            stack,
            configs,
            timestamp,
        } => commands::event::run(
            &session,
            &commands::event::EventArgs {
                target: &target,
                kind: &kind,
                stack: stack.as_deref(),
                configs: &configs,
                timestamp,
            },
            json_output,
        ),
        Commands::SetState {
            target,
            state,
            force,
        } => commands::set_state::run(&session, &target, &state, force, json_output),
        Commands::SetDesired {
            target,
            state,
            force,
        } => commands::set_desired::run(&session, &target, &state, force, json_output),
        Commands::Remove { target } => commands::remove::run(&session, &target, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("manifest error:") {
                EXIT_MANIFEST_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}

mod commands;
mod http;
mod push;
mod runtime;
mod ui;

use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use scriptdeck_core::backend::Backend;
use scriptdeck_core::config::{ClientConfig, ConfigOverrides};
use scriptdeck_core::log_view::LogTarget;
use scriptdeck_core::model::{ControlAction, NewScript, ScriptUpdate};

use commands::LogFormat;
use http::HttpBackend;

const LOG_FILE: &str = "scriptdeck.log";

#[derive(Parser)]
#[command(name = "scriptdeck")]
#[command(about = "Monitor and control scripts on a remote process manager", long_about = None)]
struct Cli {
    /// Backend origin, e.g. http://host:5000
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, global = true)]
    token: Option<String>,

    /// Poll only; never open the push channel
    #[arg(long, global = true)]
    no_push: bool,

    /// Status poll period in milliseconds
    #[arg(long, global = true)]
    poll_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard (default)
    Dash,
    /// Print the status table once
    Status,
    /// Print a summary line on every status change
    Watch {
        /// Also print every row
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show a script's log, or the manager log with `manager`
    Logs {
        target: String,
        /// Defaults to `log_lines` from the config
        #[arg(short = 'n', long)]
        lines: Option<usize>,
        #[arg(short, long)]
        follow: bool,
        #[arg(long)]
        no_color: bool,
        /// Print escaped HTML with style spans instead of raw escapes
        #[arg(long, conflicts_with = "no_color")]
        html: bool,
    },
    Start {
        /// Script ids, or `all`
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Stop {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    Restart {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Register a script file with the backend
    Add {
        path: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        args: Option<String>,
        #[arg(long)]
        interpreter: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        no_auto_restart: bool,
    },
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Change stored fields of one script
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        args: Option<String>,
        #[arg(long)]
        interpreter: Option<String>,
        #[arg(long)]
        auto_restart: Option<bool>,
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        max_memory_mb: Option<f64>,
    },
    /// Check configuration and backend reachability
    Doctor,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.url.clone(),
            auth_token: self.token.clone(),
            no_push: self.no_push,
            poll_interval_ms: self.poll_ms,
        }
    }
}

fn fail(err: impl Display) -> ! {
    eprintln!("Error: {}", err);
    std::process::exit(1);
}

fn load_config(overrides: &ConfigOverrides) -> Result<(Option<PathBuf>, ClientConfig), String> {
    let cwd = std::env::current_dir().map_err(|e| e.to_string())?;
    let (path, mut config) = ClientConfig::discover_or_default(&cwd).map_err(|e| e.to_string())?;
    config
        .apply_overrides(overrides)
        .map_err(|e| e.to_string())?;
    Ok((path, config))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("SCRIPTDECK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The dashboard owns the terminal, so it logs to a file or nowhere
fn init_logging(dashboard: bool, config: &ClientConfig) -> Option<WorkerGuard> {
    let filter = env_filter();
    if !dashboard {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
        return None;
    }

    let Some(dir) = config.log_dir.as_ref().filter(|d| std::fs::create_dir_all(d).is_ok()) else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
        return None;
    };
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, LOG_FILE));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}

fn http_backend(config: &ClientConfig) -> HttpBackend {
    HttpBackend::new(config).unwrap_or_else(|e| fail(e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let (config_path, config) = load_config(&cli.overrides()).unwrap_or_else(|e| fail(e));

    let command = cli.command.unwrap_or(Commands::Dash);
    let _guard = init_logging(matches!(command, Commands::Dash), &config);

    let result = match command {
        Commands::Dash => {
            let backend: Arc<dyn Backend> = Arc::new(http_backend(&config));
            return ui::run_dashboard(config, backend).await;
        }
        Commands::Doctor => match commands::run_doctor(&config, config_path.as_deref()).await {
            Ok(()) => return Ok(()),
            Err(e) => fail(e),
        },
        Commands::Watch { verbose } => {
            let backend: Arc<dyn Backend> = Arc::new(http_backend(&config));
            commands::run_watch(config, backend, verbose).await;
            Ok(())
        }
        Commands::Status => commands::run_status(&http_backend(&config)).await,
        Commands::Logs {
            target,
            lines,
            follow,
            no_color,
            html,
        } => {
            let period = follow.then(|| config.log_refresh());
            let format = match (html, no_color) {
                (true, _) => LogFormat::Html,
                (false, true) => LogFormat::Plain,
                (false, false) => LogFormat::Color,
            };
            commands::run_logs(
                &http_backend(&config),
                LogTarget::from_id(&target),
                lines.unwrap_or(config.log_lines),
                period,
                format,
            )
            .await
        }
        Commands::Start { ids } => {
            commands::run_control(&http_backend(&config), ControlAction::Start, ids).await
        }
        Commands::Stop { ids } => {
            commands::run_control(&http_backend(&config), ControlAction::Stop, ids).await
        }
        Commands::Restart { ids } => {
            commands::run_control(&http_backend(&config), ControlAction::Restart, ids).await
        }
        Commands::Add {
            path,
            name,
            args,
            interpreter,
            group,
            no_auto_restart,
        } => {
            let script = NewScript {
                path,
                name,
                args,
                interpreter,
                group,
                auto_restart: !no_auto_restart,
            };
            commands::run_add(&http_backend(&config), script).await
        }
        Commands::Remove { ids } => commands::run_remove(&http_backend(&config), ids).await,
        Commands::Update {
            id,
            name,
            group,
            args,
            interpreter,
            auto_restart,
            enabled,
            max_memory_mb,
        } => {
            let update = ScriptUpdate {
                name,
                args,
                interpreter,
                group,
                auto_restart,
                enabled,
                max_memory_mb,
            };
            commands::run_update(&http_backend(&config), id, update).await
        }
    };

    if let Err(e) = result {
        fail(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_dashboard() {
        let cli = Cli::parse_from(["scriptdeck"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_global_flags_become_overrides() {
        let cli = Cli::parse_from([
            "scriptdeck",
            "status",
            "--url",
            "http://box:5000",
            "--no-push",
            "--poll-ms",
            "1000",
        ]);
        let o = cli.overrides();
        assert_eq!(o.base_url.as_deref(), Some("http://box:5000"));
        assert!(o.no_push);
        assert_eq!(o.poll_interval_ms, Some(1000));
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn test_update_flags() {
        let cli = Cli::parse_from([
            "scriptdeck",
            "update",
            "etl",
            "--enabled",
            "false",
            "--max-memory-mb",
            "256",
        ]);
        match cli.command {
            Some(Commands::Update {
                id,
                enabled,
                max_memory_mb,
                name,
                ..
            }) => {
                assert_eq!(id, "etl");
                assert_eq!(enabled, Some(false));
                assert_eq!(max_memory_mb, Some(256.0));
                assert!(name.is_none());
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_logs_defaults() {
        let cli = Cli::parse_from(["scriptdeck", "logs", "manager"]);
        match cli.command {
            Some(Commands::Logs {
                target,
                lines,
                follow,
                no_color,
                html,
            }) => {
                assert_eq!(LogTarget::from_id(&target), LogTarget::Manager);
                assert!(lines.is_none());
                assert!(!follow);
                assert!(!no_color);
                assert!(!html);
            }
            _ => panic!("expected logs"),
        }
    }

    #[test]
    fn test_logs_html_flag() {
        let cli = Cli::parse_from(["scriptdeck", "logs", "etl", "--html", "-n", "20"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Logs { html: true, lines: Some(20), .. })
        ));
        assert!(Cli::try_parse_from(["scriptdeck", "logs", "etl", "--html", "--no-color"]).is_err());
    }

    #[test]
    fn test_control_requires_ids() {
        assert!(Cli::try_parse_from(["scriptdeck", "stop"]).is_err());
    }
}

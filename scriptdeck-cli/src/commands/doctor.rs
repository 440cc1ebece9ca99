use std::path::Path;

use scriptdeck_core::backend::{Backend, PushChannel};
use scriptdeck_core::config::ClientConfig;
use scriptdeck_core::error::ClientError;

use crate::http::HttpBackend;
use crate::push::WsPushChannel;

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub async fn run_doctor(config: &ClientConfig, config_path: Option<&Path>) -> Result<(), String> {
    println!("scriptdeck doctor\n");

    let mut checks: Vec<Check> = Vec::new();

    println!("Configuration:");
    checks.push(check_config(config_path));
    if let Some(dir) = &config.log_dir {
        checks.push(check_log_dir(dir));
    }
    for check in &checks {
        print_check(check);
    }
    println!();

    println!("Backend: {}", config.origin());
    let backend = HttpBackend::new(config).map_err(|e| e.to_string())?;
    let mut backend_checks = vec![
        check_health(&backend).await,
        check_status(&backend).await,
        check_push(config).await,
    ];
    for check in &backend_checks {
        print_check(check);
    }
    checks.append(&mut backend_checks);
    println!();

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
    if failed.is_empty() {
        println!("All checks passed!");
    } else {
        println!("Issues found:");
        for check in &failed {
            println!("  - {}: {}", check.name, check.message);
            if let Some(hint) = &check.hint {
                println!("    Hint: {}", hint);
            }
        }
    }

    Ok(())
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!("  {}{}{} {}: {}", color, icon, reset, check.name, check.message);

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

fn check_config(path: Option<&Path>) -> Check {
    match path {
        Some(path) => Check::ok("config", path.display().to_string()),
        None => Check::ok("config", "none found, using defaults")
            .with_hint("Create scriptdeck.yaml or set SCRIPTDECK_CONFIG"),
    }
}

fn check_log_dir(dir: &Path) -> Check {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Check::ok("log_dir", dir.display().to_string()),
        Err(e) => Check::fail("log_dir", format!("{}: {}", dir.display(), e)),
    }
}

async fn check_health(backend: &HttpBackend) -> Check {
    match backend.health().await {
        Ok(health) => {
            let version = health
                .version
                .map(|v| format!(" (v{})", v))
                .unwrap_or_default();
            Check::ok("health", format!("{}{}", health.status, version))
        }
        Err(err) => Check::fail("health", err.to_string())
            .with_hint("Is the process manager running? Check base_url or pass --url"),
    }
}

async fn check_status(backend: &HttpBackend) -> Check {
    match backend.fetch_status().await {
        Ok(entries) => {
            let running = entries.iter().filter(|s| s.is_running()).count();
            Check::ok(
                "status",
                format!("{} scripts, {} running", entries.len(), running),
            )
        }
        Err(ClientError::Unauthorized) => Check::fail("status", "unauthorized")
            .with_hint("Set auth_token in the config or pass --token"),
        Err(err) => Check::fail("status", err.to_string()),
    }
}

async fn check_push(config: &ClientConfig) -> Check {
    if !config.push.enabled {
        return Check::ok("push", "disabled, polling only");
    }
    let mut channel = match WsPushChannel::new(config) {
        Ok(channel) => channel,
        Err(err) => return Check::fail("push", err.to_string()),
    };
    let url = channel.url().to_string();
    let result = channel.connect().await;
    channel.close().await;
    match result {
        Ok(()) => Check::ok("push", url),
        Err(err) => Check::fail("push", format!("{}: {}", url, err))
            .with_hint("Live updates will fall back to polling; set push.enabled: false to skip"),
    }
}

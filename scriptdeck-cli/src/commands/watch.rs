//! `scriptdeck watch` - print a summary on every status change

use std::sync::Arc;

use chrono::{Local, Utc};

use scriptdeck_core::backend::Backend;
use scriptdeck_core::config::ClientConfig;
use scriptdeck_core::model::SnapshotSource;

use super::status::{format_aggregates, format_row};
use crate::runtime::Runtime;

pub async fn run_watch(config: ClientConfig, backend: Arc<dyn Backend>, verbose: bool) {
    let mut runtime = Runtime::start(config, backend);

    runtime.session.reconciler.subscribe(move |change| {
        let source = match change.source {
            SnapshotSource::Push => "push",
            SnapshotSource::Poll => "poll",
        };
        println!(
            "[{}] ({}) {}",
            Local::now().format("%H:%M:%S"),
            source,
            format_aggregates(change.aggregates)
        );
        if verbose {
            let now = Utc::now();
            for entry in change.map.values() {
                println!("    {}", format_row(entry, now));
            }
        }
    });

    println!("Watching {} (Ctrl+C to stop)\n", runtime.config().origin());
    let mut connection = runtime.session.connection_state();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            env = runtime.recv() => {
                let Some(env) = env else { break };
                runtime.handle(env);
                let now = runtime.session.connection_state();
                if now != connection {
                    println!("[{}] connection: {}", Local::now().format("%H:%M:%S"), now);
                    connection = now;
                }
            }
        }
    }

    runtime.shutdown();
}

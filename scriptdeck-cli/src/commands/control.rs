//! Lifecycle and inventory commands: start/stop/restart, add, remove, update

use scriptdeck_core::backend::Backend;
use scriptdeck_core::error::{ClientError, ErrorKind};
use scriptdeck_core::model::{ControlAction, NewScript, ScriptId, ScriptUpdate};

use crate::runtime::Request;

fn report(request: &Request, result: &Result<(), ClientError>) {
    let label = request.action().describe();
    match result {
        Ok(()) => println!("  \x1b[32m✓\x1b[0m {}", label),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            println!("  \x1b[33m?\x1b[0m {}: {}", label, err);
            println!("    └─ run `scriptdeck status` to list current scripts");
        }
        Err(err) => println!("  \x1b[31m✗\x1b[0m {}: {}", label, err),
    }
}

/// Send requests one by one; the first failure is returned after all ran
async fn send_all(backend: &dyn Backend, requests: Vec<Request>) -> Result<(), ClientError> {
    let mut first_err = None;
    for request in requests {
        let result = request.send(backend).await;
        report(&request, &result);
        if let Err(err) = result {
            first_err.get_or_insert(err);
        }
    }
    first_err.map_or(Ok(()), Err)
}

pub async fn run_control(
    backend: &dyn Backend,
    action: ControlAction,
    ids: Vec<ScriptId>,
) -> Result<(), ClientError> {
    let all = ids.iter().any(|id| id == "all");
    let requests = match (all, action) {
        (true, ControlAction::Start) => vec![Request::StartAll],
        (true, ControlAction::Stop) => vec![Request::StopAll],
        (true, ControlAction::Restart) => backend
            .fetch_status()
            .await?
            .into_iter()
            .map(|s| Request::Control { id: s.id, action })
            .collect(),
        (false, _) => ids
            .into_iter()
            .map(|id| Request::Control { id, action })
            .collect(),
    };

    if requests.is_empty() {
        println!("No scripts to {}.", action);
        return Ok(());
    }
    send_all(backend, requests).await
}

pub async fn run_add(backend: &dyn Backend, script: NewScript) -> Result<(), ClientError> {
    send_all(backend, vec![Request::Add(script)]).await
}

pub async fn run_remove(backend: &dyn Backend, ids: Vec<ScriptId>) -> Result<(), ClientError> {
    send_all(backend, ids.into_iter().map(Request::Remove).collect()).await
}

pub async fn run_update(
    backend: &dyn Backend,
    id: ScriptId,
    update: ScriptUpdate,
) -> Result<(), ClientError> {
    if update.is_empty() {
        println!("Nothing to update; pass at least one field flag.");
        return Ok(());
    }
    send_all(backend, vec![Request::Update(id, update)]).await
}

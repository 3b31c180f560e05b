use crate::{
    config,
    errors::{AppError, Result},
    injector::ensure_tmux,
    plugin,
    state::StateStore,
};

pub async fn execute() -> Result<()> {
    let config = config::load()?;
    if !config.is_configured() {
        return Err(AppError::NotConfigured);
    }

    println!("✅ Configured");
    println!("✅ Telegram credentials present");

    if plugin::hooks_installed()? {
        println!("✅ Hooks installed");
    } else {
        println!("⚠️ Hooks not installed (run `codebridge init`)");
    }

    if ensure_tmux().await.is_ok() {
        println!("✅ tmux available");
    } else {
        println!("⚠️ tmux not available");
    }

    let store = StateStore::new(config.state_dir());
    println!("State directory: {}", store.root().display());
    if store.bridge_running() {
        println!("✅ Bridge running");
    } else {
        println!("⚠️ Bridge not running (start it with `codebridge bridge`)");
    }

    let plan_mode = if store.plan_mode()? { "ON" } else { "OFF" };
    println!("Plan mode: {plan_mode}");

    match store.indicator()? {
        Some(message_id) => println!("Thinking indicator: message {message_id}"),
        None => println!("Thinking indicator: none"),
    }

    let pending = store.pending_requests()?;
    if pending.is_empty() {
        println!("Pending approvals: none");
    } else {
        println!("Pending approvals: {}", pending.len());
        for request in pending {
            println!("  {}  {}", request.request_id, request.tool_name);
        }
    }

    Ok(())
}

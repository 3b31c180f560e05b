use std::{
    io::{self, Write},
    time::Duration,
};

use tracing::info;

use crate::{config, errors::Result, plugin, telegram::TelegramClient};

const PAIRING_WAIT: Duration = Duration::from_secs(120);

pub async fn execute() -> Result<()> {
    let mut config = config::load().unwrap_or_default();

    print!("Telegram bot token (from BotFather): ");
    io::stdout().flush()?;
    let mut token = String::new();
    io::stdin().read_line(&mut token)?;
    let token = token.trim().to_string();

    let client = TelegramClient::new(
        &config.telegram_api_base,
        &token,
        config.outbound_per_second,
    );
    let username = client.get_me().await?;
    println!("Bot verified: @{username}");
    println!(
        "Send /start to @{username} now. Waiting up to {} seconds...",
        PAIRING_WAIT.as_secs()
    );

    let chat_id = client.wait_for_start_chat(PAIRING_WAIT).await?;
    println!("Paired chat_id: {chat_id}");

    config.telegram_bot_token = Some(token);
    config.telegram_chat_id = Some(chat_id);
    config::save(&config)?;

    let binary_path = std::env::current_exe()?;
    plugin::install_hooks(&binary_path, config.timeout_seconds)?;

    info!("init completed");
    print_init_summary(&config);
    Ok(())
}

fn print_init_summary(config: &config::Config) {
    println!("Paired ✅");
    println!("Hooks installed ✅");
    println!("Start the bridge inside tmux with `codebridge bridge` ✅");
    println!("State directory: {}", config.state_dir().display());
    println!(
        "Config saved at {}",
        config::config_path()
            .map(|v| v.display().to_string())
            .unwrap_or_else(|_| "<unknown>".to_string())
    );
}

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::Parser;
use client_core::{
    config::DEFAULT_SETTINGS_FILE, load_settings_from, FileIdentityStore, HttpSnapshotLoader,
    IdentityStore, SyncEngine,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

use commands::{parse_command, Command, HELP};
use render::{format_notification, render_view};

#[derive(Parser, Debug)]
struct Args {
    /// Name to edit as. Falls back to the one remembered from the last session.
    #[arg(long)]
    username: Option<String>,
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let settings = load_settings_from(&args.config, |key| std::env::var(key).ok())?;
    let identity = Arc::new(FileIdentityStore::new(settings.identity_path.clone()));
    let username = match args.username {
        Some(username) => username,
        None => identity
            .load()?
            .ok_or_else(|| anyhow!("no remembered username, pass --username"))?,
    };
    info!(server = %settings.server_address, %username, "starting grid client");

    let (notify_tx, mut notifications) = mpsc::unbounded_channel();
    let snapshot = Arc::new(HttpSnapshotLoader::new(settings.snapshot_timeout));
    let engine = SyncEngine::start_with_dependencies(
        settings,
        &username,
        snapshot,
        Arc::new(notify_tx),
        identity,
    )?;
    let mut view = engine.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => println!("{HELP}"),
                    Ok(Some(Command::Show)) => print!("{}", render_view(&engine.view())),
                    Ok(Some(Command::Select(position))) => engine.select(position).await?,
                    Ok(Some(Command::Edit(value))) => engine.edit(value).await?,
                    Ok(Some(Command::Set(position, value))) => {
                        engine.submit_edit(position, value).await?
                    }
                    Err(err) => eprintln!("{err:#}"),
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = view.borrow_and_update().clone();
                print!("{}", render_view(&current));
            }
            Some(notification) = notifications.recv() => {
                println!("{}", format_notification(&notification));
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

mod cli;
mod commands;
mod config;
mod exchange;
mod form;
mod links;
mod list;
mod logging;
mod model;
mod storage;
mod tags;
mod ui;

use anyhow::Result;
use clap::Parser;
use tracing::info;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config = config::Config::load(args.config.as_deref())?;
    let store_path =
        config.resolve_store_path(args.store.as_deref(), std::env::var_os(config::STORE_ENV))?;
    logging::init_tracing(
        &config.resolve_log_path(&store_path),
        config.log_level.as_deref(),
        args.verbose,
    )?;
    info!(store = %store_path.display(), "starting groovelog");

    let mut store = storage::RecordStore::new(storage::FileStore::open(&store_path)?);
    let command = args.command.unwrap_or(cli::Command::Tui);
    match command {
        cli::Command::List { filter } => commands::list(&store, filter),
        cli::Command::Add {
            title,
            artist,
            note,
            tags,
            links,
        } => commands::add(&mut store, title, artist, note, tags, links),
        cli::Command::Edit {
            id,
            title,
            artist,
            note,
            tags,
            clear_tags,
            links,
            clear_links,
        } => commands::edit(
            &mut store, id, title, artist, note, tags, clear_tags, links, clear_links,
        ),
        cli::Command::Progress { id, level } => commands::progress(&mut store, id, level),
        cli::Command::Delete { id, yes } => commands::delete(&mut store, id, yes),
        cli::Command::Sort => commands::sort(&mut store),
        cli::Command::Tags => commands::tags(&store),
        cli::Command::Tag { tag, clear } => commands::tag(&mut store, tag, clear),
        cli::Command::Incomplete { state } => {
            commands::incomplete(&mut store, state == cli::Toggle::On)
        }
        cli::Command::Goal { text, clear, yes } => commands::goal(&mut store, text, clear, yes),
        cli::Command::Export { out } => commands::export(&store, &config, out),
        cli::Command::Import { file } => commands::import(&mut store, &file),
        cli::Command::Tui => commands::tui(store, config),
    }
}

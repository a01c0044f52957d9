//! `flagdeck` - serve a slide deck whose sections follow feature flags.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, Notify};
use tracing::info;

use flagdeck::cli::{Cli, Command, ConfigCommand, DeckCommand, ServeCommand};
use flagdeck::store::Backends;
use flagdeck::{init_logging, load_deck, Config, HttpServer, Presentation, UserContext};

/// Requests buffered between the accept thread and the session.
const REQUEST_QUEUE: usize = 64;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Serve(serve) => handle_serve(config, &serve),
        Command::Deck(DeckCommand::Sections { file, json }) => {
            handle_sections(&config, file, json)
        }
        Command::Flags(flags) => handle_flags(&config, flags.json),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

fn handle_serve(mut config: Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    if let Some(deck) = &cmd.deck {
        config.deck.path.clone_from(deck);
    }

    let doc = load_deck(&config.deck.path)
        .with_context(|| format!("loading deck {}", config.deck.path.display()))?;
    let backends = Backends::from_config(&config).context("building flag backends")?;
    let server = HttpServer::bind(&config.bind_addr())?;
    let port = server.port().unwrap_or(config.server.port);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    runtime.block_on(async move {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        let accept = server.spawn_accept(tx);
        let handle = server.handle();

        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.notify_one();
            }
        });

        info!(port, "Presentation available at http://localhost:{port}");
        info!(port, "Health check available at http://localhost:{port}/health");

        let presentation = Presentation::new(config, doc);
        let result = presentation
            .run(UserContext::presenter(), backends, rx, shutdown)
            .await;

        handle.unblock();
        let _ = tokio::task::spawn_blocking(move || accept.join()).await;
        info!("Server stopped");
        result.map_err(anyhow::Error::from)
    })
}

fn handle_sections(config: &Config, file: Option<std::path::PathBuf>, json: bool) -> anyhow::Result<()> {
    let path = file.unwrap_or_else(|| config.deck.path.clone());
    let doc = load_deck(&path).with_context(|| format!("loading deck {}", path.display()))?;
    let flags = config.flag_set();

    let mut sections: Vec<serde_json::Value> = Vec::new();
    for id in doc.tagged_slides() {
        let Some(slide) = doc.slide(id) else { continue };
        let section = slide.section.clone().unwrap_or_default();
        sections.push(serde_json::json!({
            "section": section,
            "flag": flags.for_section(&section).map(|def| def.key.clone()),
            "title": slide.title().unwrap_or("No title"),
        }));
    }
    let anchor = doc
        .find_top_level_by_heading(2, &config.deck.anchor_heading)
        .is_some();

    if json {
        let report = serde_json::json!({ "anchor_found": anchor, "slides": sections });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Deck: {}", path.display());
    println!(
        "Anchor \"{}\": {}",
        config.deck.anchor_heading,
        if anchor { "found" } else { "missing" }
    );
    println!();
    println!("{:<20} {:<28} TITLE", "SECTION", "FLAG");
    for entry in &sections {
        println!(
            "{:<20} {:<28} {}",
            entry["section"].as_str().unwrap_or(""),
            entry["flag"].as_str().unwrap_or("(none)"),
            entry["title"].as_str().unwrap_or("")
        );
    }
    Ok(())
}

fn handle_flags(config: &Config, json: bool) -> anyhow::Result<()> {
    let flags = config.flag_set();
    if json {
        println!("{}", serde_json::to_string_pretty(&config.flags)?);
        return Ok(());
    }
    println!("{:<28} {:<20} {:<18} HOTKEY", "FLAG", "NAME", "SECTION");
    for def in flags.iter() {
        let hotkey = def
            .hotkey
            .and_then(char::from_u32)
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        println!(
            "{:<28} {:<20} {:<18} {}",
            def.key,
            def.name,
            flags.section_of(&def.key),
            hotkey
        );
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Address:            {}", config.bind_addr());
                println!("  Public dir:         {}", config.server.public_dir.display());
                println!("  reveal.js dir:      {}", config.server.reveal_dir.display());
                println!();
                println!("[Deck]");
                println!("  Path:               {}", config.deck.path.display());
                println!("  Anchor heading:     {}", config.deck.anchor_heading);
                println!("  Section suffix:     {}", config.deck.section_suffix);
                println!();
                println!("[Backend]");
                println!(
                    "  Client-side id:     {}",
                    if config.has_client_side_id() { "set" } else { "(none, polling)" }
                );
                println!("  Environment:        {}", config.backend.environment);
                println!("  Init timeout (ms):  {}", config.backend.init_timeout_ms);
                println!();
                println!("[Polling]");
                println!("  Interval (ms):      {}", config.polling.interval_ms);
                match (&config.polling.url, &config.polling.file) {
                    (Some(url), _) => println!("  Source:             {url}"),
                    (None, Some(file)) => println!("  Source:             {}", file.display()),
                    (None, None) => println!("  Source:             (none)"),
                }
                println!();
                println!("[Flags]");
                println!("  Declared:           {}", config.flags.len());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

mod terminal_view;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use nav_core::{
    config::load_settings_from, DataMode, MemoryPositionStore, Navigator, TransitionOutcome,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use view_controllers::{ViewController, ViewOptions};

use crate::terminal_view::TerminalView;

/// Replays positions through a navigator with terminal views and prints
/// each route change.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = nav_core::config::SETTINGS_FILE)]
    config: PathBuf,
    /// Overrides the configured data mode.
    #[arg(long)]
    data_mode: Option<DataMode>,
    /// Extra routes bound to terminal views.
    #[arg(long = "route")]
    routes: Vec<String>,
    /// Positions to visit in order; `back` goes one entry back.
    positions: Vec<String>,
}

const DEMO_ROUTES: [&str; 3] = ["home", "customers", "customers/detail"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut options = load_settings_from(&args.config, |key| std::env::var(key).ok()).options()?;
    if let Some(mode) = args.data_mode {
        options.data_mode = mode;
    }
    info!(data_mode = %options.data_mode, "shell: starting");

    let store = MemoryPositionStore::new();
    let navigator = Navigator::with_options(store.clone(), options);
    for route in DEMO_ROUTES.iter().copied().chain(args.routes.iter().map(String::as_str)) {
        let view = TerminalView::new(route);
        let controller = Arc::new(ViewController::new(view, ViewOptions::new(route)));
        navigator.register_controller(controller);
    }

    while navigator.registry().pending_inits() > 0 {
        tokio::task::yield_now().await;
    }
    info!(controllers = navigator.registry().len(), "shell: controllers ready");

    for position in &args.positions {
        if position == "back" {
            if !store.back() {
                println!("already at the first position");
                continue;
            }
        } else {
            store.push_external(position);
        }
        match navigator.on_navigate().await {
            Ok(TransitionOutcome::Completed(change)) => {
                println!("{}", serde_json::to_string_pretty(&change)?);
            }
            Ok(other) => println!("{} -> {other:?}", navigator.position()),
            Err(err) => println!("{} -> error: {err}", navigator.position()),
        }
    }
    Ok(())
}

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use imgpick::output::load_output;
use imgpick::prompt::extract_prompt;
use imgpick::{
    event_channel, FileService, FolderWatcher, ImageFolderPicker, LocalFileService, LoggingHost,
    PickerConfig, SessionStore, TokioDispatcher,
};

const DEFAULT_NODE_ID: &str = "default";

fn usage() -> ! {
    eprintln!("usage: imgpick <folder> [node-id]");
    eprintln!("       imgpick --browse [path]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imgpick=info".parse().context("Invalid log directive")?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(folder) = args.next() else {
        usage();
    };

    let config = PickerConfig::load();
    let (events_tx, events_rx) = event_channel();
    let watcher = FolderWatcher::new(events_tx.clone(), config.watch_settings())?;
    let service = Arc::new(LocalFileService::new(watcher, config.dimension_cache_entries));

    if folder == "--browse" {
        let path = args.next().unwrap_or_default();
        let listing = service.browse(&path).await?;
        println!("{} ({} images)", listing.current, listing.image_count);
        for entry in &listing.folders {
            println!("  {}", entry.path);
        }
        return Ok(());
    }

    let node_id = args.next().unwrap_or_else(|| DEFAULT_NODE_ID.to_string());
    let mut store = SessionStore::open_default()?;
    let dispatch = TokioDispatcher::new(service, events_tx);

    let mut picker = ImageFolderPicker::new(config, dispatch, LoggingHost);
    picker.bind_default_folder(0, &folder);
    if let Some(snapshot) = store.load_snapshot(&node_id)? {
        picker.restore(&snapshot);
    }
    picker.start();
    info!(%folder, %node_id, "Picker running, Ctrl-C to exit");

    loop {
        tokio::select! {
            event = events_rx.recv_async() => {
                let Ok(event) = event else { break };
                picker.handle_event(event);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some((folder, filename)) = picker.chosen(picker.active_source()) {
        match load_output(folder, filename) {
            Ok(output) => info!(
                path = %output.image_path,
                width = output.image.width(),
                height = output.image.height(),
                images = output.image_count,
                "Chosen image"
            ),
            Err(e) => warn!(error = %e, "Chosen image unavailable"),
        }
        let path = std::path::Path::new(folder).join(filename);
        match extract_prompt(&path.to_string_lossy()) {
            Ok(prompt) => {
                for line in prompt.display_lines() {
                    info!(%line, "Chosen image prompt");
                }
            }
            Err(e) => debug!(error = %e, "No prompt for chosen image"),
        }
    }

    store.save_snapshot(&node_id, &picker.snapshot())?;
    info!(%node_id, "Saved session");
    Ok(())
}

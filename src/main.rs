//! Extension Config CLI
//!
//! Reads, writes and watches a file-backed extension configuration store.

use anyhow::{Result, bail};
use clap::Parser;
use extension_config::cli::{Cli, Command};
use extension_config::config::{ConfigStore, Settings, SettingsLoader, Teardown};
use extension_config::error::{ErrorReport, StoreError};
use extension_config::format::{self, OutputFormat};
use extension_config::logging::{self, LogTarget};
use extension_config::storage::{self, FileStorage, StorageBackend};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output_format = cli.format;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, output_format);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut loader = SettingsLoader::load(cli.settings.as_deref())?;
    if let Some(path) = loader.source_path() {
        info!("Using settings file {}", path.display());
    }

    // Command-line flags are the highest tier
    let overrides = loader.settings_mut();
    if let Some(dir) = cli.dir {
        overrides.storage.dir = Some(dir);
    }
    if let Some(namespace) = cli.namespace {
        overrides.storage.namespace = namespace;
    }
    let settings = loader.into_settings();

    let file_storage = open_storage(&settings)?;
    let backend: Arc<dyn StorageBackend> = file_storage.clone();
    let store = ConfigStore::new(backend, settings.store_defaults());

    match cli.command {
        Command::Get { key } => run_get(&store, key.as_deref(), cli.format).await?,
        Command::Set { key, value } => run_set(&store, &key, &value).await?,
        Command::Defaults => {
            println!(
                "{}",
                format::render_configuration(store.defaults(), cli.format)?
            );
        }
        Command::Watch { no_external } => {
            let external = settings.watch.external && !no_external;
            run_watch(&store, &file_storage, &settings, external, cli.format).await?;
        }
        Command::Path => {
            println!("{}", file_storage.path().display());
        }
    }

    Ok(())
}

/// Open the file backend in the first available storage directory.
fn open_storage(settings: &Settings) -> Result<Arc<FileStorage>> {
    let namespace = &settings.storage.namespace;
    let candidates = settings
        .storage_dir_candidates()
        .into_iter()
        .map(|dir| {
            dir.map(|d| FileStorage::open(d, namespace).map(Arc::new))
                .transpose()
        })
        .collect::<std::result::Result<Vec<_>, StoreError>>()?;

    let selected = storage::select_backend(candidates)?;
    debug!(backend = %selected.name(), "Selected storage backend");
    Ok(selected)
}

/// Run the get command
async fn run_get(store: &ConfigStore, key: Option<&str>, output: OutputFormat) -> Result<()> {
    let config = store.read_config().await?;
    let rendered = match key {
        None => format::render_configuration(&config, output)?,
        Some(key) => match config.get(key) {
            Some(value) => format::render_value(value, output)?,
            None => bail!("key '{}' is not set", key),
        },
    };
    println!("{}", rendered);
    Ok(())
}

/// Run the set command
async fn run_set(store: &ConfigStore, key: &str, raw_value: &str) -> Result<()> {
    let value = format::parse_cli_value(raw_value);
    store.set_config(key, value.clone()).await?;
    info!(key = %key, value = %value, "Configuration updated");
    Ok(())
}

/// Run the watch command: print the configuration on every rebuild.
async fn run_watch(
    store: &ConfigStore,
    file_storage: &FileStorage,
    settings: &Settings,
    external: bool,
    output: OutputFormat,
) -> Result<()> {
    // Keep the guard alive for as long as we watch
    let _guard = if external {
        match file_storage.watch_external(&settings.watch.watcher_config()) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(
                    "Failed to watch storage file: {}. \
                     Only changes made by this process will be reported.",
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let handle = store
        .configure(move |config| {
            let rendered = format::render_configuration(&config, output);
            async move {
                match rendered {
                    Ok(text) => println!("{}", text),
                    Err(e) => warn!("Failed to render configuration: {}", e),
                }
                Teardown::from_fn(|| debug!("Configuration handler released"))
            }
        })
        .await?;

    info!(
        "Watching {}; press Ctrl-C to stop",
        file_storage.path().display()
    );
    tokio::signal::ctrl_c().await?;
    info!(rebuilds = handle.generation(), "Stopped watching");
    Ok(())
}

fn report_error(err: &anyhow::Error, output: OutputFormat) {
    if output == OutputFormat::Json
        && let Some(store_err) = err.downcast_ref::<StoreError>()
        && let Ok(json) = serde_json::to_string(&ErrorReport::from(store_err))
    {
        eprintln!("{}", json);
        return;
    }
    eprintln!("Error: {:#}", err);
}

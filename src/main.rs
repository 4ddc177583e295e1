use std::{fs, io::ErrorKind, path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::eyre::{bail, Result, WrapErr};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::info;

use pagewise::{
    bind_to_lifecycle,
    infrastructure::{cli::Cli, config::Settings, memory_source::MemorySource},
    utils::{initialize_logging, initialize_panic_handler},
    Lifecycle, LoadState, LoadStates, Pager, PagingItems, SnapshotStreamExt, StateKeeper,
};

const STATE_KEY: &str = "numbers";
const WAIT_LIMIT: Duration = Duration::from_secs(30);

fn load_keeper(path: &Path) -> Result<StateKeeper> {
    match fs::read_to_string(path) {
        Ok(json) => {
            info!("Restoring state from {}", path.display());
            StateKeeper::from_json(&json)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(StateKeeper::new()),
        Err(e) => Err(e).wrap_err_with(|| format!("Failed to read {}", path.display())),
    }
}

fn save_keeper(keeper: &StateKeeper, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, keeper.save()?)
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    info!("Saved state to {}", path.display());
    Ok(())
}

fn describe(states: &LoadStates) -> String {
    format!(
        "prepend={:?} append={:?} refresh={:?}",
        states.prepend, states.append, states.refresh
    )
}

/// Scroll forward through `count` items, retrying whenever a load fails
async fn scroll(items: &PagingItems<u64, String>, count: usize) -> Result<usize> {
    let mut index = 0;
    while index < count {
        let ready = timeout(
            WAIT_LIMIT,
            items.wait_until(|items| {
                let states = items.load_states();
                items.size() > index
                    || states.has_error()
                    || (states.refresh.is_complete() && states.append.is_complete())
            }),
        )
        .await;
        if ready.is_err() {
            bail!("Timed out waiting for item {index}");
        }

        let states = items.load_states();
        if states.has_error() {
            println!("        load failed ({}), retrying", describe(&states));
            items.retry()?;
            // Wait for the retry to leave the error state before looking again
            timeout(WAIT_LIMIT, items.wait_until(|items| !items.load_states().has_error()))
                .await
                .wrap_err("Timed out waiting for the retry")?;
            continue;
        }
        match items.get(index) {
            Some(item) => {
                println!("{index:>6}  {item}");
                index += 1;
            }
            None if states.append == LoadState::Complete => {
                println!("        end of list");
                break;
            }
            None => {}
        }
    }
    Ok(index)
}

async fn tokio_main() -> Result<()> {
    initialize_logging()?;

    initialize_panic_handler()?;

    let args = <Cli as Parser>::parse();

    let settings = Settings::new()?.merge_cli(&args);
    let config = settings.paging_config()?;
    let state_file = settings.state_file();
    info!(?config, source = ?settings.source, "Starting");

    let keeper = load_keeper(&state_file)?;
    let source = MemorySource::from_settings(&settings.source, config.page_size as u64);
    let mut pager = Pager::new(config, settings.source.start_page, Arc::new(source));
    if let Some(state) = keeper.consume_paging_state(STATE_KEY)? {
        println!("Resuming {} saved pages", state.pages.len());
        pager = pager.with_initial_state(state);
    }

    let scope = CancellationToken::new();
    let cache = pager.cached_in(&scope);
    keeper.register_paging_state(STATE_KEY, &cache);

    let display = cache
        .subscribe()
        .into_stream()
        .map_items(|n| format!("item #{n}"))
        .cached_in(&scope);
    let lifecycle = Lifecycle::new();
    let (items, binding) = bind_to_lifecycle(&display, &lifecycle, true)?;
    lifecycle.resume();

    let scrolled = scroll(&items, args.scroll).await?;
    println!(
        "Scrolled through {scrolled} of {} loaded items ({})",
        items.size(),
        describe(&items.load_states())
    );

    lifecycle.pause();
    save_keeper(&keeper, &state_file)?;
    lifecycle.destroy();
    binding.await?;
    scope.cancel();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = tokio_main().await {
        eprintln!("{} error: Something went wrong", env!("CARGO_PKG_NAME"));
        Err(e)
    } else {
        Ok(())
    }
}

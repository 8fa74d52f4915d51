use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatplays::config as cfg;
use chatplays::dispatch::{Dispatcher, DispatcherSettings, ProfileWatcher, control};
use chatplays::executor::{DryRunInjector, EnigoInjector, InputInjector};
use chatplays::sources::{FeedState, StdinSource};

/// How long shutdown waits for running sequences to release held input.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Chatplays CLI
#[derive(Debug, Parser)]
#[command(
    name = chatplays::PKG_NAME,
    version = chatplays::PKG_VERSION,
    about = "Turn live chat messages into keyboard and mouse input"
)]
struct Args {
    /// Path to the JSON profile to load at start
    #[arg(short = 'p', long = "profile")]
    profile: Option<PathBuf>,

    /// Twitch channel to read chat from
    #[arg(short = 'c', long = "channel", conflicts_with = "stdin")]
    channel: Option<String>,

    /// Read chat lines ("sender: text") from standard input instead of Twitch
    #[arg(long = "stdin")]
    stdin: bool,

    /// Enable dry-run mode (log input events instead of simulating them)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Maximum number of action sequences running at once
    #[arg(
        long = "max-sequences",
        default_value_t = DispatcherSettings::default().max_concurrent_sequences,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..=100_000)
    )]
    max_sequences: usize,

    /// Reload the profile whenever its file changes
    #[arg(long = "watch", requires = "profile")]
    watch: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for profiles and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_schema {
        cfg::write_schema_to_writer(std::io::stdout().lock())?;
        println!();
        return Ok(());
    }

    chatplays::init_tracing(args.log_level.as_deref());
    info!(
        version = chatplays::PKG_VERSION,
        profile = ?args.profile,
        dry_run = args.dry_run,
        "Starting Chatplays"
    );

    let injector: Arc<dyn InputInjector> = if args.dry_run {
        Arc::new(DryRunInjector)
    } else {
        Arc::new(EnigoInjector::spawn().context("failed to start the input injector")?)
    };

    let settings = DispatcherSettings {
        max_concurrent_sequences: args.max_sequences,
        ..DispatcherSettings::default()
    };
    let (dispatcher, intake) = Dispatcher::new(settings, injector);

    if let Some(path) = &args.profile {
        let count = dispatcher
            .load_profile(path)
            .await
            .with_context(|| format!("failed to load profile {}", path.display()))?;
        debug!(commands = count, "Profile loaded successfully");
    } else {
        warn!("No profile given; no command will fire until one is loaded.");
    }

    let shutdown = CancellationToken::new();
    let _watcher = match (&args.profile, args.watch) {
        (Some(path), true) => Some(ProfileWatcher::spawn(
            dispatcher.clone(),
            path.clone(),
            shutdown.clone(),
        )?),
        _ => None,
    };

    if let Some(channel) = &args.channel {
        dispatcher.connect(channel)?;
    } else if args.stdin {
        dispatcher.connect_source(&StdinSource::new());
    } else {
        warn!("No chat feed configured (use --channel or --stdin). Waiting for Ctrl+C.");
    }

    // Operator controls: the terminal when it is not the chat feed, and signals.
    if !args.stdin {
        control::spawn_console(dispatcher.clone(), shutdown.clone());
    }
    #[cfg(unix)]
    control::spawn_signal_controls(dispatcher.clone(), shutdown.clone())
        .context("failed to install signal handlers")?;

    let runner = {
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(intake, shutdown).await })
    };

    // Main wait: Ctrl+C, the operator's `stop`, or the end of stdin when
    // reading a local feed.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = shutdown.cancelled() => {}
        _ = stdin_finished(&dispatcher), if args.stdin => {
            info!("Standard input closed, shutting down");
        }
    }

    shutdown.cancel();
    runner.await.context("dispatcher task panicked")?;
    dispatcher.drain(SHUTDOWN_GRACE).await;
    info!(stats = ?dispatcher.stats(), "Chatplays exited");
    Ok(())
}

/// Resolves once the stdin feed has ended and every queued message and running
/// sequence is done.
async fn stdin_finished(dispatcher: &Dispatcher) {
    let mut state = dispatcher.subscribe_feed_state();
    let mut seen_listening = *state.borrow() == FeedState::Listening;
    loop {
        if seen_listening && *state.borrow() == FeedState::Disconnected {
            break;
        }
        if state.changed().await.is_err() {
            break;
        }
        seen_listening |= *state.borrow() == FeedState::Listening;
    }
    while dispatcher.pending_messages() > 0 || dispatcher.active_sequences() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

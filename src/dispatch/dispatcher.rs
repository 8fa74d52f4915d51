use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{self, Action};
use crate::error::{
    DuplicateAliasWarning, FeedError, LoadError, RuleSetError, SaveError,
};
use crate::executor::{ActionSequencer, InputInjector};
use crate::matching::match_message;
use crate::rules::{CommandId, RuleSet, RuleStore};
use crate::sources::{ChatMessage, FeedLink, FeedSource, FeedState, TwitchSource};

/// How often [`Dispatcher::drain`] checks for running sequences.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Tunables for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Cap on simultaneously running action sequences; matches beyond it are
    /// dropped. Values above `Semaphore::MAX_PERMITS` are clamped.
    pub max_concurrent_sequences: usize,
    /// Capacity of the channel between feeds and the dispatch loop.
    pub intake_capacity: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sequences: 100,
            intake_capacity: 256,
        }
    }
}

/// Whether messages currently produce input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Listening,
    Disabled,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub received: u64,
    pub ignored_while_disabled: u64,
    pub matched: u64,
    pub started: u64,
    pub dropped: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    ignored_while_disabled: AtomicU64,
    matched: AtomicU64,
    started: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            ignored_while_disabled: self.ignored_while_disabled.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Receiving end of the dispatcher's message intake; consumed by [`Dispatcher::run`].
pub struct MessageIntake(mpsc::Receiver<ChatMessage>);

struct ActiveFeed {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    rules: RuleStore,
    disabled: AtomicBool,
    sequencer: ActionSequencer,
    permits: Arc<Semaphore>,
    max_sequences: usize,
    counters: Counters,
    intake: mpsc::Sender<ChatMessage>,
    feed: Mutex<Option<ActiveFeed>>,
    feed_state: Arc<watch::Sender<FeedState>>,
}

/// Owns the live rule set and turns chat messages into action sequences.
///
/// The dispatcher never waits for a sequence: every fired command runs on
/// its own task, bounded by a semaphore. When the cap is reached the surplus
/// sequence is dropped and logged, never queued. It is a cheap clonable
/// handle; clones share all state.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher with an empty rule set.
    pub fn new(
        settings: DispatcherSettings,
        injector: Arc<dyn InputInjector>,
    ) -> (Self, MessageIntake) {
        let (intake, rx) = mpsc::channel(settings.intake_capacity.max(1));
        let max_sequences = settings.max_concurrent_sequences.min(Semaphore::MAX_PERMITS);
        let (feed_state, _) = watch::channel(FeedState::Disconnected);
        let shared = Shared {
            rules: RuleStore::default(),
            disabled: AtomicBool::new(false),
            sequencer: ActionSequencer::new(injector),
            permits: Arc::new(Semaphore::new(max_sequences)),
            max_sequences,
            counters: Counters::default(),
            intake,
            feed: Mutex::new(None),
            feed_state: Arc::new(feed_state),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            MessageIntake(rx),
        )
    }

    /// Consume messages until `shutdown` fires, then stop the active feed.
    pub async fn run(&self, intake: MessageIntake, shutdown: CancellationToken) {
        let MessageIntake(mut rx) = intake;
        info!(
            target: "chatplays::dispatch",
            injector = self.shared.sequencer.injector_name(),
            "Dispatcher running"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(message) => {
                        self.on_message(&message.text, &message.sender, message.timestamp);
                    }
                    None => break,
                },
            }
        }
        self.disconnect();
        info!(target: "chatplays::dispatch", stats = ?self.stats(), "Dispatcher stopped");
    }

    /// Handle one chat message. Returns how many sequences were started.
    ///
    /// Must be called from within a Tokio runtime; sequences are spawned onto it.
    pub fn on_message(&self, text: &str, sender: &str, timestamp: DateTime<Utc>) -> usize {
        let shared = &self.shared;
        Counters::bump(&shared.counters.received, 1);

        if self.state() == DispatchState::Disabled {
            Counters::bump(&shared.counters.ignored_while_disabled, 1);
            debug!(target: "chatplays::dispatch", %sender, %timestamp, %text, "Ignored message while disabled");
            return 0;
        }

        let rules = shared.rules.snapshot();
        let fired = match_message(text, &rules, false);
        if fired.is_empty() {
            trace!(target: "chatplays::dispatch", %sender, %text, "No command matched");
            return 0;
        }
        Counters::bump(&shared.counters.matched, fired.len() as u64);

        let mut started = 0;
        for command in fired {
            let id = command.id();
            let permit = match Arc::clone(&shared.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    Counters::bump(&shared.counters.dropped, 1);
                    warn!(
                        target: "chatplays::dispatch",
                        command = %id, %sender,
                        "Sequence limit reached; dropping command"
                    );
                    continue;
                }
            };

            info!(target: "chatplays::dispatch", command = %id, %sender, "Command fired");
            let actions = command.shared_actions();
            let task_shared = Arc::clone(shared);
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = task_shared.sequencer.run(&actions).await {
                    Counters::bump(&task_shared.counters.failed, 1);
                    error!(
                        target: "chatplays::dispatch",
                        command = %id, index = err.index, error = %err,
                        "Action sequence aborted"
                    );
                }
            });
            Counters::bump(&shared.counters.started, 1);
            started += 1;
        }
        started
    }

    /// Current state, derived from the global disable flag.
    pub fn state(&self) -> DispatchState {
        if self.shared.disabled.load(Ordering::Acquire) {
            DispatchState::Disabled
        } else {
            DispatchState::Listening
        }
    }

    /// Toggle the global disable flag. Running sequences are not cancelled.
    pub fn set_global_disable(&self, disabled: bool) {
        let was = self.shared.disabled.swap(disabled, Ordering::AcqRel);
        if was != disabled {
            info!(target: "chatplays::dispatch", disabled, "Global disable toggled");
        }
    }

    /// Stop chat from producing input, effective for the very next message.
    /// Sequences already running finish and release what they hold.
    pub fn emergency_stop(&self) {
        self.shared.disabled.store(true, Ordering::Release);
        warn!(
            target: "chatplays::dispatch",
            active = self.active_sequences(),
            "Emergency stop: chat input disabled"
        );
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.counters.snapshot()
    }

    /// Sequences currently running.
    pub fn active_sequences(&self) -> usize {
        self.shared
            .max_sequences
            .saturating_sub(self.shared.permits.available_permits())
    }

    /// Wait up to `limit` for running sequences to finish, so input they still
    /// hold gets released. Returns `false` if some were still running.
    pub async fn drain(&self, limit: Duration) -> bool {
        let idle = async {
            while self.active_sequences() > 0 {
                sleep(DRAIN_POLL).await;
            }
        };
        let drained = timeout(limit, idle).await.is_ok();
        if !drained {
            warn!(
                target: "chatplays::dispatch",
                active = self.active_sequences(),
                "Sequences still running after the grace period"
            );
        }
        drained
    }

    /// Messages waiting in the intake.
    pub fn pending_messages(&self) -> usize {
        self.shared.intake.max_capacity() - self.shared.intake.capacity()
    }

    /// The currently published rule set.
    pub fn rules(&self) -> Arc<RuleSet> {
        self.shared.rules.snapshot()
    }

    // --- Rule editing ---

    pub fn add_command<I, S>(
        &self,
        aliases: I,
        actions: Vec<Action>,
    ) -> Result<(CommandId, Vec<DuplicateAliasWarning>), RuleSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.shared
            .rules
            .update(|rules| rules.add_command(aliases, actions))
    }

    pub fn update_command<I, S>(
        &self,
        id: CommandId,
        aliases: I,
        actions: Vec<Action>,
    ) -> Result<Vec<DuplicateAliasWarning>, RuleSetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.shared
            .rules
            .update(|rules| rules.update_command(id, aliases, actions))
    }

    pub fn remove_command(&self, id: CommandId) -> Result<(), RuleSetError> {
        self.shared
            .rules
            .update(|rules| rules.remove_command(id).map(|_| ()))
    }

    pub fn set_enabled(&self, id: CommandId, enabled: bool) -> Result<(), RuleSetError> {
        self.shared
            .rules
            .update(|rules| rules.set_enabled(id, enabled))
    }

    // --- Profiles ---

    /// Load a profile file and publish it. On any error the current rule set
    /// stays in place. Returns the number of commands loaded.
    pub async fn load_profile(&self, path: impl AsRef<Path>) -> Result<usize, LoadError> {
        let path = path.as_ref();
        let loaded = config::read_profile(path)
            .await
            .and_then(|profile| RuleSet::from_profile(&profile));
        let rules = match loaded {
            Ok(rules) => rules,
            Err(err) => {
                warn!(target: "chatplays::profile", path = %path.display(), error = %err, "Profile rejected; keeping current rules");
                return Err(err);
            }
        };

        let count = rules.len();
        self.shared.rules.replace(rules);
        info!(target: "chatplays::profile", path = %path.display(), commands = count, "Profile loaded");
        Ok(count)
    }

    /// Write the current rule set to a profile file.
    pub async fn save_profile(&self, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let profile = self.shared.rules.snapshot().to_profile();
        config::write_profile(path.as_ref(), &profile).await?;
        info!(target: "chatplays::profile", path = %path.as_ref().display(), commands = profile.commands.len(), "Profile saved");
        Ok(())
    }

    // --- Feed ---

    /// Connect to a Twitch channel, replacing any active feed.
    pub fn connect(&self, channel: &str) -> Result<(), FeedError> {
        let source = TwitchSource::new(channel)?;
        self.connect_source(&source);
        Ok(())
    }

    /// Start `source` as the active feed, replacing any previous one.
    pub fn connect_source(&self, source: &dyn FeedSource) {
        let cancel = CancellationToken::new();
        let link = FeedLink::new(
            self.shared.intake.clone(),
            cancel.clone(),
            Arc::clone(&self.shared.feed_state),
        );

        let mut feed = self.shared.feed.lock();
        if let Some(previous) = feed.take() {
            debug!(target: "chatplays::dispatch", feed = previous.name, "Replacing active feed");
            previous.cancel.cancel();
        }
        info!(target: "chatplays::dispatch", feed = source.name(), "Starting feed");
        let task = source.start(link);
        *feed = Some(ActiveFeed {
            name: source.name(),
            cancel,
            task,
        });
    }

    /// Stop the active feed, if any.
    pub fn disconnect(&self) {
        if let Some(active) = self.shared.feed.lock().take() {
            active.cancel.cancel();
            info!(
                target: "chatplays::dispatch",
                feed = active.name,
                finished = active.task.is_finished(),
                "Feed disconnected"
            );
        }
        self.shared.feed_state.send_replace(FeedState::Disconnected);
    }

    pub fn feed_state(&self) -> FeedState {
        *self.shared.feed_state.borrow()
    }

    /// Watch feed state changes.
    pub fn subscribe_feed_state(&self) -> watch::Receiver<FeedState> {
        self.shared.feed_state.subscribe()
    }

    /// A sender for delivering messages straight into the intake.
    pub fn intake_sender(&self) -> mpsc::Sender<ChatMessage> {
        self.shared.intake.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Key;
    use crate::executor::InputEvent;
    use crate::test_support::RecordingInjector;

    fn press(key: Key, hold_ms: u64) -> Action {
        Action::KeyPress { key, hold_ms }
    }

    fn dispatcher(max: usize) -> (Dispatcher, MessageIntake, Arc<RecordingInjector>) {
        let injector = Arc::new(RecordingInjector::default());
        let settings = DispatcherSettings {
            max_concurrent_sequences: max,
            ..DispatcherSettings::default()
        };
        let (d, intake) = Dispatcher::new(settings, injector.clone());
        (d, intake, injector)
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_fires_sequence() {
        let (d, _intake, injector) = dispatcher(4);
        d.add_command(["jump"], vec![press(Key::Space, 0)]).unwrap();

        assert_eq!(d.on_message("JUMP!", "viewer", Utc::now()), 0);
        assert_eq!(d.on_message(" Jump ", "viewer", Utc::now()), 1);
        sleep(Duration::from_millis(1)).await;

        assert_eq!(
            injector.events(),
            vec![InputEvent::KeyDown(Key::Space), InputEvent::KeyUp(Key::Space)]
        );
        let stats = d.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intake_is_not_blocked_by_long_sequences() {
        let (d, _intake, injector) = dispatcher(8);
        d.add_command(["slow"], vec![Action::Wait { ms: 5_000 }, press(Key::Char('s'), 0)])
            .unwrap();
        d.add_command(["fast"], vec![press(Key::Char('f'), 0)]).unwrap();

        assert_eq!(d.on_message("slow", "a", Utc::now()), 1);
        assert_eq!(d.on_message("fast", "b", Utc::now()), 1);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            injector.events(),
            vec![InputEvent::KeyDown(Key::Char('f')), InputEvent::KeyUp(Key::Char('f'))]
        );

        sleep(Duration::from_secs(5)).await;
        assert_eq!(
            injector.events(),
            vec![
                InputEvent::KeyDown(Key::Char('f')),
                InputEvent::KeyUp(Key::Char('f')),
                InputEvent::KeyDown(Key::Char('s')),
                InputEvent::KeyUp(Key::Char('s')),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_is_dropped_not_queued() {
        let (d, _intake, injector) = dispatcher(2);
        d.add_command(["hold"], vec![press(Key::Char('h'), 1_000)]).unwrap();

        let started: usize = (0..5).map(|_| d.on_message("hold", "x", Utc::now())).sum();
        assert_eq!(started, 2);
        assert_eq!(d.stats().dropped, 3);
        assert_eq!(d.active_sequences(), 2);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(injector.events().len(), 4);
        assert_eq!(d.active_sequences(), 0);
        assert_eq!(d.on_message("hold", "x", Utc::now()), 1);
    }

    #[tokio::test]
    async fn test_oversized_cap_is_clamped() {
        let injector = Arc::new(RecordingInjector::default());
        let settings = DispatcherSettings {
            max_concurrent_sequences: usize::MAX,
            ..DispatcherSettings::default()
        };
        let (d, _intake) = Dispatcher::new(settings, injector);
        assert_eq!(d.active_sequences(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_held_input_to_be_released() {
        let (d, _intake, injector) = dispatcher(4);
        d.add_command(
            ["run"],
            vec![press(Key::LShift, 0), Action::Wait { ms: 800 }],
        )
        .unwrap();

        d.on_message("run", "x", Utc::now());
        sleep(Duration::from_millis(1)).await;
        assert!(d.drain(Duration::from_secs(2)).await);
        assert_eq!(
            injector.events(),
            vec![InputEvent::KeyDown(Key::LShift), InputEvent::KeyUp(Key::LShift)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_after_the_limit() {
        let (d, _intake, _injector) = dispatcher(4);
        d.add_command(["nap"], vec![Action::Wait { ms: 60_000 }]).unwrap();

        d.on_message("nap", "x", Utc::now());
        assert!(!d.drain(Duration::from_secs(1)).await);
        assert_eq!(d.active_sequences(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_disable_suppresses_and_counts() {
        let (d, _intake, injector) = dispatcher(4);
        d.add_command(["jump"], vec![press(Key::Space, 0)]).unwrap();

        d.set_global_disable(true);
        assert_eq!(d.state(), DispatchState::Disabled);
        assert_eq!(d.on_message("jump", "x", Utc::now()), 0);
        assert_eq!(d.stats().ignored_while_disabled, 1);

        d.set_global_disable(false);
        assert_eq!(d.on_message("jump", "x", Utc::now()), 1);
        sleep(Duration::from_millis(1)).await;
        assert_eq!(injector.events().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_does_not_cancel_running_sequence() {
        let (d, _intake, injector) = dispatcher(4);
        d.add_command(
            ["combo"],
            vec![press(Key::Char('a'), 0), Action::Wait { ms: 100 }, press(Key::Char('b'), 0)],
        )
        .unwrap();

        d.on_message("combo", "x", Utc::now());
        sleep(Duration::from_millis(10)).await;
        d.set_global_disable(true);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(injector.events().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sequence_is_counted() {
        let injector = Arc::new(RecordingInjector::failing_at(0));
        let (d, _intake) = Dispatcher::new(DispatcherSettings::default(), injector.clone());
        d.add_command(["jump"], vec![press(Key::Space, 0)]).unwrap();

        d.on_message("jump", "x", Utc::now());
        sleep(Duration::from_millis(1)).await;
        assert_eq!(d.stats().failed, 1);

        d.on_message("jump", "x", Utc::now());
        sleep(Duration::from_millis(1)).await;
        assert_eq!(
            injector.events(),
            vec![InputEvent::KeyDown(Key::Space), InputEvent::KeyUp(Key::Space)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_consumes_intake() {
        let (d, intake, injector) = dispatcher(4);
        d.add_command(["go"], vec![press(Key::Char('w'), 0)]).unwrap();

        let shutdown = CancellationToken::new();
        let runner = {
            let d = d.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { d.run(intake, shutdown).await })
        };

        d.intake_sender()
            .send(ChatMessage::now("viewer", "go go go"))
            .await
            .unwrap();
        sleep(Duration::from_millis(5)).await;
        shutdown.cancel();
        runner.await.unwrap();

        assert_eq!(
            injector.events(),
            vec![InputEvent::KeyDown(Key::Char('w')), InputEvent::KeyUp(Key::Char('w'))]
        );
        assert_eq!(d.feed_state(), FeedState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_rules() {
        let (d, _intake, _injector) = dispatcher(4);
        let (id, _) = d.add_command(["jump"], vec![press(Key::Space, 0)]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        tokio::fs::write(&bad, r#"{"commands": [{"aliases": ["left"], "enabled": true}]}"#)
            .await
            .unwrap();

        let err = d.load_profile(&bad).await.unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
        let rules = d.rules();
        assert_eq!(rules.lookup("jump").map(|c| c.id()), Some(id));
        assert!(rules.lookup("left").is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_profile() {
        let (d, _intake, _injector) = dispatcher(4);
        d.add_command(["w", "forward"], vec![press(Key::Char('w'), 250)]).unwrap();
        let (off, _) = d.add_command(["s"], vec![press(Key::Char('s'), 0)]).unwrap();
        d.set_enabled(off, false).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        d.save_profile(&path).await.unwrap();

        let (other, _intake2, _injector2) = dispatcher(4);
        assert_eq!(other.load_profile(&path).await.unwrap(), 2);
        assert_eq!(other.rules().to_profile(), d.rules().to_profile());
    }

    #[tokio::test]
    async fn test_edits_are_visible_to_later_snapshots_only() {
        let (d, _intake, _injector) = dispatcher(4);
        let (id, _) = d.add_command(["jump"], vec![press(Key::Space, 0)]).unwrap();
        let before = d.rules();

        d.remove_command(id).unwrap();
        assert!(before.lookup("jump").is_some());
        assert!(d.rules().lookup("jump").is_none());
        assert_eq!(
            d.remove_command(id),
            Err(RuleSetError::UnknownCommand(id))
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_blank_channel() {
        let (d, _intake, _injector) = dispatcher(4);
        assert!(matches!(d.connect("  "), Err(FeedError::InvalidChannel)));
        assert_eq!(d.feed_state(), FeedState::Disconnected);
    }
}

//! Profile hot reload.
//!
//! Watches the directory holding a profile file and reloads the profile into
//! the dispatcher whenever the file is created or modified. Saves made with
//! a temporary file and a rename show up as a create event, so both kinds
//! count. Bursts of events are coalesced before reloading.
//!
//! A reload that fails leaves the current rule set untouched; the error is
//! logged and the watcher keeps going.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::Dispatcher;
use crate::error::WatchError;

/// Quiet period after the last file event before reloading.
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Keeps a profile file in sync with a dispatcher. Dropping it stops watching.
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ProfileWatcher {
    /// Start watching `path`. Reloads stop when `shutdown` fires or the
    /// watcher is dropped.
    pub fn spawn(
        dispatcher: Dispatcher,
        path: impl Into<PathBuf>,
        shutdown: CancellationToken,
    ) -> Result<Self, WatchError> {
        let path = path.into();
        let Some(file_name) = path.file_name().map(OsString::from) else {
            return Err(WatchError {
                path,
                source: notify::Error::generic("profile path has no file name"),
            });
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let watched = file_name.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if touches_profile(&event, &watched) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => error!(target: "chatplays::profile", error = %e, "Profile watcher error"),
            }
        })
        .map_err(|source| WatchError {
            path: path.clone(),
            source,
        })?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError {
                path: path.clone(),
                source,
            })?;
        info!(target: "chatplays::profile", path = %path.display(), "Watching profile for changes");

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    signal = rx.recv() => if signal.is_none() { break },
                }
                // Wait for the burst to settle.
                while let Ok(Some(())) = timeout(RELOAD_DEBOUNCE, rx.recv()).await {}

                debug!(target: "chatplays::profile", path = %path.display(), "Profile changed; reloading");
                // Errors are logged by load_profile.
                let _ = dispatcher.load_profile(&path).await;
            }
            debug!(target: "chatplays::profile", "Profile watcher stopped");
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ProfileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn touches_profile(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatcherSettings;
    use crate::test_support::RecordingInjector;
    use notify::event::{CreateKind, ModifyKind};
    use std::sync::Arc;
    use tokio::time::{Instant, sleep};

    #[test]
    fn test_only_profile_events_count() {
        let name = OsString::from("profile.json");
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/x/profile.json"));
        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/x/profile.json"));
        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/x/other.json"));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/tmp/x/profile.json"));

        assert!(touches_profile(&modify, &name));
        assert!(touches_profile(&create, &name));
        assert!(!touches_profile(&other, &name));
        assert!(!touches_profile(&access, &name));
    }

    #[tokio::test]
    async fn test_rewrite_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        tokio::fs::write(&path, r#"{"version": 1, "commands": []}"#)
            .await
            .unwrap();

        let (dispatcher, _intake) = Dispatcher::new(
            DispatcherSettings::default(),
            Arc::new(RecordingInjector::default()),
        );
        let shutdown = CancellationToken::new();
        let _watcher = ProfileWatcher::spawn(dispatcher.clone(), &path, shutdown.clone()).unwrap();

        tokio::fs::write(
            &path,
            r#"{"version": 1, "commands": [
                {"aliases": ["jump"], "enabled": true, "actions": [{"type": "key_press", "key": "SPACE"}]}
            ]}"#,
        )
        .await
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.rules().lookup("jump").is_none() && Instant::now() < deadline {
            sleep(Duration::from_millis(50)).await;
        }
        assert!(dispatcher.rules().lookup("jump").is_some());
        shutdown.cancel();
    }
}

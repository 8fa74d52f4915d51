//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::InjectError;
use crate::executor::{InputEvent, InputInjector};

/// Records every injected event with the (tokio) time it arrived.
#[derive(Default)]
pub struct RecordingInjector {
    log: Mutex<Vec<(Instant, InputEvent)>>,
    calls: AtomicUsize,
    fail_at: Option<usize>,
}

impl RecordingInjector {
    /// An injector whose `call`-th inject (0-based) is rejected.
    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.log.lock().iter().map(|(_, e)| *e).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, InputEvent)> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl InputInjector for RecordingInjector {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn inject(&self, event: InputEvent) -> Result<(), InjectError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(call) {
            return Err(InjectError::Rejected("device busy".into()));
        }
        self.log.lock().push((Instant::now(), event));
        Ok(())
    }
}

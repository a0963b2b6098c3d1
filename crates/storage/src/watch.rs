//! Cancellable watch subscriptions that survive stream closure.
//!
//! [`spawn_watch`] runs a background task that consumes a coordination
//! store watch stream and hands each event to a [`WatchHandler`]. When the
//! stream ends, or subscribing fails, the task waits out a
//! [`BackoffConfig`] delay and subscribes again, then calls
//! [`WatchHandler::on_resubscribe`] so the handler can catch up on
//! anything that changed while it was disconnected. The backoff resets
//! after the first event received on a fresh stream.
//!
//! The task stops when its [`WatchHandle`] is cancelled or dropped.

use std::sync::Arc;

use async_trait::async_trait;
use fail::fail_point;
use tokio::{select, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::BackoffConfig,
    coordination::{CoordinationStore, Watcher},
    types::{WatchEvent, WatchScope},
};

/// Receives events from a watch subscription.
///
/// Handlers run inline on the watch task, so events are delivered one at a
/// time in stream order.
#[async_trait]
pub trait WatchHandler: Send + Sync + 'static {
    /// Called for every event on the stream, including deletes.
    async fn on_event(&self, event: WatchEvent);

    /// Called after a successful resubscribe, before any new event.
    async fn on_resubscribe(&self) {}
}

/// Owns a running watch task.
///
/// Dropping the handle cancels the task.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// A handle with no task behind it, for backends without change streams.
    #[must_use]
    pub fn inert() -> Self {
        Self { cancel: CancellationToken::new(), task: None }
    }

    /// Returns `true` if a task was spawned for this handle.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Requests the task to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancels the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::warn!(error = %err, "watch task ended abnormally");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns a resubscribing watch on `key` and returns its handle.
pub fn spawn_watch<H: WatchHandler>(
    store: Arc<dyn CoordinationStore>,
    key: impl Into<String>,
    scope: WatchScope,
    backoff: BackoffConfig,
    handler: Arc<H>,
) -> WatchHandle {
    spawn(store, key.into(), scope, backoff, handler, None)
}

/// Like [`spawn_watch`], but consumes `watcher` as the first subscription.
///
/// Opening the watcher before reading the current state means no write
/// between the read and the subscription is missed.
pub fn spawn_watch_from<H: WatchHandler>(
    store: Arc<dyn CoordinationStore>,
    key: impl Into<String>,
    scope: WatchScope,
    backoff: BackoffConfig,
    handler: Arc<H>,
    watcher: Watcher,
) -> WatchHandle {
    spawn(store, key.into(), scope, backoff, handler, Some(watcher))
}

fn spawn<H: WatchHandler>(
    store: Arc<dyn CoordinationStore>,
    key: String,
    scope: WatchScope,
    backoff: BackoffConfig,
    handler: Arc<H>,
    initial: Option<Watcher>,
) -> WatchHandle {
    let cancel = CancellationToken::new();
    let task =
        tokio::spawn(run_watch(store, key, scope, backoff, handler, initial, cancel.clone()));
    WatchHandle { cancel, task: Some(task) }
}

#[tracing::instrument(skip(store, backoff, handler, initial, cancel))]
async fn run_watch<H: WatchHandler>(
    store: Arc<dyn CoordinationStore>,
    key: String,
    scope: WatchScope,
    backoff: BackoffConfig,
    handler: Arc<H>,
    mut initial: Option<Watcher>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut subscribed_once = false;

    loop {
        let subscription = match initial.take() {
            Some(watcher) => Ok(watcher),
            None => select! {
                _ = cancel.cancelled() => return,
                result = store.watch(&key, scope) => result,
            },
        };

        match subscription {
            Ok(mut watcher) => {
                if subscribed_once {
                    tracing::info!(attempt, "watch resubscribed");
                    handler.on_resubscribe().await;
                }
                subscribed_once = true;

                loop {
                    let event = select! {
                        _ = cancel.cancelled() => return,
                        event = watcher.next() => event,
                    };
                    match event {
                        Some(event) => {
                            attempt = 0;
                            handler.on_event(event).await;
                        },
                        None => break,
                    }
                }
                tracing::warn!("watch stream closed");
            },
            Err(err) => {
                tracing::warn!(error = %err, attempt, "watch subscribe failed");
            },
        }

        fail_point!("watch-before-resubscribe", |_| {});

        let delay = backoff.delay(attempt);
        attempt = attempt.saturating_add(1);
        let delay_ms = delay.as_millis() as u64;
        tracing::debug!(delay_ms, attempt, "resubscribing after backoff");
        select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

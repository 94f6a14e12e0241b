//! Notification routing.
//!
//! Every inbound notification is offered to the active subscriptions whose
//! method filter and predicate match. A matching subscription is filled once
//! and removed; it sees further notifications only after [`Subscription::rearm`].
//! Notifications nobody is interested in are dropped: other clients' traffic
//! shares the event channel and is not an error.

use crate::codec::Value;
use crate::{Result, RpcError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::oneshot;
use tracing::trace;

/// Predicate over a notification's arguments.
pub type Predicate = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// A notification delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub args: Vec<Value>,
}

/// Which notifications a subscription wants.
#[derive(Clone)]
pub struct NotificationFilter {
    method: String,
    predicate: Option<Predicate>,
}

impl NotificationFilter {
    /// Match every notification with this method name.
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            predicate: None,
        }
    }

    /// Additionally require `predicate(args)` to hold.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    pub fn matches(&self, method: &str, args: &[Value]) -> bool {
        self.method == method && self.predicate.as_ref().map_or(true, |p| p(args))
    }
}

impl fmt::Debug for NotificationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationFilter")
            .field("method", &self.method)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

type Slot = oneshot::Sender<Result<Notification>>;

struct Entry {
    id: u64,
    filter: NotificationFilter,
    slot: Slot,
}

struct State {
    entries: Vec<Entry>,
    closed: Option<RpcError>,
}

struct Inner {
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arm(&self, filter: &NotificationFilter) -> Result<(u64, oneshot::Receiver<Result<Notification>>)> {
        let mut state = self.lock();
        if let Some(err) = &state.closed {
            return Err(err.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        state.entries.push(Entry {
            id,
            filter: filter.clone(),
            slot: tx,
        });
        Ok((id, rx))
    }

    fn disarm(&self, id: u64) {
        self.lock().entries.retain(|e| e.id != id);
    }
}

/// Routes notifications to subscriptions. Cheap to clone.
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<Inner>,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                state: Mutex::new(State {
                    entries: Vec::new(),
                    closed: None,
                }),
            }),
        }
    }

    /// Register interest in notifications matching `filter`.
    pub fn subscribe(&self, filter: NotificationFilter) -> Result<Subscription> {
        let (id, rx) = self.inner.arm(&filter)?;
        Ok(Subscription {
            id: Some(id),
            rx: Some(rx),
            filter,
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// Offer a notification to every active subscription.
    ///
    /// Returns how many subscriptions it satisfied.
    pub fn dispatch(&self, method: &str, args: &[Value]) -> usize {
        let matched = {
            let mut state = self.inner.lock();
            let mut matched = Vec::new();
            let mut i = 0;
            while i < state.entries.len() {
                if state.entries[i].filter.matches(method, args) {
                    matched.push(state.entries.swap_remove(i));
                } else {
                    i += 1;
                }
            }
            matched
        };

        if matched.is_empty() {
            trace!("Dropping unmatched notification {}", method);
            return 0;
        }

        let notification = Notification {
            method: method.to_string(),
            args: args.to_vec(),
        };
        matched
            .into_iter()
            .map(|entry| entry.slot.send(Ok(notification.clone())).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Fail every active subscription and refuse new ones.
    pub fn close(&self, err: &RpcError) {
        let entries = {
            let mut state = self.inner.lock();
            if state.closed.is_none() {
                state.closed = Some(err.clone());
            }
            std::mem::take(&mut state.entries)
        };
        for entry in entries {
            let _ = entry.slot.send(Err(err.clone()));
        }
    }

    /// Number of armed subscriptions.
    pub fn active(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

/// A single-shot interest in one kind of notification.
///
/// Dropping it unregisters it.
pub struct Subscription {
    id: Option<u64>,
    rx: Option<oneshot::Receiver<Result<Notification>>>,
    filter: NotificationFilter,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Wait for the matching notification.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// subscription armed.
    pub async fn recv(&mut self) -> Result<Notification> {
        let rx = self.rx.as_mut().ok_or_else(|| RpcError::InvalidState {
            message: format!(
                "subscription to '{}' already delivered; rearm it first",
                self.filter.method
            ),
        })?;
        let outcome = rx.await;
        self.rx = None;
        self.id = None;
        match outcome {
            Ok(delivered) => delivered,
            Err(_) => Err(RpcError::transport("notification dispatcher shut down")),
        }
    }

    /// Arm the subscription again after a delivery.
    pub fn rearm(&mut self) -> Result<()> {
        if self.rx.is_some() {
            return Ok(());
        }
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(|| RpcError::transport("notification dispatcher shut down"))?;
        let (id, rx) = inner.arm(&self.filter)?;
        self.id = Some(id);
        self.rx = Some(rx);
        Ok(())
    }

    pub fn filter(&self) -> &NotificationFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let (Some(id), Some(inner)) = (self.id, self.inner.upgrade()) {
            inner.disarm(id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

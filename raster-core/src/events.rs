use std::panic::AssertUnwindSafe;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Event names understood by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Imported,
    Updated,
    Removed,
    Custom(String),
}

impl EventKind {
    pub fn custom(name: impl Into<String>) -> Self {
        EventKind::Custom(name.into())
    }

    pub fn parse(s: &str) -> Self {
        let norm = s.trim().to_lowercase();
        match norm.as_str() {
            "imported" => EventKind::Imported,
            "updated" => EventKind::Updated,
            "removed" => EventKind::Removed,
            other => EventKind::Custom(other.to_string()),
        }
    }
}

/// Anything published through the hub names its kind.
pub trait Event: Clone + Send + Sync + 'static {
    fn kind(&self) -> EventKind;
}

/// Listener signature (async). The listener owns its copy of the event so
/// it can outlive the publisher.
pub type EventListener<E> = Arc<dyn Fn(E) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPat {
    Any,
    Exact(EventKind),
}

impl EventPat {
    pub fn matches(&self, kind: &EventKind) -> bool {
        match self {
            EventPat::Any => true,
            EventPat::Exact(k) => k == kind,
        }
    }
}

/// How `publish` runs listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Await each listener in registration order before `publish` returns.
    Inline,
    /// Hand each listener to the tokio runtime and return immediately.
    #[default]
    Spawn,
}

impl Dispatch {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Some(Dispatch::Inline),
            "spawn" => Some(Dispatch::Spawn),
            _ => None,
        }
    }
}

#[derive(Clone)]
struct ListenerEntry<E: Event> {
    id: ListenerId,
    pattern: EventPat,
    listener: EventListener<E>,
    once: bool,
}

/// Outcome of a `publish` call.
///
/// Publishers normally drop it. Callers that need to observe completion
/// (tests, shutdown) can await [`Delivery::settled`].
#[must_use = "drop the delivery to publish fire-and-forget, or await `settled()`"]
pub struct Delivery {
    pub listeners: usize,
    pub failed: usize,
    pending: Vec<JoinHandle<bool>>,
}

impl Delivery {
    /// Wait for spawned listeners. Returns the number that failed.
    pub async fn settled(self) -> usize {
        let mut failed = self.failed;
        for handle in self.pending {
            match handle.await {
                Ok(true) => {}
                Ok(false) | Err(_) => failed += 1,
            }
        }
        failed
    }
}

/// Minimal in-process event hub.
///
/// Emission is split so that no lock is held across `.await`:
/// 1) snapshot matching listeners (read lock)
/// 2) drop once-listeners (write lock)
/// 3) run listeners (no lock held)
///
/// Listener failures and panics are logged and counted; they never reach
/// the publisher.
pub struct EventHub<E: Event> {
    listeners: RwLock<Vec<ListenerEntry<E>>>,
    dispatch: Dispatch,
}

impl<E: Event> Default for EventHub<E> {
    fn default() -> Self {
        Self::new(Dispatch::default())
    }
}

impl<E: Event> EventHub<E> {
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            dispatch,
        }
    }

    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// hub.on(EventKind::Imported, listener)
    pub fn on(&self, kind: EventKind, listener: EventListener<E>) -> ListenerId {
        self.on_pattern(EventPat::Exact(kind), listener)
    }

    pub fn on_pattern(&self, pattern: EventPat, listener: EventListener<E>) -> ListenerId {
        self.push(pattern, listener, false)
    }

    /// Deliver at most one event, then unregister.
    pub fn once(&self, kind: EventKind, listener: EventListener<E>) -> ListenerId {
        self.push(EventPat::Exact(kind), listener, true)
    }

    fn push(&self, pattern: EventPat, listener: EventListener<E>, once: bool) -> ListenerId {
        let id = next_listener_id();
        self.listeners.write().push(ListenerEntry {
            id,
            pattern,
            listener,
            once,
        });
        id
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|e| e.id != id);
        before != listeners.len()
    }

    pub fn remove_all(&self) -> usize {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.clear();
        before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn snapshot(&self, kind: &EventKind) -> Vec<EventListener<E>> {
        let (to_call, once_ids) = {
            let listeners = self.listeners.read();
            let mut to_call = Vec::new();
            let mut once_ids = Vec::new();
            for entry in listeners.iter() {
                if entry.pattern.matches(kind) {
                    to_call.push(entry.listener.clone());
                    if entry.once {
                        once_ids.push(entry.id);
                    }
                }
            }
            (to_call, once_ids)
        };

        if !once_ids.is_empty() {
            self.listeners.write().retain(|e| !once_ids.contains(&e.id));
        }
        to_call
    }

    /// Fan `event` out to every matching listener.
    pub async fn publish(&self, event: E) -> Delivery {
        let kind = event.kind();
        let listeners = self.snapshot(&kind);
        debug!(?kind, listeners = listeners.len(), "publishing event");

        let mut delivery = Delivery {
            listeners: listeners.len(),
            failed: 0,
            pending: Vec::new(),
        };

        match self.dispatch {
            Dispatch::Inline => {
                for f in &listeners {
                    if !run_listener(f, event.clone(), &kind).await {
                        delivery.failed += 1;
                    }
                }
            }
            Dispatch::Spawn => {
                for f in listeners {
                    let event = event.clone();
                    let kind = kind.clone();
                    delivery
                        .pending
                        .push(tokio::spawn(async move { run_listener(&f, event, &kind).await }));
                }
            }
        }

        delivery
    }
}

async fn run_listener<E: Event>(f: &EventListener<E>, event: E, kind: &EventKind) -> bool {
    match AssertUnwindSafe(f(event)).catch_unwind().await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!(?kind, error = %err, "event listener failed");
            false
        }
        Err(_) => {
            warn!(?kind, "event listener panicked");
            false
        }
    }
}

//! Outcome notifications for the presentation layer.
//!
//! The notifier owns no domain state. Each call to [`Notifier::notify`] is
//! independent: it is pushed onto a toast tray that forgets it once its TTL
//! lapses, and every registered listener is invoked synchronously.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Success => write!(f, "success"),
            NotificationKind::Error => write!(f, "error"),
            NotificationKind::Info => write!(f, "info"),
            NotificationKind::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub kind: NotificationKind,
    pub issued_at: Instant,
    pub ttl: Duration,
}

impl Notification {
    pub fn expires_at(&self) -> Instant {
        self.issued_at + self.ttl
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

type Listener = Box<dyn Fn(&Notification) + Send + Sync>;

struct NotifierInner {
    // `None` holds listeners for every kind.
    listeners: RwLock<HashMap<Option<NotificationKind>, Vec<Listener>>>,
    tray: Mutex<Vec<Notification>>,
    next_id: AtomicU64,
    ttl: Duration,
}

/// Fire-and-forget notification emitter. Clone shares listeners and tray.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<NotifierInner>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_NOTIFICATION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                listeners: RwLock::new(HashMap::new()),
                tray: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                ttl,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Register a listener for one kind of notification.
    pub fn on<F>(&self, kind: NotificationKind, listener: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.add_listener(Some(kind), Box::new(listener));
    }

    /// Register a listener for every notification.
    pub fn on_any<F>(&self, listener: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.add_listener(None, Box::new(listener));
    }

    fn add_listener(&self, kind: Option<NotificationKind>, listener: Listener) {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.entry(kind).or_default().push(listener);
    }

    pub fn notify(&self, message: impl Into<String>, kind: NotificationKind) -> NotificationId {
        let now = Instant::now();
        let notification = Notification {
            id: NotificationId(self.inner.next_id.fetch_add(1, Ordering::Relaxed)),
            message: message.into(),
            kind,
            issued_at: now,
            ttl: self.inner.ttl,
        };
        tracing::debug!(kind = %kind, message = %notification.message, "notify");

        {
            let mut tray = self.inner.tray.lock().unwrap_or_else(PoisonError::into_inner);
            tray.retain(|n| !n.is_expired_at(now));
            tray.push(notification.clone());
        }

        let listeners = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for key in [Some(kind), None] {
            if let Some(bucket) = listeners.get(&key) {
                for listener in bucket {
                    listener(&notification);
                }
            }
        }

        notification.id
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, NotificationKind::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, NotificationKind::Error)
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, NotificationKind::Info)
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, NotificationKind::Warning)
    }

    /// Notifications still within their TTL, oldest first.
    pub fn active(&self) -> Vec<Notification> {
        self.active_at(Instant::now())
    }

    pub fn active_at(&self, now: Instant) -> Vec<Notification> {
        let tray = self.inner.tray.lock().unwrap_or_else(PoisonError::into_inner);
        tray.iter().filter(|n| !n.is_expired_at(now)).cloned().collect()
    }

    /// Remove a notification before it expires. Returns true if it was shown.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut tray = self.inner.tray.lock().unwrap_or_else(PoisonError::into_inner);
        let before = tray.len();
        tray.retain(|n| n.id != id);
        tray.len() != before
    }

    /// Drop expired notifications. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut tray = self.inner.tray.lock().unwrap_or_else(PoisonError::into_inner);
        let before = tray.len();
        tray.retain(|n| !n.is_expired_at(now));
        before - tray.len()
    }
}

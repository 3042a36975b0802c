//! Mutations aimed at a placeholder wait for the create that owns it.
//!
//! A create opens a [`CreateTicket`] for its placeholder. An update or remove
//! that targets the placeholder before the create settles takes a [`Link`],
//! which resolves to the server's key once the create confirms, or to nothing
//! if the create failed or its future was dropped unpolled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Open,
    Confirmed(String),
    Abandoned,
}

/// Rewrites a record's id; taken from the record's `Identified` impl.
pub(crate) type AssignId<T> = fn(&mut T, String);

struct Entry<T> {
    rx: watch::Receiver<Resolution>,
    assign: AssignId<T>,
}

type Open<T> = Arc<Mutex<HashMap<String, Entry<T>>>>;

pub(crate) struct PlaceholderLinks<T> {
    open: Open<T>,
}

impl<T> PlaceholderLinks<T> {
    pub(crate) fn new() -> Self {
        Self {
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn open(&self, placeholder: &str, assign: AssignId<T>) -> CreateTicket<T> {
        let (tx, rx) = watch::channel(Resolution::Open);
        lock(&self.open).insert(placeholder.to_string(), Entry { rx, assign });
        CreateTicket {
            tx,
            placeholder: placeholder.to_string(),
            assign,
            open: Arc::clone(&self.open),
        }
    }

    /// None when no create is in flight for `placeholder`.
    pub(crate) fn follow(&self, placeholder: &str) -> Option<Link<T>> {
        lock(&self.open).get(placeholder).map(|entry| Link {
            rx: entry.rx.clone(),
            assign: entry.assign,
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.open).len()
    }
}

/// Held by a create's remote half until it settles.
pub(crate) struct CreateTicket<T> {
    tx: watch::Sender<Resolution>,
    placeholder: String,
    assign: AssignId<T>,
    open: Open<T>,
}

impl<T> CreateTicket<T> {
    pub(crate) fn assign(&self) -> AssignId<T> {
        self.assign
    }

    pub(crate) fn confirm(self, server_key: String) {
        self.tx.send_replace(Resolution::Confirmed(server_key));
    }

    pub(crate) fn abandon(self) {
        self.tx.send_replace(Resolution::Abandoned);
    }
}

impl<T> Drop for CreateTicket<T> {
    fn drop(&mut self) {
        lock(&self.open).remove(&self.placeholder);
        if *self.tx.borrow() == Resolution::Open {
            self.tx.send_replace(Resolution::Abandoned);
        }
    }
}

pub(crate) struct Link<T> {
    rx: watch::Receiver<Resolution>,
    pub(crate) assign: AssignId<T>,
}

impl<T> Link<T> {
    /// Wait for the create to settle. Returns the server key it confirmed.
    pub(crate) async fn resolved(mut self) -> Option<String> {
        loop {
            let state = self.rx.borrow_and_update().clone();
            match state {
                Resolution::Confirmed(key) => return Some(key),
                Resolution::Abandoned => return None,
                Resolution::Open => {}
            }
            if self.rx.changed().await.is_err() {
                let state = self.rx.borrow().clone();
                return match state {
                    Resolution::Confirmed(key) => Some(key),
                    _ => None,
                };
            }
        }
    }
}

fn lock<T>(open: &Open<T>) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
    open.lock().unwrap_or_else(PoisonError::into_inner)
}

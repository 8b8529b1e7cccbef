//! Resolution of `(action, token)` requests and subscriber notification
//!
//! Subscribers are plain functions registered on a [`Dispatcher`]. They are
//! called synchronously, in registration order, for every resolution. Any of
//! them may return an override response; the first one returned wins.

use chrono::Utc;
use tracing::debug;

use crate::availability::is_available;
use crate::error::Result;
use crate::lifecycle::PrivateUrls;
use crate::model::PrivateUrlRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Event passed to subscribers
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    pub outcome: Outcome,
    pub action: &'a str,
    /// The record as resolved, `None` if no record matched
    pub record: Option<&'a PrivateUrlRecord>,
}

/// Subscriber callback; `Some` overrides the default response
pub type Subscriber<R> = Box<dyn Fn(&Notification<'_>) -> Option<R> + Send + Sync>;

/// Result of a resolution
#[derive(Debug)]
pub enum Resolution<R> {
    /// A subscriber supplied the response
    Override(R),
    /// The hit was counted; respond with the default redirect
    Redirect,
    /// Missing or unavailable; respond with "not found"
    NotFound,
}

pub struct Dispatcher<R> {
    urls: PrivateUrls,
    subscribers: Vec<Subscriber<R>>,
}

impl<R: 'static> Dispatcher<R> {
    pub fn new(urls: PrivateUrls) -> Self {
        Self {
            urls,
            subscribers: Vec::new(),
        }
    }

    /// Registers a subscriber for both outcomes
    pub fn subscribe<F>(mut self, subscriber: F) -> Self
    where
        F: Fn(&Notification<'_>) -> Option<R> + Send + Sync + 'static,
    {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    /// Registers a subscriber that only sees successful resolutions
    pub fn on_success<F>(self, subscriber: F) -> Self
    where
        F: Fn(&Notification<'_>) -> Option<R> + Send + Sync + 'static,
    {
        self.subscribe(move |n: &Notification<'_>| {
            if n.outcome == Outcome::Success {
                subscriber(n)
            } else {
                None
            }
        })
    }

    /// Registers a subscriber that only sees failed resolutions
    pub fn on_failure<F>(self, subscriber: F) -> Self
    where
        F: Fn(&Notification<'_>) -> Option<R> + Send + Sync + 'static,
    {
        self.subscribe(move |n: &Notification<'_>| {
            if n.outcome == Outcome::Failure {
                subscriber(n)
            } else {
                None
            }
        })
    }

    pub fn urls(&self) -> &PrivateUrls {
        &self.urls
    }

    /// Resolves a request for `(action, token)`.
    ///
    /// A missing or unavailable record notifies subscribers of a failure.
    /// Otherwise the hit is claimed first and, once it is counted,
    /// subscribers are notified of a success with the record as it was
    /// resolved. A record consumed by a concurrent request between lookup
    /// and claim takes the failure path.
    pub fn resolve(&self, action: &str, token: &str) -> Result<Resolution<R>> {
        let found = self.urls.find(action, token)?;

        let (outcome, snapshot) = match found {
            Some(record) if is_available(&record, Utc::now()) => {
                let snapshot = record.clone();
                let mut record = record;
                let hit = self.urls.consume(&mut record)?;
                if hit.is_accepted() {
                    (Outcome::Success, Some(snapshot))
                } else {
                    (Outcome::Failure, Some(record).filter(|r| r.is_persisted()))
                }
            }
            other => (Outcome::Failure, other),
        };

        debug!(action, ?outcome, "Resolved private url");

        let notification = Notification {
            outcome,
            action,
            record: snapshot.as_ref(),
        };

        if let Some(response) = self.notify(&notification) {
            return Ok(Resolution::Override(response));
        }

        Ok(match outcome {
            Outcome::Success => Resolution::Redirect,
            Outcome::Failure => Resolution::NotFound,
        })
    }

    /// Calls every subscriber and returns the first override
    fn notify(&self, notification: &Notification<'_>) -> Option<R> {
        let mut first = None;
        for subscriber in &self.subscribers {
            let response = subscriber(notification);
            if first.is_none() {
                first = response;
            }
        }
        first
    }
}

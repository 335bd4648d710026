//! Cached `Date:` header value, refreshed once a second by a dedicated task
//! and read lock-free by connection tasks.
//!
//! This replaces the ETS-like shared cell the design notes describe with a
//! `tokio::sync::watch` channel: the refresh task is the sole writer, every
//! reader gets a cheap `Arc<str>` clone of the latest value without
//! contending a mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Handle for reading the cached `Date:` header value.
#[derive(Clone)]
pub struct DateCache {
    rx: watch::Receiver<Arc<str>>,
}

impl DateCache {
    /// Current formatted value, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`.
    pub fn get(&self) -> Arc<str> {
        self.rx.borrow().clone()
    }
}

fn format_now() -> Arc<str> {
    #[cfg(feature = "date_header")]
    {
        Arc::from(httpdate::fmt_http_date(std::time::SystemTime::now()))
    }
    #[cfg(not(feature = "date_header"))]
    {
        Arc::from("")
    }
}

/// Spawn the background refresh task and return a handle cloneable by every
/// connection task. The task runs for the lifetime of the runtime; drop all
/// `DateCache` clones and the sender to let it observe the channel is
/// closed and exit (it currently never does on its own since the server
/// holds at least one connection's clone for as long as it accepts).
pub fn spawn() -> DateCache {
    let (tx, rx) = watch::channel(format_now());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if tx.send(format_now()).is_err() {
                break;
            }
        }
    });
    DateCache { rx }
}

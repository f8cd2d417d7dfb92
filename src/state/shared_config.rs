//! The process-wide message value.

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, PoisonError};

/// Returned when a proposed message is empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("message must not be empty")]
pub struct InvalidMessage;

/// Concurrency-safe holder of the current message.
///
/// Reads load the current `Arc<String>` without locking, so a reader always
/// observes one complete value. Writes are serialized by `write_lock`; the
/// last `replace` to complete wins, and every read that starts after
/// `replace` returns sees the new value.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    current: ArcSwap<String>,
    write_lock: Mutex<()>,
}

impl SharedConfig {
    /// Seed the cell. The initial value follows the same rules as `replace`.
    pub fn new(initial: &str) -> Result<Self, InvalidMessage> {
        let value = normalize(initial)?;
        Ok(Self {
            inner: Arc::new(Inner {
                current: ArcSwap::new(value),
                write_lock: Mutex::new(()),
            }),
        })
    }

    /// Current message.
    pub fn read(&self) -> Arc<String> {
        self.inner.current.load_full()
    }

    /// Replace the message with `value` trimmed of surrounding whitespace.
    ///
    /// Returns the stored value. On error the current value is untouched.
    pub fn replace(&self, value: &str) -> Result<Arc<String>, InvalidMessage> {
        let value = normalize(value)?;

        // A poisoned lock only means another writer panicked; the guarded
        // data is `()` so it is always safe to continue.
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if **self.inner.current.load() != *value {
            self.inner.current.store(value.clone());
        }
        Ok(value)
    }
}

fn normalize(value: &str) -> Result<Arc<String>, InvalidMessage> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InvalidMessage);
    }
    Ok(Arc::new(trimmed.to_string()))
}

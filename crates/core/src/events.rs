// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Typed subscriber lists.
//!
//! Each component that fires events owns one [`Subscribers`] per event kind.
//! Callbacks run synchronously, in registration order, on the thread that
//! fires the event. They are observers: they cannot fail the emitter.

use std::fmt;
use std::sync::{Arc, Mutex};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// An ordered list of callbacks for one event type.
pub struct Subscribers<E> {
    callbacks: Mutex<Vec<Callback<E>>>,
}

impl<E> Subscribers<E> {
    /// Creates an empty subscriber list.
    pub fn new() -> Self {
        Subscribers {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Registers a callback. It fires after every callback registered before it.
    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.push(Arc::new(callback));
    }

    /// Invokes every callback with `event`.
    ///
    /// The list is copied before dispatch so a callback may subscribe further
    /// callbacks without deadlocking; those fire from the next event on.
    pub fn emit(&self, event: &E) {
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Returns the number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Subscribers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

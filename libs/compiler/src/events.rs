//! Synchronous publish/subscribe used to announce the compiler lifecycle.

use crate::backend::ExecutionMode;
use crate::types::{CompilationResult, SourceContext};

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<E> = Box<dyn FnMut(&E) + Send>;

/// Broadcasts each event to every subscriber, in registration order, before `emit` returns.
pub struct EventBus<E> {
  subscribers: Vec<(SubscriptionId, Subscriber<E>)>,
  next_id: u64,
}

impl<E> Default for EventBus<E> {
  fn default() -> Self {
    Self {
      subscribers: Vec::new(),
      next_id: 0,
    }
  }
}

impl<E> EventBus<E> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&mut self, subscriber: impl FnMut(&E) + Send + 'static) -> SubscriptionId {
    let id = SubscriptionId(self.next_id);
    self.next_id += 1;
    self.subscribers.push((id, Box::new(subscriber)));
    id
  }

  /// Returns `false` when `id` was not subscribed.
  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    let before = self.subscribers.len();
    self.subscribers.retain(|(existing, _)| *existing != id);
    self.subscribers.len() != before
  }

  pub fn emit(&mut self, event: &E) {
    for (_, subscriber) in self.subscribers.iter_mut() {
      subscriber(event);
    }
  }
}

/// Lifecycle notifications published by [`crate::Compiler`].
#[derive(Clone, Debug, PartialEq)]
pub enum CompilerEvent {
  LoadingCompiler {
    url: String,
    mode: ExecutionMode,
  },
  CompilerLoaded {
    version: String,
  },
  CompilationStarted,
  /// `source` is `None` only for transport failures that cannot be tied to a job.
  CompilationFinished {
    success: bool,
    result: CompilationResult,
    source: Option<SourceContext>,
  },
  CompilationDuration {
    elapsed_ms: u64,
  },
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  #[test]
  fn delivers_in_registration_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::<u32>::new();
    for label in ["first", "second"] {
      let seen = Arc::clone(&seen);
      bus.subscribe(move |value| seen.lock().unwrap().push(format!("{label}:{value}")));
    }
    bus.emit(&7);
    assert_eq!(*seen.lock().unwrap(), vec!["first:7", "second:7"]);
  }

  #[test]
  fn unsubscribed_listeners_stop_receiving() {
    let count = Arc::new(Mutex::new(0));
    let mut bus = EventBus::<()>::new();
    let id = {
      let count = Arc::clone(&count);
      bus.subscribe(move |_| *count.lock().unwrap() += 1)
    };
    bus.emit(&());
    assert!(bus.unsubscribe(id));
    assert!(!bus.unsubscribe(id));
    bus.emit(&());
    assert_eq!(*count.lock().unwrap(), 1);
  }
}

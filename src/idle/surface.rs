//! Activity surface: where qualifying input events come from.
//!
//! The detector only needs `subscribe(event, handler) -> unsubscribe`, so any
//! input source (a terminal, a test harness, a UI bridge) can drive it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tracing::trace;

/// A user input event type that counts as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputEvent {
    MouseDown,
    MouseMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
    Wheel,
}

impl InputEvent {
    /// Events recognised when none are configured.
    pub const DEFAULT: [InputEvent; 7] = [
        Self::MouseDown,
        Self::MouseMove,
        Self::KeyPress,
        Self::Scroll,
        Self::TouchStart,
        Self::Click,
        Self::Wheel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MouseDown => "mousedown",
            Self::MouseMove => "mousemove",
            Self::KeyPress => "keypress",
            Self::Scroll => "scroll",
            Self::TouchStart => "touchstart",
            Self::Click => "click",
            Self::Wheel => "wheel",
        }
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::DEFAULT
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown input event: {s}"))
    }
}

/// Callback invoked for each qualifying event.
pub type ActivityHandler = Arc<dyn Fn(InputEvent) + Send + Sync>;

/// Handle returned by [`ActivitySurface::subscribe`].
///
/// Detaches the listener when dropped or when [`Subscription::unsubscribe`] is called.
#[must_use = "dropping a subscription detaches the listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// Capability for listening to user input.
pub trait ActivitySurface: Send + Sync {
    /// Attach `handler` to `event`. The listener stays attached until the
    /// returned subscription is dropped.
    fn subscribe(&self, event: InputEvent, handler: ActivityHandler) -> Subscription;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_event: HashMap<InputEvent, Vec<(u64, ActivityHandler)>>,
}

/// In-process activity surface: input sources call [`ActivityHub::emit`].
#[derive(Clone, Default)]
pub struct ActivityHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl ActivityHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch an event to every listener attached to it.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, event: InputEvent) -> usize {
        // Handlers run without the lock held so they may (un)subscribe.
        let handlers: Vec<ActivityHandler> = self
            .lock()
            .by_event
            .get(&event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!("Dispatching {} to {} listener(s)", event, handlers.len());
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Total number of attached listeners across all events.
    pub fn listener_count(&self) -> usize {
        self.lock().by_event.values().map(Vec::len).sum()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActivitySurface for ActivityHub {
    fn subscribe(&self, event: InputEvent, handler: ActivityHandler) -> Subscription {
        let id = {
            let mut listeners = self.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners
                .by_event
                .entry(event)
                .or_default()
                .push((id, handler));
            id
        };

        let weak: Weak<Mutex<Listeners>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            let Some(listeners) = weak.upgrade() else {
                return;
            };
            let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(list) = listeners.by_event.get_mut(&event) {
                list.retain(|(existing, _)| *existing != id);
                if list.is_empty() {
                    listeners.by_event.remove(&event);
                }
            }
        })
    }
}

impl fmt::Debug for ActivityHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

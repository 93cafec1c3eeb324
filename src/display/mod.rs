//! Attract-mode display controller.
//!
//! Two modes. Dormant: the user is active and the overlay is hidden.
//! Rotating: the idle detector fired, the overlay is up and cycles through
//! the feed's items on a fixed interval. Any qualifying input returns to
//! Dormant.

pub mod rotation;
pub mod terminal;
pub mod view;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use rotation::RotationState;
pub use terminal::TerminalRenderer;
pub use view::{Renderer, Slide, View, compose};

use crate::config::DisplayConfig;
use crate::feed::ItemFeed;
use crate::idle::{ActivitySurface, IdleDetector, IdleHooks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Idle,
    Active,
}

/// Requests a manual refetch from a running controller.
#[derive(Debug, Clone)]
pub struct RetryHandle(mpsc::UnboundedSender<()>);

impl RetryHandle {
    pub fn retry(&self) {
        let _ = self.0.send(());
    }
}

/// Composes the idle detector and the item feed into attract mode.
pub struct DisplayController<R: Renderer> {
    config: DisplayConfig,
    surface: Arc<dyn ActivitySurface>,
    feed: ItemFeed,
    renderer: R,
    retry_tx: mpsc::UnboundedSender<()>,
    retry_rx: mpsc::UnboundedReceiver<()>,
}

impl<R: Renderer> DisplayController<R> {
    pub fn new(
        config: DisplayConfig,
        surface: Arc<dyn ActivitySurface>,
        feed: ItemFeed,
        renderer: R,
    ) -> Self {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        Self {
            config,
            surface,
            feed,
            renderer,
            retry_tx,
            retry_rx,
        }
    }

    pub fn retry_handle(&self) -> RetryHandle {
        RetryHandle(self.retry_tx.clone())
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// On return the idle timer, rotation timer and activity listeners are
    /// released and the feed ignores any fetch still in flight.
    pub async fn run(self, shutdown: CancellationToken) {
        let Self {
            config,
            surface,
            feed,
            mut renderer,
            retry_tx: _retry_tx,
            mut retry_rx,
        } = self;

        let (transition_tx, mut transitions) = mpsc::unbounded_channel();
        let hooks = IdleHooks::new()
            .on_idle({
                let tx = transition_tx.clone();
                move || {
                    let _ = tx.send(Transition::Idle);
                }
            })
            .on_active(move || {
                let _ = transition_tx.send(Transition::Active);
            });
        let detector = IdleDetector::start(&config.idle(), surface, hooks);

        let mut feed_rx = feed.subscribe();
        let mut rotation: Option<RotationState> = None;
        let mut ticker: Option<Interval> = None;
        let mut last_view = View::Hidden;

        if config.prefetch {
            debug!("Prefetching items while dormant");
            spawn_refetch(&feed);
        }

        info!("Display controller running");

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                Some(transition) = transitions.recv() => match transition {
                    Transition::Idle => {
                        let count = feed_rx.borrow().items.len();
                        info!("Entering attract mode ({} item(s) held)", count);
                        rotation = Some(RotationState::new(count));
                        ticker = Some(rotation_ticker(&config));
                        if count == 0 {
                            spawn_refetch(&feed);
                        }
                    }
                    Transition::Active => {
                        info!("Leaving attract mode");
                        rotation = None;
                        ticker = None;
                    }
                },

                Some(()) = retry_rx.recv() => {
                    debug!("Manual retry requested");
                    spawn_refetch(&feed);
                }

                Ok(()) = feed_rx.changed() => {
                    if let Some(ref mut rotation) = rotation {
                        rotation.resize(feed_rx.borrow().items.len());
                    }
                }

                () = next_tick(&mut ticker) => {
                    if let Some(ref mut rotation) = rotation {
                        rotation.advance();
                        debug!("Rotated to {:?}", rotation.current_index());
                    }
                }
            }

            let view = {
                let state = feed_rx.borrow_and_update();
                compose(rotation.as_ref(), &state)
            };
            if view != last_view {
                renderer.render(&view);
                last_view = view;
            }
        }

        drop(detector);
        feed.close();
        if last_view != View::Hidden {
            renderer.render(&View::Hidden);
        }
        info!("Display controller stopped");
    }
}

fn rotation_ticker(config: &DisplayConfig) -> Interval {
    let period = config.rotation_interval();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn spawn_refetch(feed: &ItemFeed) {
    // Detached; the feed ignores the result once closed.
    drop(feed.spawn_refetch());
}

//! Idle/active state machine.
//!
//! Two phases, `Active` and `Idle`. Qualifying input moves to `Active` and
//! re-arms a single timer; the timer expiring moves to `Idle`. Pausing or
//! disabling cancels the timer and detaches listeners, so the detector cannot
//! go idle on its own until it is resumed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::surface::{ActivityHandler, ActivitySurface, InputEvent, Subscription};

/// Idle detector settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    /// Quiet period after which the detector goes idle.
    pub timeout: Duration,

    /// Input events that count as activity.
    pub events: Vec<InputEvent>,

    /// Whether detection runs at all.
    pub enabled: bool,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            events: InputEvent::DEFAULT.to_vec(),
            enabled: true,
        }
    }
}

/// Detector phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Idle,
}

/// Point-in-time view of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityState {
    pub last_activity_at: Instant,
    pub idle: bool,
    pub paused: bool,
}

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Transition callbacks.
#[derive(Clone, Default)]
pub struct IdleHooks {
    on_idle: Option<Hook>,
    on_active: Option<Hook>,
}

impl IdleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once each time the quiet period elapses.
    #[must_use]
    pub fn on_idle(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_idle = Some(Arc::new(f));
        self
    }

    /// Called once on the first qualifying event after going idle.
    #[must_use]
    pub fn on_active(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_active = Some(Arc::new(f));
        self
    }

    fn fire_idle(&self) {
        if let Some(f) = &self.on_idle {
            f();
        }
    }

    fn fire_active(&self) {
        if let Some(f) = &self.on_active {
            f();
        }
    }
}

struct Machine {
    phase: Phase,
    last_activity_at: Instant,
    enabled: bool,
    paused: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every cancellation so a timer that already woke up can tell
    /// it was superseded.
    generation: u64,
    subscriptions: Vec<Subscription>,
}

impl Machine {
    fn new(enabled: bool) -> Self {
        Self {
            phase: Phase::Active,
            last_activity_at: Instant::now(),
            enabled,
            paused: false,
            timer: None,
            generation: 0,
            subscriptions: Vec::new(),
        }
    }

    /// Timers and listeners are live only in this condition.
    fn armed(&self) -> bool {
        self.enabled && !self.paused
    }

    /// Returns true when this ends an idle period.
    fn record_activity(&mut self, now: Instant) -> bool {
        self.last_activity_at = now;
        let was_idle = self.phase == Phase::Idle;
        self.phase = Phase::Active;
        was_idle
    }

    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Returns true when this starts an idle period.
    fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.armed() || self.phase == Phase::Idle {
            return false;
        }
        self.timer = None;
        self.phase = Phase::Idle;
        true
    }
}

struct Shared {
    timeout: Duration,
    events: Vec<InputEvent>,
    surface: Arc<dyn ActivitySurface>,
    hooks: IdleHooks,
    /// Runtime the timer runs on; activity may arrive from any thread.
    runtime: Handle,
    machine: Mutex<Machine>,
}

impl Shared {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(self: &Arc<Self>) {
        let resumed = {
            let mut machine = self.machine();
            machine.cancel_timer();
            machine.record_activity(Instant::now())
        };

        if resumed {
            info!("Activity detected, leaving idle");
            self.hooks.fire_active();
        }

        self.arm();
    }

    fn arm(self: &Arc<Self>) {
        let mut machine = self.machine();
        if !machine.armed() {
            return;
        }

        machine.cancel_timer();
        let generation = machine.generation;
        let weak = Arc::downgrade(self);
        let timeout = self.timeout;

        trace!("Idle timer armed for {:?}", timeout);
        machine.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire(generation);
            }
        }));
    }

    fn expire(&self, generation: u64) {
        let went_idle = self.machine().expire(generation);
        if went_idle {
            info!("No activity for {:?}, going idle", self.timeout);
            self.hooks.fire_idle();
        }
    }

    fn attach(self: &Arc<Self>, machine: &mut Machine) {
        if !machine.armed() || !machine.subscriptions.is_empty() {
            return;
        }

        for &event in &self.events {
            let weak = Arc::downgrade(self);
            let handler: ActivityHandler = Arc::new(move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.reset();
                }
            });
            machine
                .subscriptions
                .push(self.surface.subscribe(event, handler));
        }
        debug!("Attached {} activity listener(s)", machine.subscriptions.len());
    }

    /// Cancel the timer and take the listeners so they can be dropped
    /// after the machine lock is released.
    fn quiesce(machine: &mut Machine) -> Vec<Subscription> {
        machine.cancel_timer();
        std::mem::take(&mut machine.subscriptions)
    }
}

/// Watches an [`ActivitySurface`] and reports idle/active transitions.
///
/// Must be created inside a tokio runtime. Dropping the detector cancels its
/// timer and detaches every listener.
pub struct IdleDetector {
    shared: Arc<Shared>,
}

impl IdleDetector {
    /// Start watching `surface`.
    pub fn start(config: &IdleConfig, surface: Arc<dyn ActivitySurface>, hooks: IdleHooks) -> Self {
        let mut events = config.events.clone();
        events.sort_by_key(|e| e.as_str());
        events.dedup();

        let shared = Arc::new(Shared {
            timeout: config.timeout,
            events,
            surface,
            hooks,
            runtime: Handle::current(),
            machine: Mutex::new(Machine::new(config.enabled)),
        });

        if config.enabled {
            {
                let mut machine = shared.machine();
                shared.attach(&mut machine);
            }
            shared.reset();
        }

        info!(
            "Idle detector started (timeout={:?}, enabled={})",
            config.timeout, config.enabled
        );
        Self { shared }
    }

    pub fn is_idle(&self) -> bool {
        self.shared.machine().phase == Phase::Idle
    }

    pub fn phase(&self) -> Phase {
        self.shared.machine().phase
    }

    pub fn state(&self) -> ActivityState {
        let machine = self.shared.machine();
        ActivityState {
            last_activity_at: machine.last_activity_at,
            idle: machine.phase == Phase::Idle,
            paused: machine.paused,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.machine().enabled
    }

    /// Treat now as fresh activity.
    ///
    /// Fires `on_active` if idle, then re-arms the timer unless paused or disabled.
    pub fn reset(&self) {
        self.shared.reset();
    }

    /// Suppress idle transitions until [`IdleDetector::resume`].
    ///
    /// The current phase is left unchanged.
    pub fn pause(&self) {
        let detached = {
            let mut machine = self.shared.machine();
            machine.paused = true;
            Shared::quiesce(&mut machine)
        };
        debug!("Idle detector paused");
        drop(detached);
    }

    /// Clear the pause and treat the resume as fresh activity.
    pub fn resume(&self) {
        {
            let mut machine = self.shared.machine();
            machine.paused = false;
            self.shared.attach(&mut machine);
        }
        debug!("Idle detector resumed");
        self.shared.reset();
    }

    /// Enable or disable detection.
    ///
    /// Disabling while idle keeps the idle phase without firing `on_active`;
    /// re-enabling behaves like [`IdleDetector::resume`].
    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.shared.machine().enabled = true;
            self.resume();
            return;
        }

        let detached = {
            let mut machine = self.shared.machine();
            machine.enabled = false;
            Shared::quiesce(&mut machine)
        };
        debug!("Idle detector disabled");
        drop(detached);
    }
}

impl Drop for IdleDetector {
    fn drop(&mut self) {
        let detached = Shared::quiesce(&mut self.shared.machine());
        drop(detached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idle::surface::ActivityHub;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    const TIMEOUT: Duration = Duration::from_millis(1000);

    struct Harness {
        hub: ActivityHub,
        idle: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        detector: IdleDetector,
    }

    fn start(enabled: bool) -> Harness {
        start_with(TIMEOUT, enabled)
    }

    fn start_with(timeout: Duration, enabled: bool) -> Harness {
        let hub = ActivityHub::new();
        let idle = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));

        let hooks = IdleHooks::new()
            .on_idle({
                let idle = Arc::clone(&idle);
                move || {
                    idle.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_active({
                let active = Arc::clone(&active);
                move || {
                    active.fetch_add(1, Ordering::SeqCst);
                }
            });

        let config = IdleConfig {
            timeout,
            enabled,
            ..Default::default()
        };
        let detector = IdleDetector::start(&config, Arc::new(hub.clone()), hooks);

        Harness {
            hub,
            idle,
            active,
            detector,
        }
    }

    impl Harness {
        fn idle_count(&self) -> usize {
            self.idle.load(Ordering::SeqCst)
        }

        fn active_count(&self) -> usize {
            self.active.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_within_timeout_never_goes_idle() {
        let h = start(true);

        for _ in 0..20 {
            sleep(Duration::from_millis(900)).await;
            h.hub.emit(InputEvent::MouseMove);
        }

        assert_eq!(h.idle_count(), 0);
        assert!(!h.detector.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_goes_idle_exactly_once() {
        let h = start(true);

        sleep(Duration::from_millis(999)).await;
        assert_eq!(h.idle_count(), 0);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(h.idle_count(), 1);
        assert!(h.detector.is_idle());

        sleep(Duration::from_secs(30)).await;
        assert_eq!(h.idle_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_after_idle_fires_active_and_rearms() {
        let h = start(true);

        sleep(Duration::from_millis(1001)).await;
        assert!(h.detector.is_idle());

        h.hub.emit(InputEvent::KeyPress);
        assert_eq!(h.active_count(), 1);
        assert!(!h.detector.is_idle());

        // A second event while active is not another transition.
        h.hub.emit(InputEvent::KeyPress);
        assert_eq!(h.active_count(), 1);

        sleep(Duration::from_millis(999)).await;
        assert_eq!(h.idle_count(), 1);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(h.idle_count(), 2);
    }

    #[tokio::test]
    async fn test_activity_from_another_thread_rearms() {
        let h = start_with(Duration::from_millis(100), true);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(h.idle_count(), 1);

        // Input sources such as a stdin reader live outside the runtime.
        let hub = h.hub.clone();
        let emitted = std::thread::spawn(move || hub.emit(InputEvent::KeyPress))
            .join()
            .expect("emitting thread panicked");
        assert_eq!(emitted, 1);
        assert_eq!(h.active_count(), 1);
        assert!(!h.detector.is_idle());

        sleep(Duration::from_millis(300)).await;
        assert_eq!(h.idle_count(), 2);
        assert!(h.detector.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_events_schedules_one_timer() {
        let h = start(true);

        for event in InputEvent::DEFAULT {
            h.hub.emit(event);
        }
        h.hub.emit(InputEvent::Click);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.idle_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_suppresses_idle_until_resume() {
        let h = start(true);
        assert_eq!(h.hub.listener_count(), InputEvent::DEFAULT.len());

        h.detector.pause();
        assert!(h.detector.state().paused);
        assert_eq!(h.hub.listener_count(), 0);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.idle_count(), 0);
        assert!(!h.detector.is_idle());

        h.detector.resume();
        assert!(!h.detector.state().paused);
        assert_eq!(h.hub.listener_count(), InputEvent::DEFAULT.len());

        sleep(Duration::from_millis(999)).await;
        assert_eq!(h.idle_count(), 0);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(h.idle_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_keeps_idle_phase() {
        let h = start(true);
        sleep(Duration::from_millis(1001)).await;
        assert!(h.detector.is_idle());

        h.detector.pause();
        assert!(h.detector.is_idle());
        assert_eq!(h.active_count(), 0);

        h.detector.resume();
        assert!(!h.detector.is_idle());
        assert_eq!(h.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_while_idle_stays_idle_silently() {
        let h = start(true);
        sleep(Duration::from_millis(1001)).await;
        assert!(h.detector.is_idle());

        h.detector.set_enabled(false);
        assert!(!h.detector.is_enabled());
        assert!(h.detector.is_idle());
        assert_eq!(h.active_count(), 0);
        assert_eq!(h.hub.listener_count(), 0);

        h.detector.set_enabled(true);
        assert_eq!(h.active_count(), 1);
        assert!(!h.detector.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_cycles_keep_listeners_balanced() {
        let h = start(true);
        let expected = InputEvent::DEFAULT.len();

        for _ in 0..10 {
            h.detector.set_enabled(false);
            assert_eq!(h.hub.listener_count(), 0);
            h.detector.set_enabled(true);
            assert_eq!(h.hub.listener_count(), expected);
        }

        h.detector.pause();
        h.detector.pause();
        h.detector.resume();
        h.detector.resume();
        assert_eq!(h.hub.listener_count(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_at_start_never_idles() {
        let h = start(false);
        assert_eq!(h.hub.listener_count(), 0);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.idle_count(), 0);

        h.detector.set_enabled(true);
        sleep(Duration::from_millis(1001)).await;
        assert_eq!(h.idle_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_listeners_and_timer() {
        let h = start(true);
        let idle = Arc::clone(&h.idle);
        let hub = h.hub.clone();

        drop(h.detector);
        assert_eq!(hub.listener_count(), 0);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(idle.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_records_last_activity() {
        let h = start(true);
        let before = h.detector.state().last_activity_at;

        sleep(Duration::from_millis(500)).await;
        h.detector.reset();

        let after = h.detector.state().last_activity_at;
        assert_eq!(after - before, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_events_attach_once() {
        let hub = ActivityHub::new();
        let config = IdleConfig {
            timeout: TIMEOUT,
            events: vec![InputEvent::Click, InputEvent::Click, InputEvent::Wheel],
            enabled: true,
        };
        let _detector = IdleDetector::start(&config, Arc::new(hub.clone()), IdleHooks::new());
        assert_eq!(hub.listener_count(), 2);
    }

    #[test]
    fn test_superseded_timer_does_not_expire() {
        let mut machine = Machine::new(true);
        let stale = machine.generation;
        machine.cancel_timer();

        assert!(!machine.expire(stale));
        assert_eq!(machine.phase, Phase::Active);

        let current = machine.generation;
        assert!(machine.expire(current));
        assert_eq!(machine.phase, Phase::Idle);
        assert!(!machine.expire(current));
    }

    #[test]
    fn test_paused_machine_does_not_expire() {
        let mut machine = Machine::new(true);
        machine.paused = true;
        assert!(!machine.expire(machine.generation));
    }
}

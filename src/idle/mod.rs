//! Idle detection module.
//!
//! Provides the activity surface abstraction and the idle/active state machine
//! that drives attract mode.

pub mod detector;
pub mod surface;

pub use detector::{ActivityState, IdleConfig, IdleDetector, IdleHooks, Phase};
pub use surface::{ActivityHandler, ActivityHub, ActivitySurface, InputEvent, Subscription};

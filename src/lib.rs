//! kiosk-attract - Attract-mode overlay for an idle kiosk.
//!
//! A caching endpoint in front of an upstream commits API, a feed client that
//! calls it, an idle detector and a display controller that rotates through
//! the fetched items while nobody is using the device.

pub mod api;
pub mod cache;
pub mod config;
pub mod display;
pub mod domain;
pub mod feed;
pub mod idle;
pub mod server;
pub mod upstream;

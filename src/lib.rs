// Library surface for headless/integration tests and reuse.
// The binary only adds terminal setup and the event loop.
pub mod app;
pub mod app_dirs;
pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod migration;
pub mod model;
pub mod runtime;
pub mod session;
pub mod stats;
pub mod storage;
pub mod ui;
pub mod util;

pub use app::{App, AppState};

/// Milliseconds between UI ticks (toast expiry, redraw)
pub const TICK_RATE_MS: u64 = 100;

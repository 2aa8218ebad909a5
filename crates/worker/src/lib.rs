//! Animation worker: environment wiring and the renderer boundary.
//!
//! ## Components
//!
//! - `config` - environment-derived settings for broker, store, and renderer
//! - `render` - stages task inputs on disk and shells out to the renderer
//!
//! The consume loop itself lives in `motionforge-infra`; this crate only
//! assembles it.

pub mod config;
pub mod render;

pub use config::{Config, Device};
pub use render::RenderExecutor;

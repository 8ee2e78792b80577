//! sc-audio: Soundcard output engine
//!
//! Owns the app buffer ring, the tempo-to-buffer timing tables and the
//! transport counters, and drives a platform [`Backend`] (cpal hosts or the
//! null sink) one buffer at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ SoundcardEngine │────▶│ RingBufferPool │     │   Backend    │
//! │                 │     │ (app buffers)  │     │              │
//! │ - presets       │     └────────────────┘     │ - open       │
//! │ - play_step     │──────── ring slots ───────▶│ - write      │
//! │ - transport     │     ┌────────────────┐     │ - close      │
//! │                 │────▶│  TaskLauncher  │     └──────────────┘
//! └─────────────────┘     │ Tic / Clear /  │
//!                         │ SwitchBuffer   │
//!                         └────────────────┘
//! ```

mod backend;
mod engine;
mod error;
pub mod pack;
mod pool;
mod tasks;
mod timing;
mod transport;

pub use backend::*;
pub use engine::*;
pub use error::*;
pub use pack::NativeLayout;
pub use pool::*;
pub use tasks::*;
pub use timing::*;
pub use transport::*;

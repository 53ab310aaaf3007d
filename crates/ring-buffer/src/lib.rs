//! Rolling Windows
//!
//! Fixed-capacity FIFO buffers holding the most recent samples of a metric
//! (FPS, processing time, confidence). Inserting into a full window evicts
//! exactly the oldest sample.

mod buffer;

pub use buffer::{RollingWindow, DEFAULT_CAPACITY};

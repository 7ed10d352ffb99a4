//! # Double-Buffered Output
//!
//! ```text
//! Frame N:
//!   Passes write survivors into Set A
//!   Draw reads Set B (frame N-1 output)
//!
//! Frame N+1:
//!   PUBLISH (atomic index flip)
//!   Passes write survivors into Set B
//!   Draw reads Set A
//! ```
//!
//! A set is never written while a read handle on it is alive. The writer
//! gets an error instead of waiting.

mod double_buffer;

pub use double_buffer::{BufferSetId, DoubleBuffered, ReadHandle, Roles, WriteHandle};

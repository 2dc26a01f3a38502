//! Common types used across Periscope components
//!
//! - `address` - remote address handle and validity rules
//! - `matrix` - raw 4x4 matrices as laid out in the target and the decomposed view matrix
//! - `camera` - camera roles, resolved camera set and debug snapshot
//! - `geometry` - viewport rectangle and on-screen checks
//! - `session` - session lifecycle signals

pub mod address;
pub mod camera;
pub mod geometry;
pub mod matrix;
pub mod session;

pub use address::*;
pub use camera::*;
pub use geometry::*;
pub use matrix::*;
pub use session::*;

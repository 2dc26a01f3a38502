//! Periscope Core Library
//!
//! Batched remote-memory writes, camera acquisition and view projection for a
//! separate target process. The memory transport is consumed through the traits
//! in [`traits`]; everything else is built on top of them.

pub mod camera;
pub mod context;
pub mod feature;
pub mod remote;
pub mod scatter;
pub mod session;
pub mod sim;
pub mod toggle;
pub mod traits;
pub mod writes;

pub use camera::{
    validate_view_matrix, AcquisitionState, CameraAcquisition, CameraRegistry, MatrixRejection,
    ViewSnapshot, ViewState,
};
pub use context::Periscope;
pub use feature::{FeatureContext, FeatureGate, GateOutcome, MemWriteFeature, WriteSwitches};
pub use periscope_common::{Error, Result};
pub use scatter::{ReadBatch, ScatterResults, ScatterWriteHandle};
pub use session::{SessionHub, SessionListener};
pub use toggle::{StateToggle, TogglePayload};
pub use traits::*;
pub use writes::{TickReport, WriteMultiplexer};

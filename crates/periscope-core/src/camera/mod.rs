//! Camera acquisition and view projection

mod acquisition;
mod registry;
mod validate;
mod view;

pub use acquisition::{AcquisitionState, CameraAcquisition};
pub use registry::CameraRegistry;
pub use validate::{validate_view_matrix, MatrixRejection};
pub use view::{project, ViewSnapshot, ViewState};

//! Camera types

use super::address::RemoteAddress;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera roles the acquisition search looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraRole {
    /// Always-present first-person camera
    FirstPerson,
    /// Scope camera, active only while looking through an optic
    Optic,
}

impl CameraRole {
    /// Classify a camera object name (case-insensitive substring match)
    ///
    /// "fps" is checked first, so a name containing both markers is the
    /// first-person camera.
    pub fn classify(name: &str) -> Option<CameraRole> {
        let lower = name.to_ascii_lowercase();
        if !lower.contains("camera") {
            return None;
        }
        if lower.contains("fps") {
            Some(CameraRole::FirstPerson)
        } else if lower.contains("optic") {
            Some(CameraRole::Optic)
        } else {
            None
        }
    }
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraRole::FirstPerson => write!(f, "fps"),
            CameraRole::Optic => write!(f, "optic"),
        }
    }
}

/// Camera addresses resolved by the acquisition machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSet {
    pub fps: RemoteAddress,
    pub optic: RemoteAddress,
    /// Set once the FPS camera's matrix passed validation
    pub initialized: bool,
}

impl CameraSet {
    pub fn new(fps: RemoteAddress, optic: RemoteAddress) -> Self {
        Self {
            fps,
            optic,
            initialized: false,
        }
    }

    pub fn get(&self, role: CameraRole) -> RemoteAddress {
        match role {
            CameraRole::FirstPerson => self.fps,
            CameraRole::Optic => self.optic,
        }
    }

    /// Both roles found
    pub fn is_complete(&self) -> bool {
        self.fps.is_valid() && self.optic.is_valid()
    }

    /// Camera that supplies the view matrix: optic when scoped and known, else FPS
    pub fn view_camera(&self, scoped: bool) -> Option<RemoteAddress> {
        if scoped && self.optic.is_valid() {
            Some(self.optic)
        } else {
            self.fps.valid()
        }
    }

    pub fn clear(&mut self) {
        *self = CameraSet::default();
    }
}

/// Point-in-time view of camera and projection state for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraDebugSnapshot {
    pub ready: bool,
    pub is_ads: bool,
    pub is_scoped: bool,
    pub fps_camera: RemoteAddress,
    pub optic_camera: RemoteAddress,
    pub active_camera: RemoteAddress,
    pub fov: f32,
    pub aspect: f32,
    pub zoom_level: f32,
    pub m14: f32,
    pub m24: f32,
    pub m44: f32,
    /// Normalized right basis, tiny components clamped to zero
    pub right: [f32; 3],
    /// Normalized up basis, tiny components clamped to zero
    pub up: [f32; 3],
    pub translation: [f32; 3],
    pub viewport_width: f32,
    pub viewport_height: f32,
}

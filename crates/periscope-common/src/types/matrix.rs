//! Matrix types
//!
//! `RawMatrix` mirrors the 4x4 row-major float block stored in the target.
//! `ViewMatrix` is the decomposed form the projector works with.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Row-major 4x4 float matrix, `mRC` = row R, column C
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct RawMatrix {
    pub m11: f32,
    pub m12: f32,
    pub m13: f32,
    pub m14: f32,
    pub m21: f32,
    pub m22: f32,
    pub m23: f32,
    pub m24: f32,
    pub m31: f32,
    pub m32: f32,
    pub m33: f32,
    pub m34: f32,
    pub m41: f32,
    pub m42: f32,
    pub m43: f32,
    pub m44: f32,
}

impl RawMatrix {
    /// Size of the block in target memory
    pub const SIZE: usize = std::mem::size_of::<RawMatrix>();

    pub const IDENTITY: RawMatrix = RawMatrix::from_rows([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    pub const fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self {
            m11: rows[0][0],
            m12: rows[0][1],
            m13: rows[0][2],
            m14: rows[0][3],
            m21: rows[1][0],
            m22: rows[1][1],
            m23: rows[1][2],
            m24: rows[1][3],
            m31: rows[2][0],
            m32: rows[2][1],
            m33: rows[2][2],
            m34: rows[2][3],
            m41: rows[3][0],
            m42: rows[3][1],
            m43: rows[3][2],
            m44: rows[3][3],
        }
    }

    pub fn from_slice(values: &[f32; 16]) -> Self {
        bytemuck::cast(*values)
    }

    pub fn to_array(&self) -> [f32; 16] {
        bytemuck::cast(*self)
    }

    /// Translation row (M41, M42, M43)
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m41, self.m42, self.m43)
    }

    /// Diagonal marker components (M11, M22, M33, M44)
    pub fn diagonal(&self) -> [f32; 4] {
        [self.m11, self.m22, self.m33, self.m44]
    }
}

/// View matrix decomposed into projection basis vectors
///
/// The basis is read down the columns of the raw block: `right` is column 1,
/// `up` column 2 and `translation` column 4. `m14`/`m24` hold the raw
/// translation row terms M41/M42.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewMatrix {
    pub m44: f32,
    pub m14: f32,
    pub m24: f32,
    pub translation: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl ViewMatrix {
    pub fn identity() -> Self {
        Self::from_raw(&RawMatrix::IDENTITY)
    }

    pub fn from_raw(raw: &RawMatrix) -> Self {
        Self {
            m44: raw.m44,
            m14: raw.m41,
            m24: raw.m42,
            translation: Vec3::new(raw.m14, raw.m24, raw.m34),
            right: Vec3::new(raw.m11, raw.m21, raw.m31),
            up: Vec3::new(raw.m12, raw.m22, raw.m32),
        }
    }
}

impl Default for ViewMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<RawMatrix> for ViewMatrix {
    fn from(raw: RawMatrix) -> Self {
        Self::from_raw(&raw)
    }
}

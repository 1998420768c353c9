pub mod euler_angles;
pub mod mrp;
pub mod rotation_matrix;

use nalgebra::{Matrix3, Vector3};

pub mod prelude {
    pub use crate::euler_angles::*;
    pub use crate::mrp::*;
    pub use crate::rotation_matrix::*;
    pub use crate::{RotationTrait, tilde};
}

/// Trait defining rotation and transformation operations.
///
/// All rotations in this crate are stored as frame transformations, so
/// `transform` maps components in the base frame to components in the
/// rotated frame and `rotate` moves a vector within one frame.
pub trait RotationTrait {
    /// Rotates a vector by the rotation.
    ///
    /// # Arguments
    ///
    /// * `v` - The vector to be rotated.
    ///
    /// # Returns
    ///
    /// The rotated vector.
    fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64>;

    /// Transforms a vector by the rotation.
    ///
    /// # Arguments
    ///
    /// * `v` - The vector to be transformed, in base frame components.
    ///
    /// # Returns
    ///
    /// The same vector in rotated frame components.
    fn transform(&self, v: &Vector3<f64>) -> Vector3<f64>;

    fn inv(&self) -> Self;

    fn identity() -> Self;
}

/// Skew-symmetric cross product matrix, `tilde(a) * b == a.cross(&b)`.
pub fn tilde(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

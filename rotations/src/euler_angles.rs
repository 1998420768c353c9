use serde::{Deserialize, Serialize};

use crate::rotation_matrix::RotationMatrix;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EulerSequence {
    #[default]
    ZYX,
    ZXZ,
}

/// Euler angles applied in `sequence` order: `phi` first, `psi` last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub phi: f64,
    pub theta: f64,
    pub psi: f64,
    pub sequence: EulerSequence,
}

impl EulerAngles {
    pub fn new(phi: f64, theta: f64, psi: f64, sequence: EulerSequence) -> Self {
        Self {
            phi,
            theta,
            psi,
            sequence,
        }
    }
}

impl From<&EulerAngles> for RotationMatrix {
    fn from(angles: &EulerAngles) -> RotationMatrix {
        match angles.sequence {
            EulerSequence::ZYX => {
                RotationMatrix::m1(angles.psi)
                    * RotationMatrix::m2(angles.theta)
                    * RotationMatrix::m3(angles.phi)
            }
            EulerSequence::ZXZ => {
                RotationMatrix::m3(angles.psi)
                    * RotationMatrix::m1(angles.theta)
                    * RotationMatrix::m3(angles.phi)
            }
        }
    }
}

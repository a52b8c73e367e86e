// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Camera intrinsic parameters and their multi-resolution pyramid.

use crate::misc::type_aliases::{Float, Mat3};

/// Intrinsic parameters of a pinhole camera, without skew.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Intrinsics {
    /// Focal lengths `(fx, fy)` in pixels.
    pub focal: (Float, Float),
    /// Principal point `(cx, cy)` in pixels.
    pub principal_point: (Float, Float),
}

impl Intrinsics {
    /// Inverse of the calibration matrix,
    /// mapping homogeneous pixel coordinates to normalized image coordinates.
    #[rustfmt::skip]
    pub fn inverse_matrix(&self) -> Mat3 {
        let (fx, fy) = self.focal;
        let (cx, cy) = self.principal_point;
        Mat3::new(
            1.0 / fx, 0.0,      -cx / fx,
            0.0,      1.0 / fy, -cy / fy,
            0.0,      0.0,       1.0,
        )
    }

    /// Compute the intrinsics of all `n` levels of a pyramid, starting with this one.
    ///
    /// Focal lengths are halved at each level, while the principal point
    /// is always derived from the level 0 one to avoid drift,
    /// with pixel centers aligned on the 2x2 mean pyramid.
    #[allow(clippy::cast_precision_loss)]
    pub fn multi_res(self, n: usize) -> Vec<Intrinsics> {
        let (cx_0, cy_0) = self.principal_point;
        let mut focal = self.focal;
        let mut levels = Vec::with_capacity(n);
        for level in 0..n {
            let scale = (1_u32 << level) as Float;
            levels.push(Intrinsics {
                focal,
                principal_point: ((cx_0 + 0.5) / scale - 0.5, (cy_0 + 0.5) / scale - 0.5),
            });
            focal = (0.5 * focal.0, 0.5 * focal.1);
        }
        levels
    }
}

// TESTS #############################################################

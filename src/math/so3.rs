// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lie algebra/group functions for 3D rotations.
//!
//! Interesting reads:
//! - Sophus c++ library: <https://github.com/strasdat/Sophus>
//! - Ethan Eade course on Lie Groups for 2D and 3D transformations:
//!     - details: <http://ethaneade.com/lie.pdf>
//!     - summary: <http://ethaneade.com/lie_groups.pdf>

use nalgebra::{Quaternion, UnitQuaternion};
use std::f32::consts::PI;

use crate::misc::type_aliases::{Float, Mat3, Vec3};

/// Threshold for using Taylor series in computations.
pub const EPSILON_TAYLOR_SERIES: Float = 1e-2;
const EPSILON_TAYLOR_SERIES_2: Float = EPSILON_TAYLOR_SERIES * EPSILON_TAYLOR_SERIES;
const _1_6: Float = 1.0 / 6.0;
const _1_8: Float = 0.125;
const _1_12: Float = 1.0 / 12.0;
const _1_24: Float = 1.0 / 24.0;
const _1_48: Float = 1.0 / 48.0;
const _1_120: Float = 1.0 / 120.0;
const _1_720: Float = 1.0 / 720.0;

/// Hat operator.
/// Goes from so3 parameterization to so3 element (skew-symmetric matrix).
#[rustfmt::skip]
pub fn hat(w: Vec3) -> Mat3 {
    Mat3::new(
         0.0,  -w.z,   w.y,
         w.z,   0.0,  -w.x,
        -w.y,   w.x,   0.0,
    )
}

/// Squared hat operator (`hat_2(w) == hat(w) * hat(w)`).
/// Result is a symmetric matrix.
#[rustfmt::skip]
pub fn hat_2(w: Vec3) -> Mat3 {
    let w11 = w.x * w.x;
    let w12 = w.x * w.y;
    let w13 = w.x * w.z;
    let w22 = w.y * w.y;
    let w23 = w.y * w.z;
    let w33 = w.z * w.z;
    Mat3::new(
        -w22 - w33,     w12,           w13,
         w12,          -w11 - w33,     w23,
         w13,           w23,          -w11 - w22,
    )
}

/// Compute the exponential map from Lie algebra so3 to Lie group SO3.
/// Goes from so3 parameterization to SO3 element (rotation).
pub fn exp(w: Vec3) -> UnitQuaternion<Float> {
    let theta_2 = w.norm_squared();
    let (real_factor, imag_factor) = if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        (1.0 - _1_8 * theta_2, 0.5 - _1_48 * theta_2) // TAYLOR
    } else {
        let theta = theta_2.sqrt();
        let half_theta = 0.5 * theta;
        (half_theta.cos(), half_theta.sin() / theta)
    };
    UnitQuaternion::from_quaternion(Quaternion::from_parts(real_factor, imag_factor * w))
}

/// Compute the logarithm map from the Lie group SO3 to the Lie algebra so3.
/// Inverse of the exponential map.
pub fn log(rotation: UnitQuaternion<Float>) -> Vec3 {
    let imag_vector = rotation.vector();
    let imag_norm_2 = imag_vector.norm_squared();
    let real_factor = rotation.scalar();
    if imag_norm_2 < EPSILON_TAYLOR_SERIES_2 {
        (2.0 / real_factor) * imag_vector // TAYLOR
    } else if real_factor.abs() < EPSILON_TAYLOR_SERIES {
        let imag_norm = imag_norm_2.sqrt();
        let alpha = real_factor.abs() / imag_norm;
        let theta = real_factor.signum() * (PI - 2.0 * alpha); // TAYLOR
        (theta / imag_norm) * imag_vector
    } else {
        let imag_norm = imag_norm_2.sqrt();
        let theta = 2.0 * (imag_norm / real_factor).atan();
        (theta / imag_norm) * imag_vector
    }
}

/// Left jacobian of SO3, the `V` matrix mapping the linear velocity
/// of a twist to the translation of its exponential.
pub fn left_jacobian(w: Vec3) -> Mat3 {
    let theta_2 = w.norm_squared();
    let (coef_omega, coef_omega_2) = if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        (0.5 - _1_24 * theta_2, _1_6 - _1_120 * theta_2) // TAYLOR
    } else {
        let theta = theta_2.sqrt();
        (
            (1.0 - theta.cos()) / theta_2,
            (theta - theta.sin()) / (theta * theta_2),
        )
    };
    Mat3::identity() + coef_omega * hat(w) + coef_omega_2 * hat_2(w)
}

/// Inverse of the left jacobian of SO3.
pub fn left_jacobian_inverse(w: Vec3) -> Mat3 {
    let theta_2 = w.norm_squared();
    let coef_omega_2 = if theta_2 < EPSILON_TAYLOR_SERIES_2 {
        _1_12 + _1_720 * theta_2 // TAYLOR
    } else {
        let theta = theta_2.sqrt();
        let half_theta = 0.5 * theta;
        (1.0 - half_theta * half_theta.cos() / half_theta.sin()) / theta_2
    };
    Mat3::identity() - 0.5 * hat(w) + coef_omega_2 * hat_2(w)
}

// TESTS #############################################################

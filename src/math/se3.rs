// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lie algebra/group functions for 3D rigid body motion.
//!
//! Twists are parameterized as `(v1, v2, v3, w1, w2, w3)`,
//! linear velocity first, like in Sophus.
//! This is also the ordering of the pose part of the initializer jacobians.

use nalgebra::Translation3;

use crate::math::so3;
use crate::misc::type_aliases::{Float, Iso3, Vec3, Vec6};

/// Parameterization of a twist (element of se3).
pub type Twist = Vec6;

/// Retrieve the linear velocity part of the twist parameterization.
pub fn linear_velocity(xi: Twist) -> Vec3 {
    xi.fixed_rows::<3>(0).into_owned()
}

/// Retrieve the angular velocity part of the twist parameterization.
pub fn angular_velocity(xi: Twist) -> Vec3 {
    xi.fixed_rows::<3>(3).into_owned()
}

/// Build a twist from its linear and angular velocity parts.
pub fn twist(v: Vec3, w: Vec3) -> Twist {
    Vec6::new(v.x, v.y, v.z, w.x, w.y, w.z)
}

/// Compute the exponential map from Lie algebra se3 to Lie group SE3.
/// Goes from se3 parameterization to SE3 element (rigid body motion).
pub fn exp(xi: Twist) -> Iso3 {
    let w = angular_velocity(xi);
    let translation = so3::left_jacobian(w) * linear_velocity(xi);
    Iso3::from_parts(Translation3::from(translation), so3::exp(w))
}

/// Compute the logarithm map from the Lie group SE3 to the Lie algebra se3.
/// Inverse of the exponential map.
pub fn log(iso: &Iso3) -> Twist {
    let w = so3::log(iso.rotation);
    let v = so3::left_jacobian_inverse(w) * iso.translation.vector;
    twist(v, w)
}

/// Left-multiply a rigid body motion by the exponential of a twist increment.
/// The rotation part is renormalized to keep it on the manifold.
pub fn left_compose(xi: Twist, motion: &Iso3) -> Iso3 {
    let mut composed = exp(xi) * motion;
    composed.rotation.renormalize_fast();
    composed
}

/// Squared norm of the translation part of a rigid body motion.
pub fn translation_norm_squared(motion: &Iso3) -> Float {
    motion.translation.vector.norm_squared()
}

// TESTS #############################################################

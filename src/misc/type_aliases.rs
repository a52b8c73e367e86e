// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Type aliases for common types used all over the code base.

use nalgebra as na;

/// At the moment, the library is focused on f32 computation.
pub type Float = f32;

/// A vector with three Float coordinates.
pub type Vec3 = na::Vector3<Float>;
/// A vector with six Float coordinates.
pub type Vec6 = na::Vector6<Float>;
/// A vector with eight Float coordinates (pose + affine brightness).
pub type Vec8 = na::SVector<Float, 8>;
/// A vector with nine Float coordinates (jacobian + residual).
pub type Vec9 = na::SVector<Float, 9>;
/// A vector with ten Float coordinates.
pub type Vec10 = na::SVector<Float, 10>;

/// A 3x3 matrix of Floats.
pub type Mat3 = na::Matrix3<Float>;
/// A 6x6 matrix of Floats.
pub type Mat6 = na::Matrix6<Float>;
/// An 8x8 matrix of Floats.
pub type Mat8 = na::SMatrix<Float, 8, 8>;
/// A 9x9 matrix of Floats.
pub type Mat9 = na::SMatrix<Float, 9, 9>;

/// A direct 3D isometry, also known as rigid body motion.
pub type Iso3 = na::Isometry3<Float>;

/// Type alias to easily spot vectors that are indexed over multi-resolution levels.
pub type Levels<T> = Vec<T>;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # Visual Odometry Init
//!
//! Photometric initialization of a monocular visual odometry.
//! From a reference frame and a stream of new frames, and without any prior
//! on the depths or the motion, it estimates the relative pose,
//! an affine brightness transfer and the inverse depths of a sparse set of points.
//!
//! The main entry point is the `core::init::coarse_initializer` module.

#![warn(missing_docs)]

pub mod core;
pub mod dataset;
pub mod math;
pub mod misc;

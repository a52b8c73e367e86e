// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Photometric initialization of a monocular odometry from two frames.

pub mod coarse_initializer;
pub mod lm_optimizer;
pub mod materialize;
pub mod neighbors;
pub mod point;
pub mod propagate;
pub mod regularize;
pub mod residual;

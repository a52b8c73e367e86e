// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Selection of the pixels seeding the initializer candidate points.

use nalgebra::DMatrix;

use crate::core::frame::LevelImage;

pub mod dso;

/// 0: not picked
/// n: picked, with a selector dependent type `n`
pub type Picked = u8;

/// Proposes candidate point locations in an image.
///
/// The initializer calls it once per pyramid level of a new reference frame,
/// with a target number of points for that level.
/// The returned map has the same shape as the image.
pub trait PixelSelector {
    /// Select approximately `nb_target` pixels of the image.
    fn select(&mut self, image: &LevelImage, nb_target: usize) -> DMatrix<Picked>;
}

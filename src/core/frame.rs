// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frames as consumed by the initializer:
//! multi-resolution images of `(intensity, gradient x, gradient y)` triples.

use nalgebra::DMatrix;

use crate::core::{gradient, multires};
use crate::misc::type_aliases::{Float, Levels, Vec3};

/// One pyramid level of a frame.
/// Matrices are indexed by `(row, column)`, that is `(y, x)`.
pub type LevelImage = DMatrix<Vec3>;

/// A frame with its image pyramid and exposure time.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Image pyramid, level 0 is the full resolution.
    pub levels: Levels<LevelImage>,
    /// Exposure time of the frame, or a non-positive value if unknown.
    pub exposure: Float,
}

impl Frame {
    /// Build a frame from already computed pyramid levels.
    pub fn new(levels: Levels<LevelImage>, exposure: Float) -> Self {
        Self { levels, exposure }
    }

    /// Build a frame from an 8 bits gray image.
    /// Levels are computed with a 2x2 mean pyramid and centered gradients.
    pub fn from_gray(img: &DMatrix<u8>, nb_levels: usize, exposure: Float) -> Self {
        let levels = multires::mean_pyramid(nb_levels, img)
            .iter()
            .map(|intensity| {
                let (gx, gy) = gradient::centered(intensity);
                DMatrix::from_fn(intensity.nrows(), intensity.ncols(), |i, j| {
                    Vec3::new(intensity[(i, j)], gx[(i, j)], gy[(i, j)])
                })
            })
            .collect();
        Self { levels, exposure }
    }

    /// Number of levels in the pyramid.
    pub fn nb_levels(&self) -> usize {
        self.levels.len()
    }

    /// `(width, height)` of a given level.
    pub fn size(&self, level: usize) -> (usize, usize) {
        let (nb_rows, nb_cols) = self.levels[level].shape();
        (nb_cols, nb_rows)
    }
}

/// Bilinear interpolation of the three channels of a pixel with floating point coordinates.
///
/// The caller guarantees that `0 <= x < width - 1` and `0 <= y < height - 1`.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn interpolate(image: &LevelImage, x: Float, y: Float) -> Vec3 {
    let u = x.floor();
    let v = y.floor();
    let (u_0, v_0) = (u as usize, v as usize);
    let a = x - u;
    let b = y - v;
    (1.0 - b) * (1.0 - a) * image[(v_0, u_0)]
        + b * (1.0 - a) * image[(v_0 + 1, u_0)]
        + (1.0 - b) * a * image[(v_0, u_0 + 1)]
        + b * a * image[(v_0 + 1, u_0 + 1)]
}

/// Bilinear interpolation of the intensity channel only.
///
/// Same preconditions than `interpolate`.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn interpolate_intensity(image: &LevelImage, x: Float, y: Float) -> Float {
    let u = x.floor();
    let v = y.floor();
    let (u_0, v_0) = (u as usize, v as usize);
    let a = x - u;
    let b = y - v;
    (1.0 - b) * (1.0 - a) * image[(v_0, u_0)].x
        + b * (1.0 - a) * image[(v_0 + 1, u_0)].x
        + (1.0 - b) * a * image[(v_0, u_0 + 1)].x
        + b * a * image[(v_0 + 1, u_0 + 1)].x
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;

    fn ramp_frame() -> Frame {
        let img = DMatrix::from_fn(16, 24, |i, j| (2 * j + i) as u8);
        Frame::from_gray(&img, 3, 1.0)
    }

    #[test]
    fn from_gray_builds_levels_with_gradients() {
        let frame = ramp_frame();
        assert_eq!(frame.nb_levels(), 3);
        assert_eq!(frame.size(0), (24, 16));
        assert_eq!(frame.size(2), (6, 4));
        let pixel = frame.levels[0][(5, 7)];
        assert_eq!(pixel, Vec3::new(19.0, 2.0, 1.0));
    }

    #[test]
    fn interpolation_is_exact_on_a_ramp() {
        let frame = ramp_frame();
        let value = interpolate(&frame.levels[0], 7.25, 5.5);
        approx::assert_relative_eq!(value.x, 2.0 * 7.25 + 5.5, epsilon = 1e-5);
        approx::assert_relative_eq!(value.y, 2.0, epsilon = 1e-5);
        approx::assert_relative_eq!(
            interpolate_intensity(&frame.levels[0], 7.25, 5.5),
            value.x,
            epsilon = 1e-5
        );
    }
}

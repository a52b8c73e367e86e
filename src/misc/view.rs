// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to visualize the initializer state.

use image::RgbImage;
use nalgebra::DMatrix;

use crate::core::frame::LevelImage;
use crate::core::init::point::CandidatePoint;
use crate::misc::interop;
use crate::misc::type_aliases::Float;

/// Create an RGB image of the gray reference image
/// with the points overimposed as 3x3 squares.
///
/// Good points are colored by their regularized inverse depth,
/// normalized such that the mean is 1, invalid points are black.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn idepth_image(reference: &LevelImage, points: &[CandidatePoint]) -> RgbImage {
    let mut rgb_mat: DMatrix<(u8, u8, u8)> = reference.map(|pixel| {
        let gray = pixel.x.max(0.0).min(255.0) as u8;
        (gray, gray, gray)
    });
    let (nb_rows, nb_cols) = rgb_mat.shape();
    let (nb_good, sum_ir) = points
        .iter()
        .filter(|p| p.is_good)
        .fold((0.0, 0.0), |(n, s), p| (n + 1.0, s + p.ir));
    let factor = if sum_ir > 0.0 { nb_good / sum_ir } else { 1.0 };
    for p in points {
        let color = if p.is_good {
            rainbow(p.ir * factor)
        } else {
            (0, 0, 0)
        };
        let x = (p.u + 0.5).floor().max(0.0) as usize;
        let y = (p.v + 0.5).floor().max(0.0) as usize;
        for j in x.saturating_sub(1)..(x + 2).min(nb_cols) {
            for i in y.saturating_sub(1)..(y + 2).min(nb_rows) {
                rgb_mat[(i, j)] = color;
            }
        }
    }
    interop::rgb_from_matrix(&rgb_mat)
}

/// Cyclic colormap going red, green, blue and back to red every 3 units.
/// Non positive values are white.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn rainbow(value: Float) -> (u8, u8, u8) {
    if !(value > 0.0) || !value.is_finite() {
        return (255, 255, 255);
    }
    let whole = value.floor();
    let frac = value - whole;
    let up = (255.0 * frac) as u8;
    let down = (255.0 * (1.0 - frac)) as u8;
    match (whole as u64) % 3 {
        0 => (down, up, 0),
        1 => (0, down, up),
        _ => (up, 0, down),
    }
}

// TESTS #############################################################

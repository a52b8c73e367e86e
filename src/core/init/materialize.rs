// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dense inverse depth maps built from the converged candidate points,
//! for the hand-off to a coarse tracker.

use nalgebra::DMatrix;

use crate::core::frame::LevelImage;
use crate::core::init::point::CandidatePoint;
use crate::misc::type_aliases::{Float, Levels};

/// Inverse depth of pixels without information.
pub const UNKNOWN_IDEPTH: Float = -1.0;

/// Pixels closer than this to the border are never emitted.
const MARGIN: usize = 2;

/// A pixel with a known inverse depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthPixel {
    /// Column.
    pub x: usize,
    /// Row.
    pub y: usize,
    /// Inverse depth.
    pub idepth: Float,
    /// Reference intensity.
    pub color: Float,
}

/// Inverse depth map of one level.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseDepth {
    /// Dense map indexed `(y, x)`, `UNKNOWN_IDEPTH` where unknown.
    pub idepth: DMatrix<Float>,
    /// Compact list of the known pixels, row-major order.
    pub pixels: Vec<DepthPixel>,
}

/// Neighbours used to fill a cell at a given dilation pass.
const DIAGONAL: [(isize, isize); 4] = [(1, 1), (-1, -1), (-1, 1), (1, -1)];
const AXIS_ALIGNED: [(isize, isize); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Build the inverse depth maps of all levels.
///
/// Good points are splatted with their regularized inverse depth,
/// then empty cells are filled from their neighbours:
/// one diagonal pass on levels 0 and 1, two axis-aligned passes on coarser levels.
pub fn coarse_depth(
    points: &Levels<Vec<CandidatePoint>>,
    reference: &Levels<LevelImage>,
) -> Levels<CoarseDepth> {
    points
        .iter()
        .zip(reference)
        .enumerate()
        .map(|(level, (points, image))| {
            let (mut depth, mut weight) = splat(points, image.shape());
            if level < 2 {
                dilate(&mut depth, &mut weight, &DIAGONAL);
            } else {
                dilate(&mut depth, &mut weight, &AXIS_ALIGNED);
                dilate(&mut depth, &mut weight, &AXIS_ALIGNED);
            }
            normalize(&depth, &weight, image)
        })
        .collect()
}

/// Sum of the inverse depths and weights of the good points at their rounded position.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn splat(points: &[CandidatePoint], shape: (usize, usize)) -> (DMatrix<Float>, DMatrix<Float>) {
    let (nb_rows, nb_cols) = shape;
    let mut depth = DMatrix::zeros(nb_rows, nb_cols);
    let mut weight = DMatrix::zeros(nb_rows, nb_cols);
    for p in points.iter().filter(|p| p.is_good) {
        let x = (p.u + 0.5).floor();
        let y = (p.v + 0.5).floor();
        if x >= 0.0 && y >= 0.0 && (x as usize) < nb_cols && (y as usize) < nb_rows {
            let (x, y) = (x as usize, y as usize);
            depth[(y, x)] += p.ir;
            weight[(y, x)] += 1.0;
        }
    }
    (depth, weight)
}

/// Fill the empty cells with non empty neighbours.
/// Only cells empty before the pass are written,
/// only from cells non empty before the pass.
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_sign_loss)]
fn dilate(depth: &mut DMatrix<Float>, weight: &mut DMatrix<Float>, offsets: &[(isize, isize); 4]) {
    let (nb_rows, nb_cols) = depth.shape();
    let weight_before = weight.clone();
    for y in 1..nb_rows.saturating_sub(1) {
        for x in 1..nb_cols.saturating_sub(1) {
            if weight_before[(y, x)] > 0.0 {
                continue;
            }
            let mut depth_sum = 0.0;
            let mut weight_sum = 0.0;
            let mut nb_filled = 0.0;
            for &(dy, dx) in offsets {
                let ny = (y as isize + dy) as usize;
                let nx = (x as isize + dx) as usize;
                if weight_before[(ny, nx)] > 0.0 {
                    depth_sum += depth[(ny, nx)];
                    weight_sum += weight_before[(ny, nx)];
                    nb_filled += 1.0;
                }
            }
            if nb_filled > 0.0 {
                depth[(y, x)] = depth_sum / nb_filled;
                weight[(y, x)] = weight_sum / nb_filled;
            }
        }
    }
}

fn normalize(depth: &DMatrix<Float>, weight: &DMatrix<Float>, image: &LevelImage) -> CoarseDepth {
    let (nb_rows, nb_cols) = depth.shape();
    let mut idepth = DMatrix::repeat(nb_rows, nb_cols, UNKNOWN_IDEPTH);
    let mut pixels = Vec::new();
    for y in MARGIN..nb_rows.saturating_sub(MARGIN) {
        for x in MARGIN..nb_cols.saturating_sub(MARGIN) {
            if weight[(y, x)] <= 0.0 {
                continue;
            }
            let d = depth[(y, x)] / weight[(y, x)];
            let color = image[(y, x)].x;
            if color.is_finite() && d > 0.0 {
                idepth[(y, x)] = d;
                pixels.push(DepthPixel {
                    x,
                    y,
                    idepth: d,
                    color,
                });
            }
        }
    }
    CoarseDepth { idepth, pixels }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::misc::type_aliases::Vec3;
    use approx;

    fn image(width: usize, height: usize) -> LevelImage {
        DMatrix::from_fn(height, width, |i, j| Vec3::new((i + j) as Float, 0.0, 0.0))
    }

    fn field(x: usize, y: usize) -> Float {
        0.5 + 0.01 * (x * y) as Float
    }

    #[test]
    fn dense_field_round_trip() {
        let (width, height) = (20, 16);
        let points: Vec<CandidatePoint> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let mut p = CandidatePoint::new(x as Float + 0.1, y as Float + 0.1);
                p.ir = field(x, y);
                p
            })
            .collect();
        let depth = coarse_depth(&vec![points], &vec![image(width, height)]);
        let level = &depth[0];
        assert_eq!(level.pixels.len(), (width - 4) * (height - 4));
        for px in &level.pixels {
            approx::assert_relative_eq!(px.idepth, field(px.x, px.y));
            assert_eq!(px.color, (px.x + px.y) as Float);
            assert_eq!(level.idepth[(px.y, px.x)], px.idepth);
        }
        assert_eq!(level.idepth[(0, 0)], UNKNOWN_IDEPTH);
    }

    #[test]
    fn sparse_points_are_dilated() {
        let mut fine = CandidatePoint::new(5.1, 5.1);
        fine.ir = 2.0;
        let mut coarse = CandidatePoint::new(5.1, 5.1);
        coarse.ir = 3.0;
        let mut invalid = CandidatePoint::new(8.1, 8.1);
        invalid.is_good = false;
        let depth = coarse_depth(
            &vec![vec![fine, invalid], vec![coarse]],
            &vec![image(12, 12), image(12, 12)],
        );
        // Level 0: the 4 diagonal cells are filled.
        let fine_px: Vec<(usize, usize)> = depth[0].pixels.iter().map(|p| (p.x, p.y)).collect();
        assert_eq!(fine_px, vec![(4, 4), (6, 4), (5, 5), (4, 6), (6, 6)]);
        assert!(depth[0].pixels.iter().all(|p| p.idepth == 2.0));
        // Level 1 is dilated as a fine level too.
        assert_eq!(depth[1].pixels.len(), 5);
        assert!(depth[1].pixels.iter().all(|p| p.idepth == 3.0));
    }

    #[test]
    fn coarse_levels_are_dilated_twice() {
        let mut point = CandidatePoint::new(5.1, 5.1);
        point.ir = 4.0;
        let depth = coarse_depth(
            &vec![vec![], vec![], vec![point]],
            &vec![image(12, 12), image(12, 12), image(12, 12)],
        );
        assert!(depth[0].pixels.is_empty());
        // A diamond of radius 2 around (5, 5).
        assert_eq!(depth[2].pixels.len(), 13);
        assert!(depth[2].pixels.iter().all(|p| p.idepth == 4.0));
        assert_eq!(depth[2].idepth[(5, 7)], 4.0);
        assert_eq!(depth[2].idepth[(6, 6)], 4.0);
        assert_eq!(depth[2].idepth[(7, 6)], UNKNOWN_IDEPTH);
    }

    #[test]
    fn non_finite_color_is_unknown() {
        let mut point = CandidatePoint::new(5.1, 5.1);
        point.ir = 1.0;
        let mut img = image(12, 12);
        img[(5, 5)] = Vec3::new(Float::NAN, 0.0, 0.0);
        let depth = coarse_depth(&vec![vec![point]], &vec![img]);
        assert_eq!(depth[0].idepth[(5, 5)], UNKNOWN_IDEPTH);
        assert_eq!(depth[0].pixels.len(), 4);
    }
}

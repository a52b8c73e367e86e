// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Transfer of inverse depths between pyramid levels through the parent links.

use crate::core::init::point::{clamp_idepth, CandidatePoint};
use crate::core::init::regularize;
use crate::misc::type_aliases::{Float, Levels};

/// Parents with less information than this do not propagate down.
const MIN_PARENT_HESSIAN: Float = 0.1;

/// Propagate the depths of `level` to `level + 1`.
///
/// Each coarse point receiving at least one contribution takes the
/// `last_hessian` weighted mean of its good children targets.
/// The coarse level is then regularized.
pub fn propagate_up(points: &mut Levels<Vec<CandidatePoint>>, level: usize, snapped: bool) {
    let (fine, coarse) = points.split_at_mut(level + 1);
    let fine = &fine[level];
    let coarse = &mut coarse[0];
    let mut sums = vec![(0.0, 0.0); coarse.len()];
    for point in fine.iter().filter(|p| p.is_good) {
        if let Some(parent) = point.parent {
            let (ir_sum, weight) = &mut sums[parent];
            *ir_sum += point.ir * point.last_hessian;
            *weight += point.last_hessian;
        }
    }
    for (point, (ir_sum, weight)) in coarse.iter_mut().zip(sums) {
        if weight > 0.0 {
            point.ir = ir_sum / weight;
            point.idepth = clamp_idepth(point.ir);
            point.is_good = true;
        }
    }
    regularize::optimize_regularization(coarse, snapped);
}

/// Propagate the depths of `level` to `level - 1`.
///
/// Invalid children of informative parents adopt the parent target.
/// Valid children blend their target with the parent one,
/// the child information counting twice.
/// The fine level is then regularized.
pub fn propagate_down(points: &mut Levels<Vec<CandidatePoint>>, level: usize, snapped: bool) {
    let (fine, coarse) = points.split_at_mut(level);
    let fine = &mut fine[level - 1];
    let coarse = &coarse[0];
    for point in fine.iter_mut() {
        let parent = match point.parent {
            Some(idx) => &coarse[idx],
            None => continue,
        };
        if !parent.is_good || parent.last_hessian < MIN_PARENT_HESSIAN {
            continue;
        }
        if point.is_good {
            let child_weight = 2.0 * point.last_hessian;
            point.ir = (point.ir * child_weight + parent.ir * parent.last_hessian)
                / (child_weight + parent.last_hessian);
        } else {
            point.ir = parent.ir;
            point.is_good = true;
            point.last_hessian = 0.0;
        }
        point.idepth = clamp_idepth(point.ir);
    }
    regularize::optimize_regularization(fine, snapped);
}

// TESTS #############################################################

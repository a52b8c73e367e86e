// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Neighbour consensus of the inverse depths.

use crate::core::init::point::{CandidatePoint, PointTrial, NB_NEIGHBOURS};
use crate::misc::type_aliases::Float;

/// Weight of the neighbours median in the regularized inverse depth.
pub const REG_WEIGHT: Float = 0.8;

/// Minimum number of good neighbours to compute a median.
const MIN_NB_VALUES: usize = 3;

/// Update the regularization targets `ir` of all points of a level.
///
/// Before snapping, every target is the flat prior 1.
/// After snapping, the target of each good point with at least 3 good neighbours
/// is pulled towards the (upper) median of the neighbours targets.
/// Neighbours targets are read before any update of the pass.
pub fn optimize_regularization(points: &mut [CandidatePoint], snapped: bool) {
    if !snapped {
        points.iter_mut().for_each(|p| p.ir = 1.0);
        return;
    }
    let snapshot: Vec<(Float, bool)> = points.iter().map(|p| (p.ir, p.is_good)).collect();
    let mut values = Vec::with_capacity(NB_NEIGHBOURS);
    for point in points.iter_mut().filter(|p| p.is_good) {
        values.clear();
        values.extend(
            point
                .neighbours
                .iter()
                .flatten()
                .map(|&n| snapshot[n])
                .filter(|&(_, good)| good)
                .map(|(ir, _)| ir),
        );
        if values.len() >= MIN_NB_VALUES {
            let mid = values.len() / 2;
            let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            point.ir = (1.0 - REG_WEIGHT) * point.idepth + REG_WEIGHT * *median;
        }
    }
}

/// Regularization energy `(old, new)` of a trial,
/// over the points good in the trial.
///
/// It is zero before snapping.
pub fn regularization_energy(
    points: &[CandidatePoint],
    trials: &[PointTrial],
    snapped: bool,
    coupling_weight: Float,
) -> (Float, Float) {
    if !snapped {
        return (0.0, 0.0);
    }
    let (old, new) = points
        .iter()
        .zip(trials)
        .filter(|(_, trial)| trial.is_good_new)
        .fold((0.0, 0.0), |(old, new), (p, trial)| {
            let r_old = p.idepth - p.ir;
            let r_new = trial.idepth_new - p.ir;
            (old + r_old * r_old, new + r_new * r_new)
        });
    (coupling_weight * old, coupling_weight * new)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::init::neighbors;
    use approx;
    use quickcheck_macros;

    fn grid(idepth: impl Fn(usize, usize) -> Float) -> Vec<CandidatePoint> {
        let mut points = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                let mut p = CandidatePoint::new(4.0 * x as Float + 3.1, 4.0 * y as Float + 3.1);
                p.idepth = idepth(x, y);
                p.ir = p.idepth;
                points.push(p);
            }
        }
        let mut levels = vec![points];
        neighbors::build(&mut levels);
        levels.remove(0)
    }

    #[test]
    fn not_snapped_resets_to_flat_prior() {
        let mut points = grid(|x, y| 1.0 + (x + y) as Float);
        optimize_regularization(&mut points, false);
        assert!(points.iter().all(|p| p.ir == 1.0));
        let before = points.clone();
        optimize_regularization(&mut points, false);
        assert_eq!(points, before);
    }

    #[test]
    fn uses_upper_median_of_good_neighbours() {
        let mut points: Vec<CandidatePoint> = (0..5)
            .map(|i| {
                let mut p = CandidatePoint::new(i as Float, 0.0);
                p.idepth = 1.0;
                p.ir = i as Float;
                p
            })
            .collect();
        points[0].neighbours = [Some(1), Some(2), Some(3), Some(4), None, None, None, None, None, None];
        points[4].is_good = false;
        // Good neighbours targets: 1, 2, 3 -> median 2.
        optimize_regularization(&mut points, true);
        approx::assert_relative_eq!(points[0].ir, 0.2 * 1.0 + 0.8 * 2.0);
        points[4].is_good = true;
        points[0].ir = 0.0;
        // Good neighbours targets: 1, 2, 3, 4 -> upper median 3.
        optimize_regularization(&mut points, true);
        approx::assert_relative_eq!(points[0].ir, 0.2 * 1.0 + 0.8 * 3.0);
    }

    #[test]
    fn few_neighbours_leave_target_untouched() {
        let mut points: Vec<CandidatePoint> = (0..3).map(|i| CandidatePoint::new(i as Float, 0.0)).collect();
        points[0].ir = 7.0;
        points[0].neighbours[0] = Some(1);
        points[0].neighbours[1] = Some(2);
        optimize_regularization(&mut points, true);
        assert_eq!(points[0].ir, 7.0);
    }

    #[test]
    fn energy_is_zero_before_snapping() {
        let points = grid(|x, _| 1.0 + x as Float);
        let trials: Vec<PointTrial> = points.iter().map(|p| PointTrial::from_committed(p).with_idepth(5.0)).collect();
        assert_eq!(regularization_energy(&points, &trials, false, 1.0), (0.0, 0.0));
    }

    #[test]
    fn energy_skips_points_bad_in_the_trial() {
        let mut points = vec![CandidatePoint::new(3.1, 3.1), CandidatePoint::new(5.1, 5.1)];
        points[0].idepth = 2.0;
        points[1].idepth = 3.0;
        let mut trials: Vec<PointTrial> = points.iter().map(|p| PointTrial::from_committed(p).with_idepth(1.5)).collect();
        trials[1].is_good_new = false;
        let (old, new) = regularization_energy(&points, &trials, true, 2.0);
        approx::assert_relative_eq!(old, 2.0 * 1.0);
        approx::assert_relative_eq!(new, 2.0 * 0.25);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn consensus_field_is_a_fixed_point(depth: u8) -> bool {
        let idepth = 0.01 + Float::from(depth) / 16.0;
        let mut points = grid(|_, _| idepth);
        optimize_regularization(&mut points, true);
        let once = points.clone();
        optimize_regularization(&mut points, true);
        points.iter().zip(once.iter()).all(|(p, q)| {
            approx::relative_eq!(p.ir, q.ir, max_relative = 1e-5)
                && approx::relative_eq!(p.ir, idepth, max_relative = 1e-5)
                && p.idepth == q.idepth
        })
    }
}

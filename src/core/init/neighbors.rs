// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Neighbour graph of the candidate points.
//!
//! Each point is linked to its closest points of the same level
//! and to its closest point at the next coarser level (its parent).
//! Links are indices into the per-level point vectors.

use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::core::init::point::{CandidatePoint, NB_NEIGHBOURS, NEIGHBOURS_WEIGHT_SUM};
use crate::misc::type_aliases::{Float, Levels};

/// Decay factor of the link weights with the squared pixel distance.
pub const DIST_FACTOR: Float = 0.05;

type IndexedPosition = GeomWithData<[Float; 2], usize>;

fn spatial_index(points: &[CandidatePoint]) -> RTree<IndexedPosition> {
    let positions = points
        .iter()
        .enumerate()
        .map(|(idx, p)| IndexedPosition::new([p.u, p.v], idx))
        .collect();
    RTree::bulk_load(positions)
}

/// Link weight for a squared distance.
fn decay(dist_2: Float) -> Float {
    (-dist_2 * DIST_FACTOR).exp()
}

/// Build the neighbour and parent links of all the levels.
///
/// A point is never its own neighbour.
/// Missing neighbours (levels with few points) are left to `None` with a zero weight.
/// Present weights are normalized to sum to `NEIGHBOURS_WEIGHT_SUM`.
pub fn build(points: &mut Levels<Vec<CandidatePoint>>) {
    let nb_levels = points.len();
    for level in 0..nb_levels {
        let tree = spatial_index(&points[level]);
        for (idx, point) in points[level].iter_mut().enumerate() {
            link_neighbours(&tree, idx, point);
        }

        if level + 1 < nb_levels && !points[level + 1].is_empty() {
            let (fine, coarse) = points.split_at_mut(level + 1);
            let parent_tree = spatial_index(&coarse[0]);
            for point in fine[level].iter_mut() {
                let query = [point.u * 0.5 - 0.25, point.v * 0.5 - 0.25];
                match parent_tree.nearest_neighbor_iter_with_distance_2(&query).next() {
                    Some((parent, dist_2)) => {
                        point.parent = Some(parent.data);
                        point.parent_dist = decay(dist_2);
                    }
                    None => {
                        point.parent = None;
                        point.parent_dist = 0.0;
                    }
                }
            }
        } else {
            for point in points[level].iter_mut() {
                point.parent = None;
                point.parent_dist = 0.0;
            }
        }
    }
}

fn link_neighbours(tree: &RTree<IndexedPosition>, idx: usize, point: &mut CandidatePoint) {
    point.neighbours = [None; NB_NEIGHBOURS];
    point.neighbours_dist = [0.0; NB_NEIGHBOURS];
    let closest: Vec<(usize, Float)> = tree
        .nearest_neighbor_iter_with_distance_2(&[point.u, point.v])
        .filter(|(other, _)| other.data != idx)
        .take(NB_NEIGHBOURS)
        .map(|(other, dist_2)| (other.data, dist_2))
        .collect();
    let min_dist_2 = match closest.first() {
        Some(&(_, dist_2)) => dist_2,
        None => return,
    };
    // Relative to the closest neighbour to avoid underflows.
    let weight_sum: Float = closest.iter().map(|&(_, d)| decay(d - min_dist_2)).sum();
    for (k, &(other, dist_2)) in closest.iter().enumerate() {
        point.neighbours[k] = Some(other);
        point.neighbours_dist[k] = decay(dist_2 - min_dist_2) * NEIGHBOURS_WEIGHT_SUM / weight_sum;
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    fn grid_level(width: usize, height: usize, step: usize) -> Vec<CandidatePoint> {
        let mut points = Vec::new();
        for y in (3..height).step_by(step) {
            for x in (3..width).step_by(step) {
                points.push(CandidatePoint::new(x as Float + 0.1, y as Float + 0.1));
            }
        }
        points
    }

    fn check_graph(levels: &Levels<Vec<CandidatePoint>>) -> bool {
        let nb_levels = levels.len();
        levels.iter().enumerate().all(|(level, points)| {
            points.iter().enumerate().all(|(idx, p)| {
                let valid_neighbours = p
                    .neighbours
                    .iter()
                    .all(|n| n.map_or(true, |n| n < points.len() && n != idx));
                let valid_parent = match p.parent {
                    None => level + 1 == nb_levels || levels[level + 1].is_empty(),
                    Some(parent) => level + 1 < nb_levels && parent < levels[level + 1].len(),
                };
                let weights: Float = p.neighbours_dist.iter().sum();
                let weights_ok = if points.len() > 1 {
                    approx::relative_eq!(weights, NEIGHBOURS_WEIGHT_SUM, max_relative = 1e-4)
                } else {
                    weights == 0.0
                };
                valid_neighbours && valid_parent && weights_ok
            })
        })
    }

    #[test]
    fn grid_pyramid_graph_is_valid() {
        let mut levels = vec![grid_level(64, 48, 2), grid_level(32, 24, 2), grid_level(16, 12, 3)];
        build(&mut levels);
        assert!(check_graph(&levels));
        assert!(levels[2].iter().all(|p| p.parent.is_none()));
        assert!(levels[0].iter().all(|p| p.neighbours.iter().all(Option::is_some)));
    }

    #[test]
    fn parent_is_the_closest_coarse_point() {
        let mut levels = vec![
            vec![CandidatePoint::new(10.1, 10.1), CandidatePoint::new(30.1, 30.1)],
            vec![CandidatePoint::new(5.1, 5.1), CandidatePoint::new(15.1, 15.1)],
        ];
        build(&mut levels);
        assert_eq!(levels[0][0].parent, Some(0));
        assert_eq!(levels[0][1].parent, Some(1));
        assert_eq!(levels[0][0].neighbours[0], Some(1));
        assert_eq!(levels[0][0].neighbours[1], None);
        assert_eq!(levels[0][0].neighbours_dist[0], NEIGHBOURS_WEIGHT_SUM);
    }

    #[test]
    fn duplicate_positions_are_not_self_neighbours() {
        let mut levels = vec![vec![CandidatePoint::new(5.1, 5.1); 4]];
        build(&mut levels);
        assert!(check_graph(&levels));
        assert_eq!(levels[0][0].neighbours_iter().count(), 3);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn random_points_graph_is_valid(fine: Vec<(u8, u8)>, coarse: Vec<(u8, u8)>) -> bool {
        let to_points = |coords: &[(u8, u8)]| {
            coords
                .iter()
                .map(|&(x, y)| CandidatePoint::new(Float::from(x) + 0.1, Float::from(y) + 0.1))
                .collect::<Vec<_>>()
        };
        let mut levels = vec![to_points(&fine), to_points(&coarse)];
        build(&mut levels);
        check_graph(&levels)
    }
}

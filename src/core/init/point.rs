// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Candidate points of the initializer, one set per pyramid level.

use crate::misc::type_aliases::{Float, Vec10};

/// Number of same-level neighbours of each point.
pub const NB_NEIGHBOURS: usize = 10;

/// Sum of the weights of the neighbours of a point.
pub const NEIGHBOURS_WEIGHT_SUM: Float = 10.0;

/// Minimum committed inverse depth.
pub const MIN_IDEPTH: Float = 1e-3;

/// Maximum committed inverse depth.
pub const MAX_IDEPTH: Float = 50.0;

/// Sampling pattern around each point, `(dx, dy)` offsets.
pub const PATTERN: [(i32, i32); 8] = [
    (0, -2),
    (-1, -1),
    (1, -1),
    (-2, 0),
    (0, 0),
    (2, 0),
    (-1, 1),
    (0, 2),
];

/// Outlier threshold of one sample of the pattern.
pub const SAMPLE_OUTLIER_TH: Float = 12.0 * 12.0;

/// Per point jacobian cross terms with the inverse depth derivative.
///
/// * `[0..8]`: sum of `dp_i * dd` over the pattern.
/// * `[8]`: sum of `r * dd`, then the Schur right hand side term.
/// * `[9]`: sum of `dd * dd`, then the inverse of the damped depth information.
pub type JacobianScratch = Vec10;

/// A candidate point at a given level.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidatePoint {
    /// Column coordinate, fixed at seeding.
    pub u: Float,
    /// Row coordinate, fixed at seeding.
    pub v: Float,
    /// Committed inverse depth, within `[MIN_IDEPTH, MAX_IDEPTH]`.
    pub idepth: Float,
    /// Regularization target inverse depth.
    pub ir: Float,
    /// Committed validity.
    pub is_good: bool,
    /// Committed `[photometric, depth prior]` energies.
    pub energy: [Float; 2],
    /// Depth information of the point, used as weight when propagating depths.
    pub last_hessian: Float,
    /// Energy cap of the whole pattern.
    pub outlier_th: Float,
    /// Bound on the next inverse depth increment.
    pub max_step: Float,
    /// Indices of the closest points of the same level.
    pub neighbours: [Option<usize>; NB_NEIGHBOURS],
    /// Weights of the neighbours, zero for missing ones.
    pub neighbours_dist: [Float; NB_NEIGHBOURS],
    /// Index of the closest point at the next coarser level.
    pub parent: Option<usize>,
    /// Weight of the parent link.
    pub parent_dist: Float,
}

impl CandidatePoint {
    /// New point at depth 1 without neighbours nor parent.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(u: Float, v: Float) -> Self {
        Self {
            u,
            v,
            idepth: 1.0,
            ir: 1.0,
            is_good: true,
            energy: [0.0, 0.0],
            last_hessian: 0.0,
            outlier_th: PATTERN.len() as Float * SAMPLE_OUTLIER_TH,
            max_step: 1e10,
            neighbours: [None; NB_NEIGHBOURS],
            neighbours_dist: [0.0; NB_NEIGHBOURS],
            parent: None,
            parent_dist: 0.0,
        }
    }

    /// Iterate over the present neighbours and their weights.
    pub fn neighbours_iter(&self) -> impl Iterator<Item = (usize, Float)> + '_ {
        self.neighbours
            .iter()
            .zip(self.neighbours_dist.iter())
            .filter_map(|(n, &d)| n.map(|idx| (idx, d)))
    }

    /// Commit an accepted trial of this point.
    ///
    /// A point already invalid before the trial only resets
    /// its inverse depth to its regularization target.
    pub fn commit(&mut self, trial: &PointTrial) {
        if !self.is_good {
            self.idepth = clamp_idepth(self.ir);
            return;
        }
        self.idepth = trial.idepth_new;
        self.is_good = trial.is_good_new;
        self.energy = trial.energy_new;
        self.last_hessian = trial.last_hessian_new;
        self.max_step = trial.max_step;
    }
}

/// Working values of a point during one optimizer trial.
///
/// Created from the committed point, modified by the step
/// and the evaluation, then either committed or dropped.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointTrial {
    /// Proposed inverse depth.
    pub idepth_new: Float,
    /// Validity under the proposed model.
    pub is_good_new: bool,
    /// Energies under the proposed model.
    pub energy_new: [Float; 2],
    /// Depth information under the proposed model.
    pub last_hessian_new: Float,
    /// Bound on the next inverse depth increment.
    pub max_step: Float,
}

impl PointTrial {
    /// Trial starting from the committed values of a point, with zero energies.
    pub fn from_committed(point: &CandidatePoint) -> Self {
        Self {
            idepth_new: point.idepth,
            is_good_new: point.is_good,
            energy_new: [0.0, 0.0],
            last_hessian_new: point.last_hessian,
            max_step: point.max_step,
        }
    }

    /// Trial with an other proposed inverse depth, other values untouched.
    pub fn with_idepth(self, idepth_new: Float) -> Self {
        Self { idepth_new, ..self }
    }
}

/// Clamp an inverse depth within the valid range.
pub fn clamp_idepth(idepth: Float) -> Float {
    idepth.max(MIN_IDEPTH).min(MAX_IDEPTH)
}

// TESTS #############################################################

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Levenberg-Marquardt implementation of the `optimizer::OptimizerState` trait
//! for the joint pose, affine brightness and inverse depths problem of one level.

use log::{debug, trace, warn};

use crate::core::init::point::{clamp_idepth, CandidatePoint, JacobianScratch};
use crate::core::init::regularize;
use crate::core::init::residual::{
    self, AffineLight, EnergyWeights, Evaluation, LevelObs, ResidualSystem,
};
use crate::math::optimizer::{Continue, OptimizerState};
use crate::math::se3;
use crate::misc::type_aliases::{Float, Iso3, Mat6, Mat8, Vec6, Vec8};

/// Initial Levenberg-Marquardt coefficient of each level.
pub const LM_COEF_INIT: Float = 0.1;
const LM_COEF_MIN: Float = 1e-4;
const LM_COEF_MAX: Float = 1e4;

/// Iterations stop when the norm of the increment is below this threshold.
const MIN_INC_NORM: Float = 1e-4;

/// Depth steps are bounded by this fraction of the points `max_step`.
const MAX_PIXEL_STEP: Float = 0.25;
const MAX_IDEPTH_STEP: Float = 1e10;

/// Diagonal preconditioning of the 8 parameters.
const STEP_SCALING: [Float; 8] = [1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 10.0, 1000.0];

/// Failure of the step computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NumericalError {
    /// The Cholesky decomposition failed.
    #[error("damped system is not positive definite")]
    NotPositiveDefinite,
    /// The solution contains NaN or infinite values.
    #[error("step has non finite coefficients")]
    NonFiniteStep,
}

/// Parameters of the optimization of one level.
#[derive(Debug, Clone, Copy)]
pub struct LevelConfig {
    /// Pyramid level, only used for logging.
    pub level: usize,
    /// Size `(width, height)` of the level images.
    pub size: (usize, usize),
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Keep the affine brightness parameters constant.
    pub fix_affine: bool,
    /// Weights of the energy terms.
    pub weights: EnergyWeights,
}

/// A proposed model: pose, affine brightness and inverse depths.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Proposed pose.
    pub pose: Iso3,
    /// Proposed affine brightness.
    pub affine: AffineLight,
    /// Proposed inverse depths, one per point.
    pub idepths: Vec<Float>,
    /// Norm of the pose and affine increment.
    pub inc_norm: Float,
}

/// An evaluated proposal, owning all its working data.
#[derive(Debug, Clone)]
pub struct Trial {
    /// The evaluated proposal.
    pub proposal: Proposal,
    /// Result of the residuals evaluation.
    pub evaluation: Evaluation,
    /// Regularization energies `(old, new)`.
    pub reg_energy: (Float, Float),
}

/// Either an evaluated trial or the failure of the step computation.
pub type EvalState = Result<Trial, NumericalError>;

/// State of the Levenberg-Marquardt optimizer for one level.
///
/// It borrows the points of the level, which are only modified
/// when a trial is accepted.
pub struct LevelOptimizer<'a> {
    /// Configuration of the level.
    pub config: LevelConfig,
    /// Points of the level.
    pub points: &'a mut [CandidatePoint],
    /// Committed jacobian terms, one per point.
    pub scratch: Vec<JacobianScratch>,
    /// Committed normal equations.
    pub system: ResidualSystem,
    /// Committed pose.
    pub pose: Iso3,
    /// Committed affine brightness.
    pub affine: AffineLight,
    /// Levenberg-Marquardt hessian diagonal coefficient.
    pub lm_coef: Float,
    /// Number of consecutive rejected trials.
    pub nb_fails: usize,
    /// True once the flat prior energy has been capped in an accepted trial.
    pub snapped: bool,
}

impl<'a> LevelOptimizer<'a> {
    /// Evaluate the starting model and commit it unconditionally.
    pub fn new(
        obs: &LevelObs,
        config: LevelConfig,
        points: &'a mut [CandidatePoint],
        pose: Iso3,
        affine: AffineLight,
        snapped: bool,
    ) -> Self {
        let idepths: Vec<Float> = points.iter().map(|p| p.idepth).collect();
        let evaluation = residual::evaluate(obs, &config.weights, points, &idepths, &pose, affine);
        let Evaluation {
            system,
            trials,
            scratch,
        } = evaluation;
        points.iter_mut().zip(&trials).for_each(|(p, t)| p.commit(t));
        debug!(
            "lvl {}, initial energy {} + {} ({} / {} good points)",
            config.level, system.energy, system.alpha_energy, system.nb_good, system.nb_points
        );
        Self {
            config,
            points,
            scratch,
            system,
            pose,
            affine,
            lm_coef: LM_COEF_INIT,
            nb_fails: 0,
            snapped,
        }
    }

    /// Commit an accepted trial: the working scratch is moved in.
    fn accept(&mut self, trial: Trial) {
        let Trial {
            proposal,
            evaluation,
            ..
        } = trial;
        if evaluation.system.capped {
            self.snapped = true;
        }
        self.points
            .iter_mut()
            .zip(&evaluation.trials)
            .for_each(|(p, t)| p.commit(t));
        self.scratch = evaluation.scratch;
        self.system = evaluation.system;
        self.pose = proposal.pose;
        self.affine = proposal.affine;
        regularize::optimize_regularization(self.points, self.snapped);
        self.lm_coef = (0.5 * self.lm_coef).max(LM_COEF_MIN);
        self.nb_fails = 0;
    }

    /// Only the damping changes on a rejected trial.
    fn reject(&mut self) {
        self.lm_coef = (4.0 * self.lm_coef).min(LM_COEF_MAX);
        self.nb_fails += 1;
    }

    /// Damped and preconditioned reduced system, and the preconditioning matrix.
    #[allow(clippy::cast_precision_loss)]
    fn reduced_system(&self) -> (Mat8, Vec8, Mat8) {
        let damping = 1.0 / (1.0 + self.lm_coef);
        let mut hessian = self.system.hessian;
        for i in 0..8 {
            hessian[(i, i)] *= 1.0 + self.lm_coef;
        }
        hessian -= self.system.hessian_sc * damping;
        let gradient = self.system.gradient - self.system.gradient_sc * damping;
        let (width, height) = self.config.size;
        let factor = 0.01 / (width * height) as Float;
        let scaling = Mat8::from_diagonal(&Vec8::from(STEP_SCALING));
        (
            scaling * hessian * scaling * factor,
            scaling * gradient * factor,
            scaling,
        )
    }

    /// Pose and affine increment `inc` such that `H inc = -b`.
    fn increment(&self) -> Result<Vec8, NumericalError> {
        let (hessian, gradient, scaling) = self.reduced_system();
        let inc = if self.config.fix_affine {
            let hessian_6: Mat6 = hessian.fixed_view::<6, 6>(0, 0).into_owned();
            let gradient_6: Vec6 = gradient.fixed_rows::<6>(0).into_owned();
            let scaling_6: Mat6 = scaling.fixed_view::<6, 6>(0, 0).into_owned();
            let solution = hessian_6
                .cholesky()
                .ok_or(NumericalError::NotPositiveDefinite)?
                .solve(&gradient_6);
            let mut inc = Vec8::zeros();
            inc.fixed_rows_mut::<6>(0).copy_from(&(-(scaling_6 * solution)));
            inc
        } else {
            let solution = hessian
                .cholesky()
                .ok_or(NumericalError::NotPositiveDefinite)?
                .solve(&gradient);
            -(scaling * solution)
        };
        if inc.iter().all(|x| x.is_finite()) {
            Ok(inc)
        } else {
            Err(NumericalError::NonFiniteStep)
        }
    }

    /// Back substitution of the inverse depth steps.
    fn depth_steps(&self, inc: &Vec8) -> Vec<Float> {
        let damping = 1.0 / (1.0 + self.lm_coef);
        self.points
            .iter()
            .zip(&self.scratch)
            .map(|(p, jb)| {
                if !p.is_good {
                    return p.idepth;
                }
                let b = jb[8] + jb.fixed_rows::<8>(0).dot(inc);
                let step = -b * jb[9] * damping;
                let max_step = (MAX_PIXEL_STEP * p.max_step).min(MAX_IDEPTH_STEP);
                clamp_idepth(p.idepth + step.max(-max_step).min(max_step))
            })
            .collect()
    }
}

impl<'a, 'b> OptimizerState<LevelObs<'b>, EvalState, Proposal, NumericalError>
    for LevelOptimizer<'a>
{
    /// Solve the damped reduced system and apply the increment
    /// to the pose, the affine brightness and the inverse depths.
    fn step(&self) -> Result<Proposal, NumericalError> {
        let inc = self.increment()?;
        let pose = se3::left_compose(inc.fixed_rows::<6>(0).into_owned(), &self.pose);
        let affine = AffineLight {
            a: self.affine.a + inc[6],
            b: self.affine.b + inc[7],
        };
        Ok(Proposal {
            pose,
            affine,
            idepths: self.depth_steps(&inc),
            inc_norm: inc.norm(),
        })
    }

    /// Evaluate the proposal and its regularization energy.
    fn eval(&self, obs: &LevelObs<'b>, proposal: Proposal) -> EvalState {
        let evaluation = residual::evaluate(
            obs,
            &self.config.weights,
            &*self.points,
            &proposal.idepths,
            &proposal.pose,
            proposal.affine,
        );
        let reg_energy = regularize::regularization_energy(
            &*self.points,
            &evaluation.trials,
            self.snapped,
            self.config.weights.coupling_weight,
        );
        Ok(Trial {
            proposal,
            evaluation,
            reg_energy,
        })
    }

    fn step_failed(&self, error: NumericalError) -> EvalState {
        Err(error)
    }

    /// Accept the trial if the total energy decreased.
    ///
    /// Stop when the increment is small, after too many iterations,
    /// or after two consecutive rejected trials.
    fn stop_criterion(self, nb_iter: usize, eval_state: EvalState) -> (Self, Continue) {
        let mut state = self;
        let inc_norm = match eval_state {
            Ok(trial) => {
                let energy_old = state.system.total_energy() + trial.reg_energy.0;
                let energy_new = trial.evaluation.system.total_energy() + trial.reg_energy.1;
                let inc_norm = trial.proposal.inc_norm;
                let accepted = energy_old > energy_new;
                trace!(
                    "lvl {}, it {} (l={}) {}: {} -> {} (|inc| = {})",
                    state.config.level,
                    nb_iter,
                    state.lm_coef,
                    if accepted { "ACCEPT" } else { "REJECT" },
                    energy_old,
                    energy_new,
                    inc_norm
                );
                if accepted {
                    state.accept(trial);
                } else {
                    state.reject();
                }
                inc_norm
            }
            Err(error) => {
                warn!("lvl {}, it {}: {}", state.config.level, nb_iter, error);
                state.reject();
                Float::INFINITY
            }
        };
        let stop = !(inc_norm > MIN_INC_NORM)
            || nb_iter > state.config.max_iterations
            || state.nb_fails >= 2;
        if stop {
            (state, Continue::Stop)
        } else {
            (state, Continue::Forward)
        }
    }
}

// TESTS #############################################################

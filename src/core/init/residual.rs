// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Photometric residuals of the candidate points and the normal equations
//! of the joint pose, affine brightness and inverse depth problem.
//!
//! Inverse depths are eliminated with the Schur complement,
//! so the returned system is always 8x8:
//! 6 pose parameters (translation then rotation) and 2 affine brightness parameters.
//! The per point terms needed to back-substitute the depth steps
//! are returned as `JacobianScratch` values.

use itertools::izip;
use rayon::prelude::*;

use crate::core::camera::Intrinsics;
use crate::core::frame::{self, LevelImage};
use crate::core::init::point::{CandidatePoint, JacobianScratch, PointTrial, PATTERN};
use crate::math::accumulator::{EnergyAccum, SymMat9};
use crate::math::se3;
use crate::misc::type_aliases::{Float, Iso3, Mat3, Mat8, Vec3, Vec8, Vec9};

/// Initial value of the depth step bound, before seeing any sample.
pub const MAX_STEP_INIT: Float = 1e10;

/// Affine brightness transfer from the reference frame to the new one:
/// `I_new = exp(a) * I_ref + b`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AffineLight {
    /// Logarithm of the gain.
    pub a: Float,
    /// Offset.
    pub b: Float,
}

impl AffineLight {
    /// Multiplicative gain `exp(a)`.
    pub fn gain(&self) -> Float {
        self.a.exp()
    }
}

/// Weights of the energy terms.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EnergyWeights {
    /// Huber threshold of the photometric residuals.
    pub huber_th: Float,
    /// Cap of the flat prior energy, per point.
    pub alpha_k: Float,
    /// Weight of the flat prior (inverse depths at 1, no translation).
    pub alpha_w: Float,
    /// Weight of the coupling between inverse depths and their regularized targets.
    pub coupling_weight: Float,
}

impl Default for EnergyWeights {
    fn default() -> Self {
        Self {
            huber_th: 9.0,
            alpha_k: 2.5 * 2.5,
            alpha_w: 150.0 * 150.0,
            coupling_weight: 1.0,
        }
    }
}

/// Images and calibration of one pyramid level.
pub struct LevelObs<'a> {
    /// Calibration of the level.
    pub intrinsics: &'a Intrinsics,
    /// Reference frame level.
    pub reference: &'a LevelImage,
    /// New frame level.
    pub target: &'a LevelImage,
}

/// Accumulated normal equations of a model evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ResidualSystem {
    /// Photometric energy of all points (carried energy for invalid ones).
    pub energy: Float,
    /// Flat prior energy, clamped to its cap.
    pub alpha_energy: Float,
    /// True if the flat prior energy reached its cap.
    pub capped: bool,
    /// Number of points of the level.
    pub nb_points: usize,
    /// Number of points good under the evaluated model.
    pub nb_good: usize,
    /// Hessian of the pose and affine parameters.
    pub hessian: Mat8,
    /// Gradient of the pose and affine parameters.
    pub gradient: Vec8,
    /// Hessian part to remove for the depths elimination.
    pub hessian_sc: Mat8,
    /// Gradient part to remove for the depths elimination.
    pub gradient_sc: Vec8,
}

impl ResidualSystem {
    /// Total energy without regularization.
    pub fn total_energy(&self) -> Float {
        self.energy + self.alpha_energy
    }
}

/// Everything computed when evaluating a model.
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// The normal equations.
    pub system: ResidualSystem,
    /// Per point working values.
    pub trials: Vec<PointTrial>,
    /// Per point working jacobian terms.
    pub scratch: Vec<JacobianScratch>,
}

/// Result of the evaluation of one point.
struct PointEval {
    trial: PointTrial,
    scratch: JacobianScratch,
    photometric: Float,
    samples: Option<[Vec9; 8]>,
}

/// Projection of the reference pixels into the new frame.
struct Warp {
    rki: Mat3,
    translation: Vec3,
    gain: Float,
    offset: Float,
    fx: Float,
    fy: Float,
    cx: Float,
    cy: Float,
}

/// Evaluate the model `(pose, affine)` with the proposed inverse depths
/// of the points of one level.
///
/// Points are processed in parallel, the results are summed in point order.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(
    obs: &LevelObs,
    weights: &EnergyWeights,
    points: &[CandidatePoint],
    idepths_new: &[Float],
    pose: &Iso3,
    affine: AffineLight,
) -> Evaluation {
    let (fx, fy) = obs.intrinsics.focal;
    let (cx, cy) = obs.intrinsics.principal_point;
    let warp = Warp {
        rki: pose.rotation.to_rotation_matrix().matrix() * obs.intrinsics.inverse_matrix(),
        translation: pose.translation.vector,
        gain: affine.gain(),
        offset: affine.b,
        fx,
        fy,
        cx,
        cy,
    };

    let evals: Vec<PointEval> = points
        .par_iter()
        .zip(idepths_new.par_iter())
        .map(|(point, &idepth_new)| eval_point(obs, &warp, weights.huber_th, point, idepth_new))
        .collect();

    // Photometric energy and full system.
    let mut energy = EnergyAccum::new();
    let mut accum = SymMat9::new();
    for eval in &evals {
        energy.add(eval.photometric);
        if let Some(samples) = &eval.samples {
            samples.iter().for_each(|s| accum.add_vec(s));
        }
    }

    // Flat prior energy.
    let nb_points = points.len();
    let n = nb_points as Float;
    let mut prior = EnergyAccum::new();
    let mut trials: Vec<PointTrial> = Vec::with_capacity(nb_points);
    let mut scratch: Vec<JacobianScratch> = Vec::with_capacity(nb_points);
    for (point, eval) in points.iter().zip(evals) {
        let mut trial = eval.trial;
        if trial.is_good_new {
            let d = trial.idepth_new - 1.0;
            trial.energy_new[1] = d * d;
            prior.add(d * d);
        } else {
            trial.energy_new[1] = point.energy[1];
        }
        trials.push(trial);
        scratch.push(eval.scratch);
    }
    let nb_good = prior.count() as usize;
    let mut alpha_energy = weights.alpha_w * (prior.sum() + se3::translation_norm_squared(pose) * n);
    let capped = alpha_energy > weights.alpha_k * n;
    let alpha_opt = if capped {
        alpha_energy = weights.alpha_k * n;
        0.0
    } else {
        weights.alpha_w
    };

    // Schur complement terms.
    let mut accum_sc = SymMat9::new();
    for (point, trial, jb) in izip!(points, trials.iter_mut(), scratch.iter_mut()) {
        if !trial.is_good_new {
            continue;
        }
        trial.last_hessian_new = jb[9];
        jb[8] += alpha_opt * (trial.idepth_new - 1.0);
        jb[9] += alpha_opt;
        if capped {
            jb[8] += weights.coupling_weight * (trial.idepth_new - point.ir);
            jb[9] += weights.coupling_weight;
        }
        jb[9] = 1.0 / (1.0 + jb[9]);
        accum_sc.add_vec_weighted(jb[9], &jb.fixed_rows::<9>(0).into_owned());
    }

    let (mut hessian, mut gradient) = accum.finalize();
    let (hessian_sc, gradient_sc) = accum_sc.finalize();

    // Prior on the translation.
    let t_log = se3::linear_velocity(se3::log(pose));
    for i in 0..3 {
        hessian[(i, i)] += alpha_opt * n;
        gradient[i] += t_log[i] * alpha_opt * n;
    }

    Evaluation {
        system: ResidualSystem {
            energy: energy.sum(),
            alpha_energy,
            capped,
            nb_points,
            nb_good,
            hessian,
            gradient,
            hessian_sc,
            gradient_sc,
        },
        trials,
        scratch,
    }
}

/// True if bilinear interpolation at `(x, y)` stays within `(width, height)`,
/// with an additional `margin` on each side.
#[allow(clippy::cast_precision_loss)]
fn inside(x: Float, y: Float, width: usize, height: usize, margin: Float) -> bool {
    x > margin && y > margin && x < width as Float - 1.0 - margin && y < height as Float - 1.0 - margin
}

/// Residuals and derivatives of the pattern samples of one point.
#[allow(clippy::many_single_char_names)]
#[allow(clippy::similar_names)]
fn eval_point(
    obs: &LevelObs,
    warp: &Warp,
    huber_th: Float,
    point: &CandidatePoint,
    idepth_new: Float,
) -> PointEval {
    let carried = PointTrial {
        idepth_new,
        is_good_new: false,
        energy_new: point.energy,
        last_hessian_new: point.last_hessian,
        max_step: MAX_STEP_INIT,
    };
    let invalid = |trial: PointTrial| PointEval {
        trial,
        scratch: JacobianScratch::zeros(),
        photometric: point.energy[0],
        samples: None,
    };
    if !point.is_good {
        return invalid(carried);
    }

    let (height, width) = obs.target.shape();
    let t = &warp.translation;
    let mut max_step = MAX_STEP_INIT;
    let mut scratch = JacobianScratch::zeros();
    let mut samples = [Vec9::zeros(); 8];
    let mut energy = 0.0;
    for (sample, &(dx, dy)) in samples.iter_mut().zip(PATTERN.iter()) {
        let x_ref = point.u + dx as Float;
        let y_ref = point.v + dy as Float;
        let pt = warp.rki * Vec3::new(x_ref, y_ref, 1.0) + t * idepth_new;
        let u = pt.x / pt.z;
        let v = pt.y / pt.z;
        let ku = warp.fx * u + warp.cx;
        let kv = warp.fy * v + warp.cy;
        let new_idepth = idepth_new / pt.z;
        // Target samples must be at least one pixel away from the border.
        if !(inside(ku, kv, width, height, 1.0) && new_idepth > 0.0)
            || !inside(x_ref, y_ref, width, height, 0.0)
        {
            return invalid(PointTrial { max_step, ..carried });
        }

        let hit = frame::interpolate(obs.target, ku, kv);
        let intensity_ref = frame::interpolate_intensity(obs.reference, x_ref, y_ref);
        if !intensity_ref.is_finite() || !hit.x.is_finite() {
            return invalid(PointTrial { max_step, ..carried });
        }

        let residual = hit.x - warp.gain * intensity_ref - warp.offset;
        let mut hw = if residual.abs() < huber_th {
            1.0
        } else {
            huber_th / residual.abs()
        };
        energy += hw * residual * residual * (2.0 - hw);

        let dxdd = (t.x - t.z * u) / pt.z;
        let dydd = (t.y - t.z * v) / pt.z;
        if hw < 1.0 {
            hw = hw.sqrt();
        }
        let dx_interp = hw * hit.y * warp.fx;
        let dy_interp = hw * hit.z * warp.fy;
        let jac = Vec9::from([
            new_idepth * dx_interp,
            new_idepth * dy_interp,
            -new_idepth * (u * dx_interp + v * dy_interp),
            -u * v * dx_interp - (1.0 + v * v) * dy_interp,
            (1.0 + u * u) * dx_interp + u * v * dy_interp,
            -v * dx_interp + u * dy_interp,
            -hw * warp.gain * intensity_ref,
            -hw,
            hw * residual,
        ]);
        let dd = dx_interp * dxdd + dy_interp * dydd;

        let step_bound = 1.0 / (dxdd * warp.fx).hypot(dydd * warp.fy);
        if step_bound < max_step {
            max_step = step_bound;
        }

        for k in 0..9 {
            scratch[k] += jac[k] * dd;
        }
        scratch[9] += dd * dd;
        *sample = jac;
    }

    if energy > point.outlier_th * 20.0 {
        return invalid(PointTrial { max_step, ..carried });
    }

    PointEval {
        trial: PointTrial {
            idepth_new,
            is_good_new: true,
            energy_new: [energy, point.energy[1]],
            last_hessian_new: point.last_hessian,
            max_step,
        },
        scratch,
        photometric: energy,
        samples: Some(samples),
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use crate::core::frame::Frame;
    use approx;
    use nalgebra::{DMatrix, Translation3, UnitQuaternion};

    const WIDTH: usize = 64;
    const HEIGHT: usize = 48;

    fn intrinsics() -> Intrinsics {
        Intrinsics {
            focal: (50.0, 50.0),
            principal_point: (32.0, 24.0),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    fn textured(shift: Float) -> Frame {
        let img = DMatrix::from_fn(HEIGHT, WIDTH, |i, j| {
            let x = j as Float - shift;
            let y = i as Float;
            (128.0 + 40.0 * (0.4 * x).sin() + 40.0 * (0.3 * y).cos()) as u8
        });
        Frame::from_gray(&img, 1, 1.0)
    }

    fn points() -> Vec<CandidatePoint> {
        let mut points = Vec::new();
        for y in (6..HEIGHT - 6).step_by(4) {
            for x in (6..WIDTH - 6).step_by(4) {
                points.push(CandidatePoint::new(x as Float + 0.1, y as Float + 0.1));
            }
        }
        points
    }

    fn eval_with(points: &[CandidatePoint], target: &Frame, pose: &Iso3) -> Evaluation {
        let reference = textured(0.0);
        let intrinsics = intrinsics();
        let obs = LevelObs {
            intrinsics: &intrinsics,
            reference: &reference.levels[0],
            target: &target.levels[0],
        };
        let idepths: Vec<Float> = points.iter().map(|p| p.idepth).collect();
        evaluate(&obs, &EnergyWeights::default(), points, &idepths, pose, AffineLight::default())
    }

    #[test]
    fn identical_frames_have_zero_energy() {
        let points = points();
        let eval = eval_with(&points, &textured(0.0), &Iso3::identity());
        let system = &eval.system;
        assert_eq!(system.nb_good, points.len());
        assert_eq!(system.nb_points, points.len());
        approx::assert_abs_diff_eq!(system.energy, 0.0, epsilon = 1e-2);
        assert!(!system.capped);
        assert_eq!(system.alpha_energy, 0.0);
        // Without translation, depths are only constrained by the flat prior.
        assert!(eval
            .scratch
            .iter()
            .all(|s| approx::relative_eq!(s[9], 1.0 / (1.0 + 150.0 * 150.0))));
        assert!(eval.trials.iter().all(|t| t.max_step == MAX_STEP_INIT));
    }

    #[test]
    fn hessian_is_symmetric_with_prior_on_translation() {
        let points = points();
        let eval = eval_with(&points, &textured(0.0), &Iso3::identity());
        let h = eval.system.hessian;
        assert_eq!(h, h.transpose());
        let n = points.len() as Float;
        assert!(h[(0, 0)] >= 150.0 * 150.0 * n);
        assert!(h[(3, 3)] > 0.0);
    }

    #[test]
    fn big_translation_caps_the_prior() {
        let points = points();
        let pose = Iso3::from_parts(Translation3::new(0.05, 0.0, 0.0), UnitQuaternion::identity());
        let eval = eval_with(&points, &textured(0.0), &pose);
        let system = &eval.system;
        assert!(system.capped);
        approx::assert_relative_eq!(system.alpha_energy, 2.5 * 2.5 * points.len() as Float);
        // With a translation, depths are observable.
        let good = eval.trials.iter().zip(&eval.scratch).filter(|(t, _)| t.is_good_new);
        assert!(good.clone().count() > 0);
        assert!(good.clone().all(|(_, s)| s[9] < 1.0));
        assert!(good.clone().all(|(t, _)| t.max_step < MAX_STEP_INIT));
    }

    #[test]
    fn point_projected_out_of_image_is_excluded() {
        let mut points = vec![CandidatePoint::new(30.1, 20.1), CandidatePoint::new(30.1, 24.1)];
        points[1].energy = [3.0, 0.5];
        let reference = textured(0.0);
        let intrinsics = intrinsics();
        let obs = LevelObs {
            intrinsics: &intrinsics,
            reference: &reference.levels[0],
            target: &reference.levels[0],
        };
        // Half a pixel shift for the first point, far outside for the second.
        let pose = Iso3::from_parts(Translation3::new(10.0, 0.0, 0.0), UnitQuaternion::identity());
        let weights = EnergyWeights::default();
        let affine = AffineLight::default();
        let eval = evaluate(&obs, &weights, &points, &[1e-3, 50.0], &pose, affine);
        assert!(eval.trials[0].is_good_new);
        assert!(!eval.trials[1].is_good_new);
        assert_eq!(eval.trials[1].energy_new, [3.0, 0.5]);
        assert_eq!(eval.system.nb_good, 1);

        // The second point does not contribute to the 8x8 systems.
        let direct = evaluate(&obs, &weights, &points[..1], &[1e-3], &pose, affine);
        approx::assert_relative_eq!(
            eval.system.energy,
            direct.system.energy + 3.0,
            max_relative = 1e-5
        );
        assert_eq!(eval.system.hessian, direct.system.hessian);
        assert_eq!(eval.system.hessian_sc, direct.system.hessian_sc);
        assert_eq!(eval.system.gradient_sc, direct.system.gradient_sc);
    }

    #[test]
    fn committed_invalid_point_carries_its_energy() {
        let mut points = points();
        points[0].is_good = false;
        points[0].energy = [7.0, 1.0];
        let eval = eval_with(&points, &textured(0.0), &Iso3::identity());
        assert!(!eval.trials[0].is_good_new);
        assert_eq!(eval.trials[0].energy_new, [7.0, 1.0]);
        assert!(eval.system.energy >= 7.0);
        assert_eq!(eval.scratch[0], JacobianScratch::zeros());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Coarse-to-fine initializer of a monocular visual odometry.
//!
//! The first frame becomes the reference frame, seeded with candidate points
//! at every pyramid level. Each new frame is then tracked against it,
//! jointly optimizing the relative pose, the affine brightness
//! and the inverse depths of the points, from the coarsest level to the finest.
//! The initializer is ready when the motion has been large enough
//! for a few consecutive frames.

use image::RgbImage;
use log::{debug, info, warn};

use crate::core::camera::Intrinsics;
use crate::core::candidates::PixelSelector;
use crate::core::frame::Frame;
use crate::core::init::lm_optimizer::{LevelConfig, LevelOptimizer};
use crate::core::init::materialize::{self, CoarseDepth};
use crate::core::init::neighbors;
use crate::core::init::point::{clamp_idepth, CandidatePoint};
use crate::core::init::propagate;
use crate::core::init::residual::{EnergyWeights, LevelObs};
use crate::math::optimizer::OptimizerState as _;
use crate::misc::type_aliases::{Float, Iso3, Levels, Vec3};
use crate::misc::view;

pub use crate::core::init::residual::AffineLight;

/// Points are only seeded at this distance from the left and top borders.
const SEED_BORDER_LOW: usize = 3;
/// Points are only seeded at this distance from the right and bottom borders.
const SEED_BORDER_HIGH: usize = 4;
/// Sub-pixel offset of the seeded points.
const SEED_OFFSET: Float = 0.1;

/// Receiver of the initializer outputs, typically a visualization.
pub trait OutputObserver {
    /// Called first for every frame given to the initializer,
    /// including the skipped ones.
    fn push_live_frame(&mut self, frame: &Frame);

    /// Whether the observer wants the colorized inverse depth image.
    fn needs_depth_image(&self) -> bool {
        false
    }

    /// Colorized inverse depth image of the finest level,
    /// only built when at least one observer needs it.
    fn push_depth_image(&mut self, _image: &RgbImage) {}
}

/// Errors of the initializer construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The configuration asks for no pyramid level.
    #[error("the number of levels must be positive")]
    NoLevel,
    /// Per level parameters are missing.
    #[error("{nb_levels} levels but {nb_densities} densities and {nb_max_iterations} iteration caps")]
    MissingLevelParameters {
        /// Configured number of levels.
        nb_levels: usize,
        /// Number of configured densities.
        nb_densities: usize,
        /// Number of configured iteration caps.
        nb_max_iterations: usize,
    },
    /// The reference frame has fewer levels than configured.
    #[error("the frame has {actual} levels, {expected} expected")]
    NotEnoughLevels {
        /// Configured number of levels.
        expected: usize,
        /// Levels of the frame.
        actual: usize,
    },
    /// The pixel selector returned a map of the wrong shape.
    #[error("selection map of level {level} is {actual:?}, {expected:?} expected")]
    SelectorShape {
        /// Level of the selection.
        level: usize,
        /// Shape `(rows, columns)` of the level image.
        expected: (usize, usize),
        /// Shape `(rows, columns)` of the returned map.
        actual: (usize, usize),
    },
}

/// Configuration of the initializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of pyramid levels used.
    pub nb_levels: usize,
    /// Camera intrinsic parameters at full resolution.
    pub intrinsics: Intrinsics,
    /// Per level density of candidate points, relative to the level 0 number of pixels.
    pub densities: Levels<Float>,
    /// Per level maximum number of iterations.
    pub max_iterations: Levels<usize>,
    /// Keep the affine brightness parameters constant during optimization.
    pub fix_affine: bool,
    /// Weights of the energy terms.
    pub weights: EnergyWeights,
    /// Number of frames to track after snapping before being ready.
    pub nb_frames_after_snap: usize,
}

impl Config {
    /// Default configuration for a camera.
    pub fn new(intrinsics: Intrinsics) -> Self {
        Self {
            nb_levels: 5,
            intrinsics,
            densities: vec![0.03, 0.05, 0.15, 0.5, 1.0],
            max_iterations: vec![5, 5, 10, 30, 50],
            fix_affine: true,
            weights: EnergyWeights::default(),
            nb_frames_after_snap: 5,
        }
    }

    /// Initialize the initializer with its reference frame.
    ///
    /// The selector is asked for candidate points at every level.
    pub fn init(
        self,
        first_frame: Frame,
        selector: &mut dyn PixelSelector,
    ) -> Result<CoarseInitializer, InitError> {
        self.check()?;
        let state = State::seed(&self, first_frame, selector)?;
        Ok(CoarseInitializer {
            config: self,
            state,
        })
    }

    fn check(&self) -> Result<(), InitError> {
        if self.nb_levels == 0 {
            return Err(InitError::NoLevel);
        }
        if self.densities.len() < self.nb_levels || self.max_iterations.len() < self.nb_levels {
            return Err(InitError::MissingLevelParameters {
                nb_levels: self.nb_levels,
                nb_densities: self.densities.len(),
                nb_max_iterations: self.max_iterations.len(),
            });
        }
        Ok(())
    }
} // impl Config

/// Struct used to initialize the odometry.
/// Can only be constructed by initialization from a `Config`.
pub struct CoarseInitializer {
    config: Config,
    state: State,
}

/// Internal state of the initializer.
struct State {
    intrinsics_multires: Levels<Intrinsics>,
    reference: Frame,
    points: Levels<Vec<CandidatePoint>>,
    pose: Iso3,
    affine: AffineLight,
    snapped: bool,
    frame_id: usize,
    snapped_at: usize,
}

impl State {
    /// Seed the points of a new reference frame and build their neighbour graph.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    fn seed(
        config: &Config,
        reference: Frame,
        selector: &mut dyn PixelSelector,
    ) -> Result<Self, InitError> {
        if reference.nb_levels() < config.nb_levels {
            return Err(InitError::NotEnoughLevels {
                expected: config.nb_levels,
                actual: reference.nb_levels(),
            });
        }
        let (width_0, height_0) = reference.size(0);
        let mut points = Vec::with_capacity(config.nb_levels);
        for level in 0..config.nb_levels {
            let image = &reference.levels[level];
            let nb_target = (config.densities[level] * (width_0 * height_0) as Float) as usize;
            let picked = selector.select(image, nb_target);
            if picked.shape() != image.shape() {
                return Err(InitError::SelectorShape {
                    level,
                    expected: image.shape(),
                    actual: picked.shape(),
                });
            }
            let (nb_rows, nb_cols) = image.shape();
            let mut level_points = Vec::new();
            for y in SEED_BORDER_LOW..nb_rows.saturating_sub(SEED_BORDER_HIGH) {
                for x in SEED_BORDER_LOW..nb_cols.saturating_sub(SEED_BORDER_HIGH) {
                    if picked[(y, x)] != 0 {
                        level_points.push(CandidatePoint::new(
                            x as Float + SEED_OFFSET,
                            y as Float + SEED_OFFSET,
                        ));
                    }
                }
            }
            if level_points.is_empty() {
                warn!("no candidate point at level {}", level);
            }
            debug!(
                "level {}: {} points for {} targeted",
                level,
                level_points.len(),
                nb_target
            );
            points.push(level_points);
        }
        neighbors::build(&mut points);
        info!(
            "new reference frame with {} points at full resolution",
            points[0].len()
        );
        Ok(Self {
            intrinsics_multires: config.intrinsics.multi_res(config.nb_levels),
            reference,
            points,
            pose: Iso3::identity(),
            affine: AffineLight::default(),
            snapped: false,
            frame_id: 0,
            snapped_at: 0,
        })
    }
}

impl CoarseInitializer {
    /// Replace the reference frame, discarding all points and the tracking state.
    pub fn set_reference(
        &mut self,
        frame: Frame,
        selector: &mut dyn PixelSelector,
    ) -> Result<(), InitError> {
        self.state = State::seed(&self.config, frame, selector)?;
        Ok(())
    }

    /// Track a new frame against the reference frame.
    ///
    /// Returns true when the initialization is ready,
    /// that is when the tracking snapped for enough frames.
    /// Frames with fewer levels or other sizes than the reference are only
    /// pushed to the observers, and otherwise ignored.
    pub fn track_frame(
        &mut self,
        frame: &Frame,
        observers: &mut [&mut dyn OutputObserver],
    ) -> bool {
        for observer in observers.iter_mut() {
            observer.push_live_frame(frame);
        }
        if !self.is_compatible(frame) {
            warn!("frame levels do not match the reference frame, skipping it");
            return false;
        }

        let nb_levels = self.config.nb_levels;
        let state = &mut self.state;
        if !state.snapped {
            state.pose.translation.vector = Vec3::zeros();
            for point in state.points.iter_mut().flatten() {
                point.ir = 1.0;
                point.last_hessian = 0.0;
            }
        }
        let mut pose = state.pose;
        let mut affine = state.affine;
        if state.reference.exposure > 0.0 && frame.exposure > 0.0 {
            affine = AffineLight {
                a: (frame.exposure / state.reference.exposure).ln(),
                b: 0.0,
            };
        }
        let mut snapped = state.snapped;

        // Coarse to fine optimization.
        for level in (0..nb_levels).rev() {
            if level < nb_levels - 1 {
                propagate::propagate_down(&mut state.points, level + 1, snapped);
            }
            reset_points(&mut state.points[level], level == nb_levels - 1);
            let obs = LevelObs {
                intrinsics: &state.intrinsics_multires[level],
                reference: &state.reference.levels[level],
                target: &frame.levels[level],
            };
            let level_config = LevelConfig {
                level,
                size: state.reference.size(level),
                max_iterations: self.config.max_iterations[level],
                fix_affine: self.config.fix_affine,
                weights: self.config.weights,
            };
            let optimizer = LevelOptimizer::new(
                &obs,
                level_config,
                &mut state.points[level],
                pose,
                affine,
                snapped,
            );
            let (optimizer, nb_iter) = optimizer.iterative_solve(&obs);
            debug!(
                "level {}: {} iterations, energy {} + {}",
                level, nb_iter, optimizer.system.energy, optimizer.system.alpha_energy
            );
            pose = optimizer.pose;
            affine = optimizer.affine;
            snapped = optimizer.snapped;
        }

        // Fine to coarse propagation of the optimized depths.
        for level in 0..nb_levels - 1 {
            propagate::propagate_up(&mut state.points, level, snapped);
        }

        state.pose = pose;
        state.affine = affine;
        state.snapped = snapped;
        state.frame_id += 1;
        if !snapped {
            state.snapped_at = 0;
        } else if state.snapped_at == 0 {
            state.snapped_at = state.frame_id;
            info!("snapped at frame {}", state.frame_id);
        }

        if observers.iter().any(|o| o.needs_depth_image()) {
            let image = view::idepth_image(&state.reference.levels[0], &state.points[0]);
            observers
                .iter_mut()
                .filter(|o| o.needs_depth_image())
                .for_each(|o| o.push_depth_image(&image));
        }

        let ready = snapped && state.frame_id > state.snapped_at + self.config.nb_frames_after_snap;
        if ready {
            info!(
                "ready at frame {}, translation {}",
                state.frame_id,
                pose.translation.vector.transpose()
            );
        }
        ready
    }

    /// Dense and compact inverse depth maps of all levels,
    /// for the hand-off to a coarse tracker.
    pub fn coarse_depth(&self) -> Levels<CoarseDepth> {
        materialize::coarse_depth(&self.state.points, &self.state.reference.levels)
    }

    /// Pose of the last tracked frame relative to the reference frame.
    pub fn pose(&self) -> Iso3 {
        self.state.pose
    }

    /// Affine brightness of the last tracked frame relative to the reference frame.
    pub fn affine(&self) -> AffineLight {
        self.state.affine
    }

    /// True if the depth prior has been overcome by the motion.
    pub fn is_snapped(&self) -> bool {
        self.state.snapped
    }

    /// Number of frames tracked since the reference frame.
    pub fn frame_id(&self) -> usize {
        self.state.frame_id
    }

    /// Candidate points of a level.
    pub fn points(&self, level: usize) -> &[CandidatePoint] {
        &self.state.points[level]
    }

    /// The reference frame.
    pub fn reference(&self) -> &Frame {
        &self.state.reference
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn is_compatible(&self, frame: &Frame) -> bool {
        frame.nb_levels() >= self.config.nb_levels
            && (0..self.config.nb_levels)
                .all(|level| frame.size(level) == self.state.reference.size(level))
    }
} // impl CoarseInitializer

// Helpers #######################################################################

/// Prepare the points of a level for a new optimization:
/// committed energies are zeroed.
/// On the coarsest level, invalid points with good neighbours are revived
/// with the mean target of those neighbours.
fn reset_points(points: &mut [CandidatePoint], coarsest: bool) {
    for point in points.iter_mut() {
        point.energy = [0.0, 0.0];
    }
    if !coarsest {
        return;
    }
    let snapshot: Vec<(Float, bool)> = points.iter().map(|p| (p.ir, p.is_good)).collect();
    for point in points.iter_mut().filter(|p| !p.is_good) {
        let (sum, count) = point
            .neighbours
            .iter()
            .flatten()
            .map(|&n| snapshot[n])
            .filter(|&(_, good)| good)
            .fold((0.0, 0.0), |(s, c), (ir, _)| (s + ir, c + 1.0));
        if count > 0.0 {
            point.is_good = true;
            point.ir = sum / count;
            point.idepth = clamp_idepth(point.ir);
        }
    }
}

// TESTS #############################################################

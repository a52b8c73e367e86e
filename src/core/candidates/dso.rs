// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Candidates point selection according to
//! "Direct Sparse Odometry", J.Engel, V.Koltun, D. Cremers, PAMI 2018.

use log::trace;
use nalgebra::DMatrix;
use rand::Rng;

use crate::core::candidates::{Picked, PixelSelector};
use crate::core::frame::LevelImage;
use crate::core::multires;
use crate::misc::helper::nb_blocks;
use crate::misc::type_aliases::Float;

/// Configuration of regions.
#[derive(Copy, Clone, Debug)]
pub struct RegionConfig {
    /// The region size.
    pub size: usize,
    /// Coefficients `(a, b)` of the region threshold: `a * (median + b)^2`.
    pub threshold_coefs: (Float, Float),
}

/// Configuration of blocks.
#[derive(Copy, Clone, Debug)]
pub struct BlockConfig {
    /// Base size of a block.
    pub base_size: usize,
    /// Number of levels for picking points in blocks.
    pub nb_levels: usize,
    /// Multiplier factor for block threshold computation.
    pub threshold_factor: Float,
}

/// Configuration of the recursive nature of candidates selection.
/// If the number of points obtained after one iteration is not within
/// given bounds, the algorithm adapts the base block size and re-iterates.
#[derive(Copy, Clone, Debug)]
pub struct RecursiveConfig {
    /// Max number of iterations left.
    pub nb_iterations_left: usize,
    /// Low percentage threshold of target number of points.
    pub low_thresh: Float,
    /// High percentage threshold of target number of points.
    pub high_thresh: Float,
    /// Threshold such that if we have random_thresh < points_ratio < high_thresh,
    /// we randomly sample points to have approximately the desired target number of candidate
    /// points.
    pub random_thresh: Float,
}

/// Default region configuration according to DSO paper and code.
pub const DEFAULT_REGION_CONFIG: RegionConfig = RegionConfig {
    size: 32,
    threshold_coefs: (1.0, 3.0), // (2.0, 3) in dso and (1.0, 3) in ldso
};

/// Default block configuration according to DSO paper and code.
pub const DEFAULT_BLOCK_CONFIG: BlockConfig = BlockConfig {
    base_size: 4,
    nb_levels: 3,
    threshold_factor: 0.5,
};

/// Default recursive configuration according to DSO paper and code.
pub const DEFAULT_RECURSIVE_CONFIG: RecursiveConfig = RecursiveConfig {
    nb_iterations_left: 1,
    low_thresh: 0.8,
    high_thresh: 4.0,
    random_thresh: 1.1,
};

/// Pixel selector picking the strongest gradient of blocks,
/// with thresholds adapted to the gradients of each region.
#[derive(Copy, Clone, Debug)]
pub struct DsoSelector {
    /// Regions configuration.
    pub region_config: RegionConfig,
    /// Blocks configuration.
    pub block_config: BlockConfig,
    /// Recursive adaptation configuration.
    pub recursive_config: RecursiveConfig,
}

impl Default for DsoSelector {
    fn default() -> Self {
        Self {
            region_config: DEFAULT_REGION_CONFIG,
            block_config: DEFAULT_BLOCK_CONFIG,
            recursive_config: DEFAULT_RECURSIVE_CONFIG,
        }
    }
}

impl PixelSelector for DsoSelector {
    fn select(&mut self, image: &LevelImage, nb_target: usize) -> DMatrix<Picked> {
        let gradients = image.map(|pixel| (pixel.y * pixel.y + pixel.z * pixel.z).sqrt());
        select(
            &gradients,
            self.region_config,
            self.block_config,
            self.recursive_config,
            nb_target,
        )
    }
}

/// Select a subset of points satisfying two conditions:
///   * points shall be well-distributed in the image.
///   * higher density where gradients are bigger.
///
/// The returned map holds the block level at which each point was picked.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_precision_loss)]
pub fn select(
    gradients: &DMatrix<Float>,
    region_config: RegionConfig,
    block_config: BlockConfig,
    recursive_config: RecursiveConfig,
    nb_target: usize,
) -> DMatrix<Picked> {
    // Pick all block candidates
    let median_gradients = region_median_gradients(gradients, region_config.size);
    let regions_thresholds = region_thresholds(&median_gradients, region_config.threshold_coefs);
    let (vec_nb_candidates, picked) = pick_all_block_candidates(
        block_config,
        region_config.size,
        &regions_thresholds,
        gradients,
    );
    let nb_candidates: usize = vec_nb_candidates.iter().sum();
    trace!("Number of points picked by level: {:?}", vec_nb_candidates);
    let candidates_ratio = nb_candidates as Float / nb_target.max(1) as Float;
    // The number of selected pixels behave approximately as
    // nb_candidates = K / (block_size + 1)^2 where K is scene dependant.
    // nb_target = K / (target_size + 1)^2
    // So sqrt( candidates_ratio ) = (target_size + 1) / (block_size + 1)
    // and in theory:
    // target_size = sqrt( ratio ) * (block_size + 1) - 1
    let target_size = candidates_ratio.sqrt() * (block_config.base_size as Float + 1.0) - 1.0;
    let target_size = std::cmp::max(1, target_size.round() as i32) as usize;
    if candidates_ratio < recursive_config.low_thresh
        || candidates_ratio > recursive_config.high_thresh
    {
        if target_size != block_config.base_size && recursive_config.nb_iterations_left > 0 {
            let mut b_config = block_config;
            b_config.base_size = target_size;
            let mut rec_config = recursive_config;
            rec_config.nb_iterations_left -= 1;
            select(gradients, region_config, b_config, rec_config, nb_target)
        } else {
            picked
        }
    } else if candidates_ratio > recursive_config.random_thresh {
        // randomly select a correct % of points
        let mut rng = rand::thread_rng();
        let keep_ratio = 1.0 / candidates_ratio;
        picked.map(|p| {
            if p > 0 && rng.gen::<Float>() <= keep_ratio {
                p
            } else {
                0
            }
        })
    } else {
        picked
    }
}

/// Pick candidates at all the block levels.
#[allow(clippy::cast_possible_truncation)]
fn pick_all_block_candidates(
    block_config: BlockConfig,
    regions_size: usize,
    regions_thresholds: &DMatrix<Float>,
    gradients: &DMatrix<Float>,
) -> (Vec<usize>, DMatrix<Picked>) {
    let (nb_rows, nb_cols) = gradients.shape();
    let max_gradients_0 = init_max_gradients(gradients, block_config.base_size);
    let max_gradients_multires =
        multires::limited_sequence(block_config.nb_levels, max_gradients_0, |m| {
            multires::halve(m, max_of_four_gradients)
        });
    let mut threshold_level_coef = 1.0;
    let mut nb_picked = Vec::new();
    let (blocks_rows, blocks_cols) = max_gradients_multires[0].shape();
    let mut mask = DMatrix::repeat(blocks_rows, blocks_cols, true);
    let mut candidates = DMatrix::repeat(nb_rows, nb_cols, 0);
    for (level, max_gradients_level) in max_gradients_multires.iter().enumerate() {
        let (nb_picked_level, mask_next_level) = pick_level_block_candidates(
            threshold_level_coef,
            (level + 1) as Picked,
            regions_size,
            regions_thresholds,
            max_gradients_level,
            &mask,
            &mut candidates,
        );
        nb_picked.push(nb_picked_level);
        mask = mask_next_level;
        threshold_level_coef *= block_config.threshold_factor;
    }
    (nb_picked, candidates)
}

/// Gradient magnitude and position of a pixel.
type GradientAt = (Float, usize, usize);

/// Retrieve the pixel with max gradient for each block in the image.
fn init_max_gradients(gradients: &DMatrix<Float>, block_size: usize) -> DMatrix<GradientAt> {
    let (nb_rows, nb_cols) = gradients.shape();
    DMatrix::from_fn(nb_blocks(nb_rows, block_size), nb_blocks(nb_cols, block_size), |bi, bj| {
        let start_i = bi * block_size;
        let start_j = bj * block_size;
        let end_i = std::cmp::min(start_i + block_size, nb_rows);
        let end_j = std::cmp::min(start_j + block_size, nb_cols);
        let mut tmp_max = (gradients[(start_i, start_j)], start_i, start_j);
        for j in start_j..end_j {
            for i in start_i..end_i {
                let g = gradients[(i, j)];
                if g > tmp_max.0 {
                    tmp_max = (g, i, j);
                }
            }
        }
        tmp_max
    })
}

/// Retrieve the max and position of 4 gradients.
fn max_of_four_gradients(
    g1: GradientAt,
    g2: GradientAt,
    g3: GradientAt,
    g4: GradientAt,
) -> GradientAt {
    let g_max = |g_m1: GradientAt, g_m2: GradientAt| if g_m1.0 < g_m2.0 { g_m2 } else { g_m1 };
    g_max(g1, g_max(g2, g_max(g3, g4)))
}

/// For each block where the mask is "true",
/// select the pixel with the highest gradient magnitude
/// if its squared magnitude is above the region threshold.
/// Returns the number of selected points and a mask of blocks to test for the next level.
fn pick_level_block_candidates(
    threshold_level_coef: Float,
    level: Picked,
    regions_size: usize,
    regions_thresholds: &DMatrix<Float>,
    max_gradients: &DMatrix<GradientAt>,
    mask: &DMatrix<bool>,
    candidates: &mut DMatrix<Picked>,
) -> (usize, DMatrix<bool>) {
    let (mask_height, mask_width) = mask.shape();
    let mut mask_next_level = DMatrix::repeat(mask_height / 2, mask_width / 2, true);
    let mut nb_picked = 0;
    // We use mask_width / 2 * 2 to avoid remainder pixels
    for j in 0..(mask_width / 2 * 2) {
        for i in 0..(mask_height / 2 * 2) {
            if mask[(i, j)] {
                let (g, i_g, j_g) = max_gradients[(i, j)];
                let threshold = regions_thresholds[(i_g / regions_size, j_g / regions_size)];
                if g * g >= threshold_level_coef * threshold {
                    mask_next_level[(i / 2, j / 2)] = false;
                    candidates[(i_g, j_g)] = level;
                    nb_picked += 1;
                }
            } else {
                mask_next_level[(i / 2, j / 2)] = false;
            }
        }
    }
    (nb_picked, mask_next_level)
}

/// Smooth the medians and set thresholds given some coefficients (a,b):
/// threshold = a * ( smooth( median ) + b ) ^ 2.
#[allow(clippy::cast_precision_loss)]
fn region_thresholds(median_gradients: &DMatrix<Float>, coefs: (Float, Float)) -> DMatrix<Float> {
    let (nb_rows, nb_cols) = median_gradients.shape();
    DMatrix::from_fn(nb_rows, nb_cols, |i, j| {
        let start_i = i.saturating_sub(1);
        let start_j = j.saturating_sub(1);
        let end_i = std::cmp::min(nb_rows, i + 2);
        let end_j = std::cmp::min(nb_cols, j + 2);
        let neighborhood = median_gradients.view((start_i, start_j), (end_i - start_i, end_j - start_j));
        let (a, b) = coefs;
        let thresh_tmp = neighborhood.mean() + b;
        a * thresh_tmp * thresh_tmp
    })
}

/// Compute median gradients magnitude of each region in the image.
/// The regions on the right and bottom might be smaller.
fn region_median_gradients(gradients: &DMatrix<Float>, size: usize) -> DMatrix<Float> {
    let (nb_rows, nb_cols) = gradients.shape();
    DMatrix::from_fn(nb_blocks(nb_rows, size), nb_blocks(nb_cols, size), |i, j| {
        let height = std::cmp::min(size, nb_rows - i * size);
        let width = std::cmp::min(size, nb_cols - j * size);
        let region_view = gradients.view((i * size, j * size), (height, width));
        let mut region_cloned: Vec<Float> = region_view.iter().cloned().collect();
        region_cloned.sort_unstable_by(|a, b| a.total_cmp(b));
        region_cloned[region_cloned.len() / 2]
    })
}

// TESTS #############################################################

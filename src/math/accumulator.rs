// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper types to accumulate (sum) a lot of values.
//!
//! Summing thousands of small f32 terms into a single variable loses precision.
//! The accumulators here sum into a first buffer and flush it into a second one
//! every `FLUSH_THRESHOLD` additions.

use nalgebra::SVector;

use crate::misc::type_aliases::{Float, Mat8, Mat9, Vec8, Vec9};

const FLUSH_THRESHOLD: u32 = 100;

/// Number of coefficients in the upper triangle of a symmetric 9x9 matrix.
const SYM_MAT_9_SIZE: usize = 45;

type SymData = SVector<Float, SYM_MAT_9_SIZE>;

/// Symmetric 9x9 matrix accumulator.
///
/// Accumulated vectors are of the form `[J, r]` where `J` are the 8 jacobian
/// coefficients of the pose and affine parameters and `r` is a residual term.
/// The resulting matrix therefore holds the 8x8 hessian in its top-left corner
/// and the 8x1 gradient in its last column.
#[derive(Clone, Debug)]
pub struct SymMat9 {
    nb_data: u32,
    data: SymData,
    data_hundreds: SymData,
}

impl Default for SymMat9 {
    fn default() -> Self {
        Self::new()
    }
}

impl SymMat9 {
    /// Initialize with zeros.
    #[inline]
    pub fn new() -> Self {
        Self {
            nb_data: 0,
            data: SymData::zeros(),
            data_hundreds: SymData::zeros(),
        }
    }

    /// Merge another `SymMat9` into this one.
    #[inline]
    pub fn add(&mut self, other: &Self) {
        let nb_data = self.nb_data + other.nb_data;
        if nb_data < FLUSH_THRESHOLD {
            self.nb_data = nb_data;
            self.data += other.data;
            self.data_hundreds += other.data_hundreds;
        } else {
            self.nb_data = 0;
            self.data_hundreds += self.data + other.data + other.data_hundreds;
            self.data = SymData::zeros();
        }
    }

    /// Add a term vv^t to the symmetric matrix accumulator.
    #[inline]
    pub fn add_vec(&mut self, vec: &Vec9) {
        self.add_vec_weighted(1.0, vec);
    }

    /// Add a term w * vv^t to the symmetric matrix accumulator.
    #[inline]
    pub fn add_vec_weighted(&mut self, weight: Float, vec: &Vec9) {
        let mut vec_data = SymData::zeros();
        let mut index = 0_usize;
        for j in 0..9 {
            let data_j = weight * vec[j];
            for i in j..9 {
                vec_data[index] = data_j * vec[i];
                index += 1;
            }
        }
        if self.nb_data < FLUSH_THRESHOLD {
            self.nb_data += 1;
            self.data += vec_data;
        } else {
            self.nb_data = 1;
            self.data_hundreds += self.data;
            self.data = vec_data;
        }
    }

    /// Accumulate all values into the field used in the `to_mat` function.
    /// Clear the other fields.
    #[inline]
    pub fn flush(&mut self) {
        if self.nb_data > 0 {
            self.data_hundreds += self.data;
            self.data = SymData::zeros();
            self.nb_data = 0;
        }
    }

    /// Convert the `SymMat9` into a normal matrix `Mat9`.
    /// Requires the use of `flush()` before.
    #[inline]
    pub fn to_mat(&self) -> Mat9 {
        let mut mat = Mat9::zeros();
        let mut index = 0_usize;
        for j in 0..9 {
            for i in j..9 {
                let data_ij = self.data_hundreds[index];
                mat[(i, j)] = data_ij;
                mat[(j, i)] = data_ij;
                index += 1;
            }
        }
        mat
    }

    /// Flush and split the accumulated matrix into
    /// its 8x8 hessian block and its 8x1 gradient block.
    pub fn finalize(mut self) -> (Mat8, Vec8) {
        self.flush();
        let mat = self.to_mat();
        (
            mat.fixed_view::<8, 8>(0, 0).into_owned(),
            mat.fixed_view::<8, 1>(0, 8).into_owned(),
        )
    }
}

/// Scalar energy accumulator, also counting the number of terms.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnergyAccum {
    nb_data: u32,
    nb_total: u32,
    data: Float,
    data_hundreds: Float,
}

impl EnergyAccum {
    /// Initialize with zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one energy term.
    #[inline]
    pub fn add(&mut self, value: Float) {
        self.nb_total += 1;
        if self.nb_data < FLUSH_THRESHOLD {
            self.nb_data += 1;
            self.data += value;
        } else {
            self.nb_data = 1;
            self.data_hundreds += self.data;
            self.data = value;
        }
    }

    /// Number of accumulated terms.
    pub fn count(&self) -> u32 {
        self.nb_total
    }

    /// Total sum of the accumulated terms.
    pub fn sum(&self) -> Float {
        self.data_hundreds + self.data
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;
    use approx;
    use quickcheck_macros;

    const EPSILON: Float = 1e-5;

    type Jac = (i8, i8, i8, i8, i8, i8, i8, i8);

    fn gen_vec(jac: Jac, r: i8) -> Vec9 {
        let (a, b, c, d, e, f, g, h) = jac;
        Vec9::from_iterator([a, b, c, d, e, f, g, h, r].iter().map(|&x| Float::from(x) / 16.0))
    }

    #[test]
    fn new() {
        let accum = SymMat9::new();
        assert_eq!(accum.nb_data, 0);
        assert_eq!(accum.to_mat(), Mat9::zeros());
    }

    #[test]
    fn finalize_splits_hessian_and_gradient() {
        let vec = Vec9::from_iterator((1..=9).map(|x| x as Float));
        let mut accum = SymMat9::new();
        accum.add_vec(&vec);
        let (hessian, gradient) = accum.finalize();
        assert_eq!(hessian[(0, 0)], 1.0);
        assert_eq!(hessian[(7, 6)], 56.0);
        assert_eq!(gradient[0], 9.0);
        assert_eq!(gradient[7], 72.0);
    }

    #[test]
    fn energy_sum_and_count() {
        let mut accum = EnergyAccum::new();
        for _ in 0..250 {
            accum.add(0.5);
        }
        assert_eq!(accum.count(), 250);
        approx::assert_relative_eq!(accum.sum(), 125.0);
    }

    // PROPERTY TESTS ################################################

    #[quickcheck_macros::quickcheck]
    fn add_vec_101_nb_1(jac: Jac, r: i8) -> bool {
        let vec = gen_vec(jac, r);
        let mut accum = SymMat9::new();
        for _ in 0..101 {
            accum.add_vec(&vec);
        }
        accum.nb_data == 1
    }

    #[quickcheck_macros::quickcheck]
    fn to_mat(jac: Jac, r: i8) -> bool {
        let vec = gen_vec(jac, r);
        let mut accum = SymMat9::new();
        accum.add_vec(&vec);
        accum.flush();
        approx::relative_eq!(
            accum.to_mat(),
            vec * vec.transpose(),
            max_relative = EPSILON
        )
    }

    #[quickcheck_macros::quickcheck]
    fn add_merges_like_sequential(jac: Jac, r: i8) -> bool {
        let vec = gen_vec(jac, r);
        let mut sequential = SymMat9::new();
        let mut left = SymMat9::new();
        let mut right = SymMat9::new();
        for i in 0..150 {
            sequential.add_vec_weighted(0.5, &vec);
            if i % 3 == 0 {
                left.add_vec_weighted(0.5, &vec);
            } else {
                right.add_vec_weighted(0.5, &vec);
            }
        }
        left.add(&right);
        left.flush();
        sequential.flush();
        approx::relative_eq!(
            left.to_mat(),
            sequential.to_mat(),
            epsilon = 1e-3,
            max_relative = 1e-4
        )
    }

    #[quickcheck_macros::quickcheck]
    fn add_vec_1000_better(jac: Jac, r: i8) -> bool {
        let vec = gen_vec(jac, r);
        let base = vec * vec.transpose();
        let ground_truth = 1000.0 * base;

        // Compute the sum without the accumulator.
        let mut normal_sum = Mat9::zeros();
        for _ in 0..1000 {
            normal_sum += base;
        }

        // Compute the sum with the accumulator.
        let mut accum = SymMat9::new();
        for _ in 0..1000 {
            accum.add_vec(&vec);
        }
        accum.flush();

        // Compare both versions.
        let accum_error = (accum.to_mat() - ground_truth).norm();
        let sum_error = (normal_sum - ground_truth).norm();
        accum_error <= sum_error
    }
}

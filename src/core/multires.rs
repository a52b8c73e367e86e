// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Functions to generate sequence of matrices with lower and lower resolution.

use nalgebra::{DMatrix, Scalar};

use crate::misc::type_aliases::Float;

/// Recursively generate a pyramid of matrices where each level
/// is half the previous resolution, computed with the mean of each 2x2 block.
///
/// The first level is the given matrix converted to floating point.
pub fn mean_pyramid(max_levels: usize, mat: &DMatrix<u8>) -> Vec<DMatrix<Float>> {
    limited_sequence(max_levels, mat.map(Float::from), |m| {
        halve(m, |a, b, c, d| 0.25 * (a + b + c + d))
    })
}

/// Recursively apply a function transforming the image
/// until it's not possible anymore or the max number of iterations is reached.
/// Using iterations = 0 has the same effect than iterations = 1 since it always has
/// at least one matrix (the init matrix).
pub fn limited_sequence<F, T>(iterations: usize, mat: DMatrix<T>, f: F) -> Vec<DMatrix<T>>
where
    F: Fn(&DMatrix<T>) -> Option<DMatrix<T>>,
    T: Scalar,
{
    let mut pyr = vec![mat];
    while pyr.len() < iterations {
        match pyr.last().and_then(|m| f(m)) {
            Some(new_mat) => pyr.push(new_mat),
            None => break,
        }
    }
    pyr
}

/// Halve the resolution of a matrix by applying a function to each 2x2 block.
/// If one size of the matrix is < 2 then this function returns None.
/// If one size is odd, its last line/column is dropped.
///
/// The block is of the form:
///   a c
///   b d
pub fn halve<F, T, U>(mat: &DMatrix<T>, f: F) -> Option<DMatrix<U>>
where
    F: Fn(T, T, T, T) -> U,
    T: Scalar + Copy,
    U: Scalar,
{
    let (r, c) = mat.shape();
    let half_r = r / 2;
    let half_c = c / 2;
    if half_r == 0 || half_c == 0 {
        None
    } else {
        let half_mat = DMatrix::<U>::from_fn(half_r, half_c, |i, j| {
            let a = mat[(2 * i, 2 * j)];
            let b = mat[(2 * i + 1, 2 * j)];
            let c = mat[(2 * i, 2 * j + 1)];
            let d = mat[(2 * i + 1, 2 * j + 1)];
            f(a, b, c, d)
        });
        Some(half_mat)
    }
}

// TESTS #############################################################

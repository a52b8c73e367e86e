// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper function to compute gradients

use nalgebra::DMatrix;

use crate::misc::type_aliases::Float;

/// Compute a centered gradient.
///
/// 1/2 * ( img(i+1,j) - img(i-1,j), img(i,j+1) - img(i,j-1) )
///
/// Gradients of pixels at the border of the image are set to 0.
pub fn centered(img: &DMatrix<Float>) -> (DMatrix<Float>, DMatrix<Float>) {
    let (nb_rows, nb_cols) = img.shape();
    let interior = |i: usize, j: usize| i > 0 && j > 0 && i + 1 < nb_rows && j + 1 < nb_cols;
    let grad_x = DMatrix::from_fn(nb_rows, nb_cols, |i, j| {
        if interior(i, j) {
            0.5 * (img[(i, j + 1)] - img[(i, j - 1)])
        } else {
            0.0
        }
    });
    let grad_y = DMatrix::from_fn(nb_rows, nb_cols, |i, j| {
        if interior(i, j) {
            0.5 * (img[(i + 1, j)] - img[(i - 1, j)])
        } else {
            0.0
        }
    });
    (grad_x, grad_y)
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn centered_on_a_ramp() {
        // Intensity increases by 2 along x and by 10 along y.
        let img = DMatrix::from_fn(5, 6, |i, j| (10 * i + 2 * j) as Float);
        let (gx, gy) = centered(&img);
        assert_eq!(gx[(2, 3)], 2.0);
        assert_eq!(gy[(2, 3)], 10.0);
        assert_eq!(gx[(0, 3)], 0.0);
        assert_eq!(gy[(2, 5)], 0.0);
    }
}

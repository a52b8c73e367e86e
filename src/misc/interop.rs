// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interoperability conversions between the image and matrix types.
//!
//! Matrices are indexed `(row, column)`, images `(x, y)`,
//! so every conversion performs a transposition.

use image::{GrayImage, Rgb, RgbImage};
use nalgebra::DMatrix;

/// Convert a `GrayImage` into an `u8` matrix.
pub fn matrix_from_image(img: GrayImage) -> DMatrix<u8> {
    let (width, height) = img.dimensions();
    DMatrix::from_row_slice(height as usize, width as usize, &img.into_raw())
}

/// Convert an `(r, g, b)` matrix into an `RgbImage`.
#[allow(clippy::cast_possible_truncation)]
pub fn rgb_from_matrix(mat: &DMatrix<(u8, u8, u8)>) -> RgbImage {
    let (nb_rows, nb_cols) = mat.shape();
    RgbImage::from_fn(nb_cols as u32, nb_rows as u32, |x, y| {
        let (r, g, b) = mat[(y as usize, x as usize)];
        Rgb([r, g, b])
    })
}

// TESTS #############################################################

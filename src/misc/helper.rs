// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Miscellaneous helper functions that didn't fit elsewhere.

/// Compute the quotient and remainder of x/y both at the same time.
pub fn div_rem<T>(x: T, y: T) -> (T, T)
where
    T: std::ops::Div<Output = T> + std::ops::Rem<Output = T> + Copy,
{
    (x / y, x % y)
}

/// Number of blocks of size `block` needed to cover `size`.
pub fn nb_blocks(size: usize, block: usize) -> usize {
    match div_rem(size, block) {
        (quot, 0) => quot,
        (quot, _) => quot + 1,
    }
}

// TESTS #############################################################

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn blocks_cover_the_size() {
        assert_eq!(div_rem(17, 5), (3, 2));
        assert_eq!(nb_blocks(64, 32), 2);
        assert_eq!(nb_blocks(65, 32), 3);
        assert_eq!(nb_blocks(3, 4), 1);
    }
}

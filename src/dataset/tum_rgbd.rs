// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helper functions to handle datasets compatible with TUM RGB-D.

use std::fmt;
use std::path::PathBuf;

use crate::core::camera::Intrinsics;
use crate::misc::type_aliases::Iso3;

/// Intrinsics parameters of freiburg 1 (fr1) scenes in the TUM RGB-D dataset.
#[allow(clippy::excessive_precision)]
pub const INTRINSICS_FR1: Intrinsics = Intrinsics {
    principal_point: (318.643_040, 255.313_989),
    focal: (517.306_408, 516.469_215),
};

/// Intrinsics parameters of freiburg 2 (fr2) scenes in the TUM RGB-D dataset.
#[allow(clippy::excessive_precision)]
pub const INTRINSICS_FR2: Intrinsics = Intrinsics {
    principal_point: (325.141_442, 249.701_764),
    focal: (520.908_620, 521.007_327),
};

/// Intrinsics parameters of freiburg 3 (fr3) scenes in the TUM RGB-D dataset.
#[allow(clippy::excessive_precision)]
pub const INTRINSICS_FR3: Intrinsics = Intrinsics {
    principal_point: (320.106_653, 247.632_132),
    focal: (535.433_105, 539.212_524),
};

/// Timestamp and 3D camera pose of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    /// Timestamp of the frame.
    pub timestamp: f64,
    /// Pose (rigid body motion / direct isometry) of the frame.
    pub pose: Iso3,
}

/// Timestamp and file path of an image, as listed in `rgb.txt`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    /// Timestamp of the image.
    pub timestamp: f64,
    /// File path of the image, relative to the dataset directory.
    pub file_path: PathBuf,
}

/// Write trajectory points in the TUM RGB-D format for trajectories:
/// `timestamp tx ty tz qx qy qz qw`.
impl fmt::Display for TrajectoryPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = self.pose.translation.vector;
        let q = self.pose.rotation.into_inner().coords;
        write!(
            f,
            "{} {} {} {} {} {} {} {}",
            self.timestamp, t.x, t.y, t.z, q.x, q.y, q.z, q.w
        )
    }
}

/// Error while parsing a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parsing error at line {line}")]
pub struct ParseError {
    /// Line number, starting at 1.
    pub line: usize,
}

/// Parse image lists of a dataset using the TUM RGB-D format.
pub mod parse {
    use super::*;
    use nom::{
        branch::alt,
        bytes::complete::{is_not, tag},
        character::complete::{not_line_ending, space1},
        combinator::map,
        number::complete::double,
        sequence::{preceded, tuple},
        IResult,
    };

    /// Parse an image list file (`rgb.txt` or `depth.txt`) into a vector of `ImageEntry`.
    pub fn image_list(file_content: &str) -> Result<Vec<ImageEntry>, ParseError> {
        multi_line(image_line, file_content)
    }

    fn multi_line<F, T>(line_parser: F, file_content: &str) -> Result<Vec<T>, ParseError>
    where
        F: Fn(&str) -> IResult<&str, Option<T>>,
    {
        let mut vec_data = Vec::new();
        for (line_idx, line) in file_content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line_parser(line) {
                Ok((_, Some(data))) => vec_data.push(data),
                Ok(_) => (),
                Err(_) => return Err(ParseError { line: line_idx + 1 }),
            }
        }
        Ok(vec_data)
    }

    // nom parsers #############################################################

    // Parse a comment.
    fn comment(input: &str) -> IResult<&str, ()> {
        map(preceded(tag("#"), not_line_ending), |_| ())(input)
    }

    fn path(input: &str) -> IResult<&str, PathBuf> {
        map(is_not(" \t\r\n"), PathBuf::from)(input)
    }

    // Image list ----------------------

    // Image line is either a comment or a timestamp and a file path.
    fn image_line(input: &str) -> IResult<&str, Option<ImageEntry>> {
        alt((map(comment, |_| None), map(image_entry, Some)))(input)
    }

    fn image_entry(input: &str) -> IResult<&str, ImageEntry> {
        map(tuple((double, space1, path)), |(timestamp, _, file_path)| {
            ImageEntry {
                timestamp,
                file_path,
            }
        })(input)
    }
} // pub mod parse

// TESTS #############################################################

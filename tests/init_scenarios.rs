// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use nalgebra::DMatrix;

use visual_odometry_init::core::camera::Intrinsics;
use visual_odometry_init::core::candidates::dso::DsoSelector;
use visual_odometry_init::core::candidates::{Picked, PixelSelector};
use visual_odometry_init::core::frame::{Frame, LevelImage};
use visual_odometry_init::core::init::coarse_initializer::{Config, OutputObserver};
use visual_odometry_init::core::init::materialize::UNKNOWN_IDEPTH;
use visual_odometry_init::misc::type_aliases::Float;

const WIDTH: usize = 320;
const HEIGHT: usize = 240;
const NB_LEVELS: usize = 5;

const INTRINSICS: Intrinsics = Intrinsics {
    focal: (100.0, 100.0),
    principal_point: (160.0, 120.0),
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Selector picking one pixel every `step` in both directions.
struct Grid {
    step: usize,
}

impl PixelSelector for Grid {
    fn select(&mut self, image: &LevelImage, _nb_target: usize) -> DMatrix<Picked> {
        let step = self.step;
        DMatrix::from_fn(image.nrows(), image.ncols(), |i, j| {
            Picked::from(i % step == 0 && j % step == 0)
        })
    }
}

struct NoObserver;

impl OutputObserver for NoObserver {
    fn push_live_frame(&mut self, _frame: &Frame) {}
}

/// Smooth texture of a plane.
fn smooth(x: Float, y: Float) -> Float {
    128.0
        + 35.0 * (0.07 * x + 0.4 * (0.05 * y).sin()).sin()
        + 30.0 * (0.09 * y + 0.02 * x).cos()
        + 20.0 * (0.05 * x - 0.06 * y).sin()
}

/// Checkerboard with squares of 32 pixels.
#[allow(clippy::cast_possible_truncation)]
fn checkerboard(x: Float, y: Float) -> Float {
    let square = ((x / 32.0).floor() + (y / 32.0).floor()) as i64;
    if square.rem_euclid(2) == 0 {
        60.0
    } else {
        190.0
    }
}

/// Plane seen with a lateral shift of `shift` pixels
/// and an affine brightness change `gain * I + offset`.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn render(texture: fn(Float, Float) -> Float, shift: Float, gain: Float, offset: Float) -> Frame {
    let img = DMatrix::from_fn(HEIGHT, WIDTH, |i, j| {
        let value = gain * texture(j as Float - shift, i as Float) + offset;
        value.max(0.0).min(255.0) as u8
    });
    Frame::from_gray(&img, NB_LEVELS, 0.0)
}

fn plane(shift: Float) -> Frame {
    render(smooth, shift, 1.0, 0.0)
}

#[test]
fn identical_frames_never_snap() {
    init_logger();
    let frame = plane(0.0);
    let mut initializer = Config::new(INTRINSICS)
        .init(frame.clone(), &mut Grid { step: 4 })
        .unwrap();
    let mut observer = NoObserver;
    let mut observers: [&mut dyn OutputObserver; 1] = [&mut observer];
    for _ in 0..8 {
        assert!(!initializer.track_frame(&frame, &mut observers));
    }
    assert!(!initializer.is_snapped());
    assert!(initializer.pose().translation.vector.norm() < 1e-2);
}

#[test]
fn lateral_translation_snaps() {
    init_logger();
    let mut initializer = Config::new(INTRINSICS)
        .init(plane(0.0), &mut Grid { step: 4 })
        .unwrap();
    let target = plane(10.0);
    let mut observer = NoObserver;
    let mut observers: [&mut dyn OutputObserver; 1] = [&mut observer];
    let ready = (0..12).any(|_| initializer.track_frame(&target, &mut observers));
    assert!(initializer.is_snapped());
    assert!(ready);

    // The content moved to the right, so did the camera relative to the plane.
    let translation = initializer.pose().translation.vector;
    assert!(translation.norm() > 0.0);
    assert!(translation.x / translation.norm() > 0.9);

    for level in 0..NB_LEVELS {
        assert!(initializer
            .points(level)
            .iter()
            .all(|p| p.idepth >= 1e-3 && p.idepth <= 50.0));
    }
    let depth = initializer.coarse_depth();
    assert_eq!(depth.len(), NB_LEVELS);
    assert!(!depth[0].pixels.is_empty());
    assert!(depth[0].pixels.iter().all(|p| p.idepth > 0.0));
    assert!(depth[0]
        .idepth
        .iter()
        .all(|&d| d == UNKNOWN_IDEPTH || d > 0.0));
}

#[test]
fn dso_selector_seeds_textured_frames() {
    init_logger();
    let img = DMatrix::from_fn(HEIGHT, WIDTH, |i, j| {
        if (i / 8 + j / 8) % 2 == 0 {
            40
        } else {
            200
        }
    });
    let frame = Frame::from_gray(&img, NB_LEVELS, 0.0);
    let initializer = Config::new(INTRINSICS)
        .init(frame, &mut DsoSelector::default())
        .unwrap();
    assert!(!initializer.points(0).is_empty());
    assert!(initializer
        .points(0)
        .iter()
        .all(|p| p.neighbours_iter().all(|(n, _)| n < initializer.points(0).len())));
}

#[test]
fn lateral_translation_on_checkerboard() {
    init_logger();
    let mut initializer = Config::new(INTRINSICS)
        .init(render(checkerboard, 0.0, 1.0, 0.0), &mut Grid { step: 4 })
        .unwrap();
    let target = render(checkerboard, 10.0, 1.0, 0.0);
    let mut observer = NoObserver;
    let mut observers: [&mut dyn OutputObserver; 1] = [&mut observer];
    for _ in 0..12 {
        initializer.track_frame(&target, &mut observers);
    }
    let t = initializer.pose().translation.vector;
    assert!(t.x > 0.0);
    assert!(t.x > t.y.abs() && t.x > t.z.abs());
}

#[test]
fn free_affine_brightness_is_recovered() {
    init_logger();
    let config = Config {
        fix_affine: false,
        ..Config::new(INTRINSICS)
    };
    let mut initializer = config.init(plane(0.0), &mut Grid { step: 4 }).unwrap();
    let target = render(smooth, 6.0, 1.2, 10.0);
    let mut observer = NoObserver;
    let mut observers: [&mut dyn OutputObserver; 1] = [&mut observer];
    let ready = (0..12).any(|_| initializer.track_frame(&target, &mut observers));
    assert!(ready);
    assert!(initializer.is_snapped());
    let affine = initializer.affine();
    assert!((affine.gain() - 1.2).abs() < 0.02);
    assert!((affine.b - 10.0).abs() < 1.0);
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use image::RgbImage;
use log::{error, info};
use std::{env, error::Error, fs, path::Path, path::PathBuf};

use visual_odometry_init::core::camera::Intrinsics;
use visual_odometry_init::core::candidates::dso::DsoSelector;
use visual_odometry_init::core::frame::Frame;
use visual_odometry_init::core::init::coarse_initializer::{self as init, OutputObserver};
use visual_odometry_init::dataset::tum_rgbd;
use visual_odometry_init::misc::interop;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if let Err(error) = run(&args) {
        error!("{}", error);
        std::process::exit(1);
    }
}

const USAGE: &str = "Usage: ./voi_init_tum [fr1|fr2|fr3] rgb_file [depth_images_dir]";

/// Number of pyramid levels of the frames.
const NB_LEVELS: usize = 5;

fn run(args: &[String]) -> Result<(), Box<dyn Error>> {
    // Check that the arguments are correct.
    let valid_args = check_args(args)?;

    // Build a vector containing timestamps and full paths of images.
    let images = parse_image_list(&valid_args.image_list_path)?;
    let (first, others) = images.split_first().ok_or("The image list is empty")?;

    // Initialize with the first frame as reference.
    let config = init::Config::new(valid_args.intrinsics);
    let mut selector = DsoSelector::default();
    let mut initializer = config.init(read_frame(first)?, &mut selector)?;

    let mut saver = valid_args.depth_images_dir.map(DepthImageSaver::new);
    let mut counter = FrameCounter::default();

    // Track frames until the initialization is ready.
    for entry in others {
        let frame = read_frame(entry)?;
        let ready = match saver.as_mut() {
            Some(saver) => {
                let mut observers: [&mut dyn OutputObserver; 2] = [saver, &mut counter];
                initializer.track_frame(&frame, &mut observers)
            }
            None => {
                let mut observers: [&mut dyn OutputObserver; 1] = [&mut counter];
                initializer.track_frame(&frame, &mut observers)
            }
        };
        if let Some(saver) = &saver {
            if let Some(error) = &saver.last_error {
                return Err(error.clone().into());
            }
        }
        if ready {
            let pose = initializer.pose();
            println!(
                "{}",
                tum_rgbd::TrajectoryPoint {
                    timestamp: entry.timestamp,
                    pose
                }
            );
            let depth = initializer.coarse_depth();
            info!(
                "ready after {} frames, {} pixels with depth at full resolution",
                counter.nb_frames,
                depth[0].pixels.len()
            );
            return Ok(());
        }
    }

    Err("The initialization never became ready".into())
}

struct Args {
    image_list_path: PathBuf,
    intrinsics: Intrinsics,
    depth_images_dir: Option<PathBuf>,
}

/// Verify that command line arguments are correct.
fn check_args(args: &[String]) -> Result<Args, String> {
    let (camera_id, image_list_str, depth_images_dir) = match args {
        [_, camera_id, image_list_str] => (camera_id, image_list_str, None),
        [_, camera_id, image_list_str, dir] => (camera_id, image_list_str, Some(PathBuf::from(dir))),
        _ => {
            eprintln!("{}", USAGE);
            return Err("Wrong number of arguments".to_string());
        }
    };
    let intrinsics = create_camera(camera_id)?;
    let image_list_path = PathBuf::from(image_list_str);
    if !image_list_path.is_file() {
        eprintln!("{}", USAGE);
        return Err(format!(
            "The image list file does not exist or is not reachable: {}",
            image_list_str
        ));
    }
    if let Some(dir) = &depth_images_dir {
        if !dir.is_dir() {
            eprintln!("{}", USAGE);
            return Err(format!("Not a directory: {}", dir.display()));
        }
    }
    Ok(Args {
        image_list_path,
        intrinsics,
        depth_images_dir,
    })
}

/// Create camera depending on `camera_id` command line argument.
fn create_camera(camera_id: &str) -> Result<Intrinsics, String> {
    match camera_id {
        "fr1" => Ok(tum_rgbd::INTRINSICS_FR1),
        "fr2" => Ok(tum_rgbd::INTRINSICS_FR2),
        "fr3" => Ok(tum_rgbd::INTRINSICS_FR3),
        _ => {
            eprintln!("{}", USAGE);
            Err(format!("Unknown camera id: {}", camera_id))
        }
    }
}

/// Open an image list file and parse it into a vector of entries with full paths.
fn parse_image_list(file_path: &Path) -> Result<Vec<tum_rgbd::ImageEntry>, Box<dyn Error>> {
    let content = fs::read_to_string(file_path)?;
    let parent = file_path.parent().unwrap_or_else(|| Path::new("."));
    let entries = tum_rgbd::parse::image_list(&content)?
        .into_iter()
        .map(|entry| tum_rgbd::ImageEntry {
            timestamp: entry.timestamp,
            file_path: parent.join(entry.file_path),
        })
        .collect();
    Ok(entries)
}

/// Read a gray frame with its image pyramid.
fn read_frame(entry: &tum_rgbd::ImageEntry) -> Result<Frame, Box<dyn Error>> {
    let img = interop::matrix_from_image(image::open(&entry.file_path)?.into_luma8());
    Ok(Frame::from_gray(&img, NB_LEVELS, 0.0))
}

// Observers #########################################################

/// Count the tracked frames.
#[derive(Default)]
struct FrameCounter {
    nb_frames: usize,
}

impl OutputObserver for FrameCounter {
    fn push_live_frame(&mut self, _frame: &Frame) {
        self.nb_frames += 1;
    }
}

/// Save the colorized inverse depth images in a directory.
struct DepthImageSaver {
    dir: PathBuf,
    nb_images: usize,
    last_error: Option<String>,
}

impl DepthImageSaver {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            nb_images: 0,
            last_error: None,
        }
    }
}

impl OutputObserver for DepthImageSaver {
    fn push_live_frame(&mut self, _frame: &Frame) {}

    fn needs_depth_image(&self) -> bool {
        true
    }

    fn push_depth_image(&mut self, image: &RgbImage) {
        let path = self.dir.join(format!("idepth_{:04}.png", self.nb_images));
        self.nb_images += 1;
        if let Err(error) = image.save(&path) {
            self.last_error = Some(format!("Cannot save {}: {}", path.display(), error));
        }
    }
}

use crate::all::*;

lazy_static! {
  pub static ref PARAMETER_SET: Mutex<ParameterSet> = Mutex::new(ParameterSet::default());
}

// What to do with the trailer playback cursor at end-of-trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(clap::ArgEnum)]
pub enum TrailerEnd {
  // Keep showing the last trailer frame.
  Hold,
  // Restart the trailer from its first frame.
  Loop,
}

#[derive(Debug)]
#[derive(clap::Parser)]
pub struct ParameterSet {
  // Feature extractor.
  #[clap(long, default_value = "16")]
  pub fast_threshold: i16,
  #[clap(long, default_value = "500")]
  pub max_keypoints: usize,
  #[clap(long, default_value = "3")]
  pub keypoint_min_distance: i32,

  // Matcher.
  #[clap(long, default_value = "0.7")]
  pub ratio_test: f64,
  #[clap(long, default_value = "10")]
  pub min_matches: usize,

  // Homography estimation.
  #[clap(long, default_value = "200")]
  pub ransac_iters: usize,
  #[clap(long, default_value = "5.0")]
  pub reproj_threshold: f64,

  // Pose tracker.
  #[clap(long, default_value = "30")]
  pub recovery_window: usize,
  #[clap(long, default_value = "0.8")]
  pub blend_factor: f64,
  #[clap(long, default_value = "25.0")]
  pub search_radius: f64,

  // Overlay compositor.
  #[clap(long, arg_enum, default_value = "hold")]
  pub trailer_end: TrailerEnd,
  #[clap(long, default_value = "1.5")]
  pub feather_width: f64,
}

// Matches the clap default values above. Cannot be derived because the
// derived one would zero every field.
impl Default for ParameterSet {
  fn default() -> ParameterSet {
    ParameterSet {
      fast_threshold: 16,
      max_keypoints: 500,
      keypoint_min_distance: 3,
      ratio_test: 0.7,
      min_matches: 10,
      ransac_iters: 200,
      reproj_threshold: 5.0,
      recovery_window: 30,
      blend_factor: 0.8,
      search_radius: 25.0,
      trailer_end: TrailerEnd::Hold,
      feather_width: 1.5,
    }
  }
}

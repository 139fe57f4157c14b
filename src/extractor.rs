use crate::all::*;

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

// 256-bit BRIEF descriptor.
pub const DESCRIPTOR_BYTES: usize = 32;
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

// Values 9 and 12 are popular, allowing quick rejection logic.
const FAST_VARIANT_N: usize = 12;

// A Bresenham circle.
const CIRCLE_RADIUS: i32 = 3;
const CIRCLE: [[i32; 2]; 16] = [
  [ 0, -3], [ 1, -3], [ 2, -2], [ 3, -1], [ 3,  0], [ 3,  1], [ 2,  2], [ 1,  3],
  [ 0,  3], [-1,  3], [-2,  2], [-3,  1], [-3,  0], [-3, -1], [-2, -2], [-1, -3],
];

// BRIEF sampling offsets stay within this patch radius. Detection skips a
// margin of the same size so all samples stay inside the image.
const PATCH_RADIUS: i32 = 12;
const MARGIN: i32 = PATCH_RADIUS + 1;

// Fixed seed so reference and query descriptors always use the same pattern.
const PATTERN_SEED: u64 = 0xb00c;

// Sparse features extracted from one frame or reference image. The keypoint
// and descriptor vectors are index-aligned.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameDescriptors {
  pub keypoints: Vec<Vector2d>,
  pub descriptors: Vec<Descriptor>,
}

impl FrameDescriptors {
  pub fn empty() -> FrameDescriptors {
    FrameDescriptors {
      keypoints: vec![],
      descriptors: vec![],
    }
  }

  pub fn len(&self) -> usize {
    self.keypoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.keypoints.is_empty()
  }
}

// Capability interface so the extraction algorithm can be swapped at catalog
// load time. Implementations must be deterministic for a fixed image.
pub trait FeatureExtractor {
  fn extract(&self, image: &Image) -> FrameDescriptors;
}

pub struct FastBriefExtractor {
  threshold: i16,
  max_keypoints: usize,
  min_distance: i32,
  // 256 comparison point pairs, [x0, y0, x1, y1] offsets from the keypoint.
  pattern: Vec<[i32; 4]>,
}

impl FastBriefExtractor {
  pub fn new() -> FastBriefExtractor {
    let p = &*PARAMETER_SET.lock().unwrap();
    FastBriefExtractor::with_params(p.fast_threshold, p.max_keypoints, p.keypoint_min_distance)
  }

  pub fn with_params(
    threshold: i16,
    max_keypoints: usize,
    min_distance: i32,
  ) -> FastBriefExtractor {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(PATTERN_SEED);
    let pattern = (0..(8 * DESCRIPTOR_BYTES)).map(|_| [
      rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
      rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
      rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
      rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
    ]).collect();
    FastBriefExtractor {
      threshold,
      max_keypoints,
      min_distance,
      pattern,
    }
  }

  fn detect(&self, image: &Image) -> Vec<(Pixel, i32)> {
    let mut detections = vec![];
    if (image.width as i32) <= 2 * MARGIN || (image.height as i32) <= 2 * MARGIN {
      return detections;
    }
    for y in MARGIN..(image.height as i32 - MARGIN) {
      for x in MARGIN..(image.width as i32 - MARGIN) {
        if let Some(score) = self.detect_at_pixel(x, y, image) {
          detections.push((Pixel::new(x, y), score));
        }
      }
    }
    detections
  }

  fn detect_at_pixel(&self, x: i32, y: i32, image: &Image) -> Option<i32> {
    let center_value = value(x, y, image);
    if continuous(x, y, image, |v| v < center_value - self.threshold)
      || continuous(x, y, image, |v| v > center_value + self.threshold) {
      Some(corner_score(x, y, image, center_value, self.threshold))
    }
    else {
      None
    }
  }

  // Greedy suppression of weaker nearby corners so the descriptor budget is
  // spread over the image instead of clustering on the strongest texture.
  fn select_keypoints(&self, mut detections: Vec<(Pixel, i32)>) -> Vec<Pixel> {
    // Fully deterministic order: ties on score resolved by scan order.
    detections.sort_by_key(|(p, score)| (-score, p[1], p[0]));
    let mut selected: Vec<Pixel> = vec![];
    for (p, _) in detections {
      let too_close = selected.iter().any(|q| {
        (p[0] - q[0]).abs() <= self.min_distance && (p[1] - q[1]).abs() <= self.min_distance
      });
      if too_close { continue }
      selected.push(p);
      if selected.len() >= self.max_keypoints { break }
    }
    selected
  }

  fn describe(&self, keypoint: Pixel, blurred: &Image) -> Descriptor {
    let mut descriptor = [0u8; DESCRIPTOR_BYTES];
    for (i, [x0, y0, x1, y1]) in self.pattern.iter().enumerate() {
      let a = blurred.value_i32(keypoint[0] + x0, keypoint[1] + y0);
      let b = blurred.value_i32(keypoint[0] + x1, keypoint[1] + y1);
      if a < b {
        descriptor[i / 8] |= 1u8 << (i % 8);
      }
    }
    descriptor
  }
}

impl FeatureExtractor for FastBriefExtractor {
  // Degenerate inputs (blank or tiny images) yield an empty but valid set.
  fn extract(&self, image: &Image) -> FrameDescriptors {
    let keypoints = self.select_keypoints(self.detect(image));
    if keypoints.is_empty() { return FrameDescriptors::empty() }
    let blurred = image.box_blur();
    let descriptors = keypoints.iter()
      .map(|p| self.describe(*p, &blurred))
      .collect();
    FrameDescriptors {
      keypoints: keypoints.iter()
        .map(|p| Vector2d::new(p[0] as f64, p[1] as f64))
        .collect(),
      descriptors,
    }
  }
}

fn continuous<F: Fn(i16) -> bool>(x: i32, y: i32, image: &Image, f: F) -> bool {
  // Quick rejection for 9 and 12 variants.
  if !f(value(x + CIRCLE_RADIUS, y, image)) && !f(value(x - CIRCLE_RADIUS, y, image)) {
    return false;
  }

  // The arc may wrap around the end of the circle table.
  let mut n = 0;
  for i in 0..(2 * CIRCLE.len()) {
    let p = CIRCLE[i % CIRCLE.len()];
    if f(value(x + p[0], y + p[1], image)) {
      n += 1;
      if n >= FAST_VARIANT_N { return true }
    }
    else {
      n = 0;
    }
  }
  false
}

fn corner_score(x: i32, y: i32, image: &Image, center_value: i16, threshold: i16) -> i32 {
  CIRCLE.iter()
    .map(|p| {
      let d = (value(x + p[0], y + p[1], image) - center_value).abs() as i32;
      i32::max(0, d - threshold as i32)
    })
    .sum()
}

fn value(x: i32, y: i32, image: &Image) -> i16 {
  image.data[y as usize * image.width + x as usize] as i16
}

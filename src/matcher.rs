use crate::all::*;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

// Hamming distance between two binary descriptors.
pub fn descriptor_distance(a: &Descriptor, b: &Descriptor) -> u32 {
  a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

#[derive(Clone, Copy, Debug)]
pub struct Correspondence {
  pub reference: Vector2d,
  pub frame: Vector2d,
  pub distance: u32,
}

// Outcome of matching one frame against the catalog. `correspondences` holds
// only the geometric inliers and is never shorter than the configured
// minimum; anything below that is a no-match (`None` at the call site).
#[derive(Clone, Debug)]
pub struct MatchResult {
  pub name: String,
  pub confidence: usize,
  pub correspondences: Vec<Correspondence>,
  // Maps reference cover coordinates to frame coordinates.
  pub homography: Matrix3d,
}

pub struct Matcher {
  ratio_test: f64,
  min_matches: usize,
  ransac_iters: usize,
  reproj_threshold: f64,
  rng: Xoshiro256PlusPlus,
}

impl Matcher {
  pub fn new() -> Matcher {
    let p = &*PARAMETER_SET.lock().unwrap();
    Matcher::with_params(p.ratio_test, p.min_matches, p.ransac_iters, p.reproj_threshold)
  }

  pub fn with_params(
    ratio_test: f64,
    min_matches: usize,
    ransac_iters: usize,
    reproj_threshold: f64,
  ) -> Matcher {
    Matcher {
      ratio_test,
      min_matches,
      ransac_iters,
      reproj_threshold,
      // Fixed seed keeps the whole pipeline deterministic for a given input.
      rng: Xoshiro256PlusPlus::seed_from_u64(42),
    }
  }

  pub fn min_matches(&self) -> usize {
    self.min_matches
  }

  // Scores every catalog candidate by geometrically verified inlier count.
  // Ties go to the candidate with the lowest total descriptor distance.
  pub fn match_frame(
    &mut self,
    query: &FrameDescriptors,
    catalog: &ReferenceCatalog,
  ) -> Option<MatchResult> {
    let mut best: Option<(usize, u64, MatchResult)> = None;
    for cover in catalog.covers() {
      let candidates = self.ratio_matches(&cover.descriptors, query);
      let result = match self.fit(&candidates) {
        Some((homography, inliers)) => {
          let correspondences: Vec<Correspondence> =
            inliers.iter().map(|&i| candidates[i]).collect();
          MatchResult {
            name: cover.name.clone(),
            confidence: correspondences.len(),
            homography,
            correspondences,
          }
        },
        None => continue,
      };
      if result.confidence < self.min_matches { continue }

      let total_distance: u64 = result.correspondences.iter()
        .map(|c| c.distance as u64)
        .sum();
      let better = match &best {
        Some((confidence, distance, _)) => {
          result.confidence > *confidence
            || (result.confidence == *confidence && total_distance < *distance)
        },
        None => true,
      };
      if better {
        best = Some((result.confidence, total_distance, result));
      }
    }
    best.map(|(_, _, result)| result)
  }

  // Nearest-neighbour correspondences with Lowe's ratio test: the best match
  // must be clearly closer than the second best, which suppresses ambiguous
  // descriptors. O(reference x query) brute force.
  pub fn ratio_matches(
    &self,
    reference: &FrameDescriptors,
    query: &FrameDescriptors,
  ) -> Vec<Correspondence> {
    let mut correspondences = vec![];
    if reference.len() < 2 { return correspondences }
    for (qi, qd) in query.descriptors.iter().enumerate() {
      let mut best = (u32::MAX, 0);
      let mut second = u32::MAX;
      for (ri, rd) in reference.descriptors.iter().enumerate() {
        let d = descriptor_distance(qd, rd);
        if d < best.0 {
          second = best.0;
          best = (d, ri);
        }
        else if d < second {
          second = d;
        }
      }
      if (best.0 as f64) < self.ratio_test * (second as f64) {
        correspondences.push(Correspondence {
          reference: reference.keypoints[best.1],
          frame: query.keypoints[qi],
          distance: best.0,
        });
      }
    }
    correspondences
  }

  // Local re-match used while tracking: each reference keypoint is projected
  // through the motion prior and only query keypoints within `radius` of the
  // prediction are considered.
  pub fn matches_with_prior(
    &self,
    query: &FrameDescriptors,
    reference: &FrameDescriptors,
    prior: &Matrix3d,
    radius: f64,
  ) -> Vec<Correspondence> {
    let mut correspondences = vec![];
    for (ri, rd) in reference.descriptors.iter().enumerate() {
      let predicted = match project(prior, reference.keypoints[ri]) {
        Some(p) => p,
        None => continue,
      };
      let mut best = (u32::MAX, 0);
      let mut second = u32::MAX;
      let mut in_radius = 0;
      for (qi, qd) in query.descriptors.iter().enumerate() {
        if (query.keypoints[qi] - predicted).norm() > radius { continue }
        in_radius += 1;
        let d = descriptor_distance(qd, rd);
        if d < best.0 {
          second = best.0;
          best = (d, qi);
        }
        else if d < second {
          second = d;
        }
      }
      if in_radius == 0 { continue }
      // With a single candidate in the search region the ratio test cannot
      // apply; accept the lone candidate.
      if in_radius == 1 || (best.0 as f64) < self.ratio_test * (second as f64) {
        correspondences.push(Correspondence {
          reference: reference.keypoints[ri],
          frame: query.keypoints[best.1],
          distance: best.0,
        });
      }
    }
    correspondences
  }

  // Robust fit over a correspondence set, shared by full-catalog matching and
  // tracking refinement.
  pub fn fit(&mut self, correspondences: &[Correspondence]) -> Option<(Matrix3d, Vec<usize>)> {
    let references: Vec<Vector2d> = correspondences.iter().map(|c| c.reference).collect();
    let frames: Vec<Vector2d> = correspondences.iter().map(|c| c.frame).collect();
    ransac_homography(
      &references,
      &frames,
      self.ransac_iters,
      self.reproj_threshold,
      &mut self.rng,
    )
  }
}

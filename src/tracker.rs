use crate::all::*;

// Per-session mutable tracking state. Created on the first valid match,
// mutated every frame, destroyed when tracking is lost beyond the recovery
// window or the session ends.
#[derive(Clone, Debug)]
pub struct TrackState {
  pub name: String,
  // Maps reference cover coordinates to frame coordinates.
  pub homography: Matrix3d,
  // Reference cover dimensions, needed to place the trailer.
  pub ref_size: [usize; 2],
  pub frames_since_match: usize,
  pub trailer_cursor: usize,
}

#[derive(Clone, Debug)]
pub enum TrackingState {
  // No active track; every frame is matched against the full catalog.
  Searching,
  // Refining an existing track against a single reference.
  Tracking(TrackState),
}

pub struct PoseTracker {
  pub matcher: Matcher,
  pub state: TrackingState,
  recovery_window: usize,
  blend_factor: f64,
  search_radius: f64,
}

impl PoseTracker {
  pub fn new() -> PoseTracker {
    let (recovery_window, blend_factor, search_radius) = {
      let p = &*PARAMETER_SET.lock().unwrap();
      (p.recovery_window, p.blend_factor, p.search_radius)
    };
    PoseTracker::with_params(Matcher::new(), recovery_window, blend_factor, search_radius)
  }

  pub fn with_params(
    matcher: Matcher,
    recovery_window: usize,
    blend_factor: f64,
    search_radius: f64,
  ) -> PoseTracker {
    PoseTracker {
      matcher,
      state: TrackingState::Searching,
      recovery_window,
      blend_factor,
      search_radius,
    }
  }

  pub fn track(&self) -> Option<&TrackState> {
    match &self.state {
      TrackingState::Tracking(track) => Some(track),
      TrackingState::Searching => None,
    }
  }

  pub fn track_mut(&mut self) -> Option<&mut TrackState> {
    match &mut self.state {
      TrackingState::Tracking(track) => Some(track),
      TrackingState::Searching => None,
    }
  }

  // One step of the state machine for the descriptors of one frame.
  pub fn process(&mut self, query: &FrameDescriptors, catalog: &ReferenceCatalog) {
    let active = match &self.state {
      TrackingState::Searching => None,
      TrackingState::Tracking(track) => Some((track.name.clone(), track.homography)),
    };
    match active {
      None => {
        if let Some(result) = self.matcher.match_frame(query, catalog) {
          // Guaranteed to resolve, the catalog is read-only during a session.
          let ref_size = match catalog.lookup(&result.name) {
            Some(cover) => [cover.image.width, cover.image.height],
            None => return,
          };
          info!("Matched cover {} with {} inliers, tracking.", result.name, result.confidence);
          self.state = TrackingState::Tracking(TrackState {
            name: result.name,
            homography: result.homography,
            ref_size,
            frames_since_match: 0,
            trailer_cursor: 0,
          });
        }
      },
      Some((name, prior)) => {
        let estimate = match catalog.lookup(&name) {
          Some(cover) => self.refine(query, &cover.descriptors, &prior),
          None => None,
        };
        self.apply_refinement(estimate);
      },
    }
  }

  // Lightweight per-frame refinement: re-match in the neighborhood predicted
  // by the previous homography, then smooth the fresh estimate into it.
  fn refine(
    &mut self,
    query: &FrameDescriptors,
    reference: &FrameDescriptors,
    prior: &Matrix3d,
  ) -> Option<Matrix3d> {
    let correspondences =
      self.matcher.matches_with_prior(query, reference, prior, self.search_radius);
    let (estimate, inliers) = self.matcher.fit(&correspondences)?;
    if inliers.len() < MIN_FIT_POINTS { return None }
    blend_homographies(prior, &estimate, self.blend_factor)
  }

  // Advances the Tracking state by one frame given the refinement outcome.
  // `None` counts toward the recovery window; exceeding the window drops the
  // track and returns to Searching.
  pub fn apply_refinement(&mut self, estimate: Option<Matrix3d>) {
    let track = match &mut self.state {
      TrackingState::Tracking(track) => track,
      TrackingState::Searching => return,
    };
    match estimate {
      Some(homography) => {
        track.homography = homography;
        track.frames_since_match = 0;
      },
      None => {
        track.frames_since_match += 1;
        if track.frames_since_match > self.recovery_window {
          info!("Lost track of cover {} after {} frames without a match.",
            track.name, track.frames_since_match);
          self.state = TrackingState::Searching;
        }
      },
    }
  }

  // External session end; destroys any active track.
  pub fn end_session(&mut self) {
    self.state = TrackingState::Searching;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn test_tracker(recovery_window: usize) -> PoseTracker {
    let matcher = Matcher::with_params(0.7, 10, 200, 5.0);
    PoseTracker::with_params(matcher, recovery_window, 0.8, 25.0)
  }

  fn tracking_state() -> TrackingState {
    TrackingState::Tracking(TrackState {
      name: "alpha".to_string(),
      homography: Matrix3d::identity(),
      ref_size: [64, 64],
      frames_since_match: 0,
      trailer_cursor: 0,
    })
  }

  #[test]
  fn test_track_survives_gaps_within_recovery_window() {
    let mut tracker = test_tracker(3);
    tracker.state = tracking_state();
    for _ in 0..3 {
      tracker.apply_refinement(None);
      assert!(tracker.track().is_some());
    }
    // A successful refinement resets the counter.
    let mut h = Matrix3d::identity();
    h[(0, 2)] = 2.;
    tracker.apply_refinement(Some(h));
    let track = tracker.track().unwrap();
    assert_eq!(track.frames_since_match, 0);
    assert_eq!(track.homography[(0, 2)], 2.);
    // The gap budget is available again.
    for _ in 0..3 {
      tracker.apply_refinement(None);
      assert!(tracker.track().is_some());
    }
  }

  #[test]
  fn test_track_is_lost_beyond_recovery_window() {
    let mut tracker = test_tracker(3);
    tracker.state = tracking_state();
    for _ in 0..3 {
      tracker.apply_refinement(None);
    }
    assert!(tracker.track().is_some());
    tracker.apply_refinement(None);
    assert!(tracker.track().is_none());
  }

  #[test]
  fn test_end_session_destroys_track() {
    let mut tracker = test_tracker(30);
    tracker.state = tracking_state();
    tracker.end_session();
    assert!(tracker.track().is_none());
  }

  #[test]
  fn test_apply_refinement_is_inert_while_searching() {
    let mut tracker = test_tracker(3);
    tracker.apply_refinement(Some(Matrix3d::identity()));
    assert!(tracker.track().is_none());
  }
}

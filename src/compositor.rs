use crate::all::*;

pub struct OverlayCompositor {
  feather_width: f64,
}

impl OverlayCompositor {
  pub fn new() -> OverlayCompositor {
    let p = &*PARAMETER_SET.lock().unwrap();
    OverlayCompositor::with_params(p.feather_width)
  }

  pub fn with_params(feather_width: f64) -> OverlayCompositor {
    OverlayCompositor { feather_width }
  }

  // Warps the current trailer frame through the tracked homography and
  // replaces the cover region in `frame`. Without an active track (or with
  // no trailer frame available) the input frame is left untouched. Advances
  // the track's trailer cursor by one. Returns whether anything was drawn.
  pub fn composite(
    &self,
    frame: &mut VideoFrame,
    track: Option<&mut TrackState>,
    trailer: &TrailerSource,
  ) -> bool {
    let track = match track {
      Some(track) => track,
      None => return false,
    };
    let trailer_frame = match trailer.frame_at(track.trailer_cursor) {
      Some(trailer_frame) => trailer_frame,
      None => return false,
    };
    // One trailer frame per video frame.
    track.trailer_cursor += 1;

    let ref_w = track.ref_size[0] as f64;
    let ref_h = track.ref_size[1] as f64;
    if ref_w < 2. || ref_h < 2. { return false }
    let h_inv = match track.homography.try_inverse() {
      Some(h_inv) => h_inv,
      None => return false,
    };

    // Scan only the bounding box of the projected reference corners.
    let corners = [
      Vector2d::new(0., 0.),
      Vector2d::new(ref_w - 1., 0.),
      Vector2d::new(ref_w - 1., ref_h - 1.),
      Vector2d::new(0., ref_h - 1.),
    ];
    let mut min = Vector2d::new(f64::INFINITY, f64::INFINITY);
    let mut max = Vector2d::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for corner in corners {
      let p = match project(&track.homography, corner) {
        Some(p) => p,
        None => return false,
      };
      min = min.inf(&p);
      max = max.sup(&p);
    }
    let x0 = f64::max(0., min[0].floor()) as usize;
    let y0 = f64::max(0., min[1].floor()) as usize;
    let x1 = usize::min(frame.width.saturating_sub(1), f64::max(0., max[0].ceil()) as usize);
    let y1 = usize::min(frame.height.saturating_sub(1), f64::max(0., max[1].ceil()) as usize);

    // Trailer frames are stretched to the reference cover plane.
    let sx = (trailer_frame.width - 1) as f64 / (ref_w - 1.);
    let sy = (trailer_frame.height - 1) as f64 / (ref_h - 1.);

    let mut drawn = false;
    for y in y0..=y1 {
      for x in x0..=x1 {
        let p = match project(&h_inv, Vector2d::new(x as f64, y as f64)) {
          Some(p) => p,
          None => continue,
        };
        if p[0] < 0. || p[0] > ref_w - 1. || p[1] < 0. || p[1] > ref_h - 1. { continue }
        // Hard replacement inside the quadrilateral, feathered at its border
        // to avoid visible seams.
        let edge_distance =
          f64::min(f64::min(p[0], ref_w - 1. - p[0]), f64::min(p[1], ref_h - 1. - p[1]));
        let alpha = if self.feather_width > 0. {
          f64::min(1., edge_distance / self.feather_width)
        }
        else {
          1.
        };
        let source = sample_rgb(trailer_frame, Vector2d::new(p[0] * sx, p[1] * sy));
        let target = frame.pixel(x, y);
        let mut blended = [0u8; 3];
        for c in 0..3 {
          blended[c] = (alpha * source[c] + (1. - alpha) * target[c] as f64).round() as u8;
        }
        frame.set_pixel(x, y, blended);
        drawn = true;
      }
    }
    drawn
  }
}

fn sample_rgb(frame: &VideoFrame, u: Vector2d) -> [f64; 3] {
  let x0 = f64::max(0., u[0]) as usize;
  let y0 = f64::max(0., u[1]) as usize;
  let x0 = usize::min(x0, frame.width - 1);
  let y0 = usize::min(y0, frame.height - 1);
  let x1 = usize::min(x0 + 1, frame.width - 1);
  let y1 = usize::min(y0 + 1, frame.height - 1);
  let xa = f64::max(0., u[0]).fract();
  let ya = f64::max(0., u[1]).fract();
  let p00 = frame.pixel(x0, y0);
  let p10 = frame.pixel(x1, y0);
  let p01 = frame.pixel(x0, y1);
  let p11 = frame.pixel(x1, y1);
  let mut out = [0.; 3];
  for c in 0..3 {
    out[c] = (1. - xa) * (1. - ya) * p00[c] as f64
      + xa * (1. - ya) * p10[c] as f64
      + (1. - xa) * ya * p01[c] as f64
      + xa * ya * p11[c] as f64;
  }
  out
}

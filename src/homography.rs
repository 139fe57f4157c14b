use crate::all::*;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;

type Matrix9d = nalgebra::SMatrix<f64, 9, 9>;
type Vector9d = nalgebra::SVector<f64, 9>;

// Minimal correspondence count for a projective fit.
pub const MIN_FIT_POINTS: usize = 4;

// Applies the homography to a planar point. `None` for points mapped to the
// line at infinity.
pub fn project(h: &Matrix3d, p: Vector2d) -> Option<Vector2d> {
  let q = h * Vector3d::new(p[0], p[1], 1.);
  if q[2].abs() < 1e-9 { return None }
  Some(Vector2d::new(q[0] / q[2], q[1] / q[2]))
}

pub fn reprojection_error(h: &Matrix3d, reference: Vector2d, frame: Vector2d) -> f64 {
  match project(h, reference) {
    Some(p) => (p - frame).norm(),
    None => f64::INFINITY,
  }
}

// Scales the matrix to the h[(2, 2)] = 1 convention.
pub fn normalize_homography(h: &Matrix3d) -> Option<Matrix3d> {
  let s = h[(2, 2)];
  if s.abs() < 1e-12 { return None }
  Some(h / s)
}

// Rejects non-invertible and wildly scaled fits so they never propagate into
// the tracker state.
pub fn sane_homography(h: &Matrix3d) -> Option<Matrix3d> {
  if h.iter().any(|v| !v.is_finite()) { return None }
  let h = normalize_homography(h)?;
  let det = h.determinant();
  if det.abs() < 1e-6 || det.abs() > 1e6 { return None }
  h.try_inverse()?;
  if h.norm() > 1e4 { return None }
  Some(h)
}

// Temporal smoothing of successive estimates. Pure so it can be tested in
// isolation; `factor` is the weight of the new estimate.
pub fn blend_homographies(
  previous: &Matrix3d,
  new: &Matrix3d,
  factor: f64,
) -> Option<Matrix3d> {
  let previous = normalize_homography(previous)?;
  let new = normalize_homography(new)?;
  sane_homography(&((1. - factor) * previous + factor * new))
}

// Direct linear transform over >= 4 correspondences, with Hartley coordinate
// normalization for conditioning. Solved as the smallest eigenvector of
// A^T A, which avoids needing the full (non-thin) SVD.
pub fn fit_dlt(references: &[Vector2d], frames: &[Vector2d]) -> Option<Matrix3d> {
  assert_eq!(references.len(), frames.len());
  if references.len() < MIN_FIT_POINTS { return None }
  let t_ref = conditioning_transform(references)?;
  let t_frame = conditioning_transform(frames)?;

  let mut ata = Matrix9d::zeros();
  for (r, f) in references.iter().zip(frames.iter()) {
    let r = project(&t_ref, *r)?;
    let f = project(&t_frame, *f)?;
    let row0 = Vector9d::from_column_slice(&[
      -r[0], -r[1], -1., 0., 0., 0., f[0] * r[0], f[0] * r[1], f[0],
    ]);
    let row1 = Vector9d::from_column_slice(&[
      0., 0., 0., -r[0], -r[1], -1., f[1] * r[0], f[1] * r[1], f[1],
    ]);
    ata += row0 * row0.transpose() + row1 * row1.transpose();
  }

  let eigen = ata.symmetric_eigen();
  let mut min_ind = 0;
  for i in 1..9 {
    if eigen.eigenvalues[i] < eigen.eigenvalues[min_ind] { min_ind = i }
  }
  let v = eigen.eigenvectors.column(min_ind);
  let h = Matrix3d::new(
    v[0], v[1], v[2],
    v[3], v[4], v[5],
    v[6], v[7], v[8],
  );
  let h = t_frame.try_inverse()? * h * t_ref;
  normalize_homography(&h)
}

// Translates the centroid to the origin and scales the mean radius to
// sqrt(2). Fails for near-coincident point sets.
fn conditioning_transform(points: &[Vector2d]) -> Option<Matrix3d> {
  let n = points.len() as f64;
  let centroid = points.iter().sum::<Vector2d>() / n;
  let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
  if mean_dist < 1e-9 { return None }
  let s = f64::sqrt(2.) / mean_dist;
  Some(Matrix3d::new(
    s, 0., -s * centroid[0],
    0., s, -s * centroid[1],
    0., 0., 1.,
  ))
}

// Any three near-collinear points make the minimal sample degenerate.
fn degenerate_sample(points: &[Vector2d]) -> bool {
  for i in 0..points.len() {
    for j in (i + 1)..points.len() {
      for k in (j + 1)..points.len() {
        let a = points[j] - points[i];
        let b = points[k] - points[i];
        // Twice the triangle area, in square pixels.
        if (a[0] * b[1] - a[1] * b[0]).abs() < 1.0 { return true }
      }
    }
  }
  false
}

// Consensus-sampling homography fit. Returns the refit homography and the
// inlier indices, or `None` when no geometrically consistent fit exists.
pub fn ransac_homography(
  references: &[Vector2d],
  frames: &[Vector2d],
  iterations: usize,
  reproj_threshold: f64,
  rng: &mut Xoshiro256PlusPlus,
) -> Option<(Matrix3d, Vec<usize>)> {
  assert_eq!(references.len(), frames.len());
  let n = references.len();
  if n < MIN_FIT_POINTS { return None }

  let mut best_inliers: Vec<usize> = vec![];
  let mut best_error = f64::INFINITY;
  for _ in 0..iterations {
    let mut sample = [0usize; MIN_FIT_POINTS];
    for i in 0..MIN_FIT_POINTS {
      loop {
        sample[i] = rng.gen_range(0..n);
        if !sample[..i].contains(&sample[i]) { break }
      }
    }
    let sample_refs: Vec<Vector2d> = sample.iter().map(|&i| references[i]).collect();
    let sample_frames: Vec<Vector2d> = sample.iter().map(|&i| frames[i]).collect();
    if degenerate_sample(&sample_refs) || degenerate_sample(&sample_frames) { continue }

    let h = match fit_dlt(&sample_refs, &sample_frames).and_then(|h| sane_homography(&h)) {
      Some(h) => h,
      None => continue,
    };

    let mut inliers = vec![];
    let mut error = 0.;
    for i in 0..n {
      let e = reprojection_error(&h, references[i], frames[i]);
      if e < reproj_threshold {
        inliers.push(i);
        error += e;
      }
    }
    if inliers.len() > best_inliers.len()
      || (inliers.len() == best_inliers.len() && error < best_error) {
      best_inliers = inliers;
      best_error = error;
    }
  }
  if best_inliers.len() < MIN_FIT_POINTS { return None }

  // Refit on the full consensus set.
  let refs: Vec<Vector2d> = best_inliers.iter().map(|&i| references[i]).collect();
  let frms: Vec<Vector2d> = best_inliers.iter().map(|&i| frames[i]).collect();
  let h = sane_homography(&fit_dlt(&refs, &frms)?)?;
  let inliers: Vec<usize> = (0..n)
    .filter(|&i| reprojection_error(&h, references[i], frames[i]) < reproj_threshold)
    .collect();
  if inliers.len() < MIN_FIT_POINTS { return None }
  Some((h, inliers))
}

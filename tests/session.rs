// End-to-end session over a synthetic video: a known cover at a fixed pose
// for the first frames, then blank frames, checking composited output and
// recovery-window behavior.

use cover_overlay::all::*;

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

const COVER_SIZE: usize = 64;
const COVER_X: usize = 40;
const COVER_Y: usize = 30;
const FRAME_W: usize = 160;
const FRAME_H: usize = 120;

fn block_noise(width: usize, height: usize, block: usize, seed: u64) -> Image {
  let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
  let bw = (width + block - 1) / block;
  let bh = (height + block - 1) / block;
  let blocks: Vec<u8> = (0..bw * bh)
    .map(|_| if rng.gen::<bool>() { 255 } else { 0 })
    .collect();
  let mut image = Image::new(width, height);
  for y in 0..height {
    for x in 0..width {
      image.set_value(x, y, blocks[(y / block) * bw + x / block]);
    }
  }
  image
}

// r = g = b makes the grayscale conversion lossless.
fn frame_from_gray(image: &Image) -> VideoFrame {
  let mut frame = VideoFrame::new(image.width, image.height);
  for y in 0..image.height {
    for x in 0..image.width {
      let v = image.value(x, y);
      frame.set_pixel(x, y, [v, v, v]);
    }
  }
  frame
}

fn cover_image() -> Image {
  block_noise(COVER_SIZE, COVER_SIZE, 4, 21)
}

fn cover_frame() -> VideoFrame {
  let cover = cover_image();
  let mut scene = Image::new(FRAME_W, FRAME_H);
  for y in 0..COVER_SIZE {
    for x in 0..COVER_SIZE {
      scene.set_value(COVER_X + x, COVER_Y + y, cover.value(x, y));
    }
  }
  frame_from_gray(&scene)
}

fn blank_frame() -> VideoFrame {
  VideoFrame::new(FRAME_W, FRAME_H)
}

fn trailer_color(ind: usize) -> [u8; 3] {
  [40 + 20 * ind as u8, 0, 200]
}

fn make_catalog(extractor: &FastBriefExtractor) -> ReferenceCatalog {
  let image = cover_image();
  let descriptors = extractor.extract(&image);
  assert!(descriptors.len() >= 10);
  ReferenceCatalog::from_covers(vec![ReferenceCover {
    name: "alpha".to_string(),
    image,
    descriptors,
    trailer_path: std::path::PathBuf::from("unused.mp4"),
  }])
}

struct VecSource {
  frames: Vec<VideoFrame>,
}

impl FrameSource for VecSource {
  fn next(&mut self) -> Result<Option<VideoFrame>> {
    if self.frames.is_empty() { return Ok(None) }
    Ok(Some(self.frames.remove(0)))
  }
}

struct VecSink {
  frames: Vec<VideoFrame>,
}

impl FrameSink for VecSink {
  fn emit(&mut self, frame: &VideoFrame) -> Result<()> {
    self.frames.push(frame.clone());
    Ok(())
  }
}

struct SyntheticTrailers;

impl TrailerProvider for SyntheticTrailers {
  fn open(&mut self, _cover: &ReferenceCover) -> Result<TrailerSource> {
    let frames = (0..10).map(|i| {
      let mut frame = VideoFrame::new(8, 8);
      for y in 0..8 {
        for x in 0..8 {
          frame.set_pixel(x, y, trailer_color(i));
        }
      }
      frame
    }).collect();
    Ok(TrailerSource::from_frames(frames, TrailerEnd::Hold))
  }
}

struct MissingTrailers;

impl TrailerProvider for MissingTrailers {
  fn open(&mut self, cover: &ReferenceCover) -> Result<TrailerSource> {
    bail!("no trailer for {}", cover.name);
  }
}

fn make_pipeline(recovery_window: usize, provider: Box<dyn TrailerProvider>) -> Pipeline {
  Pipeline::with_components(
    Box::new(FastBriefExtractor::with_params(16, 500, 3)),
    PoseTracker::with_params(Matcher::with_params(0.7, 10, 200, 5.0), recovery_window, 0.8, 25.0),
    OverlayCompositor::with_params(1.5),
    provider,
  )
}

// A frame pixel well inside the tracked cover region.
fn probe_pixel(frame: &VideoFrame) -> [u8; 3] {
  frame.pixel(COVER_X + COVER_SIZE / 2, COVER_Y + COVER_SIZE / 2)
}

#[test]
fn cover_region_is_replaced_and_held_through_recovery_window() {
  let mut frames = vec![];
  for _ in 0..5 {
    frames.push(cover_frame());
  }
  for _ in 0..5 {
    frames.push(blank_frame());
  }
  let inputs = frames.clone();

  let extractor = FastBriefExtractor::with_params(16, 500, 3);
  let catalog = make_catalog(&extractor);
  let mut pipeline = make_pipeline(2, Box::new(SyntheticTrailers));
  let mut sink = VecSink { frames: vec![] };
  let summary = pipeline
    .run(VecSource { frames }, &mut sink, &catalog)
    .unwrap();

  assert_eq!(summary.frames_processed, 10);
  assert_eq!(sink.frames.len(), 10);

  // Frames 0..5: cover visible, replaced by successive trailer frames.
  for i in 0..5 {
    assert_eq!(probe_pixel(&sink.frames[i]), trailer_color(i), "frame {}", i);
  }
  // Frames 5 and 6: no match but inside the recovery window; the last known
  // warp is held and the trailer keeps playing.
  for i in 5..7 {
    assert_eq!(probe_pixel(&sink.frames[i]), trailer_color(i), "frame {}", i);
  }
  // Frames 7..10: the window is exceeded, the frame passes through unchanged.
  for i in 7..10 {
    assert_eq!(sink.frames[i], inputs[i], "frame {}", i);
  }

  assert_eq!(summary.frames_composited, 7);
  assert_eq!(summary.first_detection_frame, Some(0));
  assert_eq!(summary.last_detection_frame, Some(6));
}

#[test]
fn missing_trailer_degrades_to_passthrough() {
  let frames: Vec<VideoFrame> = (0..3).map(|_| cover_frame()).collect();
  let inputs = frames.clone();

  let extractor = FastBriefExtractor::with_params(16, 500, 3);
  let catalog = make_catalog(&extractor);
  let mut pipeline = make_pipeline(2, Box::new(MissingTrailers));
  let mut sink = VecSink { frames: vec![] };
  let summary = pipeline
    .run(VecSource { frames }, &mut sink, &catalog)
    .unwrap();

  // The cover is recognized but every frame passes through unreplaced.
  assert_eq!(summary.frames_processed, 3);
  assert_eq!(summary.frames_composited, 0);
  for (output, input) in sink.frames.iter().zip(inputs.iter()) {
    assert_eq!(output, input);
  }
}

#[test]
fn session_restarts_after_track_loss() {
  // Cover, long blank gap exceeding the window, cover again: the pipeline
  // must drop the track and then re-acquire it from scratch.
  let mut frames = vec![cover_frame()];
  for _ in 0..4 {
    frames.push(blank_frame());
  }
  frames.push(cover_frame());

  let extractor = FastBriefExtractor::with_params(16, 500, 3);
  let catalog = make_catalog(&extractor);
  let mut pipeline = make_pipeline(1, Box::new(SyntheticTrailers));
  let mut sink = VecSink { frames: vec![] };
  let summary = pipeline
    .run(VecSource { frames }, &mut sink, &catalog)
    .unwrap();

  assert_eq!(summary.frames_processed, 6);
  // Frames 0, 1 composited (frame 1 within the window), then loss, then a
  // fresh track on frame 5 restarts the trailer from its first frame.
  assert_eq!(summary.frames_composited, 3);
  assert_eq!(probe_pixel(&sink.frames[0]), trailer_color(0));
  assert_eq!(probe_pixel(&sink.frames[1]), trailer_color(1));
  assert_eq!(probe_pixel(&sink.frames[5]), trailer_color(0));
  assert_eq!(summary.last_detection_frame, Some(5));
}

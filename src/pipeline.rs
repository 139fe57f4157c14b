use crate::all::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread;

// Per-session accounting, logged when the session ends.
#[derive(Clone, Debug, Default)]
pub struct SessionSummary {
  pub frames_processed: usize,
  pub frames_composited: usize,
  pub first_detection_frame: Option<usize>,
  pub last_detection_frame: Option<usize>,
}

// Opens the trailer resource for a matched cover. A seam so sessions can be
// driven without spawning decoder processes.
pub trait TrailerProvider {
  fn open(&mut self, cover: &ReferenceCover) -> Result<TrailerSource>;
}

pub struct FileTrailerProvider {
  end: TrailerEnd,
}

impl FileTrailerProvider {
  pub fn new(end: TrailerEnd) -> FileTrailerProvider {
    FileTrailerProvider { end }
  }
}

impl TrailerProvider for FileTrailerProvider {
  fn open(&mut self, cover: &ReferenceCover) -> Result<TrailerSource> {
    TrailerSource::load(&cover.trailer_path, self.end)
  }
}

// Swallows composited frames, for runs without a video output.
pub struct DiscardSink;

impl FrameSink for DiscardSink {
  fn emit(&mut self, _frame: &VideoFrame) -> Result<()> {
    Ok(())
  }
}

// Sequences capture, extraction, matching, tracking and compositing for one
// session. Frames are processed in strict temporal order; capture runs one
// frame ahead on its own thread and stalls when composition is slow.
pub struct Pipeline {
  extractor: Box<dyn FeatureExtractor>,
  tracker: PoseTracker,
  compositor: OverlayCompositor,
  provider: Box<dyn TrailerProvider>,
  // Trailer of the currently (or most recently) tracked cover.
  trailer: Option<(String, TrailerSource)>,
  // Cover whose trailer failed to open; not retried within the session.
  failed_trailer: Option<String>,
  stop: Arc<AtomicBool>,
}

impl Pipeline {
  pub fn new() -> Pipeline {
    let trailer_end = {
      let p = &*PARAMETER_SET.lock().unwrap();
      p.trailer_end
    };
    Pipeline::with_components(
      Box::new(FastBriefExtractor::new()),
      PoseTracker::new(),
      OverlayCompositor::new(),
      Box::new(FileTrailerProvider::new(trailer_end)),
    )
  }

  pub fn with_components(
    extractor: Box<dyn FeatureExtractor>,
    tracker: PoseTracker,
    compositor: OverlayCompositor,
    provider: Box<dyn TrailerProvider>,
  ) -> Pipeline {
    Pipeline {
      extractor,
      tracker,
      compositor,
      provider,
      trailer: None,
      failed_trailer: None,
      stop: Arc::new(AtomicBool::new(false)),
    }
  }

  // Setting the flag aborts the session after the frame being processed.
  pub fn stop_signal(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }

  pub fn run(
    &mut self,
    source: impl FrameSource + Send + 'static,
    sink: &mut dyn FrameSink,
    catalog: &ReferenceCatalog,
  ) -> Result<SessionSummary> {
    // Back-pressure: at most one frame buffered ahead of composition, so a
    // slow compositor stalls capture instead of dropping frames.
    let (tx, rx) = sync_channel::<Result<VideoFrame>>(1);
    let mut source = source;
    let capture = thread::spawn(move || {
      loop {
        match source.next() {
          Ok(Some(frame)) => {
            // The session ended before the stream did.
            if tx.send(Ok(frame)).is_err() { break }
          },
          Ok(None) => break,
          Err(err) => {
            let _ = tx.send(Err(err));
            break;
          },
        }
      }
    });

    let mut summary = SessionSummary::default();
    let result = loop {
      let message = match rx.recv() {
        Ok(message) => message,
        Err(_) => break Ok(()),
      };
      let mut frame = match message {
        Ok(frame) => frame,
        // Input stream failure is one of the few fatal conditions.
        Err(err) => break Err(err),
      };
      if let Err(err) = self.process_frame(&mut frame, catalog, &mut summary) {
        break Err(err);
      }
      if let Err(err) = sink.emit(&frame) {
        break Err(err);
      }
      summary.frames_processed += 1;
      if self.stop.load(Ordering::Relaxed) {
        info!("Stop requested, ending session.");
        break Ok(());
      }
    };
    drop(rx);
    capture.join().map_err(|_| anyhow!("Capture thread panicked."))?;
    result?;

    self.tracker.end_session();
    self.trailer = None;
    self.failed_trailer = None;
    info!("Session processed {} frames, composited {}.",
      summary.frames_processed, summary.frames_composited);
    Ok(summary)
  }

  fn process_frame(
    &mut self,
    frame: &mut VideoFrame,
    catalog: &ReferenceCatalog,
    summary: &mut SessionSummary,
  ) -> Result<()> {
    let gray = frame.to_gray();
    let descriptors = self.extractor.extract(&gray);
    self.tracker.process(&descriptors, catalog);
    self.acquire_trailer(catalog);

    let Pipeline { tracker, compositor, trailer, .. } = self;
    let composited = match (tracker.track_mut(), trailer) {
      (track @ Some(_), Some((_, trailer))) => compositor.composite(frame, track, trailer),
      _ => false,
    };
    if composited {
      let index = summary.frames_processed;
      summary.frames_composited += 1;
      summary.first_detection_frame.get_or_insert(index);
      summary.last_detection_frame = Some(index);
    }
    Ok(())
  }

  // Opens the trailer when a new cover starts being tracked. A missing
  // trailer degrades to showing the cover unreplaced instead of aborting.
  fn acquire_trailer(&mut self, catalog: &ReferenceCatalog) {
    let name = match self.tracker.track() {
      Some(track) => track.name.clone(),
      None => return,
    };
    if let Some((cached, _)) = &self.trailer {
      if *cached == name { return }
    }
    if self.failed_trailer.as_deref() == Some(name.as_str()) { return }
    self.trailer = None;
    let cover = match catalog.lookup(&name) {
      Some(cover) => cover,
      None => return,
    };
    match self.provider.open(cover) {
      Ok(trailer) => {
        info!("Loaded trailer for {} with {} frames.", name, trailer.len());
        self.trailer = Some((name, trailer));
      },
      Err(err) => {
        warn!("Trailer unavailable for {}: {:#}. Leaving the cover unreplaced.", name, err);
        self.failed_trailer = Some(name);
      },
    }
  }
}

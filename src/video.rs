use crate::all::*;

use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

// Interleaved rgb24 frame as delivered by the decoder.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl VideoFrame {
  pub fn new(width: usize, height: usize) -> VideoFrame {
    VideoFrame {
      data: vec![0; 3 * width * height],
      width,
      height,
    }
  }

  #[inline(always)]
  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let i = 3 * (y * self.width + x);
    [self.data[i], self.data[i + 1], self.data[i + 2]]
  }

  #[inline(always)]
  pub fn set_pixel(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
    let i = 3 * (y * self.width + x);
    self.data[i] = rgb[0];
    self.data[i + 1] = rgb[1];
    self.data[i + 2] = rgb[2];
  }

  // Grayscale view for feature extraction, integer Rec. 601 weights.
  pub fn to_gray(&self) -> Image {
    let mut data = Vec::with_capacity(self.width * self.height);
    for p in self.data.chunks_exact(3) {
      let luma = (77 * p[0] as u32 + 150 * p[1] as u32 + 29 * p[2] as u32) >> 8;
      data.push(luma as u8);
    }
    Image::from_data(data, self.width, self.height)
  }
}

// Sequential source of frames in temporal order. `Ok(None)` signals end of
// stream. Not `impl Iterator` to allow returning `Result`.
pub trait FrameSource {
  fn next(&mut self) -> Result<Option<VideoFrame>>;
}

// Consumer of composited frames, normally the presentation layer or an
// encoder process.
pub trait FrameSink {
  fn emit(&mut self, frame: &VideoFrame) -> Result<()>;
}

// Reads stream dimensions with ffprobe so frame sizes do not need to be
// configured by hand.
pub fn probe_dimensions(path: &Path) -> Result<(usize, usize)> {
  let output = Command::new("ffprobe")
    .args(["-v", "error", "-select_streams", "v:0"])
    .args(["-show_entries", "stream=width,height", "-print_format", "json"])
    .arg(path)
    .output()
    .context("Running ffprobe failed.")?;
  let value: serde_json::Value = serde_json::from_slice(&output.stdout)
    .context("ffprobe did not produce valid JSON.")?;
  let stream = value["streams"].get(0)
    .ok_or(anyhow!("No video stream in {}", path.display()))?;
  let width = stream["width"].as_u64()
    .ok_or(anyhow!("Stream width is not a number."))? as usize;
  let height = stream["height"].as_u64()
    .ok_or(anyhow!("Stream height is not a number."))? as usize;
  Ok((width, height))
}

pub struct VideoInput {
  child: Child,
  child_stdout: ChildStdout,
  width: usize,
  height: usize,
}

impl VideoInput {
  pub fn new(path: &Path) -> Result<VideoInput> {
    let (width, height) = probe_dimensions(path)?;
    let mut child = Command::new("ffmpeg")
      .arg("-i").arg(path)
      .args(["-f", "rawvideo", "-vcodec", "rawvideo", "-vsync", "vfr", "-pix_fmt", "rgb24", "-"])
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .spawn()
      .context("Spawning ffmpeg decoder failed.")?;
    let child_stdout = child.stdout.take().ok_or(anyhow!("No stdout pipe from ffmpeg."))?;
    Ok(VideoInput {
      child,
      child_stdout,
      width,
      height,
    })
  }
}

impl FrameSource for VideoInput {
  fn next(&mut self) -> Result<Option<VideoFrame>> {
    let mut frame = VideoFrame::new(self.width, self.height);
    match self.child_stdout.read_exact(&mut frame.data) {
      Ok(()) => Ok(Some(frame)),
      Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
        // Collect the decoder's exit status. `wait` returns the cached status
        // on later calls, so repeated end-of-stream polls stay cheap.
        self.child.wait().context("Waiting for ffmpeg decoder failed.")?;
        Ok(None)
      },
      Err(err) => Err(err).context("Reading bytes from video input failed."),
    }
  }
}

impl Drop for VideoInput {
  fn drop(&mut self) {
    // The session may end before the stream does.
    let _ = self.child.kill();
    let _ = self.child.wait();
  }
}

pub struct VideoOutput {
  child: Child,
  child_stdin: Option<ChildStdin>,
}

impl VideoOutput {
  pub fn new(path: &Path, width: usize, height: usize, fps: f64) -> Result<VideoOutput> {
    let mut child = Command::new("ffmpeg")
      .args(["-y", "-f", "rawvideo", "-pix_fmt", "rgb24"])
      .arg("-s").arg(format!("{}x{}", width, height))
      .arg("-r").arg(format!("{}", fps))
      .args(["-i", "-", "-pix_fmt", "yuv420p"])
      .arg(path)
      .stdin(Stdio::piped())
      .stderr(Stdio::null())
      .spawn()
      .context("Spawning ffmpeg encoder failed.")?;
    let child_stdin = child.stdin.take();
    Ok(VideoOutput { child, child_stdin })
  }

  // Closes the pipe and waits for the encoder to flush the container.
  pub fn finish(mut self) -> Result<()> {
    drop(self.child_stdin.take());
    let status = self.child.wait().context("Waiting for ffmpeg encoder failed.")?;
    if !status.success() {
      bail!("ffmpeg encoder exited with {}", status);
    }
    Ok(())
  }
}

impl FrameSink for VideoOutput {
  fn emit(&mut self, frame: &VideoFrame) -> Result<()> {
    self.child_stdin.as_mut()
      .ok_or(anyhow!("Encoder pipe is closed."))?
      .write_all(&frame.data)
      .context("Writing bytes to video output failed.")
  }
}

// Decoded trailer frames and the end-of-trailer policy. The original frames
// are decoded eagerly once per session; playback is indexed by the track's
// trailer cursor.
pub struct TrailerSource {
  frames: Vec<VideoFrame>,
  end: TrailerEnd,
}

impl TrailerSource {
  pub fn load(path: &Path, end: TrailerEnd) -> Result<TrailerSource> {
    let mut input = VideoInput::new(path)?;
    let mut frames = vec![];
    while let Some(frame) = input.next()? {
      frames.push(frame);
    }
    if frames.is_empty() {
      bail!("Trailer {} contains no frames.", path.display());
    }
    Ok(TrailerSource { frames, end })
  }

  pub fn from_frames(frames: Vec<VideoFrame>, end: TrailerEnd) -> TrailerSource {
    TrailerSource { frames, end }
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  // Resolves a playback cursor to a frame according to the end policy.
  pub fn frame_at(&self, cursor: usize) -> Option<&VideoFrame> {
    if self.frames.is_empty() { return None }
    let ind = match self.end {
      TrailerEnd::Hold => usize::min(cursor, self.frames.len() - 1),
      TrailerEnd::Loop => cursor % self.frames.len(),
    };
    Some(&self.frames[ind])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn constant_frame(value: u8) -> VideoFrame {
    let mut frame = VideoFrame::new(4, 4);
    frame.data.iter_mut().for_each(|v| *v = value);
    frame
  }

  #[test]
  fn test_to_gray() {
    let mut frame = VideoFrame::new(2, 1);
    frame.set_pixel(0, 0, [255, 255, 255]);
    frame.set_pixel(1, 0, [255, 0, 0]);
    let gray = frame.to_gray();
    assert_eq!(gray.value(0, 0), 255);
    // 77 * 255 / 256.
    assert_eq!(gray.value(1, 0), 76);
  }

  #[test]
  fn test_trailer_hold_clamps_to_last_frame() {
    let trailer = TrailerSource::from_frames(
      vec![constant_frame(10), constant_frame(20)],
      TrailerEnd::Hold,
    );
    assert_eq!(trailer.frame_at(0).unwrap().data[0], 10);
    assert_eq!(trailer.frame_at(1).unwrap().data[0], 20);
    assert_eq!(trailer.frame_at(7).unwrap().data[0], 20);
  }

  #[test]
  fn test_trailer_loop_wraps_around() {
    let trailer = TrailerSource::from_frames(
      vec![constant_frame(10), constant_frame(20)],
      TrailerEnd::Loop,
    );
    assert_eq!(trailer.frame_at(2).unwrap().data[0], 10);
    assert_eq!(trailer.frame_at(3).unwrap().data[0], 20);
  }

  #[test]
  fn test_empty_trailer_yields_no_frame() {
    let trailer = TrailerSource::from_frames(vec![], TrailerEnd::Hold);
    assert!(trailer.frame_at(0).is_none());
  }

  fn ffmpeg_available() -> bool {
    let runs = |cmd: &str| Command::new(cmd)
      .arg("-version")
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .is_ok();
    runs("ffmpeg") && runs("ffprobe")
  }

  #[test]
  fn test_video_input_reads_path_with_spaces_to_clean_end() {
    if !ffmpeg_available() { return }
    let dir = std::env::temp_dir()
      .join(format!("cover-overlay-video-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("test clip.avi");
    let status = Command::new("ffmpeg")
      .args(["-y", "-f", "lavfi", "-i", "testsrc=duration=0.2:size=64x48:rate=25"])
      .arg(&path)
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .unwrap();
    assert!(status.success());

    let mut input = VideoInput::new(&path).unwrap();
    let mut count = 0;
    while let Some(frame) = input.next().unwrap() {
      assert_eq!(frame.width, 64);
      assert_eq!(frame.height, 48);
      count += 1;
    }
    assert_eq!(count, 5);
    // End of stream is stable after the decoder has been reaped.
    assert!(input.next().unwrap().is_none());
  }
}

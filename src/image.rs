use crate::all::*;

// Row-major grayscale image storage. The feature extractor and the reference
// catalog operate on these; color frames live in `video.rs`.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
  pub data: Vec<u8>,
  pub width: usize,
  pub height: usize,
}

impl Image {
  pub fn new(width: usize, height: usize) -> Image {
    Image {
      data: vec![0; width * height],
      width,
      height,
    }
  }

  pub fn from_data(data: Vec<u8>, width: usize, height: usize) -> Image {
    assert_eq!(data.len(), width * height);
    Image { data, width, height }
  }

  // Decodes a reference cover image file and converts to grayscale.
  pub fn load(path: &Path) -> Result<Image> {
    let decoded = image::open(path)
      .with_context(|| format!("Failed to load image {}", path.display()))?
      .to_luma8();
    Ok(Image {
      width: decoded.width() as usize,
      height: decoded.height() as usize,
      data: decoded.into_raw(),
    })
  }

  #[inline(always)]
  pub fn value(&self, x: usize, y: usize) -> u8 {
    self.data[y * self.width + x]
  }

  #[inline(always)]
  pub fn value_i32(&self, x: i32, y: i32) -> u8 {
    self.data[y as usize * self.width + x as usize]
  }

  #[inline(always)]
  pub fn set_value(&mut self, x: usize, y: usize, value: u8) {
    self.data[y * self.width + x] = value;
  }

  // 3x3 box blur used to desensitize BRIEF sampling to pixel noise.
  // Border pixels are left as-is.
  pub fn box_blur(&self) -> Image {
    let mut out = self.clone();
    if self.width < 3 || self.height < 3 { return out }
    for y in 1..(self.height - 1) {
      for x in 1..(self.width - 1) {
        let mut sum = 0u32;
        for dy in 0..3 {
          for dx in 0..3 {
            sum += self.value(x + dx - 1, y + dy - 1) as u32;
          }
        }
        out.set_value(x, y, (sum / 9) as u8);
      }
    }
    out
  }
}

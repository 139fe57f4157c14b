use crate::all::*;

use serde::Deserialize;

// One record of the mapping file: a JSON array of these, image resolved
// against the image directory and trailer against the trailer directory.
#[derive(Debug, Deserialize)]
pub struct MappingEntry {
  pub name: String,
  pub image: String,
  pub trailer: String,
}

// A known cover with its precomputed descriptors. Immutable after catalog
// load; the trailer itself is opened lazily when the cover is first matched.
pub struct ReferenceCover {
  pub name: String,
  pub image: Image,
  pub descriptors: FrameDescriptors,
  pub trailer_path: PathBuf,
}

pub struct ReferenceCatalog {
  covers: Vec<ReferenceCover>,
  skipped: Vec<String>,
}

impl ReferenceCatalog {
  // Descriptors for every reference image are extracted once here, which
  // amortizes the cost across all frames of all sessions. A bad entry is
  // skipped with a warning; only an empty result is fatal.
  pub fn load(
    mapping_path: &Path,
    image_dir: &Path,
    trailer_dir: &Path,
    extractor: &dyn FeatureExtractor,
  ) -> Result<ReferenceCatalog> {
    let text = std::fs::read_to_string(mapping_path)
      .with_context(|| format!("Failed to read mapping file {}", mapping_path.display()))?;
    let entries: Vec<MappingEntry> = serde_json::from_str(&text)
      .context("Mapping file is not a JSON array of {name, image, trailer} records.")?;

    let mut covers = vec![];
    let mut skipped = vec![];
    for entry in entries {
      match load_entry(&entry, image_dir, trailer_dir, extractor) {
        Ok(cover) => {
          info!("Loaded reference cover {} with {} descriptors.", cover.name, cover.descriptors.len());
          covers.push(cover);
        },
        Err(err) => {
          warn!("Skipping catalog entry {}: {:#}", entry.name, err);
          skipped.push(entry.name);
        },
      }
    }
    if covers.is_empty() {
      bail!("No usable entries in mapping file {}", mapping_path.display());
    }
    Ok(ReferenceCatalog { covers, skipped })
  }

  // For sessions and tests that assemble covers in memory.
  pub fn from_covers(covers: Vec<ReferenceCover>) -> ReferenceCatalog {
    ReferenceCatalog {
      covers,
      skipped: vec![],
    }
  }

  pub fn lookup(&self, name: &str) -> Option<&ReferenceCover> {
    self.covers.iter().find(|c| c.name == name)
  }

  pub fn covers(&self) -> &[ReferenceCover] {
    &self.covers
  }

  pub fn len(&self) -> usize {
    self.covers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.covers.is_empty()
  }

  // Names of mapping entries that failed to load.
  pub fn skipped(&self) -> &[String] {
    &self.skipped
  }
}

fn load_entry(
  entry: &MappingEntry,
  image_dir: &Path,
  trailer_dir: &Path,
  extractor: &dyn FeatureExtractor,
) -> Result<ReferenceCover> {
  let image_path = image_dir.join(&entry.image);
  let image = Image::load(&image_path)?;
  let descriptors = extractor.extract(&image);
  // A cover with fewer features than a projective fit needs can never be
  // matched, so it is rejected up front.
  if descriptors.len() < MIN_FIT_POINTS {
    bail!("Reference image {} has {} extractable features, need at least {}.",
      image_path.display(), descriptors.len(), MIN_FIT_POINTS);
  }
  let trailer_path = if Path::new(&entry.trailer).is_absolute() {
    PathBuf::from(&entry.trailer)
  }
  else {
    trailer_dir.join(&entry.trailer)
  };
  if !trailer_path.exists() {
    bail!("Trailer file {} does not exist.", trailer_path.display());
  }
  Ok(ReferenceCover {
    name: entry.name.clone(),
    image,
    descriptors,
    trailer_path,
  })
}

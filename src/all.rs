// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  catalog::*,
  compositor::*,
  extractor::*,
  homography::*,
  image::*,
  matcher::*,
  parameters::*,
  pipeline::*,
  tracker::*,
  types::*,
  util::*,
  video::*,
};

pub use {
  std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
  },
  log::{debug, error, info, warn, LevelFilter},
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
};

use cover_overlay::all::*;
use cover_overlay::util;

use clap::Parser;

#[derive(Parser)]
struct Args {
  /// JSON mapping file: an array of {name, image, trailer} records.
  #[clap(short, long)]
  mapping: String,
  /// Directory of reference cover images.
  #[clap(short, long)]
  images: String,
  /// Directory of trailer videos.
  #[clap(short, long, default_value = ".")]
  trailers: String,
  /// Input video file.
  #[clap(short = 'v', long)]
  input: String,
  /// Output video file. Omitted: composited frames are discarded.
  #[clap(short, long)]
  output: Option<String>,
  #[clap(long, default_value = "30")]
  fps: f64,
  #[clap(flatten)]
  parameters: ParameterSet,
}

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    println!("  {}: {}", i + 1, e);
  }
}

fn main() {
  if let Err(err) = run() {
    handle_error(&err);
    std::process::exit(1);
  }
}

fn run() -> Result<()> {
  let args = Args::parse();
  env_logger::Builder::new()
    .filter_level(LevelFilter::Info)
    .format(util::format_log)
    .init();
  *PARAMETER_SET.lock().unwrap() = args.parameters;

  let extractor = FastBriefExtractor::new();
  let catalog = ReferenceCatalog::load(
    Path::new(&args.mapping),
    Path::new(&args.images),
    Path::new(&args.trailers),
    &extractor,
  )?;
  info!("Catalog loaded: {} covers, {} entries skipped.",
    catalog.len(), catalog.skipped().len());

  let input = VideoInput::new(Path::new(&args.input))?;
  let mut pipeline = Pipeline::new();
  let summary = match &args.output {
    Some(path) => {
      let (width, height) = probe_dimensions(Path::new(&args.input))?;
      let mut output = VideoOutput::new(Path::new(path), width, height, args.fps)?;
      let summary = pipeline.run(input, &mut output, &catalog)?;
      output.finish()?;
      summary
    },
    None => pipeline.run(input, &mut DiscardSink, &catalog)?,
  };
  info!("Composited {} of {} frames.", summary.frames_composited, summary.frames_processed);
  Ok(())
}

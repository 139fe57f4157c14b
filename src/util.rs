// Log line prefix: level tag and source location, padded so the messages of
// consecutive per-frame lines stay aligned.
fn format_prefix(level: log::Level, file: &str, line: u32) -> String {
  format!("{:<5} {:<28}", level, format!("{}:{}", file, line))
}

pub fn format_log(
  buf: &mut env_logger::fmt::Formatter,
  record: &log::Record,
) -> std::io::Result<()> {
  use std::io::Write;
  use env_logger::fmt::Color::*;
  use log::Level::*;
  let mut style = buf.style();
  style.set_color(match record.level() {
    Error => Red,
    Warn => Yellow,
    Info => Cyan,
    Debug => Blue,
    Trace => Magenta,
  });
  let prefix = format_prefix(
    record.level(),
    record.file().unwrap_or("?"),
    record.line().unwrap_or(0),
  );
  writeln!(buf, "{} {}", style.value(prefix), record.args())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_prefix_alignment() {
    let prefix = format_prefix(log::Level::Info, "src/pipeline.rs", 42);
    assert!(prefix.starts_with("INFO "));
    assert!(prefix.contains("src/pipeline.rs:42"));
    // Short locations are padded to the same width.
    let short = format_prefix(log::Level::Warn, "a.rs", 1);
    assert_eq!(prefix.len(), short.len());
  }
}

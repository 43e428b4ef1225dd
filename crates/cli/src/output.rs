//! CLI output formatting utilities.
//!
//! Status lines go to stdout, errors to stderr. Logs are written separately by
//! tracing, also to stderr, so `--output json` keeps stdout machine-readable.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream, Style};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Cache keys and digests are shown by their first 12 hex digits.
pub fn short_digest(digest: &str) -> &str {
  &digest[..digest.len().min(12)]
}

/// Wall time of a task, at the precision a build log needs.
pub fn format_elapsed(elapsed: Duration) -> String {
  match elapsed.as_secs() {
    0 => format!("{}ms", elapsed.subsec_millis()),
    secs @ 1..60 => format!("{}.{}s", secs, elapsed.subsec_millis() / 100),
    secs => humantime::format_duration(Duration::from_secs(secs)).to_string(),
  }
}

fn styled(text: &str, stream: Stream, style: Style) -> String {
  text.if_supports_color(stream, |t| t.style(style)).to_string()
}

pub fn print_success(message: &str) {
  println!("{} {}", styled(symbols::SUCCESS, Stream::Stdout, Style::new().green()), message);
}

pub fn print_error(message: &str) {
  let red = Style::new().red();
  eprintln!(
    "{} {}",
    styled(symbols::ERROR, Stream::Stderr, red),
    styled(message, Stream::Stderr, red)
  );
}

/// Captured output of a failed command, indented under the error on stderr.
pub fn print_diagnostics(output: &str) {
  for line in output.lines() {
    eprintln!("    {}", styled(line, Stream::Stderr, Style::new().dimmed()));
  }
}

pub fn print_info(message: &str) {
  println!("{} {}", styled(symbols::INFO, Stream::Stdout, Style::new().blue()), message);
}

/// An indented `label: value` line under a heading.
pub fn print_field(label: &str, value: &str) {
  println!("  {}: {}", styled(label, Stream::Stdout, Style::new().dimmed()), value);
}

/// One line of a CI summary: outcome symbol, task name, dimmed detail.
pub fn print_task_line(ok: bool, task: &str, detail: &str) {
  let (symbol, style) = if ok {
    (symbols::SUCCESS, Style::new().green())
  } else {
    (symbols::ERROR, Style::new().red())
  };
  println!(
    "  {} {:<18} {}",
    styled(symbol, Stream::Stdout, style),
    task,
    styled(detail, Stream::Stdout, Style::new().dimmed())
  );
}

/// Heading for one described pipeline.
pub fn print_pipeline_header(name: &str, cache_key: &str) {
  println!(
    "{} {} {}",
    styled(symbols::ARROW, Stream::Stdout, Style::new().cyan()),
    styled(name, Stream::Stdout, Style::new().bold()),
    styled(short_digest(cache_key), Stream::Stdout, Style::new().dimmed())
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

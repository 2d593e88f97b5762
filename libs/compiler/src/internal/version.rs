use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

use super::errors::{map_err_with_context, Result};

static RELEASE_PREFIX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(\d+\.\d+\.\d+)").expect("valid release pattern"));

/// Strip build metadata (`0.4.17+commit.bdeb9e52.Emscripten.clang` -> `0.4.17`). Strings without
/// a leading `MAJOR.MINOR.PATCH` are returned unchanged.
pub fn truncate_version(version: &str) -> &str {
  let trimmed = version.trim().trim_start_matches('v');
  RELEASE_PREFIX
    .captures(trimmed)
    .and_then(|captures| captures.get(1))
    .map(|release| release.as_str())
    .unwrap_or(version)
}

pub fn parse_version(version: &str) -> Result<Version> {
  map_err_with_context(
    Version::parse(truncate_version(version)),
    "Failed to parse compiler version",
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncates_build_metadata() {
    assert_eq!(truncate_version("0.4.17+commit.bdeb9e52.Emscripten.clang"), "0.4.17");
    assert_eq!(truncate_version("v0.8.30"), "0.8.30");
    assert_eq!(truncate_version("nightly"), "nightly");
  }

  #[test]
  fn parses_release_versions() {
    assert_eq!(
      parse_version("0.4.11-nightly.2017.5.3+commit.1aa0f77a").expect("version"),
      Version::new(0, 4, 11)
    );
    assert!(parse_version("latest").is_err());
  }
}

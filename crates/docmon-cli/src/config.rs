//! Settings shared by every subcommand.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path: PathBuf,
  /// Written at the start of every line of checkout output.
  pub prefix:     String,
  /// Written once per nesting level of checkout output.
  pub indent:     String,
}

impl Default for CliConfig {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("docmon.db"),
      prefix:     String::new(),
      indent:     "  ".to_string(),
    }
  }
}

impl CliConfig {
  /// Layer `DOCMON_*` environment variables over the optional TOML file at
  /// `path`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DOCMON"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = CliConfig::load(Path::new("does-not-exist.toml")).unwrap();
    assert_eq!(cfg.indent, "  ");
    assert!(cfg.prefix.is_empty());
  }

  #[test]
  fn tilde_is_expanded() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/docmon.db")),
      PathBuf::from(home).join("docmon.db")
    );
    assert_eq!(expand_tilde(Path::new("/tmp/x.db")), PathBuf::from("/tmp/x.db"));
  }
}

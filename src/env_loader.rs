use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

const ENV_FILES: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads `DEDUP_*` settings from the first `.env` file found. Variables
/// already set in the environment take precedence over the file.
pub fn load_env() -> Option<PathBuf> {
    for path in ENV_FILES.iter().map(Path::new) {
        if !path.exists() {
            continue;
        }
        match load_env_from_file(path) {
            Ok(count) => {
                info!("Loaded {} environment variables from {:?}", count, path);
                return Some(path.to_path_buf());
            }
            Err(e) => warn!("Failed to load environment from {:?}: {:#}", path, e),
        }
    }
    info!("No .env file found, using environment variables from system");
    None
}

/// Splits one `.env` line into key and value. Comments, blank lines and
/// lines without `=` yield `None`; `export ` prefixes and quotes are dropped.
pub fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let idx = line.find('=')?;
    let key = line[..idx].trim();
    if key.is_empty() {
        return None;
    }
    let value = line[idx + 1..].trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    Some((key, value))
}

fn load_env_from_file(file_path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read env file {:?}", file_path))?;
    let mut applied = 0;
    for (key, value) in text.lines().filter_map(parse_env_line) {
        if std::env::var(key).is_err() {
            std::env::set_var(key, value);
            debug!("Set env var from file: {} = {}", key, value);
            applied += 1;
        }
    }
    Ok(applied)
}

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::config::Config;

/// Creates the output directory and the database's parent directory.
pub async fn ensure_directories(config: &Config) -> Result<()> {
    let db_parent = config
        .db_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty());
    for dir in std::iter::once(config.output_dir.as_path()).chain(db_parent) {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

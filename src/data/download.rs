use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::training::PipelineConfig;

/// Downloads and extracts the dataset archive unless the split directories
/// are already in place. Any network or archive failure is fatal; there is no
/// retry and no partial recovery, a rerun starts over.
pub fn fetch_dataset(config: &PipelineConfig) -> Result<()> {
    let train_dir = config.train_root();
    let val_dir = config.val_root();

    if train_dir.is_dir() && val_dir.is_dir() {
        log::info!(
            "dataset already present at {}, skipping download",
            config.data_root.display()
        );
        return Ok(());
    }

    std::fs::create_dir_all(&config.data_root).with_context(|| {
        format!("failed to create data root {}", config.data_root.display())
    })?;

    let archive_path = config.data_root.join("dataset.zip");
    download_archive(&config.archive_url, &archive_path)?;
    extract_archive(&archive_path, &config.data_root)?;
    std::fs::remove_file(&archive_path).ok();

    if !train_dir.is_dir() || !val_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "archive extracted but expected split directories are missing: {} / {}",
            train_dir.display(),
            val_dir.display()
        ));
    }

    Ok(())
}

fn download_archive(url: &str, dest: &Path) -> Result<()> {
    log::info!("downloading {url}");

    let client = reqwest::blocking::Client::builder()
        .user_agent("xray-pneumonia/0.1")
        .build()
        .context("failed to build http client")?;

    let response = client
        .get(url)
        .send()
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("server rejected download of {url}"))?;

    let bytes = response.bytes().context("failed to read archive body")?;
    let mut file =
        File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("failed to write {}", dest.display()))?;

    log::info!("wrote {} ({} bytes)", dest.display(), bytes.len());
    Ok(())
}

fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    log::info!("extracting {} into {}", archive.display(), dest.display());

    let file =
        File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip archive", archive.display()))?;
    zip.extract(dest)
        .with_context(|| format!("failed to extract into {}", dest.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::synthetic_split;
    use tempfile::TempDir;

    #[test]
    fn skips_when_splits_exist() {
        let train = synthetic_split(1, 1);
        let val = synthetic_split(1, 1);
        let root = TempDir::new().unwrap();

        let mut config = PipelineConfig::default();
        config.data_root = root.path().to_path_buf();
        config.train_dir = train.path().to_string_lossy().into_owned();
        config.val_dir = val.path().to_string_lossy().into_owned();

        // Absolute split paths already exist, so no network access happens.
        fetch_dataset(&config).unwrap();
    }

    #[test]
    fn rejects_invalid_archive() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        assert!(extract_archive(&archive, dir.path()).is_err());
    }
}

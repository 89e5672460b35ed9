use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use json_pretty_compact::PrettyCompactFormatter;
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{ser::PrettyFormatter, Serializer};

pub fn to_json_bytes<T: Serialize>(data: &T) -> serde_json::Result<Vec<u8>> {
    let formatter = PrettyCompactFormatter::new();
    let mut data_bytes = vec![];
    let mut ser = Serializer::with_formatter(&mut data_bytes, formatter);
    data.serialize(&mut ser)?;
    Ok(data_bytes)
}

// PrettyCompactFormatter mangles integer map keys, so anything keyed by tile index
// (manifests, reports) goes through the plain pretty formatter instead.
pub fn to_keyed_json_bytes<T: Serialize>(data: &T) -> serde_json::Result<Vec<u8>> {
    let mut data_bytes = vec![];
    let mut ser = Serializer::with_formatter(&mut data_bytes, PrettyFormatter::with_indent(b"  "));
    data.serialize(&mut ser)?;
    Ok(data_bytes)
}

pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    info!("Saving {}", path.display());
    let data_bytes = to_json_bytes(data)?;
    write_atomic(path, &data_bytes)?;
    Ok(())
}

pub fn save_keyed_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    info!("Saving {}", path.display());
    let data_bytes = to_keyed_json_bytes(data)?;
    write_atomic(path, &data_bytes)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    info!("Loading {}", path.display());
    let data_bytes = fs::read(path)?;
    let data: T = serde_json::from_slice(&data_bytes)?;
    Ok(data)
}

/// Writes through a temporary sibling and renames it into place, so readers only ever
/// see the old file or the complete new one.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, data)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

pub fn backup_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .context("backup source has no file name")?
        .to_string_lossy()
        .into_owned();
    let mut candidate = path.with_file_name(format!("{}.bak", name));
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}.bak.{}", name, n));
        n += 1;
    }
    Ok(candidate)
}

pub fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match source.extension() {
        Some(ext) => format!("{}_edited.{}", stem, ext.to_string_lossy()),
        None => format!("{}_edited", stem),
    };
    source.with_file_name(name)
}

pub fn preview_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{}_preview.png", stem))
}

//! Local side artifacts: metadata side-file, page files, pipeline output

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::cloud::UploadItem;
use crate::error::IngestError;
use crate::odata::Row;

/// Member the OData service adds to every row
const ROW_METADATA_KEY: &str = "__metadata";

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> IngestError + '_ {
    move |source| IngestError::LocalWriteError {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error(parent))?;
    }
    Ok(())
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_pretty_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IngestError> {
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value).map_err(|e| IngestError::LocalWriteError {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    fs::write(path, text).map_err(write_error(path))
}

/// `<metadata_dir>/<entity>_metadata.json`
pub fn metadata_path(metadata_dir: &Path, entity: &str) -> PathBuf {
    metadata_dir.join(format!("{}_metadata.json", entity))
}

/// `<data_dir>/<prefix>/<entity>_data_<n>.json`
pub fn page_path(data_dir: &Path, prefix: &str, entity: &str, page: usize) -> PathBuf {
    data_dir
        .join(prefix)
        .join(format!("{}_data_{}.json", entity, page))
}

/// `<out_dir>/<entity>_SuccessFactors-cdap-data-pipeline.json`
pub fn pipeline_file_name(entity: &str) -> String {
    format!("{}_SuccessFactors-cdap-data-pipeline.json", entity)
}

/// Write one page of rows as newline-delimited JSON, without `__metadata`.
pub fn write_page(path: &Path, rows: Vec<Row>) -> Result<usize, IngestError> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(write_error(path))?;
    let mut writer = BufWriter::new(file);

    let count = rows.len();
    for mut row in rows {
        row.remove(ROW_METADATA_KEY);
        serde_json::to_writer(&mut writer, &row).map_err(|e| IngestError::LocalWriteError {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        writer.write_all(b"\n").map_err(write_error(path))?;
    }
    writer.flush().map_err(write_error(path))?;
    Ok(count)
}

/// Page files under `dir` paired with their object names below `prefix`,
/// in file-name order.
pub fn collect_page_files(dir: &Path, prefix: &str) -> Result<Vec<UploadItem>, IngestError> {
    let mut items = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestError::LocalReadError {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        items.push(UploadItem {
            path: path.to_path_buf(),
            object_name: format!("{}/{}", prefix, file_name),
        });
    }
    Ok(items)
}

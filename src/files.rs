use anyhow::{Context, Result};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

use crate::constants::UNTITLED_NAME;

pub fn open_file(filename: &Path) -> Result<String> {
    let file =
        File::open(filename).with_context(|| format!("Failed to open file: {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .with_context(|| format!("{:?} is not valid UTF-8 text", filename))?;
    Ok(contents)
}

/// Writes through a sibling temp file and renames it over `filename`, so a
/// failed write never truncates the previous version.
pub fn save_file(filename: &Path, contents: &str) -> Result<()> {
    let mut temp_name = filename.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_filename = Path::new(&temp_name);

    let mut file = File::create(temp_filename)
        .with_context(|| format!("Failed to create temporary file: {:?}", temp_filename))?;
    file.write_all(contents.as_bytes())
        .with_context(|| "Failed to write content to temporary file")?;
    file.sync_all()
        .with_context(|| "Failed to sync temporary file")?;

    std::fs::rename(temp_filename, filename)
        .with_context(|| format!("Failed to rename temporary file to {:?}", filename))?;
    tracing::info!("Saved {:?}", filename);
    Ok(())
}

/// File name shown in the window title.
pub fn display_name(path: Option<&Path>) -> String {
    path.and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| UNTITLED_NAME.to_string())
}

pub fn is_python_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("py") || e.eq_ignore_ascii_case("pyw"))
}

/// Window title: file name, a `*` when there are unsaved edits, app name.
pub fn window_title(path: Option<&Path>, modified: bool) -> String {
    format!(
        "{}{} - {}",
        if modified { "*" } else { "" },
        display_name(path),
        crate::constants::APP_NAME
    )
}

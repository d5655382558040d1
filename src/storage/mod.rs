use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::forms::UploadedFile;

/// Six uppercase characters, used in submission URLs.
pub fn generate_submission_code() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}

pub fn ensure_dirs(media_folder: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(media_folder)
}

/// Keeps ASCII letters, digits, dots, dashes and underscores.
fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image");
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes an uploaded image below `media_folder` and returns the stored file name.
pub fn save_image(
    media_folder: &Path,
    submission_code: &str,
    file: &UploadedFile,
) -> std::io::Result<String> {
    let stored_name = format!(
        "{}_{}_{}",
        submission_code,
        &Uuid::new_v4().simple().to_string()[..8],
        sanitize_filename(&file.filename)
    );
    let path: PathBuf = media_folder.join(&stored_name);
    std::fs::write(&path, &file.content)?;
    tracing::info!("Stored image {} for submission {}", stored_name, submission_code);
    Ok(stored_name)
}

/// Deletes a stored media file. A file that is already gone is not an error.
pub fn remove_media(media_folder: &Path, stored_name: &str) {
    match std::fs::remove_file(media_folder.join(stored_name)) {
        Ok(()) => tracing::info!("Removed media file {}", stored_name),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove media file {}: {}", stored_name, e),
    }
}

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::ArtifactError;

/// File name the downloaded result archive is saved under
pub const RESULTS_ARCHIVE: &str = "team-results.zip";

/// Save an archive under `dest` and unpack it next to itself
///
/// Returns the path of the saved archive.
pub fn save_and_extract(dest: &Path, archive: &[u8]) -> Result<PathBuf, ArtifactError> {
    if !dest.is_dir() {
        debug!("creating results destination folder: {}", dest.display());
        fs::create_dir_all(dest)?;
    }

    let file_name = dest.join(RESULTS_ARCHIVE);
    debug!("downloading results file: {}", file_name.display());
    fs::write(&file_name, archive)?;

    let mut zip = ZipArchive::new(File::open(&file_name)?)?;
    zip.extract(dest)?;
    debug!("extracted {} entries to {}", zip.len(), dest.display());

    Ok(file_name)
}

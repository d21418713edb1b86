//! Output and staging path derivation

use convoy_common::hash::path_fingerprint;
use std::path::{Path, PathBuf};

/// Output path for a source: same location, extension swapped for `format_out`
pub fn derive_output_path(source: &Path, format_out: &str) -> PathBuf {
    source.with_extension(format_out.trim_start_matches('.'))
}

/// Staging path for `output`.
///
/// Only the file name changes: it becomes `md5(output) + "." + ext`, so the
/// staged file sits next to its target and is deterministic per target.
pub fn derive_temp_path(output: &Path) -> PathBuf {
    let hash = path_fingerprint(output);
    let name = match output.extension() {
        Some(ext) => format!("{}.{}", hash, ext.to_string_lossy()),
        None => hash,
    };
    output.with_file_name(name)
}

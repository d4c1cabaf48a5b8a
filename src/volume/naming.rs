//! Destination names of encrypted parts.

use std::ffi::OsStr;
use std::path::Path;

/// Extension of OpenPGP encrypted parts.
pub const PART_EXTENSION: &str = "gpg";

/// Returns the destination file name of a part.
///
/// A file stored in one part keeps its base name with `.gpg` appended. Split
/// files get a `.NNofMM` suffix with the 1-based part index and the total,
/// zero padded to two digits (or to the width of `total_parts` above 99).
///
/// # Example
///
/// ```rust
/// use offsite::volume::part_file_name;
/// use std::path::Path;
///
/// let source = Path::new("/backups/home.0.20240101.tar.bz2");
/// assert_eq!(part_file_name(source, 1, 1), "home.0.20240101.tar.bz2.gpg");
/// assert_eq!(part_file_name(source, 3, 7), "home.0.20240101.tar.bz2.03of07.gpg");
/// ```
pub fn part_file_name(source: &Path, part_index: u32, total_parts: u32) -> String {
    part_file_name_with(source, part_index, total_parts, PART_EXTENSION)
}

/// Like [`part_file_name`], with a backend-specific `extension`.
///
/// ```rust
/// use offsite::volume::part_file_name_with;
/// use std::path::Path;
///
/// let source = Path::new("var.0.20240101.tar.bz2");
/// assert_eq!(part_file_name_with(source, 2, 2, "ofsp"), "var.0.20240101.tar.bz2.02of02.ofsp");
/// ```
pub fn part_file_name_with(
    source: &Path,
    part_index: u32,
    total_parts: u32,
    extension: &str,
) -> String {
    let base = source
        .file_name()
        .unwrap_or_else(|| OsStr::new("part"))
        .to_string_lossy();

    if total_parts <= 1 {
        format!("{}.{}", base, extension)
    } else {
        let width = total_parts.to_string().len().max(2);
        format!(
            "{}.{:0width$}of{:0width$}.{}",
            base,
            part_index,
            total_parts,
            extension,
            width = width
        )
    }
}

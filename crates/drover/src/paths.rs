//! Path layout rules for capture records.
//!
//! A record's primary file lives under a `P` branch directory, e.g.
//! `<root>/<unit>/P/Prep_<name>.dat`, with a header sibling next to it and
//! XML artifacts in the parallel `M` branch at `<root>/<unit>/M/<name>/`.
//! Everything here is a pure function over `std::path` components, so the
//! platform separator is applied consistently on every operation.

use std::path::{Path, PathBuf};

/// Directory marker of the primary-data branch.
pub const PRIMARY_MARKER: &str = "P";
/// Directory marker of the metadata branch.
pub const METADATA_MARKER: &str = "M";
/// Prefix carried by primary data and header file names.
pub const RECORD_PREFIX: &str = "Prep_";
/// Suffix of the primary data file.
pub const DATA_SUFFIX: &str = ".dat";
/// Fixed name of the optional raw-data-record sibling.
pub const RAW_DATA_RECORD_XML: &str = "RawdataRecord.xml";

const DATA_EXT: &str = "dat";
const HEADER_EXT: &str = "hdr";
const XML_EXT: &str = "xml";

/// True when some non-final component of `path` equals `marker`, i.e. the
/// marker appears as a whole directory segment bounded by separators.
pub fn is_under_marker(path: &Path, marker: &str) -> bool {
    match path.parent() {
        Some(parent) => parent
            .components()
            .any(|c| c.as_os_str().to_str() == Some(marker)),
        None => false,
    }
}

/// The directory above the rightmost `marker` component of `dir`, or `None`
/// if `dir` contains no such component.
pub fn branch_root<'a>(dir: &'a Path, marker: &str) -> Option<&'a Path> {
    let mut cur = dir;
    loop {
        if cur.file_name().and_then(|n| n.to_str()) == Some(marker) {
            return cur.parent();
        }
        cur = cur.parent()?;
    }
}

/// Replace the rightmost `from_marker` component of `dir` (and everything
/// below it) with `to_marker` plus the given extra segments.
pub fn sibling_dir(dir: &Path, from_marker: &str, to_marker: &str, extra: &[&str]) -> Option<PathBuf> {
    let mut out = branch_root(dir, from_marker)?.to_path_buf();
    out.push(to_marker);
    for segment in extra {
        out.push(segment);
    }
    Some(out)
}

/// The metadata directory of a record anchored at `primary_dir`.
pub fn metadata_dir(primary_dir: &Path, name: &str) -> Option<PathBuf> {
    sibling_dir(primary_dir, PRIMARY_MARKER, METADATA_MARKER, &[name])
}

/// Strip `prefix` and `suffix` from a candidate file name to obtain the
/// record name shared by all four sibling paths. Empty names are rejected.
pub fn record_name<'a>(file_name: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    let name = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if name.is_empty() {
        return None;
    }
    Some(name)
}

pub fn data_file_name(name: &str) -> String {
    format!("{RECORD_PREFIX}{name}.{DATA_EXT}")
}

pub fn header_file_name(name: &str) -> String {
    format!("{RECORD_PREFIX}{name}.{HEADER_EXT}")
}

pub fn metadata_xml_name(name: &str) -> String {
    format!("{name}.{XML_EXT}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_must_be_a_whole_directory_segment() {
        assert!(is_under_marker(Path::new("/data/u1/P/Prep_s1.dat"), "P"));
        assert!(is_under_marker(Path::new("/data/P/sub/Prep_s1.dat"), "P"));
        // "AP" is not the marker segment
        assert!(!is_under_marker(Path::new("/data/AP/Prep_s1.dat"), "P"));
        // final component does not count; the file must live under the marker
        assert!(!is_under_marker(Path::new("/data/u1/P"), "P"));
        assert!(!is_under_marker(Path::new("P"), "P"));
    }

    #[test]
    fn branch_root_uses_rightmost_marker() {
        assert_eq!(
            branch_root(Path::new("/data/u1/P"), "P"),
            Some(Path::new("/data/u1"))
        );
        assert_eq!(
            branch_root(Path::new("/data/P/u1/P"), "P"),
            Some(Path::new("/data/P/u1"))
        );
        assert_eq!(branch_root(Path::new("/data/u1"), "P"), None);
    }

    #[test]
    fn sibling_dir_substitutes_marker_and_appends() {
        assert_eq!(
            sibling_dir(Path::new("/data/u1/P"), "P", "M", &["s123"]),
            Some(PathBuf::from("/data/u1/M/s123"))
        );
        assert_eq!(sibling_dir(Path::new("/data/u1"), "P", "M", &[]), None);
    }

    #[test]
    fn record_name_strips_prefix_and_suffix() {
        assert_eq!(
            record_name("Prep_s2018102922221914708.dat", RECORD_PREFIX, DATA_SUFFIX),
            Some("s2018102922221914708")
        );
        assert_eq!(record_name("Prep_.dat", RECORD_PREFIX, DATA_SUFFIX), None);
        assert_eq!(record_name("other_s1.dat", RECORD_PREFIX, DATA_SUFFIX), None);
        assert_eq!(record_name("Prep_s1.hdr", RECORD_PREFIX, DATA_SUFFIX), None);
    }

    #[test]
    fn sibling_file_names_share_the_record_name() {
        assert_eq!(data_file_name("s1"), "Prep_s1.dat");
        assert_eq!(header_file_name("s1"), "Prep_s1.hdr");
        assert_eq!(metadata_xml_name("s1"), "s1.xml");
    }
}

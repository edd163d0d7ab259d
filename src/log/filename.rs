//! Log file naming (spec.md §6.1), byte-for-byte matching the original's
//! `ComposeFileName`: `<log_dir>/<file_base>_<block_size:010>_<file_num:010>`.

use std::path::{Path, PathBuf};

pub fn compose(log_dir: &Path, file_base: &str, block_size: u32, file_num: u32) -> PathBuf {
    log_dir.join(format!("{file_base}_{block_size:010}_{file_num:010}"))
}

pub fn lock_file(log_dir: &Path, file_base: &str) -> PathBuf {
    log_dir.join(format!("{file_base}.lock"))
}

/// Parse `file_num` back out of a filename produced by [`compose`] for the
/// given `file_base`/`block_size`, used by `Initialize`'s directory scan
/// and `Rewind`'s "find the first numbered file" search.
pub fn parse_file_num(name: &str, file_base: &str, block_size: u32) -> Option<u32> {
    let prefix = format!("{file_base}_{block_size:010}_");
    let suffix = name.strip_prefix(&prefix)?;
    if suffix.len() != 10 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_matches_original_format() {
        let path = compose(Path::new("/var/log/stream"), "rec", 1048576, 3);
        assert_eq!(
            path.to_str().unwrap(),
            "/var/log/stream/rec_0001048576_0000000003"
        );
    }

    #[test]
    fn parse_file_num_round_trips() {
        let path = compose(Path::new("/x"), "rec", 4096, 42);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(parse_file_num(name, "rec", 4096), Some(42));
    }

    #[test]
    fn parse_file_num_rejects_other_bases() {
        assert_eq!(parse_file_num("other_0000004096_0000000001", "rec", 4096), None);
    }
}

//! Duplicate-safe file naming.
//!
//! Any write into a folder that may already hold a same-named file goes
//! through [`unique_path`]: `name.ext`, then `name_1.ext`, `name_2.ext`, ...

use std::path::{Path, PathBuf};

/// First unused path for `file_name` inside `dir`. Never returns an
/// existing path.
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !exists(&candidate) {
        return candidate;
    }

    let (stem, extension) = split_name(file_name);
    let mut counter = 1u32;
    loop {
        let name = match extension {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = dir.join(name);
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Temporary sibling path used while a file is being written
pub fn partial_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    final_path.with_file_name(format!(".{}.partial", name))
}

fn split_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], Some(&file_name[idx + 1..])),
        _ => (file_name, None),
    }
}

// symlink_metadata so a dangling link still counts as occupied
fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_free_name_is_used_as_is() {
        let temp = TempDir::new().unwrap();
        assert_eq!(unique_path(temp.path(), "a.wav"), temp.path().join("a.wav"));
    }

    #[test]
    fn test_counter_appended_before_extension() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.wav"), b"x").unwrap();
        std::fs::write(temp.path().join("a_1.wav"), b"x").unwrap();

        assert_eq!(unique_path(temp.path(), "a.wav"), temp.path().join("a_2.wav"));
    }

    #[test]
    fn test_name_without_extension() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes"), b"x").unwrap();

        assert_eq!(unique_path(temp.path(), "notes"), temp.path().join("notes_1"));
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let path = Path::new("/dest/REC_merged.m4a");
        assert_eq!(partial_path(path), PathBuf::from("/dest/.REC_merged.m4a.partial"));
    }
}

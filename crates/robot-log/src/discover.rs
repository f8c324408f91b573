//! Result file discovery.

use std::path::{Path, PathBuf};

use crate::error::{LogError, Result};

/// Resolve the result file argument into the list of files to parse.
///
/// A file is returned as is. A directory yields its `*.xml` files, descending
/// into subdirectories when `recursive` is set. Symlinked directories are not
/// descended into. Hidden entries are skipped and the result is sorted so
/// runs combine in a stable order.
pub fn discover_result_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(LogError::PathNotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_xml_files(path, recursive, &mut files)?;
    if files.is_empty() {
        return Err(LogError::NoResultFiles(path.to_path_buf()));
    }
    files.sort();
    tracing::debug!(dir = %path.display(), files = files.len(), "discovered result files");
    Ok(files)
}

fn collect_xml_files(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| LogError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| LogError::io(dir, e))?;
        let path = entry.path();
        let hidden = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(false);
        if hidden {
            continue;
        }

        let file_type = entry.file_type().map_err(|e| LogError::io(&path, e))?;
        if file_type.is_dir() {
            if recursive {
                collect_xml_files(&path, recursive, files)?;
            }
        } else if path.is_file() {
            let is_xml = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("xml"))
                .unwrap_or(false);
            if is_xml {
                files.push(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, "<robot/>").unwrap();
    }

    #[test]
    fn test_single_file_is_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("output.xml");
        touch(&file);
        assert_eq!(discover_result_files(&file, false).unwrap(), vec![file]);
    }

    #[test]
    fn test_directory_lists_xml_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.xml"));
        touch(&dir.path().join("a.XML"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join(".hidden.xml"));

        let files = discover_result_files(dir.path(), false).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml"]);
    }

    #[test]
    fn test_recursive_descends_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nightly");
        std::fs::create_dir(&nested).unwrap();
        touch(&dir.path().join("top.xml"));
        touch(&nested.join("deep.xml"));

        assert_eq!(discover_result_files(dir.path(), false).unwrap().len(), 1);
        assert_eq!(discover_result_files(dir.path(), true).unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nightly");
        std::fs::create_dir(&nested).unwrap();
        touch(&nested.join("deep.xml"));
        touch(&dir.path().join("top.xml"));
        std::os::unix::fs::symlink(dir.path(), nested.join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("top.xml"), nested.join("linked.xml")).unwrap();

        let files = discover_result_files(dir.path(), true).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["deep.xml", "linked.xml", "top.xml"]);
    }

    #[test]
    fn test_missing_and_empty_paths_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.xml");
        assert!(matches!(
            discover_result_files(&missing, false),
            Err(LogError::PathNotFound(_))
        ));
        assert!(matches!(
            discover_result_files(dir.path(), true),
            Err(LogError::NoResultFiles(_))
        ));
    }
}

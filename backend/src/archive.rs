//! Bundles a job's output artifacts into one zip archive.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Zips every regular file in `src_dir` into `dest` (flat, no directories)
/// and returns the number of entries. `dest` itself is excluded so the
/// archive can be staged inside the directory it bundles.
pub fn build_archive(src_dir: &Path, dest: &Path) -> Result<usize, String> {
    let out = File::create(dest).map_err(|e| format!("cannot create archive: {e}"))?;
    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<_> = fs::read_dir(src_dir)
        .map_err(|e| format!("cannot read job directory: {e}"))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path != dest)
        .collect();
    // Deterministic archive layout regardless of directory iteration order.
    entries.sort();

    let mut count = 0;
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        writer
            .start_file(name, options)
            .map_err(|e| format!("cannot add {name} to archive: {e}"))?;
        let mut input = File::open(&path).map_err(|e| format!("cannot read {name}: {e}"))?;
        io::copy(&mut input, &mut writer).map_err(|e| format!("cannot write {name}: {e}"))?;
        count += 1;
    }
    writer
        .finish()
        .map_err(|e| format!("cannot finish archive: {e}"))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zip::ZipArchive;

    #[test]
    fn archives_every_file_except_itself() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("carnet_a.pdf"), b"pdf a").unwrap();
        fs::write(dir.path().join("carnet_b.pdf"), b"pdf b").unwrap();
        fs::write(dir.path().join("carnet_c.png"), b"png c").unwrap();

        let dest = dir.path().join("job.zip");
        let count = build_archive(dir.path(), &dest).unwrap();
        assert_eq!(count, 3);

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"carnet_a.pdf".to_string()));
        assert!(names.contains(&"carnet_c.png".to_string()));
        assert!(!names.contains(&"job.zip".to_string()));
    }

    #[test]
    fn empty_directory_produces_empty_archive() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("job.zip");
        assert_eq!(build_archive(dir.path(), &dest).unwrap(), 0);
        let archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn missing_source_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("job.zip");
        assert!(build_archive(&dir.path().join("nope"), &dest).is_err());
    }
}

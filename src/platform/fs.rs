// ChapterSleuth - platform/fs.rs
//
// Filesystem access for multi-megabyte novel files. Inputs are memory
// mapped so encoding detection and decoding read straight from the page
// cache instead of copying the whole file twice; anything unmappable
// falls back to a buffered read.

use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Run `f` over the raw bytes of `path`.
pub fn with_file_bytes<T>(path: &Path, f: impl FnOnce(&[u8]) -> T) -> io::Result<T> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(f(&[]));
    }

    // Mapping is read-only and the file is only read once per run; a
    // concurrent writer would at worst corrupt this run's decode, which
    // the replacement-ratio check downstream catches.
    match unsafe { Mmap::map(&file) } {
        Ok(mmap) => Ok(f(&mmap)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "mmap failed; buffered read");
            let bytes = std::fs::read(path)?;
            Ok(f(&bytes))
        }
    }
}

/// Write `content` atomically: temp sibling plus rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    std::fs::write(&tmp, content)?;
    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_file_bytes_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novel.txt");
        std::fs::write(&path, "제1화\n본문\n").unwrap();
        let len = with_file_bytes(&path, |bytes| bytes.len()).unwrap();
        assert_eq!(len, "제1화\n본문\n".len());
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        let len = with_file_bytes(&path, |bytes| bytes.len()).unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(with_file_bytes(Path::new("/no/such/file"), |b| b.len()).is_err());
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }
}

//! Pull-style byte sources feeding the engine.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("source cannot seek back to {offset} (already at {position})")]
    Unseekable { offset: u64, position: u64 },
}

/// Ordered byte supply. `read` returns `None` when no more bytes are
/// available right now; a growing input may return more on a later call.
pub trait ByteSource {
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>, SourceError>;

    /// Position the source so the next `read` starts at absolute `offset`.
    fn seek(&mut self, offset: u64) -> Result<(), SourceError>;
}

pub struct FileSource {
    file: File,
    path: PathBuf,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64, SourceError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SourceError> {
        Ok(self.len()? == 0)
    }
}

impl ByteSource for FileSource {
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>, SourceError> {
        let mut buf = vec![0u8; max];
        let n = loop {
            match self.file.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    fn seek(&mut self, offset: u64) -> Result<(), SourceError> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

/// In-memory source. `append` models an input that keeps growing.
#[derive(Debug, Clone, Default)]
pub struct SliceSource {
    data: Vec<u8>,
    position: usize,
}

impl SliceSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for SliceSource {
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>, SourceError> {
        if self.position >= self.data.len() || max == 0 {
            return Ok(None);
        }
        let end = (self.position + max).min(self.data.len());
        let out = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(Some(out))
    }

    fn seek(&mut self, offset: u64) -> Result<(), SourceError> {
        self.position = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(())
    }
}

/// Wraps any reader, such as a pipe or socket. Seeking only moves forward.
pub struct ReaderSource<R: Read> {
    reader: R,
    position: u64,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
        }
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn read(&mut self, max: usize) -> Result<Option<Vec<u8>>, SourceError> {
        let mut buf = Vec::with_capacity(max);
        let n = (&mut self.reader).take(max as u64).read_to_end(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.position += n as u64;
        Ok(Some(buf))
    }

    fn seek(&mut self, offset: u64) -> Result<(), SourceError> {
        if offset < self.position {
            return Err(SourceError::Unseekable {
                offset,
                position: self.position,
            });
        }
        let skip = offset - self.position;
        let skipped = std::io::copy(&mut (&mut self.reader).take(skip), &mut std::io::sink())?;
        self.position += skipped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn slice_source_reads_and_grows() {
        let mut src = SliceSource::new(b"abcdef".to_vec());
        assert_eq!(src.read(4).expect("read"), Some(b"abcd".to_vec()));
        assert_eq!(src.read(4).expect("read"), Some(b"ef".to_vec()));
        assert_eq!(src.read(4).expect("read"), None);
        src.append(b"gh");
        assert_eq!(src.read(4).expect("read"), Some(b"gh".to_vec()));
        src.seek(1).expect("seek");
        assert_eq!(src.read(2).expect("read"), Some(b"bc".to_vec()));
    }

    #[test]
    fn file_source_seeks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("input.bin");
        let mut f = File::create(&path).expect("create");
        f.write_all(b"0123456789").expect("write");
        drop(f);

        let mut src = FileSource::open(&path).expect("open");
        assert_eq!(src.len().expect("len"), 10);
        src.seek(7).expect("seek");
        assert_eq!(src.read(16).expect("read"), Some(b"789".to_vec()));
        assert_eq!(src.read(16).expect("read"), None);
    }

    #[test]
    fn reader_source_seeks_forward_only() {
        let mut src = ReaderSource::new(&b"0123456789"[..]);
        src.seek(3).expect("seek");
        assert_eq!(src.read(2).expect("read"), Some(b"34".to_vec()));
        assert!(matches!(
            src.seek(1),
            Err(SourceError::Unseekable {
                offset: 1,
                position: 5
            })
        ));
    }
}

// src/utils/stream.rs

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tracing::debug;

/// Default size above which content is moved out of memory into a temp file.
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

/// Creates [`CachedStream`]s, deciding whether content stays in memory or
/// spills to an anonymous temp file.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedStreamFactory {
    spill_threshold: usize,
    temp_dir: Option<PathBuf>,
}

impl Default for CachedStreamFactory {
    fn default() -> Self {
        CachedStreamFactory::new(DEFAULT_SPILL_THRESHOLD, None)
    }
}

impl CachedStreamFactory {
    pub fn new(spill_threshold: usize, temp_dir: Option<PathBuf>) -> Self {
        CachedStreamFactory {
            spill_threshold,
            temp_dir,
        }
    }

    pub fn spill_threshold(&self) -> usize {
        self.spill_threshold
    }

    pub fn empty(&self) -> CachedStream {
        CachedStream::from_memory(Vec::new())
    }

    pub fn from_bytes(&self, bytes: Vec<u8>) -> io::Result<CachedStream> {
        if bytes.len() <= self.spill_threshold {
            return Ok(CachedStream::from_memory(bytes));
        }
        let mut file = self.create_temp_file()?;
        file.write_all(&bytes)?;
        file.seek(SeekFrom::Start(0))?;
        debug!(bytes = bytes.len(), "Content spilled to temp file");
        Ok(CachedStream {
            storage: Storage::Spilled(file),
            len: bytes.len() as u64,
        })
    }

    /// Buffers `reader` in memory up to the threshold, then copies the rest
    /// to a temp file.
    pub fn from_reader<R: Read>(&self, mut reader: R) -> io::Result<CachedStream> {
        let mut head = Vec::new();
        (&mut reader)
            .take(self.spill_threshold as u64 + 1)
            .read_to_end(&mut head)?;
        if head.len() <= self.spill_threshold {
            return Ok(CachedStream::from_memory(head));
        }

        let mut file = self.create_temp_file()?;
        file.write_all(&head)?;
        let rest = io::copy(&mut reader, &mut file)?;
        file.seek(SeekFrom::Start(0))?;
        let len = head.len() as u64 + rest;
        debug!(bytes = len, "Content spilled to temp file");
        Ok(CachedStream {
            storage: Storage::Spilled(file),
            len,
        })
    }

    fn create_temp_file(&self) -> io::Result<File> {
        match &self.temp_dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
    }
}

enum Storage {
    Memory(Cursor<Vec<u8>>),
    // Anonymous temp file, removed by the OS once the handle is dropped.
    Spilled(File),
}

/// A seekable, rewindable byte stream owned by a single document.
pub struct CachedStream {
    storage: Storage,
    len: u64,
}

impl CachedStream {
    pub fn from_memory(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        CachedStream {
            storage: Storage::Memory(Cursor::new(bytes)),
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::Spilled(_))
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Reads the whole stream from the start and leaves it rewound.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.rewind()?;
        let mut bytes = Vec::with_capacity(self.len as usize);
        self.read_to_end(&mut bytes)?;
        self.rewind()?;
        Ok(bytes)
    }

    pub fn read_all_string(&mut self) -> io::Result<String> {
        let bytes = self.read_all()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Default for CachedStream {
    fn default() -> Self {
        CachedStream::from_memory(Vec::new())
    }
}

impl Read for CachedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.storage {
            Storage::Memory(cursor) => cursor.read(buf),
            Storage::Spilled(file) => file.read(buf),
        }
    }
}

impl Seek for CachedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.storage {
            Storage::Memory(cursor) => cursor.seek(pos),
            Storage::Spilled(file) => file.seek(pos),
        }
    }
}

impl fmt::Debug for CachedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedStream")
            .field("len", &self.len)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_content_stays_in_memory() {
        let factory = CachedStreamFactory::new(16, None);
        let mut stream = factory.from_bytes(b"hello".to_vec()).unwrap();
        assert!(!stream.is_spilled());
        assert_eq!(stream.read_all().unwrap(), b"hello");
    }

    #[test]
    fn large_content_spills_and_rewinds() {
        let factory = CachedStreamFactory::new(4, None);
        let data = b"0123456789abcdef".to_vec();
        let mut stream = factory.from_reader(&data[..]).unwrap();
        assert!(stream.is_spilled());
        assert_eq!(stream.len(), 16);

        let mut first = String::new();
        stream.read_to_string(&mut first).unwrap();
        assert_eq!(first.as_bytes(), &data[..]);

        stream.rewind().unwrap();
        let mut second = Vec::new();
        stream.read_to_end(&mut second).unwrap();
        assert_eq!(second, data);
    }
}

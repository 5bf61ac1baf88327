//! Backing store for the serialized document between pre-close and close
//!
//! The file being signed is serialized once, patched in place, hashed, and
//! only then streamed to the caller's sink. Small documents stay in memory;
//! large ones go through a temporary file whose deletion is guaranteed by
//! the `NamedTempFile` drop guard even on an abnormal exit.

use std::io::{self, Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

/// Where the serialized bytes live until `close` ships them.
#[derive(Debug)]
pub enum BackingStore {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

impl BackingStore {
    pub fn len(&self) -> io::Result<u64> {
        match self {
            BackingStore::Memory(buf) => Ok(buf.len() as u64),
            BackingStore::File(tmp) => Ok(tmp.as_file().metadata()?.len()),
        }
    }

    /// Overwrite `bytes.len()` bytes at `offset` without changing the length.
    pub fn patch_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        match self {
            BackingStore::Memory(buf) => {
                let start = offset as usize;
                let slot = buf
                    .get_mut(start..start + bytes.len())
                    .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "patch beyond end"))?;
                slot.copy_from_slice(bytes);
                Ok(())
            }
            BackingStore::File(tmp) => {
                let file = tmp.as_file_mut();
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(bytes)?;
                file.flush()
            }
        }
    }

    /// The last `tail` bytes together with their absolute base offset.
    /// Used for placeholder scanning; the reserved literals sit in the
    /// signature dictionary near the end of the file.
    pub fn tail(&self, tail: u64) -> io::Result<(Vec<u8>, u64)> {
        let len = self.len()?;
        let base = len.saturating_sub(tail);
        match self {
            BackingStore::Memory(buf) => Ok((buf[base as usize..].to_vec(), base)),
            BackingStore::File(tmp) => {
                let mut file = tmp.as_file();
                file.seek(SeekFrom::Start(base))?;
                let mut buf = Vec::with_capacity((len - base) as usize);
                file.read_to_end(&mut buf)?;
                Ok((buf, base))
            }
        }
    }

    /// Copy the whole store into `sink`.
    pub fn stream_to(&mut self, sink: &mut dyn Write) -> io::Result<()> {
        match self {
            BackingStore::Memory(buf) => sink.write_all(buf),
            BackingStore::File(tmp) => {
                let file = tmp.as_file_mut();
                file.seek(SeekFrom::Start(0))?;
                io::copy(file, sink).map(|_| ())
            }
        }
    }
}

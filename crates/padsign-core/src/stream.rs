//! Hashable stream over the signed byte ranges
//!
//! Exposes the concatenation of the `/ByteRange` regions of the backing
//! store as a forward-only `Read`, so digests and external containers can
//! consume the signed bytes without the excluded gap ever materializing.

use std::io::{self, Read, Seek, SeekFrom};

use crate::backing::BackingStore;

/// Sequential reader over the `[offset, length, …]` regions of a store.
#[derive(Debug)]
pub struct RangeReader<'a> {
    store: &'a BackingStore,
    ranges: Vec<(u64, u64)>,
    current: usize,
    consumed: u64,
}

impl<'a> RangeReader<'a> {
    /// `range` is the offset/length alternation produced by the range
    /// calculator; an odd-length slice loses its trailing element.
    pub fn new(store: &'a BackingStore, range: &[u64]) -> Self {
        let ranges = range
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        Self {
            store,
            ranges,
            current: 0,
            consumed: 0,
        }
    }

    /// Total number of bytes this reader will yield.
    pub fn total_len(&self) -> u64 {
        self.ranges.iter().map(|(_, len)| len).sum()
    }
}

impl Read for RangeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let Some(&(offset, len)) = self.ranges.get(self.current) else {
                return Ok(0);
            };
            let remaining = len - self.consumed;
            if remaining == 0 {
                self.current += 1;
                self.consumed = 0;
                continue;
            }

            let want = buf.len().min(remaining as usize);
            let position = offset + self.consumed;

            let read = match self.store {
                BackingStore::Memory(bytes) => {
                    let start = position as usize;
                    let chunk = bytes.get(start..start + want).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::UnexpectedEof, "range beyond backing store")
                    })?;
                    buf[..want].copy_from_slice(chunk);
                    want
                }
                BackingStore::File(tmp) => {
                    let mut file = tmp.as_file();
                    file.seek(SeekFrom::Start(position))?;
                    file.read(&mut buf[..want])?
                }
            };

            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "range beyond backing store",
                ));
            }
            self.consumed += read as u64;
            return Ok(read);
        }
    }
}

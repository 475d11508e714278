//! Staging area for writes.
//!
//! Payload bytes arriving over a socket are appended to a spool (an
//! anonymous tempfile in the store directory) while the BLAKE3 digest is
//! computed in the same pass. Only once the sender signals completion is
//! the spool sealed and handed to the commit transaction, which re-reads
//! it in storage-chunk units. Dropping a spool at any point discards it;
//! the file is anonymous, so an aborted or crashed write leaves nothing
//! behind.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use stash_types::{Digest, Hasher, CHUNK_SIZE};

/// Accumulates payload bytes ahead of a commit.
pub struct Spool {
    file: File,
    hasher: Hasher,
}

impl Spool {
    /// Create a spool in `dir`, which should be the store directory so the
    /// staged bytes live on the same filesystem as the keyspace.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        let file = tempfile::tempfile_in(dir)?;
        Ok(Self {
            file,
            hasher: Hasher::new(),
        })
    }

    /// Append the next run of payload bytes.
    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.hasher.update(data);
        Ok(())
    }

    /// Bytes staged so far.
    pub fn length(&self) -> u64 {
        self.hasher.length()
    }

    /// Finish the stream: flush, rewind, and fix digest and length.
    pub fn seal(mut self) -> io::Result<SealedSpool> {
        self.file.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let length = self.hasher.length();
        let digest = self.hasher.finish();
        Ok(SealedSpool {
            file: self.file,
            digest,
            length,
        })
    }
}

/// A complete staged payload, ready to commit.
pub struct SealedSpool {
    file: File,
    digest: Digest,
    length: u64,
}

impl SealedSpool {
    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Read the next storage chunk of up to [`CHUNK_SIZE`] bytes.
    ///
    /// Returns `None` once the spool is exhausted. Wire framing and
    /// storage chunking are independent; this re-slices whatever arrived
    /// into full storage chunks with only the final one short.
    pub fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spool_of(dir: &TempDir, pieces: &[&[u8]]) -> SealedSpool {
        let mut spool = Spool::create_in(dir.path()).unwrap();
        for piece in pieces {
            spool.append(piece).unwrap();
        }
        spool.seal().unwrap()
    }

    fn drain(sealed: &mut SealedSpool) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = sealed.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn digest_and_length_match_contents() {
        let dir = TempDir::new().unwrap();
        let sealed = spool_of(&dir, &[b"hello ", b"world"]);
        assert_eq!(sealed.length(), 11);
        assert_eq!(sealed.digest(), Digest::of(b"hello world"));
    }

    #[test]
    fn empty_spool_has_zero_chunks() {
        let dir = TempDir::new().unwrap();
        let mut sealed = spool_of(&dir, &[]);
        assert_eq!(sealed.length(), 0);
        assert_eq!(sealed.digest(), Digest::of(b""));
        assert!(drain(&mut sealed).is_empty());
    }

    #[test]
    fn rechunks_at_storage_boundaries() {
        let dir = TempDir::new().unwrap();
        // Append in awkward wire-sized pieces totalling 2.5 storage chunks.
        let payload = vec![0xabu8; CHUNK_SIZE * 2 + CHUNK_SIZE / 2];
        let mut sealed = {
            let mut spool = Spool::create_in(dir.path()).unwrap();
            for piece in payload.chunks(100_000) {
                spool.append(piece).unwrap();
            }
            spool.seal().unwrap()
        };

        let chunks = drain(&mut sealed);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
        assert_eq!(chunks[1].len(), CHUNK_SIZE);
        assert_eq!(chunks[2].len(), CHUNK_SIZE / 2);
        let reassembled: Vec<u8> = chunks.concat();
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_chunk() {
        let dir = TempDir::new().unwrap();
        let payload = vec![7u8; CHUNK_SIZE];
        let mut sealed = spool_of(&dir, &[payload.as_slice()]);
        let chunks = drain(&mut sealed);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
    }

    #[test]
    fn dropped_spool_leaves_no_file_behind() {
        let dir = TempDir::new().unwrap();
        {
            let mut spool = Spool::create_in(dir.path()).unwrap();
            spool.append(b"abandoned").unwrap();
        }
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "spool left {leftovers:?}");
    }
}

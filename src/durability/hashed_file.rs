use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use xxhash_rust::xxh64::Xxh64;

use crate::error::{Result, StorageError};

const HASH_SEED: u64 = 0x5ab1e;

/// Buffered file writer that feeds every hashed byte into a running 64-bit
/// hash, so the file can carry its own integrity tag at the end.
pub struct HashedFileWriter {
    file: BufWriter<File>,
    hasher: Xxh64,
}

impl HashedFileWriter {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            file: BufWriter::new(File::create(path)?),
            hasher: Xxh64::new(HASH_SEED),
        })
    }

    pub fn write_hashed(&mut self, bytes: &[u8]) -> Result<()> {
        self.hasher.update(bytes);
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Writes without contributing to the hash; used for the trailing hash
    /// itself.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        Ok(())
    }

    pub fn hash(&self) -> u64 {
        self.hasher.digest()
    }

    pub fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }
}

/// Buffered reader mirroring [`HashedFileWriter`]: every hashed read feeds
/// the same running hash for end-of-file verification.
pub struct HashedFileReader {
    file: BufReader<File>,
    hasher: Xxh64,
}

impl HashedFileReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            file: BufReader::new(File::open(path)?),
            hasher: Xxh64::new(HASH_SEED),
        })
    }

    pub fn read_hashed(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact(buf)
            .map_err(|_| StorageError::Durability("unexpected end of file".into()))?;
        self.hasher.update(buf);
        Ok(())
    }

    pub fn hash(&self) -> u64 {
        self.hasher.digest()
    }
}

/// Reads the tail summary `(vertex_count, edge_count, hash)` without
/// disturbing any running hash: the counts are re-read (hashed) by the
/// caller when it reaches them in the stream.
pub fn read_summary(path: &Path) -> Result<(i64, i64, u64)> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < 24 {
        return Err(StorageError::Durability("file too short for summary".into()));
    }
    file.seek(SeekFrom::End(-24))?;
    let mut buf = [0u8; 24];
    file.read_exact(&mut buf)?;
    let vertex_count = i64::from_be_bytes(buf[0..8].try_into().unwrap());
    let edge_count = i64::from_be_bytes(buf[8..16].try_into().unwrap());
    let hash = u64::from_be_bytes(buf[16..24].try_into().unwrap());
    Ok((vertex_count, edge_count, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_and_reader_agree_on_hash() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hashed");
        let mut writer = HashedFileWriter::create(&path)?;
        writer.write_hashed(b"payload")?;
        writer.write_hashed(&7i64.to_be_bytes())?;
        writer.write_hashed(&0i64.to_be_bytes())?;
        let hash = writer.hash();
        writer.write_raw(&hash.to_be_bytes())?;
        writer.finish()?;

        let (vertices, edges, stored) = read_summary(&path)?;
        assert_eq!((vertices, edges), (7, 0));
        assert_eq!(stored, hash);

        let mut reader = HashedFileReader::open(&path)?;
        let mut buf = [0u8; 7 + 16];
        reader.read_hashed(&mut buf)?;
        assert_eq!(reader.hash(), stored);
        Ok(())
    }
}

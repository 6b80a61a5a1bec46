use contracts::*;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::{
    config::DatabaseOptions,
    core::{Bytes, DataRecordHdr, Offset},
    dec::Dec,
    error::{ChainDbError, ChainDbResult},
};

/// Data artifact manager.
///
/// Owns `<name>.dat`: an append-only log of value records. Records are
/// never overwritten except to flip their tombstone flag, and storage
/// is never reclaimed; the artifact grows monotonically.
///
/// Also hosts the sequential scan cursor. The scan reads the log
/// byte-by-byte from the start, independent of the hash index, so it
/// surfaces live records even when no chain points at them.
pub(crate) struct DataFile {
    file: File,
    dec: Dec,
    conf: DatabaseOptions,
    scan_off: Offset,
}

impl DataFile {
    /// Creates an empty data artifact.
    pub fn create(path: &Path) -> ChainDbResult<()> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    /// Opens an existing data artifact.
    pub fn open(path: &Path, conf: DatabaseOptions) -> ChainDbResult<DataFile> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(DataFile {
            file,
            dec: Dec::new(conf.compress),
            conf,
            scan_off: 0,
        })
    }

    /// Appends a live record holding `payload` and returns its offset.
    pub fn append(&mut self, payload: &[u8]) -> ChainDbResult<Offset> {
        trace!("DataFile::append");
        let offset = self.file.seek(SeekFrom::End(0))?;
        let stored = self.dec.pack(payload)?;
        let hdr = DataRecordHdr {
            data_len: stored.len() as u64 + 1,
            tombstone: false,
            compressed: self.dec.compresses(),
        };
        let mut bytes = Dec::ser_raw(&hdr)?;
        bytes.extend_from_slice(&stored);
        bytes.push(0);
        self.file.write_all(&bytes)?;
        if self.conf.sync {
            self.file.sync_data()?;
        }
        Ok(offset)
    }

    /// Reads the payload of the record at `offset`.
    ///
    /// The tombstone flag is not consulted: a record reachable from
    /// the index is live by construction, since `remove` unlinks the
    /// chain record before anything is tombstoned.
    pub fn read(&mut self, offset: Offset) -> ChainDbResult<Bytes> {
        trace!("DataFile::read");
        let (hdr, payload) = self.read_record(offset)?;
        self.dec.unpack(&payload, hdr.compressed)
    }

    /// Flips the tombstone flag of the record at `offset` in place.
    /// The payload bytes are left untouched.
    pub fn mark_tombstone(&mut self, offset: Offset) -> ChainDbResult<()> {
        trace!("DataFile::mark_tombstone");
        let buf = self.read_at(offset, DataRecordHdr::serde_sz())?;
        let mut hdr: DataRecordHdr = Dec::deser_raw(&buf)?;
        hdr.tombstone = true;
        let bytes = Dec::ser_raw(&hdr)?;
        self.write_at(offset, &bytes)?;
        if self.conf.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Resets the sequential scan cursor to the start of the artifact.
    pub fn rewind(&mut self) {
        self.scan_off = 0;
    }

    /// Reads the next live payload at the scan cursor, advancing past
    /// every record it touches.
    ///
    /// Tombstoned records are skipped. Returns `None` once the
    /// artifact is exhausted; a record crossing end-of-file is a
    /// corruption error, not a silent end.
    #[debug_ensures(!matches!(ret, Ok(Some(_))) || self.scan_off > old(self.scan_off), "cursor did not advance")]
    pub fn next_record(&mut self) -> ChainDbResult<Option<Bytes>> {
        let end = self.file.seek(SeekFrom::End(0))?;
        while self.scan_off < end {
            let (hdr, payload) = self.read_record(self.scan_off)?;
            self.scan_off += DataRecordHdr::serde_sz() as u64 + hdr.data_len;
            if hdr.tombstone {
                continue;
            }
            return Ok(Some(self.dec.unpack(&payload, hdr.compressed)?));
        }
        Ok(None)
    }

    /// Flushes the artifact to disk.
    pub fn sync(&mut self) -> ChainDbResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Reads the record at `offset`, returning its prefix and stored
    /// payload bytes with the terminator stripped.
    fn read_record(&mut self, offset: Offset) -> ChainDbResult<(DataRecordHdr, Bytes)> {
        let buf = self.read_at(offset, DataRecordHdr::serde_sz())?;
        let hdr: DataRecordHdr = Dec::deser_raw(&buf)?;
        let mut payload = self.read_at(
            offset + DataRecordHdr::serde_sz() as u64,
            hdr.data_len as usize,
        )?;
        match payload.pop() {
            Some(0) => Ok((hdr, payload)),
            _ => Err(ChainDbError::Corruption(format!(
                "data record at {offset} missing payload terminator"
            ))),
        }
    }

    fn read_at(&mut self, offset: Offset, len: usize) -> ChainDbResult<Bytes> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ChainDbError::Corruption(format!("data artifact truncated at {offset}"))
            } else {
                ChainDbError::IOError(e)
            }
        })?;
        Ok(buf)
    }

    fn write_at(&mut self, offset: Offset, bytes: &[u8]) -> ChainDbResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FixtureGen;
    use tempfile::{tempdir, TempDir};

    fn init_data(tmp: &TempDir, conf: DatabaseOptions) -> ChainDbResult<DataFile> {
        let path = tmp.path().join("test.dat");
        DataFile::create(&path)?;
        DataFile::open(&path, conf)
    }

    fn default_opts() -> DatabaseOptions {
        DatabaseOptions::builder().build()
    }

    #[test]
    fn append_read() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut data = init_data(&tmp, default_opts())?;
        let payload = Bytes::gen();
        let offset = data.append(&payload)?;
        assert_eq!(data.read(offset)?, payload);
        Ok(())
    }

    #[test]
    fn append_read_compressed() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let conf = DatabaseOptions::builder().compress(true).build();
        let mut data = init_data(&tmp, conf)?;
        let payload = vec![7u8; 4096];
        let offset = data.append(&payload)?;
        assert_eq!(data.read(offset)?, payload);
        Ok(())
    }

    #[test]
    fn tombstone_skipped_by_scan() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut data = init_data(&tmp, default_opts())?;
        data.append(b"one")?;
        let dead = data.append(b"two")?;
        data.append(b"three")?;
        data.mark_tombstone(dead)?;

        data.rewind();
        let mut seen = vec![];
        while let Some(payload) = data.next_record()? {
            seen.push(payload);
        }
        assert_eq!(seen, vec![b"one".to_vec(), b"three".to_vec()]);
        Ok(())
    }

    #[test]
    fn tombstone_leaves_payload_readable() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut data = init_data(&tmp, default_opts())?;
        let offset = data.append(b"ghost")?;
        data.mark_tombstone(offset)?;
        // bytes are still physically present, only the flag changed
        assert_eq!(data.read(offset)?, b"ghost".to_vec());
        Ok(())
    }

    #[test]
    fn scan_empty_artifact() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut data = init_data(&tmp, default_opts())?;
        data.rewind();
        assert_eq!(data.next_record()?, None);
        Ok(())
    }

    #[test]
    fn rewind_restarts_scan() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut data = init_data(&tmp, default_opts())?;
        data.append(b"only")?;
        data.rewind();
        assert_eq!(data.next_record()?, Some(b"only".to_vec()));
        assert_eq!(data.next_record()?, None);
        data.rewind();
        assert_eq!(data.next_record()?, Some(b"only".to_vec()));
        Ok(())
    }

    #[test]
    fn truncated_record_is_corruption() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("test.dat");
        DataFile::create(&path)?;
        {
            let mut data = DataFile::open(&path, default_opts())?;
            data.append(b"whole")?;
        }
        // chop the record mid-payload
        let bytes = std::fs::read(&path)?;
        std::fs::write(&path, &bytes[..bytes.len() - 3])?;
        let mut data = DataFile::open(&path, default_opts())?;
        data.rewind();
        match data.next_record() {
            Err(ChainDbError::Corruption(_)) => Ok(()),
            other => panic!("expected corruption error, got: {other:?}"),
        }
    }
}

use contracts::*;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
};
use xxhash_rust::xxh3::xxh3_64;

use crate::{
    config::DatabaseOptions,
    core::{Bucket, Bytes, IndexHeader, IndexRecordHdr, KeyRef, Offset, NIL},
    dec::Dec,
    error::{ChainDbError, ChainDbResult},
};

/// Artifact format marker; the last byte is the format version.
const MAGIC: [u8; 4] = [b'C', b'D', b'B', 1];

/// A chain record located by key, along with the link pointing at it.
struct ChainHit {
    /// Offset of the matching record.
    offset: Offset,
    /// The matching record's fixed-width prefix.
    hdr: IndexRecordHdr,
    /// Offset of the predecessor record, or `None` when the bucket
    /// head points at the match.
    prev: Option<Offset>,
}

/// Index artifact manager.
///
/// Owns `<name>.idx`: a fixed header, the bucket table, and the chain
/// records appended past it. Each bucket heads a singly-linked chain
/// of records built by prepending, so a chain walk visits records
/// most-recently-inserted first. New record storage comes from the
/// header's bump cursor; space freed by unlinking is never reused.
pub(crate) struct IndexFile {
    file: File,
    hdr: IndexHeader,
    conf: DatabaseOptions,
}

impl IndexFile {
    /// Creates the index artifact: header plus a zeroed bucket table.
    #[debug_requires(bucket_count > 0, "bucket table cannot be empty")]
    pub fn create(path: &Path, bucket_count: u64) -> ChainDbResult<()> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let table_sz = bucket_count * Bucket::serde_sz() as u64;
        let hdr = IndexHeader {
            magic: MAGIC,
            bucket_count,
            alloc: IndexHeader::serde_sz() as u64 + table_sz,
        };
        let mut wtr = BufWriter::new(file);
        wtr.write_all(&Dec::ser_raw(&hdr)?)?;
        let slot = Dec::ser_raw(&Bucket::default())?;
        for _ in 0..bucket_count {
            wtr.write_all(&slot)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Opens an existing index artifact, validating its header.
    pub fn open(path: &Path, conf: DatabaseOptions) -> ChainDbResult<IndexFile> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut buf = vec![0u8; IndexHeader::serde_sz()];
        file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ChainDbError::Corruption("index artifact shorter than its header".to_string())
            } else {
                ChainDbError::IOError(e)
            }
        })?;
        let hdr: IndexHeader = Dec::deser_raw(&buf)?;
        if hdr.magic != MAGIC {
            return Err(ChainDbError::Corruption(format!(
                "bad index artifact magic: {:?}",
                hdr.magic
            )));
        }
        let table_end =
            IndexHeader::serde_sz() as u64 + hdr.bucket_count * Bucket::serde_sz() as u64;
        if hdr.bucket_count == 0 || hdr.alloc < table_end {
            return Err(ChainDbError::Corruption(format!(
                "implausible index header: {} buckets, alloc at {}",
                hdr.bucket_count, hdr.alloc
            )));
        }
        debug!(
            "opened index artifact: {} buckets, alloc at {}",
            hdr.bucket_count, hdr.alloc
        );
        Ok(IndexFile { file, hdr, conf })
    }

    /// Looks up the data offset recorded for `key`, if the key is live.
    pub fn lookup(&mut self, key: KeyRef) -> ChainDbResult<Option<Offset>> {
        trace!("IndexFile::lookup");
        let bucket = self.bucket_of(key);
        let slot = self.read_bucket(bucket)?;
        Ok(self.locate(&slot, key)?.map(|hit| hit.hdr.data_offset))
    }

    /// Prepends a fresh chain record mapping `key` to `data_offset`
    /// and bumps the bucket count.
    ///
    /// The caller must have established that `key` is not already live;
    /// a duplicate would shadow the older record rather than error.
    pub fn insert(&mut self, key: KeyRef, data_offset: Offset) -> ChainDbResult<()> {
        trace!("IndexFile::insert");
        let bucket = self.bucket_of(key);
        let mut slot = self.read_bucket(bucket)?;
        let key_len = key.len() as u64 + 1;
        let offset = self.allocate(IndexRecordHdr::serde_sz() as u64 + key_len)?;
        let hdr = IndexRecordHdr {
            next: slot.head,
            key_len,
            data_offset,
        };
        self.write_record(offset, &hdr, key)?;
        slot.head = offset;
        slot.count += 1;
        self.write_bucket(bucket, &slot)?;
        if self.conf.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Unlinks the chain record for `key` and returns its data offset,
    /// or `None` if the key is not live.
    ///
    /// Only the chain links and the bucket count change; the record
    /// bytes stay behind in the artifact as dead storage.
    pub fn remove(&mut self, key: KeyRef) -> ChainDbResult<Option<Offset>> {
        trace!("IndexFile::remove");
        let bucket = self.bucket_of(key);
        let mut slot = self.read_bucket(bucket)?;
        let hit = match self.locate(&slot, key)? {
            Some(hit) => hit,
            None => return Ok(None),
        };
        trace!("unlinking chain record at {}", hit.offset);
        match hit.prev {
            None => slot.head = hit.hdr.next,
            Some(prev) => {
                let (mut prev_hdr, _) = self.read_record(prev)?;
                prev_hdr.next = hit.hdr.next;
                self.write_record_hdr(prev, &prev_hdr)?;
            }
        }
        slot.count -= 1;
        self.write_bucket(bucket, &slot)?;
        if self.conf.sync {
            self.file.sync_data()?;
        }
        Ok(Some(hit.hdr.data_offset))
    }

    /// Flushes the artifact to disk.
    pub fn sync(&mut self) -> ChainDbResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Maps a key to its bucket. Deterministic and uniform over the
    /// full bucket range.
    fn bucket_of(&self, key: KeyRef) -> u64 {
        xxh3_64(key) % self.hdr.bucket_count
    }

    /// Walks a bucket chain for at most `slot.count` hops comparing
    /// stored keys byte-for-byte. The count bounds the traversal even
    /// if the chain links are inconsistent. Chains prepend on insert,
    /// so of two records sharing a key the newer one wins.
    fn locate(&mut self, slot: &Bucket, key: KeyRef) -> ChainDbResult<Option<ChainHit>> {
        let mut prev = None;
        let mut offset = slot.head;
        for _ in 0..slot.count {
            if offset == NIL {
                break;
            }
            let (hdr, stored) = self.read_record(offset)?;
            if stored == key {
                return Ok(Some(ChainHit { offset, hdr, prev }));
            }
            prev = Some(offset);
            offset = hdr.next;
        }
        Ok(None)
    }

    /// Hands out the next record offset and advances the bump cursor.
    #[debug_ensures(self.hdr.alloc > old(self.hdr.alloc), "cursor did not advance")]
    fn allocate(&mut self, record_sz: u64) -> ChainDbResult<Offset> {
        let offset = self.hdr.alloc;
        self.hdr.alloc += record_sz;
        let bytes = Dec::ser_raw(&self.hdr)?;
        self.write_at(0, &bytes)?;
        Ok(offset)
    }

    #[debug_requires(bucket < self.hdr.bucket_count, "bucket out of range")]
    fn read_bucket(&mut self, bucket: u64) -> ChainDbResult<Bucket> {
        let buf = self.read_at(Self::bucket_offset(bucket), Bucket::serde_sz())?;
        Dec::deser_raw(&buf)
    }

    #[debug_requires(bucket < self.hdr.bucket_count, "bucket out of range")]
    fn write_bucket(&mut self, bucket: u64, slot: &Bucket) -> ChainDbResult<()> {
        let bytes = Dec::ser_raw(slot)?;
        self.write_at(Self::bucket_offset(bucket), &bytes)
    }

    fn bucket_offset(bucket: u64) -> Offset {
        IndexHeader::serde_sz() as u64 + bucket * Bucket::serde_sz() as u64
    }

    /// Reads the record at `offset`, returning its prefix and key
    /// bytes with the terminator stripped.
    fn read_record(&mut self, offset: Offset) -> ChainDbResult<(IndexRecordHdr, Bytes)> {
        let buf = self.read_at(offset, IndexRecordHdr::serde_sz())?;
        let hdr: IndexRecordHdr = Dec::deser_raw(&buf)?;
        let mut key = self.read_at(
            offset + IndexRecordHdr::serde_sz() as u64,
            hdr.key_len as usize,
        )?;
        match key.pop() {
            Some(0) => Ok((hdr, key)),
            _ => Err(ChainDbError::Corruption(format!(
                "index record at {offset} missing key terminator"
            ))),
        }
    }

    fn write_record(
        &mut self,
        offset: Offset,
        hdr: &IndexRecordHdr,
        key: KeyRef,
    ) -> ChainDbResult<()> {
        let mut bytes = Dec::ser_raw(hdr)?;
        bytes.extend_from_slice(key);
        bytes.push(0);
        self.write_at(offset, &bytes)
    }

    fn write_record_hdr(&mut self, offset: Offset, hdr: &IndexRecordHdr) -> ChainDbResult<()> {
        let bytes = Dec::ser_raw(hdr)?;
        self.write_at(offset, &bytes)
    }

    fn read_at(&mut self, offset: Offset, len: usize) -> ChainDbResult<Bytes> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ChainDbError::Corruption(format!("index artifact truncated at {offset}"))
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
    use tempfile::{tempdir, TempDir};

    fn opts(bucket_count: u64) -> DatabaseOptions {
        DatabaseOptions::builder().bucket_count(bucket_count).build()
    }

    fn init_index(tmp: &TempDir, bucket_count: u64) -> ChainDbResult<IndexFile> {
        let path = tmp.path().join("test.idx");
        IndexFile::create(&path, bucket_count)?;
        IndexFile::open(&path, opts(bucket_count))
    }

    #[test]
    fn header_persisted() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("test.idx");
        IndexFile::create(&path, 64)?;
        let idx = IndexFile::open(&path, opts(64))?;
        assert_eq!(idx.hdr.bucket_count, 64);
        assert_eq!(
            idx.hdr.alloc,
            IndexHeader::serde_sz() as u64 + 64 * Bucket::serde_sz() as u64
        );
        Ok(())
    }

    #[test]
    fn insert_lookup() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut idx = init_index(&tmp, 16)?;
        idx.insert(b"king", 42)?;
        assert_eq!(idx.lookup(b"king")?, Some(42));
        assert_eq!(idx.lookup(b"queen")?, None);
        Ok(())
    }

    #[test]
    fn chain_collisions() -> ChainDbResult<()> {
        // one bucket forces every key onto the same chain
        let tmp = tempdir()?;
        let mut idx = init_index(&tmp, 1)?;
        idx.insert(b"a", 1)?;
        idx.insert(b"b", 2)?;
        idx.insert(b"c", 3)?;
        assert_eq!(idx.lookup(b"a")?, Some(1));
        assert_eq!(idx.lookup(b"b")?, Some(2));
        assert_eq!(idx.lookup(b"c")?, Some(3));
        Ok(())
    }

    #[test]
    fn remove_unlinks_head_and_middle() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut idx = init_index(&tmp, 1)?;
        idx.insert(b"a", 1)?;
        idx.insert(b"b", 2)?;
        idx.insert(b"c", 3)?;
        // "c" heads the chain; "b" sits in the middle
        assert_eq!(idx.remove(b"c")?, Some(3));
        assert_eq!(idx.lookup(b"c")?, None);
        assert_eq!(idx.remove(b"b")?, Some(2));
        assert_eq!(idx.lookup(b"b")?, None);
        assert_eq!(idx.lookup(b"a")?, Some(1));
        assert_eq!(idx.remove(b"a")?, Some(1));
        let slot = idx.read_bucket(0)?;
        assert_eq!(slot.count, 0);
        assert_eq!(slot.head, NIL);
        Ok(())
    }

    #[test]
    fn remove_absent_is_none() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let mut idx = init_index(&tmp, 8)?;
        assert_eq!(idx.remove(b"ghost")?, None);
        Ok(())
    }

    #[test]
    fn cursor_survives_reopen() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("test.idx");
        IndexFile::create(&path, 8)?;
        let alloc_after;
        {
            let mut idx = IndexFile::open(&path, opts(8))?;
            idx.insert(b"king", 7)?;
            alloc_after = idx.hdr.alloc;
        }
        let mut idx = IndexFile::open(&path, opts(8))?;
        assert_eq!(idx.hdr.alloc, alloc_after);
        assert_eq!(idx.lookup(b"king")?, Some(7));
        Ok(())
    }

    #[test]
    fn bad_magic_is_corruption() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("test.idx");
        std::fs::write(&path, vec![0u8; 256])?;
        match IndexFile::open(&path, opts(8)) {
            Err(ChainDbError::Corruption(_)) => Ok(()),
            Err(other) => panic!("expected corruption error, got: {other:?}"),
            Ok(_) => panic!("expected corruption error, got an open artifact"),
        }
    }

    #[test]
    fn truncated_artifact_is_corruption() -> ChainDbResult<()> {
        let tmp = tempdir()?;
        let path = tmp.path().join("test.idx");
        std::fs::write(&path, vec![1u8, 2, 3])?;
        match IndexFile::open(&path, opts(8)) {
            Err(ChainDbError::Corruption(_)) => Ok(()),
            Err(other) => panic!("expected corruption error, got: {other:?}"),
            Ok(_) => panic!("expected corruption error, got an open artifact"),
        }
    }
}

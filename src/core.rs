use bincode::{Decode, Encode};

#[cfg(test)]
use rand::{distributions::Standard, thread_rng, Rng};

/// Owned byte string.
pub type Bytes = Vec<u8>;
/// Borrowed key bytes.
pub type KeyRef<'a> = &'a [u8];
/// Absolute byte offset within an artifact.
pub type Offset = u64;

/// Chain link marking the end of a bucket chain.
///
/// Offset zero lies inside the index artifact header and can never
/// address a record.
pub(crate) const NIL: Offset = 0;

/// Index artifact header.
///
/// `alloc` is the bump cursor at which the next index record will be
/// appended. It advances on every insert and never moves back; space
/// freed by unlinking records is not reused.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub(crate) struct IndexHeader {
    /// Artifact format marker, version in the last byte.
    pub magic: [u8; 4],
    /// Bucket table capacity, fixed at creation time.
    pub bucket_count: u64,
    /// Bump cursor for index record allocation.
    pub alloc: Offset,
}

impl IndexHeader {
    pub fn serde_sz() -> usize {
        // [u8; 4] + u64 + u64
        20
    }
}

/// One slot of the bucket table.
#[derive(Debug, Clone, Copy, Default, Encode, Decode, PartialEq, Eq)]
pub(crate) struct Bucket {
    /// Offset of the first record in the chain, or [NIL].
    pub head: Offset,
    /// Number of records reachable from `head`.
    pub count: u64,
}

impl Bucket {
    pub fn serde_sz() -> usize {
        // u64 + u64
        16
    }
}

/// Fixed-width prefix of an index record.
///
/// The key bytes follow on disk, NUL terminated; `key_len` includes
/// the terminator. `next` is the previous chain head at the time this
/// record was inserted.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub(crate) struct IndexRecordHdr {
    pub next: Offset,
    pub key_len: u64,
    pub data_offset: Offset,
}

impl IndexRecordHdr {
    pub fn serde_sz() -> usize {
        // u64 + u64 + u64
        24
    }
}

/// Fixed-width prefix of a data record.
///
/// The payload bytes follow on disk, NUL terminated; `data_len`
/// includes the terminator. The tombstone flag is the sole authority
/// on liveness and the only part of a record ever rewritten.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub(crate) struct DataRecordHdr {
    pub data_len: u64,
    pub tombstone: bool,
    pub compressed: bool,
}

impl DataRecordHdr {
    pub fn serde_sz() -> usize {
        // u64 + bool + bool
        10
    }
}

#[cfg(test)]
pub trait FixtureGen<T> {
    fn gen() -> T;
}

#[cfg(test)]
impl FixtureGen<Bytes> for Bytes {
    fn gen() -> Bytes {
        let mut rng = thread_rng();
        let len = rng.gen_range(32..4097);
        rng.sample_iter(Standard).take(len).collect()
    }
}

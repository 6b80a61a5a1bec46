/*!
ChainDb is a disk resident key value store built on a fixed-capacity
hash table with chained index records and an append-only value log.

Two artifacts back a store: `<name>.idx` holds a header, the bucket
table, and variable-length index records chained per bucket;
`<name>.dat` holds the values, each prefixed by a length and a
tombstone flag. Values are never moved or reclaimed; removal flips the
tombstone in place and unlinks the chain record, and chains grow by
prepending. The bucket capacity is chosen at creation time, persisted
in the index header, and read back on open.

Lookups hash the key, read the bucket, and walk its chain for at most
`count` hops. Full-table iteration (`rewind`/`next_record`) ignores
the index and scans the value log directly, skipping tombstones.

```rust
use chaindb::{ChainDb, ChainDbResult};

fn main() -> ChainDbResult<()> {
    let base = std::env::temp_dir().join("chaindb-doc");
    std::fs::remove_file(base.with_extension("idx")).ok();
    std::fs::remove_file(base.with_extension("dat")).ok();

    ChainDb::create(&base, None)?;
    let mut db = ChainDb::open(&base, None)?;
    db.insert(b"king", b"queen")?;
    assert_eq!(db.fetch(b"king")?.unwrap(), b"queen".to_vec());
    db.close()?;
    Ok(())
}
```
*/
#![deny(missing_docs)]
#[macro_use]
extern crate log;
mod chaindb;
mod config;
mod core;
mod data;
mod dec;
mod error;
mod index;
mod utils;
pub use crate::chaindb::ChainDb;
pub use crate::config::DatabaseOptions;
pub use crate::core::{Bytes, KeyRef};
pub use crate::error::{ChainDbError, ChainDbResult};

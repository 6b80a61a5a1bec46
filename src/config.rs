use typed_builder::TypedBuilder;

/// Store configuration.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct DatabaseOptions {
    /// Number of hash buckets in the index artifact.
    ///
    /// Fixed at creation time and persisted in the artifact header.
    /// `open` reads the capacity back from disk and ignores this field.
    #[builder(default = 10008)]
    pub bucket_count: u64,
    /// Synchronous write IO flag. If enabled all writes are flushed to disk.
    #[builder(default = false)]
    pub sync: bool,
    /// Snappy-compress payloads before appending them to the data artifact.
    #[builder(default = false)]
    pub compress: bool,
}

use std::fmt;

/// Process-wide metadata merged into trace-level tags at flush time.
///
/// Providers are treated as read-only and queried lazily, once per chunk.
pub trait MetadataProvider: Send + Sync + fmt::Debug {
    /// Source-control metadata tags, e.g. the git revision the running
    /// binary was built from.
    fn git_metadata_tags(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// The serialized process-level tags, if any.
    fn process_tags(&self) -> Option<String> {
        None
    }
}

/// A [`MetadataProvider`] that supplies no metadata.
#[derive(Clone, Debug, Default)]
pub struct NoMetadata;

impl MetadataProvider for NoMetadata {}

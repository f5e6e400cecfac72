//! Domain records mirrored from the remote archive and the trait the
//! pipeline uses to treat them generically.

pub mod comic;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record keyed by a positive integer identifier.
///
/// Implemented by every type the pipeline can fetch and persist. The
/// identifier is the natural key: stores keep at most one record per id.
pub trait Item: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> u64;
}

//! Point-to-point requests.

mod sync;

pub use sync::SyncRequest;

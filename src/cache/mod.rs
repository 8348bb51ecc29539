//! Disk cache keyed by source URL.
//!
//! Layout: `<root>/<host[:port]>/<escaped-url><ext>`, one file per resource. There is no
//! index; the directory tree is the index and file mtimes decide freshness.

pub mod key;
pub mod locks;
pub mod store;

pub use key::{encode_url, resolve_path, CacheKey};
pub use locks::{KeyGuard, KeyedLocks};
pub use store::{content_type_for_extension, CacheEntry, CacheStore};

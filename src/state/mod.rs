//! Run records, their storage, and the target index.

pub mod index;
pub mod record;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use index::{TargetEntry, TargetIndex, TargetRegistry, INDEX_FILE};
pub use record::{CompletedStep, RunRecord, RunStatus};
pub use store::{RunStateStore, ARCHIVE_DIR, STATUS_FILE};

static SIBLING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A path next to `path` that no other writer, thread or process, will pick.
///
/// The name is `<file name>.<tag>-<pid>-<nanos>-<n>`.
pub(crate) fn unique_sibling(path: &Path, tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let n = SIBLING_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        "{}.{}-{}-{}-{}",
        name,
        tag,
        std::process::id(),
        nanos,
        n
    ))
}

//! Payload serialization to and from queue files.
//!
//! Payloads are opaque bytes; the codec's job is only to get them onto disk
//! durably, under a size bound, with a filename that will sort correctly
//! once renamed into `queued/`.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::{fs, io::AsyncWriteExt};

use crate::error::{QueueError, Result};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Write `payload` to a freshly created file in `tmp_dir`, named with the
/// current millisecond timestamp so a later rename yields a sortable
/// queue filename.
///
/// The file is created with create-new semantics; a same-millisecond
/// collision bumps the timestamp forward until a free name is found. The
/// payload is fsynced before the path is returned, so a subsequent rename
/// publishes a fully durable file.
///
/// # Errors
/// Returns [`QueueError::TooLarge`] when the payload exceeds `max_bytes`,
/// or the underlying I/O error.
pub async fn write_payload(
    tmp_dir: &Path,
    payload: &[u8],
    max_bytes: Option<usize>,
) -> Result<PathBuf> {
    if let Some(max) = max_bytes
        && payload.len() > max
    {
        return Err(QueueError::TooLarge {
            size: payload.len(),
            max,
        });
    }

    let mut stamp = now_ms();
    loop {
        let path = tmp_dir.join(stamp.to_string());
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(payload).await?;
                file.sync_all().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                stamp += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Read a payload back from a queue file.
///
/// # Errors
/// Surfaces the underlying I/O error; the caller decides what a poisoned
/// file means for queue state.
pub async fn read_payload(path: &Path) -> Result<Arc<[u8]>> {
    let bytes = fs::read(path).await?;
    Ok(Arc::from(bytes))
}

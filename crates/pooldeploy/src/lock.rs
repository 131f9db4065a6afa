use crate::errors::DeployError;
use eyre::Context as _;
use fs2::FileExt as _;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive per-network lock held for the duration of an orchestration run.
///
/// Two runs against the same deployment would race on the single pool admin slot; the second
/// one fails fast instead. The lock is released when the value is dropped.
#[derive(Debug)]
pub struct RunLock {
    _file: File,
}

impl RunLock {
    pub fn acquire(path: &Path, network: &str) -> eyre::Result<Self> {
        if let Some(parent) = path.parent() {
            crate::fsutil::ensure_dir(parent)?;
        }
        let f = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        match f.try_lock_exclusive() {
            Ok(()) => Ok(Self { _file: f }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(DeployError::RunLocked {
                network: network.to_owned(),
            }
            .into()),
            Err(e) => Err(eyre::Report::new(e).wrap_err(format!("lock {}", path.display()))),
        }
    }
}

use eyre::Context as _;
use rand::Rng as _;
use std::{
    fs::{self, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

pub fn ensure_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        let md = fs::metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if !md.is_dir() {
            eyre::bail!("expected directory at {}", dir.display());
        }
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))
}

fn tmp_path_for(parent: &Path, final_name: &Path) -> PathBuf {
    let base = final_name
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let mut rand_bytes = [0_u8; 8];
    rand::rng().fill_bytes(&mut rand_bytes);
    parent.join(format!(".{base}.tmp.{}", hex::encode(rand_bytes)))
}

/// Write `bytes` to `path` through a temp file and rename, so readers never see a torn file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    ensure_dir(parent)?;

    let tmp = tmp_path_for(parent, path);
    let mut f = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp)
        .with_context(|| format!("open temp {}", tmp.display()))?;
    f.write_all(bytes)
        .with_context(|| format!("write {}", tmp.display()))?;
    f.sync_all()
        .with_context(|| format!("fsync {}", tmp.display()))?;
    drop(f);

    #[cfg(windows)]
    {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("remove existing {}", path.display()))?;
        }
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents_and_leaves_no_temp() -> eyre::Result<()> {
        let dir = tempfile::tempdir()?;
        let p = dir.path().join("nested").join("book.json");
        write_atomic(&p, b"{}")?;
        write_atomic(&p, b"{\"a\":1}")?;
        assert_eq!(fs::read_to_string(&p)?, "{\"a\":1}");

        let leftovers = fs::read_dir(p.parent().ok_or_else(|| eyre::eyre!("no parent"))?)?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0_usize, "temp files must be renamed away");
        Ok(())
    }
}

//! Compiled contract artifacts (Hardhat layout: `<dir>/**/<Name>.sol/<Name>.json`).

use alloy::primitives::Bytes;
use eyre::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    contract_name: String,
    bytecode: String,
}

#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Locate `<contract>.json`, preferring a flat file in the root over the nested layout.
    fn find(&self, contract: &str) -> eyre::Result<PathBuf> {
        let file_name = format!("{contract}.json");
        let flat = self.dir.join(&file_name);
        if flat.is_file() {
            return Ok(flat);
        }
        let mut stack = vec![self.dir.clone()];
        while let Some(dir) = stack.pop() {
            let rd = std::fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))?;
            for entry in rd {
                let entry = entry.with_context(|| format!("read {}", dir.display()))?;
                let p = entry.path();
                if p.is_dir() {
                    stack.push(p);
                } else if p.file_name().and_then(|s| s.to_str()) == Some(file_name.as_str()) {
                    return Ok(p);
                }
            }
        }
        eyre::bail!(
            "no artifact for {contract} under {}",
            self.dir.display()
        )
    }

    /// Creation bytecode of `contract`. Fails for abstract contracts and unlinked libraries.
    pub fn bytecode(&self, contract: &str) -> eyre::Result<Bytes> {
        let p = self.find(contract)?;
        let s = std::fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
        let a: ArtifactFile =
            serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
        if a.contract_name != contract {
            eyre::bail!(
                "{} holds {}, expected {contract}",
                p.display(),
                a.contract_name
            );
        }
        if a.bytecode.contains("__$") {
            eyre::bail!("{contract} has unlinked library references; link it before deploying");
        }
        let code = Bytes::from_str(a.bytecode.trim())
            .with_context(|| format!("decode bytecode of {contract}"))?;
        if code.is_empty() {
            eyre::bail!("{contract} has no creation bytecode (abstract contract or interface?)");
        }
        Ok(code)
    }
}

use directories::ProjectDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DeployPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl DeployPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("POOLDEPLOY_DATA_DIR"),
            std::env::var("POOLDEPLOY_CONFIG_DIR"),
        ) {
            return Ok(Self::rooted(PathBuf::from(config_dir), PathBuf::from(data_dir)));
        }

        // Linux: ~/.config/pooldeploy and ~/.local/share/pooldeploy
        // macOS: ~/Library/Application Support/pooldeploy
        let proj =
            ProjectDirs::from("", "", "pooldeploy").context("failed to resolve project dirs")?;
        Ok(Self::rooted(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    fn rooted(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join("pooldeploy.log.jsonl");
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("pooldeploy.toml")
    }

    /// Default address book location; `address_book` in the config overrides it.
    pub fn address_book_file(&self) -> PathBuf {
        self.data_dir.join("deployed-contracts.json")
    }

    pub fn run_lock_file(&self, network: &str) -> PathBuf {
        self.data_dir.join(format!("run.{network}.lock"))
    }
}

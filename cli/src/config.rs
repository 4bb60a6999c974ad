use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub api_url: String,
    pub timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "coach").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let mut config = Config::in_dir(data_dir);
        if let Ok(url) = std::env::var("COACH_API_URL") {
            if !url.trim().is_empty() {
                config.api_url = url.trim().to_string();
            }
        }
        if let Ok(secs) = std::env::var("COACH_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid COACH_TIMEOUT_SECS: '{secs}'"))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Defaults rooted at `data_dir`, without consulting the environment.
    pub fn in_dir(data_dir: PathBuf) -> Self {
        Config {
            db_path: data_dir.join("coach.db"),
            data_dir,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn token_path(&self) -> PathBuf {
        self.data_dir.join("token")
    }

    /// Bearer token for the API: `COACH_API_TOKEN` if set, else the token file.
    pub fn load_token(&self) -> Result<Option<String>> {
        if let Ok(token) = std::env::var("COACH_API_TOKEN") {
            if !token.trim().is_empty() {
                return Ok(Some(token.trim().to_string()));
            }
        }
        self.read_token_file()
    }

    fn read_token_file(&self) -> Result<Option<String>> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }
        let token = std::fs::read_to_string(&path).context("Failed to read token file")?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn save_token(&self, token: &str) -> Result<()> {
        let path = self.token_path();
        std::fs::write(&path, token.trim()).context("Failed to write token file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set token file permissions")?;
        }
        Ok(())
    }

    /// Returns whether a token file was removed.
    pub fn delete_token(&self) -> Result<bool> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to remove token file")?;
        Ok(true)
    }
}

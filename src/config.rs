use std::env;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PHOTOS: usize = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub max_file_bytes: u64,
    pub max_photos: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from("data"),
            public_base_url: None,
            static_dir: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_photos: DEFAULT_MAX_PHOTOS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(v) => v
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidEnvVar("PORT".to_string(), e.to_string()))?,
            Err(_) => DEFAULT_PORT,
        };

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let static_dir = env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let max_file_bytes = match env::var("MAX_FILE_BYTES") {
            Ok(v) => v.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("MAX_FILE_BYTES".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_MAX_FILE_BYTES,
        };

        let max_photos = match env::var("MAX_PHOTOS") {
            Ok(v) => v.parse::<usize>().map_err(|e| {
                ConfigError::InvalidEnvVar("MAX_PHOTOS".to_string(), e.to_string())
            })?,
            Err(_) => DEFAULT_MAX_PHOTOS,
        };

        Ok(Config {
            port,
            data_dir,
            public_base_url,
            static_dir,
            max_file_bytes,
            max_photos,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PORT".to_string(),
                "must be a valid port number".to_string(),
            ));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "DATA_DIR".to_string(),
                "cannot be empty".to_string(),
            ));
        }

        if self.max_file_bytes == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "MAX_FILE_BYTES".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        if let Some(base) = &self.public_base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(ConfigError::InvalidEnvVar(
                    "PUBLIC_BASE_URL".to_string(),
                    "must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Upper bound for a whole `/upload` request body: every allowed file at
    /// the per-file limit plus room for the text fields and part headers.
    pub fn max_request_bytes(&self) -> usize {
        let files = self.max_photos as u64 + 1;
        let total = self
            .max_file_bytes
            .saturating_mul(files)
            .saturating_add(1024 * 1024);
        usize::try_from(total).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::fs::OpenOptions;
use std::str;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use fd_lock::{RwLock, RwLockWriteGuard};

use crate::config::types::Config;
use crate::error::ConfigError;

// pushup-counter.json in an os dependent standard directory, such as
// %AppData% on windows
fn get_config_path() -> Result<PathBuf, ConfigError> {
    match ProjectDirs::from("", "", "pushup-counter") {
        None => Err(ConfigError::NoConfigPath),
        Some(dirs) => Ok(dirs.config_dir().join("pushup-counter.json")),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        match self.rw_lock.try_write() {
            Ok(guard) => Ok(guard),
            Err(source) => Err(ConfigError::CanNotLock { source }),
        }
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        let path = get_config_path()?;
        log::info!("Using config file {}", path.to_string_lossy());
        Self::open_sync(path)
    }

    fn open_sync(path: PathBuf) -> Result<Self, ConfigError> {
        let directory = path.parent().expect("Failed to determine parent path of config path");
        std::fs::create_dir_all(directory)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner { file };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    // an exclusive file lock on the config file ensures only one instance
    // of the application runs at a time
    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        let file = inner.file.try_clone()?;
        Ok(File::from_std(file))
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;

        // the clone shares its offset with the handle save() writes through
        file.rewind().await?;

        let mut content = vec![];
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        let config: Config = serde_json::from_str(content)?;
        Ok(config)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::DetectorTuning;

    #[tokio::test]
    async fn saved_tuning_is_read_back() {
        let path = std::env::temp_dir()
            .join(format!("pushup-counter-io-test-{}", std::process::id()))
            .join("pushup-counter.json");
        let _ = std::fs::remove_file(&path);

        let config_io = ConfigIO::open_sync(path).unwrap();
        assert_eq!(config_io.read().await.unwrap(), Config::default());

        let config = Config {
            tuning: DetectorTuning { noise_floor: 2, noise_ceiling: 8 },
        };
        config_io.save(&config).await.unwrap();
        assert_eq!(config_io.read().await.unwrap(), config);

        // writing a shorter config over a longer one must not leave
        // trailing bytes behind
        config_io.save(&Config::default()).await.unwrap();
        assert_eq!(config_io.read().await.unwrap(), Config::default());
    }
}

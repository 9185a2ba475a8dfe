use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::sync::Mutex;

use parking_meter_common::RuntimeConfig;

#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("METER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.parking-meter"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw).with_context(|| {
                format!("invalid runtime config at {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn scratch_dir(label: &str) -> PathBuf {
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT: AtomicU32 = AtomicU32::new(0);
    std::env::temp_dir().join(format!(
        "parking-meter-{label}-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let store = AppStore::at(scratch_dir("missing"));
        let runtime = store.load_runtime_config().await.unwrap();
        assert_eq!(runtime.timezone, "America/Chicago");
        assert_eq!(runtime.hourglass.passphrase, "arm1234");
    }

    #[tokio::test]
    async fn saved_config_is_read_back() {
        let dir = scratch_dir("roundtrip");
        let store = AppStore::at(dir.clone());
        let mut runtime = RuntimeConfig::default();
        runtime.classifier.max_range = 0.45;
        runtime.location.lat = "45.0".to_string();

        store.save_runtime_config(&runtime).await.unwrap();
        let loaded = store.load_runtime_config().await.unwrap();

        assert_eq!(loaded.classifier.max_range, 0.45);
        assert_eq!(loaded.location.lat, "45.0");
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = scratch_dir("corrupt");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("runtime.json"), b"{not json")
            .await
            .unwrap();

        let store = AppStore::at(dir.clone());
        assert!(store.load_runtime_config().await.is_err());
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}

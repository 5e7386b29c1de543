//! Preview configuration, supplied by the embedding application.

use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_IMAGES_COUNT: u32 = 10;
const DEFAULT_ENGINE_LOG_LEVEL: u8 = 1;
const SUPPORT_DIR_NAME: &str = "TinyPreview";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewConfig {
    /// Number of evenly spaced stills exposed per title. Default 10.
    pub images_count: Option<u32>,
    /// Verbosity of the dedicated preview engine instance. Default 1.
    pub engine_log_level: Option<u8>,
    /// Root under which per-process preview directories are created.
    pub support_dir: Option<PathBuf>,
}

impl PreviewConfig {
    pub fn effective_images_count(&self) -> u32 {
        self.images_count.unwrap_or(DEFAULT_IMAGES_COUNT).max(1)
    }

    pub fn effective_engine_log_level(&self) -> u8 {
        self.engine_log_level.unwrap_or(DEFAULT_ENGINE_LOG_LEVEL)
    }

    pub fn effective_support_dir(&self) -> PathBuf {
        if let Some(dir) = &self.support_dir {
            return dir.clone();
        }
        dirs_next::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(SUPPORT_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = PreviewConfig::default();
        assert_eq!(config.effective_images_count(), 10);
        assert_eq!(config.effective_engine_log_level(), 1);
        assert!(config.effective_support_dir().ends_with(SUPPORT_DIR_NAME));
    }

    #[test]
    fn zero_images_count_is_clamped() {
        let config = PreviewConfig {
            images_count: Some(0),
            ..PreviewConfig::default()
        };
        assert_eq!(config.effective_images_count(), 1);
    }

    #[test]
    fn deserializes_camel_case() {
        let config: PreviewConfig =
            serde_json::from_str(r#"{"imagesCount": 30, "supportDir": "/tmp/x"}"#)
                .expect("config");
        assert_eq!(config.effective_images_count(), 30);
        assert_eq!(config.effective_support_dir(), PathBuf::from("/tmp/x"));
    }
}

use crate::pipeline::AnalysisSettings;
use crate::render::ParameterPatch;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides applied on top of the renderer defaults.
    pub render: ParameterPatch,
    pub analysis: AnalysisSettings,
    /// Worker threads; `None` uses the host's available parallelism.
    pub workers: Option<usize>,
}

fn config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(dir).join("spectrostream")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config").join("spectrostream")
    } else {
        PathBuf::from(".spectrostream")
    }
}

#[derive(Debug)]
pub struct SettingsManager {
    path: PathBuf,
    data: Settings,
}

impl SettingsManager {
    pub fn load_or_default() -> Self {
        Self::load_from(config_dir().join(SETTINGS_FILE_NAME))
    }

    /// Load from an explicit path, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load_from(path: PathBuf) -> Self {
        let data = Self::load_from_disk(&path).unwrap_or_default();
        Self { path, data }
    }

    fn load_from_disk(path: &Path) -> Option<Settings> {
        let contents = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(settings) => Some(settings),
            Err(err) => {
                warn!("[settings] failed to parse {path:?}: {err}");
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.data
    }

    pub fn set_render_patch(&mut self, patch: ParameterPatch) {
        self.data.render = patch;
    }

    pub fn set_analysis(&mut self, analysis: AnalysisSettings) {
        self.data.analysis = analysis;
    }

    pub fn set_workers(&mut self, workers: Option<usize>) {
        self.data.workers = workers.filter(|&count| count > 0);
    }

    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::FrequencyScale;
    use crate::render::GradientPreset;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("spectrostream-settings-{}-{name}", std::process::id()))
            .join(SETTINGS_FILE_NAME)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let manager = SettingsManager::load_from(scratch_path("missing"));
        assert_eq!(manager.settings(), &Settings::default());
        assert_eq!(manager.settings().analysis.window_size, 4096);
        assert_eq!(manager.settings().analysis.window_step_size, 1024);
        assert_eq!(manager.settings().analysis.history_columns, 2048);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"render": {"scale": "linear"}, "analysis": {"window_step_size": 512}}"#,
        )
        .expect("valid settings");

        assert_eq!(settings.render.scale, Some(FrequencyScale::Linear));
        assert_eq!(settings.render.contrast, None);
        assert_eq!(settings.analysis.window_step_size, 512);
        assert_eq!(settings.analysis.window_size, 4096);
        assert_eq!(settings.workers, None);
    }

    #[test]
    fn save_then_reload_preserves_settings() {
        let path = scratch_path("roundtrip");
        let mut manager = SettingsManager::load_from(path.clone());
        manager.set_render_patch(ParameterPatch {
            gradient: Some(GradientPreset::Monochrome),
            zoom: Some(2.0),
            ..ParameterPatch::default()
        });
        manager.set_analysis(AnalysisSettings {
            window_size: 2048,
            window_step_size: 512,
            history_columns: 1024,
        });
        manager.set_workers(Some(3));
        manager.save().expect("write settings");

        let reloaded = SettingsManager::load_from(path.clone());
        assert_eq!(reloaded.settings(), manager.settings());
        assert_eq!(reloaded.settings().analysis.column_height(), 1024);
        assert!(!path.with_extension("json.tmp").exists());

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = scratch_path("malformed");
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).expect("scratch dir");
        }
        fs::write(&path, "{ not json").expect("write scratch file");

        let manager = SettingsManager::load_from(path.clone());
        assert_eq!(manager.settings(), &Settings::default());

        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }
}

use crate::script::WordBand;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gemini_api_key: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Inclusive word-count band for generated scripts.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    /// How many chronological scenes the image-prompt pass targets.
    #[serde(default = "default_scene_count")]
    pub scene_count: usize,
    #[serde(default = "default_projects_path")]
    pub projects_path: String,
}

fn default_text_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "imagen-4.0-generate-001".to_string()
}

fn default_min_words() -> usize {
    5000
}

fn default_max_words() -> usize {
    6500
}

fn default_scene_count() -> usize {
    100
}

fn default_projects_path() -> String {
    "projects.json".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)?;

        if config.gemini_api_key.is_empty() {
            anyhow::bail!("config.json: gemini_api_key missing");
        }
        if config.min_words == 0 || config.min_words >= config.max_words {
            anyhow::bail!(
                "config.json: invalid word band {}-{}",
                config.min_words,
                config.max_words
            );
        }
        if config.scene_count == 0 {
            anyhow::bail!("config.json: scene_count must be positive");
        }

        Ok(config)
    }

    pub fn word_band(&self) -> WordBand {
        WordBand::new(self.min_words, self.max_words)
    }
}

//! Canned vision results loaded from TOML.
//!
//! ```toml
//! [[image]]
//! key = "a.jpg"
//! labels = [{ name = "Car", confidence = 98.5 }]
//! text = [{ text = "NJ", kind = "WORD" }, { text = "NJ 1234", kind = "LINE" }]
//! ```
//!
//! Images missing from the fixture have no labels and no text.

use super::{Annotator, Classifier};
use crate::error::{Error, Result};
use crate::model::{ImageRef, Label, TextDetection};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    image: Vec<FixtureImage>,
}

#[derive(Debug, Deserialize)]
struct FixtureImage {
    key: String,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    text: Vec<TextDetection>,
}

#[derive(Debug, Default)]
pub struct FixtureVision {
    keys: Vec<String>,
    labels: HashMap<String, Vec<Label>>,
    text: HashMap<String, Vec<TextDetection>>,
}

impl FixtureVision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("bad fixture {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: FixtureFile = toml::from_str(content)?;
        Ok(file
            .image
            .into_iter()
            .fold(Self::new(), |fixture, image| {
                fixture
                    .with_labels(&image.key, image.labels)
                    .with_text(&image.key, image.text)
            }))
    }

    pub fn with_labels(mut self, key: &str, labels: Vec<Label>) -> Self {
        self.remember(key);
        self.labels.insert(key.to_string(), labels);
        self
    }

    pub fn with_text(mut self, key: &str, text: Vec<TextDetection>) -> Self {
        self.remember(key);
        self.text.insert(key.to_string(), text);
        self
    }

    fn remember(&mut self, key: &str) {
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
    }

    /// Image keys in fixture order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Classifier for FixtureVision {
    async fn detect_labels(&self, image: &ImageRef, min_confidence: f32) -> Result<Vec<Label>> {
        Ok(self
            .labels
            .get(&image.key)
            .map(|labels| {
                labels
                    .iter()
                    .filter(|l| l.confidence >= min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl Annotator for FixtureVision {
    async fn detect_text(&self, image: &ImageRef) -> Result<Vec<TextDetection>> {
        Ok(self.text.get(&image.key).cloned().unwrap_or_default())
    }
}

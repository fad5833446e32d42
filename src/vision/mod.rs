//! Image classification and text detection capabilities.
//!
//! Both are external services; the workers only see the two traits below.
//! [`http::HttpVision`] talks to a JSON service, [`fixture::FixtureVision`]
//! replays canned results from a TOML file.

pub mod fixture;
pub mod http;

use crate::error::Result;
use crate::model::{ImageRef, Label, TextDetection};
use std::future::Future;

pub use fixture::FixtureVision;
pub use http::HttpVision;

pub trait Classifier: Send + Sync {
    /// Labels for the image with confidence at or above `min_confidence`.
    fn detect_labels(
        &self,
        image: &ImageRef,
        min_confidence: f32,
    ) -> impl Future<Output = Result<Vec<Label>>> + Send;
}

pub trait Annotator: Send + Sync {
    /// Text fragments (words and lines) found in the image.
    fn detect_text(&self, image: &ImageRef)
    -> impl Future<Output = Result<Vec<TextDetection>>> + Send;
}

/// Either vision backend, chosen at startup.
pub enum Vision {
    Http(HttpVision),
    Fixture(FixtureVision),
}

impl Classifier for Vision {
    async fn detect_labels(&self, image: &ImageRef, min_confidence: f32) -> Result<Vec<Label>> {
        match self {
            Vision::Http(v) => v.detect_labels(image, min_confidence).await,
            Vision::Fixture(v) => v.detect_labels(image, min_confidence).await,
        }
    }
}

impl Annotator for Vision {
    async fn detect_text(&self, image: &ImageRef) -> Result<Vec<TextDetection>> {
        match self {
            Vision::Http(v) => v.detect_text(image).await,
            Vision::Fixture(v) => v.detect_text(image).await,
        }
    }
}

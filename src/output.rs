//! Result sinks.

use std::future::Future;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub trait ResultSink: Send {
    /// Write the rendered result lines in one go.
    fn write_results(&mut self, text: &str) -> impl Future<Output = std::io::Result<()>> + Send;
}

/// Appends results to a text file, creating it if needed.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ResultSink for FileSink {
    async fn write_results(&mut self, text: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sink_appends() {
        let path = std::env::temp_dir()
            .join("carscan-test")
            .join(format!("{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();

        let mut sink = FileSink::new(&path);
        assert_eq!(sink.path(), path.as_path());
        sink.write_results("a.jpg: NJ\n").await.unwrap();
        sink.write_results("b.jpg: PA\n").await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "a.jpg: NJ\nb.jpg: PA\n");
        let _ = tokio::fs::remove_file(&path).await;
    }
}

use super::{Interceptor, InterceptorError};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Records each model exchange as `<dir>/exchange_<timestamp>_<seq>.md`.
///
/// Files are opened with `create_new`, so concurrent requests never share a file.
#[derive(Debug)]
pub struct FileInterceptor {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileInterceptor {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, seq: AtomicU64::new(0) }
    }

    fn next_path(&self, stamp: &str) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("exchange_{}_{:04}.md", stamp, seq))
    }
}

#[async_trait]
impl Interceptor for FileInterceptor {
    async fn save(&self, prompt: &str, response: &str) -> Result<(), InterceptorError> {
        fs::create_dir_all(&self.dir).await?;

        let now = Utc::now();
        let stamp = now.format("%Y%m%d_%H%M%S_%6f").to_string();
        let transcript = format!(
            "<!-- recorded {} -->\n\n## Prompt\n\n{}\n\n## Reply\n\n{}\n",
            now.to_rfc3339(),
            prompt,
            response
        );

        loop {
            let path = self.next_path(&stamp);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(transcript.as_bytes()).await?;
                    file.flush().await?;
                    debug!(path = %path.display(), "Exchange recorded");
                    return Ok(());
                }
                // Left over from an earlier process with the same stamp.
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("book_quiz_{}_{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn records_prompt_and_reply() {
        let dir = scratch_dir("transcript");
        let interceptor = FileInterceptor::new(dir.clone());
        interceptor.save("the prompt", "the reply").await.unwrap();

        let mut entries = std::fs::read_dir(&dir).unwrap();
        let path = entries.next().unwrap().unwrap().path();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("## Prompt\n\nthe prompt"));
        assert!(content.contains("## Reply\n\nthe reply"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn concurrent_exchanges_get_separate_files() {
        let dir = scratch_dir("transcript_concurrent");
        let interceptor = std::sync::Arc::new(FileInterceptor::new(dir.clone()));
        let mut saves = tokio::task::JoinSet::new();
        for i in 0..8 {
            let interceptor = interceptor.clone();
            saves.spawn(async move { interceptor.save(&format!("prompt {}", i), "reply").await.is_ok() });
        }
        while let Some(saved) = saves.join_next().await {
            assert!(saved.unwrap());
        }

        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 8);
        std::fs::remove_dir_all(dir).unwrap();
    }
}

//! Live transcription of recorded tab audio.
//!
//! A recorder produces fixed-length [`AudioChunk`]s stamped with the video
//! time they started at; the pipeline transcribes them in order and emits
//! subtitle text to inject at that offset.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiResult;

/// One recorded slice of audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub mime: String,
    /// Video time (seconds) the chunk starts at
    pub offset: f64,
}

/// Transcribed subtitle text for a chunk
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleUpdate {
    pub content: String,
    pub offset: f64,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, data: Vec<u8>, mime: &str) -> ApiResult<String>;
}

/// Tracks the video offset of successive recorder chunks
#[derive(Debug, Clone)]
pub struct ChunkClock {
    offset: f64,
    interval: Duration,
}

impl ChunkClock {
    pub fn new(video_time: f64, interval: Duration) -> Self {
        Self {
            offset: video_time.max(0.0),
            interval,
        }
    }

    /// Offset of the next chunk; the clock then moves one interval on
    pub fn advance(&mut self) -> f64 {
        let current = self.offset;
        self.offset += self.interval.as_secs_f64();
        current
    }

    pub fn current(&self) -> f64 {
        self.offset
    }
}

/// Sequential chunk → transcription → subtitle update loop
pub struct TranscriptionPipeline {
    transcriber: Arc<dyn Transcriber>,
}

impl TranscriptionPipeline {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    /// Run until the chunk channel closes or the update receiver goes away.
    /// Returns the number of chunks transcribed.
    pub async fn run(&self, mut chunks: mpsc::Receiver<AudioChunk>, updates: mpsc::Sender<SubtitleUpdate>) -> usize {
        let mut transcribed = 0;

        while let Some(chunk) = chunks.recv().await {
            if chunk.data.is_empty() {
                debug!("Skipping empty chunk at {:.1}s", chunk.offset);
                continue;
            }

            let offset = chunk.offset;
            match self.transcriber.transcribe(chunk.data, &chunk.mime).await {
                Ok(content) => {
                    transcribed += 1;
                    let update = SubtitleUpdate { content, offset };
                    if updates.send(update).await.is_err() {
                        warn!("Subtitle receiver dropped, stopping transcription");
                        break;
                    }
                }
                Err(e) => warn!("❌ Transcription failed for chunk at {:.1}s: {}", offset, e),
            }
        }

        info!("🎙️ Transcription pipeline finished ({} chunks)", transcribed);
        transcribed
    }

    /// Run on the tokio runtime in the background
    pub fn spawn(self, chunks: mpsc::Receiver<AudioChunk>, updates: mpsc::Sender<SubtitleUpdate>) -> JoinHandle<usize> {
        tokio::spawn(async move { self.run(chunks, updates).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, data: Vec<u8>, _mime: &str) -> ApiResult<String> {
            if data == b"bad" {
                return Err(ApiError::Status {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(String::from_utf8_lossy(&data).into_owned())
        }
    }

    #[test]
    fn test_chunk_clock_advances_by_interval() {
        let mut clock = ChunkClock::new(12.5, Duration::from_secs(5));
        assert_eq!(clock.advance(), 12.5);
        assert_eq!(clock.advance(), 17.5);
        assert_eq!(clock.current(), 22.5);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_skipped() {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let (update_tx, mut update_rx) = mpsc::channel(8);

        for (data, offset) in [(&b"one"[..], 0.0), (&b"bad"[..], 5.0), (&b""[..], 7.0), (&b"three"[..], 10.0)] {
            chunk_tx
                .send(AudioChunk {
                    data: data.to_vec(),
                    mime: "audio/webm".to_string(),
                    offset,
                })
                .await
                .unwrap();
        }
        drop(chunk_tx);

        let pipeline = TranscriptionPipeline::new(Arc::new(EchoTranscriber));
        let count = pipeline.run(chunk_rx, update_tx).await;
        assert_eq!(count, 2);

        let first = update_rx.recv().await.unwrap();
        assert_eq!(first, SubtitleUpdate { content: "one".to_string(), offset: 0.0 });
        let second = update_rx.recv().await.unwrap();
        assert_eq!(second.offset, 10.0);
        assert!(update_rx.recv().await.is_none());
    }
}

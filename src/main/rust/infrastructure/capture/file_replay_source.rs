use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{Interval, MissedTickBehavior};

use crate::domain::errors::CaptureError;
use crate::domain::ports::{CaptureHandle, FrameSource};
use crate::domain::value_objects::CaptureConfig;

/// Replays a pre-encoded file in bitrate-sized slices at the chunk interval
#[derive(Debug, Clone)]
pub struct FileReplaySource {
    path: PathBuf,
    looping: bool,
    name: String,
}

impl FileReplaySource {
    pub fn new(path: PathBuf) -> Self {
        let name = format!("file:{}", path.display());
        Self {
            path,
            looping: false,
            name,
        }
    }

    /// Start over from the beginning at end of file
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl FrameSource for FileReplaySource {
    async fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        let file = File::open(&self.path)
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {}", self.path.display(), e)))?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
        if !metadata.is_file() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        if metadata.len() == 0 && self.looping {
            return Err(CaptureError::Unsupported(format!(
                "cannot loop empty file {}",
                self.path.display()
            )));
        }

        let mut ticker = tokio::time::interval(config.chunk_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Box::new(FileReplayHandle {
            file: Some(file),
            ticker,
            slice_bytes: config.nominal_chunk_bytes(),
            looping: self.looping,
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FileReplayHandle {
    file: Option<File>,
    ticker: Interval,
    slice_bytes: usize,
    looping: bool,
}

impl FileReplayHandle {
    async fn read_slice(&mut self) -> std::io::Result<Option<Bytes>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let mut slice = BytesMut::with_capacity(self.slice_bytes);
        while slice.len() < self.slice_bytes {
            let read = (&mut *file)
                .take((self.slice_bytes - slice.len()) as u64)
                .read_buf(&mut slice)
                .await?;
            if read == 0 {
                if self.looping && slice.is_empty() {
                    file.seek(SeekFrom::Start(0)).await?;
                    continue;
                }
                break;
            }
        }

        if slice.is_empty() {
            Ok(None)
        } else {
            Ok(Some(slice.freeze()))
        }
    }
}

#[async_trait]
impl CaptureHandle for FileReplayHandle {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, CaptureError> {
        if self.file.is_none() {
            return Ok(None);
        }

        self.ticker.tick().await;
        self.read_slice()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("Replay read failed: {}", e)))
    }

    fn close(&mut self) {
        self.file = None;
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Container writers for the recording sink
//!
//! Video is written as a YUV4MPEG2 stream (I420, one `FRAME` per picture).
//! Audio, when present, goes to a WAV file next to the video with the same
//! stem; it is opened lazily because the sample format is only known once
//! the first buffer arrives.

use crate::backends::camera::Framerate;
use crate::errors::{RecordingError, SdkResult};
use crate::media::AudioBuffer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files produced by a finalised recording
#[derive(Debug, Clone, PartialEq)]
pub struct MuxOutput {
    pub video: PathBuf,
    pub audio: Option<PathBuf>,
    pub frames: u64,
    pub bytes: u64,
}

/// Sink for encoded recording data
pub trait Muxer: Send {
    /// Append one I420 picture
    fn write_video(&mut self, i420: &[u8]) -> SdkResult<()>;

    /// Append interleaved PCM samples
    fn write_audio(&mut self, buffer: &AudioBuffer) -> SdkResult<()>;

    /// Bytes written so far across all tracks
    fn bytes_written(&self) -> u64;

    /// Flush and close every track
    fn finalize(self: Box<Self>) -> SdkResult<MuxOutput>;

    /// Close and delete everything written
    fn abort(self: Box<Self>);
}

fn mux_err(context: &str, e: impl std::fmt::Display) -> RecordingError {
    RecordingError::Mux(format!("{}: {}", context, e))
}

/// YUV4MPEG2 video with an optional WAV sidecar
pub struct Y4mMuxer {
    path: PathBuf,
    writer: BufWriter<File>,
    frame_len: usize,
    frames: u64,
    bytes: u64,
    audio_enabled: bool,
    audio: Option<(PathBuf, hound::WavWriter<BufWriter<File>>)>,
    audio_bytes: u64,
}

impl Y4mMuxer {
    pub fn create(path: &Path, width: u32, height: u32, framerate: Framerate, audio: bool) -> SdkResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        let header = format!(
            "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C420jpeg\n",
            width, height, framerate.num, framerate.denom
        );
        writer.write_all(header.as_bytes())?;

        let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
        debug!(path = %path.display(), width, height, fps = %framerate, "Created Y4M muxer");

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            frame_len: width as usize * height as usize + 2 * chroma,
            frames: 0,
            bytes: header.len() as u64,
            audio_enabled: audio,
            audio: None,
            audio_bytes: 0,
        })
    }

    fn audio_path(&self) -> PathBuf {
        self.path.with_extension("wav")
    }
}

impl Muxer for Y4mMuxer {
    fn write_video(&mut self, i420: &[u8]) -> SdkResult<()> {
        if i420.len() != self.frame_len {
            return Err(mux_err(
                "frame size mismatch",
                format!("{} bytes, expected {}", i420.len(), self.frame_len),
            )
            .into());
        }
        self.writer.write_all(b"FRAME\n")?;
        self.writer.write_all(i420)?;
        self.frames += 1;
        self.bytes += 6 + i420.len() as u64;
        Ok(())
    }

    fn write_audio(&mut self, buffer: &AudioBuffer) -> SdkResult<()> {
        if !self.audio_enabled {
            return Err(RecordingError::AudioDisabled.into());
        }
        if self.audio.is_none() {
            let spec = hound::WavSpec {
                channels: buffer.channels(),
                sample_rate: buffer.sample_rate(),
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let path = self.audio_path();
            let writer = hound::WavWriter::create(&path, spec).map_err(|e| mux_err("audio track", e))?;
            debug!(path = %path.display(), rate = spec.sample_rate, channels = spec.channels, "Opened audio track");
            self.audio = Some((path, writer));
        }

        if let Some((_, writer)) = self.audio.as_mut() {
            let spec = writer.spec();
            if spec.sample_rate != buffer.sample_rate() || spec.channels != buffer.channels() {
                return Err(mux_err(
                    "audio format changed",
                    format!("{} Hz x{}", buffer.sample_rate(), buffer.channels()),
                )
                .into());
            }
            for &sample in buffer.samples() {
                writer.write_sample(sample).map_err(|e| mux_err("audio write", e))?;
            }
            self.audio_bytes += buffer.samples().len() as u64 * 2;
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes + self.audio_bytes
    }

    fn finalize(mut self: Box<Self>) -> SdkResult<MuxOutput> {
        self.writer.flush()?;
        let audio = match self.audio.take() {
            Some((path, writer)) => {
                writer.finalize().map_err(|e| mux_err("audio finalize", e))?;
                Some(path)
            }
            None => None,
        };
        Ok(MuxOutput {
            video: self.path.clone(),
            audio,
            frames: self.frames,
            bytes: self.bytes_written(),
        })
    }

    fn abort(mut self: Box<Self>) {
        let audio = self.audio.take().map(|(path, writer)| {
            // Best effort, the file is deleted right after
            let _ = writer.finalize();
            path
        });
        let path = self.path.clone();
        drop(self);
        for file in std::iter::once(path).chain(audio) {
            if let Err(e) = std::fs::remove_file(&file) {
                warn!(path = %file.display(), error = %e, "Failed to remove aborted recording");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_y4m_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.y4m");
        let mut muxer = Box::new(Y4mMuxer::create(&path, 2, 2, Framerate::from_int(30), false).unwrap());
        muxer.write_video(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert!(muxer.write_video(&[0; 3]).is_err());

        let output = muxer.finalize().unwrap();
        assert_eq!(output.frames, 1);
        assert!(output.audio.is_none());

        let bytes = std::fs::read(&path).unwrap();
        let header = b"YUV4MPEG2 W2 H2 F30:1 Ip A1:1 C420jpeg\nFRAME\n";
        assert_eq!(&bytes[..header.len()], header);
        assert_eq!(&bytes[header.len()..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_audio_sidecar_and_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.y4m");
        let mut muxer = Box::new(Y4mMuxer::create(&path, 2, 2, Framerate::from_int(30), true).unwrap());
        muxer
            .write_audio(&AudioBuffer::new(vec![0i16; 480], 48_000, 1, Duration::ZERO))
            .unwrap();
        assert!(path.with_extension("wav").exists());

        muxer.abort();
        assert!(!path.exists());
        assert!(!path.with_extension("wav").exists());
    }
}

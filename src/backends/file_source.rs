// SPDX-License-Identifier: GPL-3.0-only

//! File-backed sources
//!
//! - [`ImageSource`]: a still image emitted once
//! - [`VideoFileSource`]: YUV4MPEG2 streams, as written by the recorder

use super::camera::Framerate;
use super::{FrameSource, InputSourceKind};
use crate::errors::{SdkError, SdkResult, SourceError};
use crate::media::{Frame, PixelFormat};
use image::RgbaImage;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Still image source
///
/// The image is decoded up front; `start` re-arms it so a released source
/// can be requested again.
pub struct ImageSource {
    image: RgbaImage,
    label: String,
    emitted: bool,
    active: bool,
}

impl ImageSource {
    /// Decode an image file (any format `image` supports)
    pub fn open(path: &Path) -> SdkResult<Self> {
        if !path.exists() {
            return Err(SdkError::ResourceNotFound(path.display().to_string()));
        }
        let image = image::open(path)
            .map_err(|e| SourceError::Failed(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Loaded image source"
        );
        Ok(Self::from_image(image, path.display().to_string()))
    }

    pub fn from_image(image: RgbaImage, label: impl Into<String>) -> Self {
        Self {
            image,
            label: label.into(),
            emitted: false,
            active: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl FrameSource for ImageSource {
    fn kind(&self) -> InputSourceKind {
        InputSourceKind::Image
    }

    fn start(&mut self) -> SdkResult<()> {
        self.emitted = false;
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn next_frame(&mut self, timeout: Duration) -> SdkResult<Option<Frame>> {
        if self.emitted || !self.active {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        self.emitted = true;
        let (width, height) = self.image.dimensions();
        Frame::from_rgba(width, height, self.image.as_raw().clone(), Duration::ZERO).map(Some)
    }

    fn is_exhausted(&self) -> bool {
        self.emitted
    }
}

/// Stream parameters from a YUV4MPEG2 header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Y4mHeader {
    pub width: u32,
    pub height: u32,
    pub framerate: Framerate,
    pub format: PixelFormat,
}

impl Y4mHeader {
    /// Parse the header line (without the trailing newline)
    pub fn parse(line: &str) -> SdkResult<Self> {
        let mut tokens = line.split_ascii_whitespace();
        if tokens.next() != Some("YUV4MPEG2") {
            return Err(SourceError::Failed("not a YUV4MPEG2 stream".into()).into());
        }

        let mut width = 0;
        let mut height = 0;
        let mut framerate = Framerate::default();
        let mut format = PixelFormat::Yuv420p;

        for token in tokens {
            if !token.is_char_boundary(1) {
                continue;
            }
            let (tag, value) = token.split_at(1);
            match tag {
                "W" => width = value.parse().unwrap_or(0),
                "H" => height = value.parse().unwrap_or(0),
                "F" => {
                    if let Some((num, denom)) = value.split_once(':') {
                        framerate = Framerate::new(num.parse().unwrap_or(30), denom.parse().unwrap_or(1));
                    }
                }
                "C" => {
                    format = if value.starts_with("420") {
                        PixelFormat::Yuv420p
                    } else if value == "mono" {
                        PixelFormat::Grayscale
                    } else {
                        return Err(SourceError::Failed(format!("unsupported colourspace C{}", value)).into());
                    }
                }
                // Interlacing, aspect and extensions do not affect decoding
                _ => {}
            }
        }

        if width == 0 || height == 0 {
            return Err(SourceError::Failed(format!("invalid Y4M geometry {}x{}", width, height)).into());
        }

        Ok(Self {
            width,
            height,
            framerate,
            format,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.format.required_len(self.width, self.height, self.width)
    }
}

/// YUV4MPEG2 file source
pub struct VideoFileSource {
    path: PathBuf,
    header: Y4mHeader,
    reader: Option<BufReader<File>>,
    paced: bool,
    index: u64,
    started_at: Option<Instant>,
    exhausted: bool,
}

impl VideoFileSource {
    /// Open a Y4M file and read its header
    pub fn open(path: &Path) -> SdkResult<Self> {
        if !path.exists() {
            return Err(SdkError::ResourceNotFound(path.display().to_string()));
        }
        let (header, _) = Self::open_reader(path)?;
        info!(
            path = %path.display(),
            width = header.width,
            height = header.height,
            fps = %header.framerate,
            "Opened video file source"
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            reader: None,
            paced: true,
            index: 0,
            started_at: None,
            exhausted: false,
        })
    }

    /// Deliver frames as fast as they can be read instead of in real time
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn header(&self) -> &Y4mHeader {
        &self.header
    }

    fn open_reader(path: &Path) -> SdkResult<(Y4mHeader, BufReader<File>)> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let header = Y4mHeader::parse(line.trim_end())?;
        Ok((header, reader))
    }

    fn read_frame(&mut self) -> SdkResult<Option<Vec<u8>>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut marker = String::new();
        if reader.read_line(&mut marker)? == 0 {
            return Ok(None);
        }
        if !marker.starts_with("FRAME") {
            return Err(SourceError::Failed(format!("corrupt frame marker in {}", self.path.display())).into());
        }

        let mut data = vec![0u8; self.header.frame_len()];
        match reader.read_exact(&mut data) {
            Ok(()) => Ok(Some(data)),
            // Truncated trailing frame ends the stream
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl FrameSource for VideoFileSource {
    fn kind(&self) -> InputSourceKind {
        InputSourceKind::VideoFile
    }

    fn start(&mut self) -> SdkResult<()> {
        let (_, reader) = Self::open_reader(&self.path)?;
        self.reader = Some(reader);
        self.index = 0;
        self.exhausted = false;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn stop(&mut self) {
        self.reader = None;
        self.started_at = None;
    }

    fn resume(&mut self) -> SdkResult<()> {
        // Re-anchor so the pause does not cause a catch-up burst
        self.started_at = Instant::now().checked_sub(self.header.framerate.timestamp_of(self.index));
        Ok(())
    }

    fn next_frame(&mut self, timeout: Duration) -> SdkResult<Option<Frame>> {
        if self.exhausted || self.reader.is_none() {
            std::thread::sleep(timeout);
            return Ok(None);
        }

        let timestamp = self.header.framerate.timestamp_of(self.index);
        if self.paced {
            let started = *self.started_at.get_or_insert_with(Instant::now);
            let elapsed = started.elapsed();
            if timestamp > elapsed {
                let wait = timestamp - elapsed;
                if wait > timeout {
                    std::thread::sleep(timeout);
                    return Ok(None);
                }
                std::thread::sleep(wait);
            }
        }

        let Some(data) = self.read_frame()? else {
            debug!(frames = self.index, path = %self.path.display(), "Video file exhausted");
            self.exhausted = true;
            return Ok(None);
        };
        self.index += 1;

        Frame::new(
            self.header.width,
            self.header.height,
            self.header.format,
            self.header.width,
            timestamp,
            data,
        )
        .map(Some)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_header() {
        let header = Y4mHeader::parse("YUV4MPEG2 W64 H48 F30000:1001 Ip A1:1 C420jpeg").unwrap();
        assert_eq!((header.width, header.height), (64, 48));
        assert_eq!(header.framerate, Framerate::new(30000, 1001));
        assert_eq!(header.format, PixelFormat::Yuv420p);
        assert_eq!(header.frame_len(), 64 * 48 * 3 / 2);

        assert!(Y4mHeader::parse("RIFF W2 H2").is_err());
        assert!(Y4mHeader::parse("YUV4MPEG2 W0 H2").is_err());
    }

    #[test]
    fn test_read_frames() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "YUV4MPEG2 W2 H2 F25:1 Ip A1:1 C420jpeg").unwrap();
        for value in [16u8, 128u8] {
            file.write_all(b"FRAME\n").unwrap();
            file.write_all(&[value; 6]).unwrap();
        }
        file.flush().unwrap();

        let mut source = VideoFileSource::open(file.path()).unwrap().unpaced();
        source.start().unwrap();

        let first = source.next_frame(Duration::ZERO).unwrap().unwrap();
        let second = source.next_frame(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.timestamp(), Duration::ZERO);
        assert_eq!(second.timestamp(), Duration::from_millis(40));
        assert_eq!(second.data()[0], 128);

        assert!(source.next_frame(Duration::ZERO).unwrap().is_none());
        assert!(source.is_exhausted());
    }

    #[test]
    fn test_image_emitted_once() {
        let mut source = ImageSource::from_image(RgbaImage::new(3, 2), "blank");
        source.start().unwrap();
        let frame = source.next_frame(Duration::ZERO).unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert!(source.is_exhausted());
        assert!(source.next_frame(Duration::ZERO).unwrap().is_none());

        source.start().unwrap();
        assert!(!source.is_exhausted());
    }
}

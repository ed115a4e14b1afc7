// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use lumafx::constants::VideoQuality;
use lumafx::constants::file_formats;

#[test]
fn test_video_quality_presets() {
    assert_eq!(VideoQuality::ALL.len(), 4);
    assert_eq!(VideoQuality::default(), VideoQuality::High);
}

#[test]
fn test_video_quality_ordering() {
    // Presets are ordered from lowest to highest quality
    let mut prev_bitrate = 0u32;
    for preset in VideoQuality::ALL {
        let bitrate = preset.bitrate_kbps();
        assert!(bitrate > prev_bitrate, "Presets should be ordered from lowest to highest");
        prev_bitrate = bitrate;
    }
}

#[test]
fn test_video_quality_sizes() {
    assert_eq!(VideoQuality::Low.video_size().1, 480);
    assert_eq!(VideoQuality::Medium.video_size(), (1280, 720));
    assert_eq!(VideoQuality::Ultra.video_size(), VideoQuality::High.video_size());
}

#[test]
fn test_file_extensions() {
    assert!(file_formats::is_image_extension("PNG"));
    assert!(file_formats::is_video_extension("y4m"));
    assert!(!file_formats::is_video_extension("mp4"));
}

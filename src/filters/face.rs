// SPDX-License-Identifier: GPL-3.0-only

//! Face detection collaborator
//!
//! Face landmark detection is supplied from outside the pipeline through
//! [`FaceDetector`]. Face-dependent stages (slimming, eye enlargement, nose
//! size, lipstick, blusher) read the detected faces for the current frame and
//! do nothing when the list is empty.

use serde::{Deserialize, Serialize};

/// Normalized (0..1) point in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Normalized (0..1) rectangle in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Point at fractional offsets inside the rectangle
    fn at(&self, fx: f32, fy: f32) -> Point {
        Point::new(self.x + self.width * fx, self.y + self.height * fy)
    }
}

/// Key facial landmarks used by the face stages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: Point,
    pub right_eye: Point,
    pub nose: Point,
    pub mouth: Point,
    pub left_cheek: Point,
    pub right_cheek: Point,
}

/// A detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceInfo {
    pub bounding_box: Rect,
    pub face_id: u32,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<FaceLandmarks>,
}

impl FaceInfo {
    pub fn new(face_id: u32, bounding_box: Rect, confidence: f32) -> Self {
        Self {
            bounding_box,
            face_id,
            confidence,
            landmarks: None,
        }
    }

    /// Landmarks reported by the detector, or estimated from typical facial
    /// proportions inside the bounding box
    pub fn landmarks_or_estimate(&self) -> FaceLandmarks {
        if let Some(landmarks) = self.landmarks {
            return landmarks;
        }
        let b = &self.bounding_box;
        FaceLandmarks {
            left_eye: b.at(0.32, 0.38),
            right_eye: b.at(0.68, 0.38),
            nose: b.at(0.5, 0.58),
            mouth: b.at(0.5, 0.78),
            left_cheek: b.at(0.25, 0.62),
            right_cheek: b.at(0.75, 0.62),
        }
    }
}

/// Supplies per-frame face information from an RGBA working buffer
pub trait FaceDetector: Send + Sync {
    fn detect(&self, rgba: &[u8], width: u32, height: u32) -> Vec<FaceInfo>;
}

/// Detector that reports a fixed set of faces for every frame
///
/// Used for offscreen processing where the caller already knows the face
/// geometry, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFaceDetector {
    faces: Vec<FaceInfo>,
}

impl StaticFaceDetector {
    pub fn new(faces: Vec<FaceInfo>) -> Self {
        Self { faces }
    }
}

impl FaceDetector for StaticFaceDetector {
    fn detect(&self, _rgba: &[u8], _width: u32, _height: u32) -> Vec<FaceInfo> {
        self.faces.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimated_landmarks_inside_box() {
        let face = FaceInfo::new(1, Rect::new(0.2, 0.2, 0.4, 0.5), 0.9);
        let lm = face.landmarks_or_estimate();
        assert!(lm.left_eye.x < lm.right_eye.x);
        assert!(lm.nose.y > lm.left_eye.y && lm.mouth.y > lm.nose.y);
        assert!(lm.mouth.y < 0.7);
    }
}

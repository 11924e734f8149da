//! Per-frame detection records.
//!
//! A [`DetectionRecord`] describes one tracked person in one frame as the
//! analysis SDK reports it. The session client reads it and never changes it.

use serde::{Deserialize, Serialize};

/// Face bounding box in frame pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub width: i32,
    /// Height
    pub height: i32,
}

/// A point in frame pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
}

/// Six emotion scores, each in [0, 1].
///
/// Serialized as a six-element array in [`Emotions::NAMES`] order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 6]", into = "[f32; 6]")]
pub struct Emotions {
    /// Happiness
    pub happy: f32,
    /// Surprise
    pub surprised: f32,
    /// Anger
    pub angry: f32,
    /// Disgust
    pub disgusted: f32,
    /// Fear
    pub afraid: f32,
    /// Sadness
    pub sad: f32,
}

impl Emotions {
    /// Wire field names, in vector order.
    pub const NAMES: [&'static str; 6] = [
        "happy",
        "surprised",
        "angry",
        "disgusted",
        "afraid",
        "sad",
    ];

    /// Scores in [`NAMES`](Self::NAMES) order.
    pub fn as_array(&self) -> [f32; 6] {
        [
            self.happy,
            self.surprised,
            self.angry,
            self.disgusted,
            self.afraid,
            self.sad,
        ]
    }
}

impl From<[f32; 6]> for Emotions {
    fn from(v: [f32; 6]) -> Self {
        Self {
            happy: v[0],
            surprised: v[1],
            angry: v[2],
            disgusted: v[3],
            afraid: v[4],
            sad: v[5],
        }
    }
}

impl From<Emotions> for [f32; 6] {
    fn from(e: Emotions) -> Self {
        e.as_array()
    }
}

/// An RGB color triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Six lowercase hex digits, `rrggbb`.
    pub fn hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// One tracked person in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRecord {
    /// Tracker identifier; records without one are not sent
    pub id: String,
    /// Estimated age in years
    pub age: i32,
    /// Gender score in [0, 1]
    pub gender: f32,
    /// Mood score in [0, 1]
    pub mood: f32,
    /// Face bounding box
    pub face: FaceRect,
    /// Head yaw
    pub head_yaw: f32,
    /// Head pitch
    pub head_pitch: f32,
    /// Head roll
    pub head_roll: f32,
    /// Right eye location
    pub right_eye: Point,
    /// Left eye location
    pub left_eye: Point,
    /// Attention span
    pub attention_span: f32,
    /// Emotion scores
    pub emotions: Emotions,
    /// Dominant clothing colors, may be empty
    pub clothing_colors: Vec<Rgb>,
}

impl DetectionRecord {
    /// Record with only an identifier set.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether the record can be sent.
    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Records observed in one frame, as replayed from JSON lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame number
    pub frame: u64,
    /// People in the frame
    #[serde(default)]
    pub people: Vec<DetectionRecord>,
}

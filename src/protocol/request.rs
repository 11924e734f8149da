//! Outbound field mapping.
//!
//! Every request is built fresh from the session key and the record being
//! sent; nothing carries over between records.
//!
//! Two wire quirks of the deployed service are kept on purpose:
//! `neutral` is always `"0"`, and by default the first three clothing colors
//! are written over the single `ClothesColors_1` field, so only the third
//! (or the last of fewer) is received.

use super::record::{DetectionRecord, Emotions};
use crate::config::{ColorFields, WireConfig};
use crate::transport::Request;

/// Request field names.
pub mod fields {
    /// Source (camera) name on start-session
    pub const SOURCE_NAME: &str = "source_name";
    /// Session key on every request after start
    pub const SESSION_KEY: &str = "session_key";
    /// Frame number
    pub const FRAME: &str = "frame";
    /// Person identifier
    pub const SDK_NAME: &str = "sdk_name";
    /// Age
    pub const AGE: &str = "age";
    /// Gender percent
    pub const GENDER: &str = "gender";
    /// Mood percent
    pub const MOOD: &str = "mood";
    /// Face box left
    pub const FACE_X: &str = "facePosition_x";
    /// Face box top
    pub const FACE_Y: &str = "facePosition_y";
    /// Face box width
    pub const FACE_W: &str = "facePosition_w";
    /// Face box height
    pub const FACE_H: &str = "facePosition_h";
    /// Head yaw
    pub const HEAD_YAW: &str = "headYaw";
    /// Head pitch
    pub const HEAD_PITCH: &str = "headPitch";
    /// Head roll
    pub const HEAD_ROLL: &str = "head_roll";
    /// Right eye x
    pub const RIGHT_EYE_X: &str = "rightEye_x";
    /// Right eye y
    pub const RIGHT_EYE_Y: &str = "rightEye_y";
    /// Left eye x
    pub const LEFT_EYE_X: &str = "leftEye_x";
    /// Left eye y
    pub const LEFT_EYE_Y: &str = "leftEye_y";
    /// Attention span
    pub const ATTENTION_SPAN: &str = "attention_span";
    /// Neutral emotion, always "0"
    pub const NEUTRAL: &str = "neutral";
    /// Prefix of the clothing color fields
    pub const CLOTHES_COLORS_PREFIX: &str = "ClothesColors_";
}

/// Scale a [0, 1] score to an integer percent, truncating toward zero.
///
/// The multiplication is done in `f32`, so `0.873` becomes `87` rather than
/// `88`. NaN maps to `0`.
pub fn score_percent(score: f32) -> i32 {
    (score * 100.0) as i32
}

/// `{source_name}` for start-session.
pub fn start_session(source_name: &str) -> Request {
    Request::new().with(fields::SOURCE_NAME, source_name)
}

/// `{session_key}` for stop-session.
pub fn stop_session(session_key: &str) -> Request {
    Request::new().with(fields::SESSION_KEY, session_key)
}

/// Fields for one person-detection request.
pub fn person_detection(
    session_key: &str,
    frame: u64,
    record: &DetectionRecord,
    wire: WireConfig,
) -> Request {
    let mut request = Request::new()
        .with(fields::SESSION_KEY, session_key)
        .with(fields::FRAME, frame.to_string())
        .with(fields::SDK_NAME, record.id.as_str())
        .with(fields::AGE, record.age.to_string())
        .with(fields::GENDER, score_percent(record.gender).to_string())
        .with(fields::MOOD, score_percent(record.mood).to_string())
        .with(fields::FACE_X, record.face.x.to_string())
        .with(fields::FACE_Y, record.face.y.to_string())
        .with(fields::FACE_W, record.face.width.to_string())
        .with(fields::FACE_H, record.face.height.to_string())
        .with(fields::HEAD_YAW, record.head_yaw.to_string())
        .with(fields::HEAD_PITCH, record.head_pitch.to_string())
        .with(fields::RIGHT_EYE_X, record.right_eye.x.to_string())
        .with(fields::RIGHT_EYE_Y, record.right_eye.y.to_string())
        .with(fields::LEFT_EYE_X, record.left_eye.x.to_string())
        .with(fields::LEFT_EYE_Y, record.left_eye.y.to_string())
        .with(fields::HEAD_ROLL, record.head_roll.to_string())
        .with(fields::ATTENTION_SPAN, record.attention_span.to_string())
        .with(fields::NEUTRAL, "0");

    for (name, score) in Emotions::NAMES.iter().zip(record.emotions.as_array()) {
        request.set(*name, score_percent(score).to_string());
    }

    match wire.color_fields {
        ColorFields::LastWins => {
            let shown = record.clothing_colors.iter().take(LAST_WINS_COLORS).last();
            if let Some(color) = shown {
                request.set(color_field(1), color.hex());
            }
        }
        ColorFields::Numbered => {
            for (i, color) in record.clothing_colors.iter().enumerate() {
                request.set(color_field(i + 1), color.hex());
            }
        }
    }

    request
}

/// Colors the deployed service writes over `ClothesColors_1`, in order.
const LAST_WINS_COLORS: usize = 3;

fn color_field(n: usize) -> String {
    format!("{}{n}", fields::CLOTHES_COLORS_PREFIX)
}

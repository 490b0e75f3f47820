//! # Camera frame module

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A single JPEG-encoded camera frame.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JpegFrame {
    /// UTC timestamp at which the frame was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// The JPEG image data
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl JpegFrame {
    /// Encode the frame's JPEG data as base64 text, the body format used by
    /// the `/camera` HTTP endpoint.
    pub fn to_base64(&self) -> String {
        base64::encode(&self.data)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_base64_round_trip() {
        let frame = JpegFrame {
            timestamp: Utc::now(),
            data: vec![0xff, 0xd8, 0xff, 0xe0],
        };

        let text = frame.to_base64();
        assert_eq!(base64::decode(&text).unwrap(), frame.data);
    }
}

//! Variant descriptors and processed-variant records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static configuration for one target rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantDescriptor {
    /// Logical name, e.g. `1080p`
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl VariantDescriptor {
    /// Target video bitrate as an ffmpeg `-b:v` argument, e.g. `4000k`.
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

/// The fixed ladder of renditions produced for every job.
pub const VARIANTS: &[VariantDescriptor] = &[
    VariantDescriptor { name: "1080p", width: 1920, height: 1080, bitrate_kbps: 4000 },
    VariantDescriptor { name: "720p", width: 1280, height: 720, bitrate_kbps: 2000 },
    VariantDescriptor { name: "480p", width: 854, height: 480, bitrate_kbps: 1000 },
    VariantDescriptor { name: "360p", width: 640, height: 360, bitrate_kbps: 500 },
    VariantDescriptor { name: "240p", width: 426, height: 240, bitrate_kbps: 250 },
    VariantDescriptor { name: "144p", width: 256, height: 144, bitrate_kbps: 100 },
];

/// Look up a descriptor by logical name.
pub fn variant_by_name(name: &str) -> Option<&'static VariantDescriptor> {
    VARIANTS.iter().find(|v| v.name == name)
}

/// A per-variant output record.
///
/// `(video_id, variant_name)` is unique; the row is only ever written
/// through the upsert, which replaces every other column.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessedVariant {
    pub id: Uuid,
    pub video_id: Uuid,
    pub variant_name: String,
    pub bucket: String,
    /// Object key of the container (mp4) file
    pub key: String,
    pub content_type: String,
    pub hls_playlist_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bitrate_kbps: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for the `(video_id, variant_name)` upsert.
#[derive(Debug, Clone)]
pub struct VariantUpsert {
    pub video_id: Uuid,
    pub variant_name: String,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub hls_playlist_key: Option<String>,
    pub thumbnail_key: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bitrate_kbps: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_has_six_renditions() {
        assert_eq!(VARIANTS.len(), 6);
        let names: Vec<_> = VARIANTS.iter().map(|v| v.name).collect();
        assert_eq!(names, ["1080p", "720p", "480p", "360p", "240p", "144p"]);
    }

    #[test]
    fn bitrate_arg_formats_kbps() {
        let v = variant_by_name("1080p").unwrap();
        assert_eq!(v.bitrate_arg(), "4000k");
        assert_eq!(variant_by_name("144p").unwrap().bitrate_arg(), "100k");
    }

    #[test]
    fn unknown_variant_name_is_none() {
        assert!(variant_by_name("4k").is_none());
    }
}

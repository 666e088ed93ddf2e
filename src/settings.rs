//! Settings management for Canvas Video
//!
//! Playback tuning persisted as XML in the user's config directory.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::video::{DecodeLimits, FormatFamily};

/// Playback and decode tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "CanvasVideoSettings")]
pub struct VideoSettings {
    /// Largest decoded width before the decoder is asked to downscale
    #[serde(rename = "maxDecodeWidth", default = "default_max_decode_width")]
    pub max_decode_width: u32,

    #[serde(rename = "maxDecodeHeight", default = "default_max_decode_height")]
    pub max_decode_height: u32,

    /// Floor for the per-frame duration in seconds
    #[serde(rename = "minFrameDuration", default = "default_min_frame_duration")]
    pub min_frame_duration: f32,

    /// Frames per second assumed when the stream does not say
    #[serde(rename = "defaultFrameRate", default = "default_frame_rate")]
    pub default_frame_rate: u32,

    /// Frames one update may step through to catch up
    #[serde(rename = "maxCatchUpSteps", default = "default_max_catch_up_steps")]
    pub max_catch_up_steps: u32,

    /// Comma-separated output formats in negotiation order
    #[serde(rename = "candidateFormats", default = "default_candidate_formats")]
    pub candidate_formats: String,

    /// Try hardware decoding before software
    #[serde(rename = "hardwareDecode", default = "default_true")]
    pub hardware_decode: bool,

    /// Allow pixel format conversion and scaled decode in the reader.
    /// When off, only formats the decoder emits natively are accepted.
    #[serde(rename = "softwareConversion", default = "default_true")]
    pub software_conversion: bool,

    /// Read hardware frames through a staging copy before falling back to mapping
    #[serde(rename = "preferGpuStaging", default = "default_true")]
    pub prefer_gpu_staging: bool,

    #[serde(rename = "startLooping", default)]
    pub start_looping: bool,
}

fn default_max_decode_width() -> u32 {
    640
}

fn default_max_decode_height() -> u32 {
    480
}

fn default_min_frame_duration() -> f32 {
    1.0 / 120.0
}

fn default_frame_rate() -> u32 {
    30
}

fn default_max_catch_up_steps() -> u32 {
    4
}

fn default_candidate_formats() -> String {
    FormatFamily::DEFAULT_PRIORITY
        .iter()
        .map(|family| family.label())
        .collect::<Vec<_>>()
        .join(",")
}

fn default_true() -> bool {
    true
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            max_decode_width: default_max_decode_width(),
            max_decode_height: default_max_decode_height(),
            min_frame_duration: default_min_frame_duration(),
            default_frame_rate: default_frame_rate(),
            max_catch_up_steps: default_max_catch_up_steps(),
            candidate_formats: default_candidate_formats(),
            hardware_decode: true,
            software_conversion: true,
            prefer_gpu_staging: true,
            start_looping: false,
        }
    }
}

impl VideoSettings {
    /// Clamp values into usable ranges and drop unknown format names
    pub fn sanitize(&mut self) {
        self.max_decode_width = self.max_decode_width.max(2);
        self.max_decode_height = self.max_decode_height.max(2);
        if !(self.min_frame_duration.is_finite() && self.min_frame_duration > 0.0) {
            self.min_frame_duration = default_min_frame_duration();
        }
        self.default_frame_rate = self.default_frame_rate.max(1);
        self.max_catch_up_steps = self.max_catch_up_steps.max(1);

        let known: Vec<&str> = self
            .candidate_formats
            .split(',')
            .filter_map(|name| {
                let family = FormatFamily::from_label(name);
                if family.is_none() && !name.trim().is_empty() {
                    tracing::warn!(format = name.trim(), "Ignoring unknown candidate format");
                }
                family.map(FormatFamily::label)
            })
            .collect();
        self.candidate_formats = if known.is_empty() {
            default_candidate_formats()
        } else {
            known.join(",")
        };
    }

    /// Candidate formats in negotiation order, duplicates removed
    pub fn candidates(&self) -> Vec<FormatFamily> {
        let mut families = Vec::new();
        for family in self.candidate_formats.split(',').filter_map(FormatFamily::from_label) {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        if families.is_empty() {
            families.extend(FormatFamily::DEFAULT_PRIORITY);
        }
        families
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_width: self.max_decode_width.max(2),
            max_height: self.max_decode_height.max(2),
            default_frame_rate: (self.default_frame_rate.max(1), 1),
            min_frame_duration: self.min_frame_duration,
        }
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let mut settings: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Get the settings file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("CanvasVideo");
            p.push("video.xml");
            p
        })
    }

    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Using default video settings");
                Self::default()
            }
        }
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::default_path() else {
            return Err(SettingsError::NoConfigDir);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }

        self.save_to_file(&path)
    }
}

/// Settings-related errors
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    XmlParse(quick_xml::DeError),
    XmlWrite(quick_xml::SeError),
    NoConfigDir,
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::XmlParse(e) => write!(f, "XML parse error: {}", e),
            SettingsError::XmlWrite(e) => write!(f, "XML write error: {}", e),
            SettingsError::NoConfigDir => write!(f, "Could not find config directory"),
        }
    }
}

impl std::error::Error for SettingsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = VideoSettings::default();
        assert_eq!(settings.max_decode_width, 640);
        assert_eq!(settings.max_decode_height, 480);
        assert_eq!(settings.max_catch_up_steps, 4);
        assert_eq!(settings.candidate_formats, "RGB32,ARGB32,RGBA32,ABGR32,NV12,YUY2,RGB24");
        assert_eq!(settings.candidates(), FormatFamily::DEFAULT_PRIORITY.to_vec());
        assert!(settings.prefer_gpu_staging);
        assert!(!settings.start_looping);
    }

    #[test]
    fn test_sanitize() {
        let mut settings = VideoSettings {
            max_decode_width: 0,
            min_frame_duration: -1.0,
            max_catch_up_steps: 0,
            candidate_formats: "nv12, P010 ,rgb24".to_string(),
            ..VideoSettings::default()
        };
        settings.sanitize();
        assert_eq!(settings.max_decode_width, 2);
        assert_eq!(settings.max_catch_up_steps, 1);
        assert!((settings.min_frame_duration - 1.0 / 120.0).abs() < 1e-9);
        assert_eq!(settings.candidate_formats, "NV12,RGB24");

        settings.candidate_formats = "bogus".to_string();
        settings.sanitize();
        assert_eq!(settings.candidates(), FormatFamily::DEFAULT_PRIORITY.to_vec());
    }

    #[test]
    fn test_xml_round_trip() {
        let settings = VideoSettings {
            max_decode_width: 1280,
            start_looping: true,
            candidate_formats: "NV12,RGB32".to_string(),
            ..VideoSettings::default()
        };
        let xml = to_string(&settings).unwrap();
        assert!(xml.contains("<maxDecodeWidth>1280</maxDecodeWidth>"));
        let parsed: VideoSettings = from_str(&xml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let xml = "<CanvasVideoSettings><startLooping>true</startLooping></CanvasVideoSettings>";
        let parsed: VideoSettings = from_str(xml).unwrap();
        assert!(parsed.start_looping);
        assert_eq!(parsed.max_decode_height, 480);
        assert!(parsed.hardware_decode);
    }
}

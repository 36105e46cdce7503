//! Render job payload: the composition to render and its encoder options.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Input properties handed to the remote composition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositionProps {
    /// Generated composition source
    pub code: String,
    pub duration_in_frames: u32,
    pub fps: u32,
}

impl CompositionProps {
    pub fn new(code: impl Into<String>, duration_in_frames: u32, fps: u32) -> Self {
        Self {
            code: code.into(),
            duration_in_frames,
            fps,
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        f64::from(self.duration_in_frames) / f64::from(self.fps)
    }
}

/// Output codec.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    H264,
    H265,
    Vp8,
    Vp9,
    Prores,
    Gif,
}

impl Codec {
    /// File extension of the rendered artifact.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Codec::H264 | Codec::H265 => "mp4",
            Codec::Vp8 | Codec::Vp9 => "webm",
            Codec::Prores => "mov",
            Codec::Gif => "gif",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "h264" => Some(Codec::H264),
            "h265" => Some(Codec::H265),
            "vp8" => Some(Codec::Vp8),
            "vp9" => Some(Codec::Vp9),
            "prores" => Some(Codec::Prores),
            "gif" => Some(Codec::Gif),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p,
    Yuv444p,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProresProfile {
    #[serde(rename = "proxy")]
    Proxy,
    #[serde(rename = "light")]
    Light,
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "hq")]
    Hq,
    #[serde(rename = "4444")]
    P4444,
    #[serde(rename = "4444-xq")]
    P4444Xq,
}

/// Encoder options for a render job. Unset fields use service defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default)]
    pub codec: Codec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<PixelFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_format: Option<ImageFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    /// Only honoured for [`Codec::Prores`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prores_profile: Option<ProresProfile>,
}

impl RenderOptions {
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn crf(mut self, crf: u8) -> Self {
        self.crf = Some(crf);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = Some(quality);
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(crf) = self.crf {
            if crf > 63 {
                return Err(ConfigError::InvalidRequest(format!(
                    "crf must be between 0 and 63, got {}",
                    crf
                )));
            }
        }
        if let Some(quality) = self.jpeg_quality {
            if quality > 100 {
                return Err(ConfigError::InvalidRequest(format!(
                    "jpegQuality must be between 0 and 100, got {}",
                    quality
                )));
            }
        }
        Ok(())
    }

    /// Options as they should be sent: the prores profile is dropped for other codecs.
    pub fn normalized(&self) -> Self {
        let mut options = self.clone();
        if options.codec != Codec::Prores {
            options.prores_profile = None;
        }
        options
    }

    /// Download file name for the rendered artifact.
    pub fn output_file_name(&self) -> String {
        format!("video.{}", self.codec.file_extension())
    }
}

/// Payload submitted to the render service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub input_props: CompositionProps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_options: Option<RenderOptions>,
}

impl RenderRequest {
    pub fn new(input_props: CompositionProps) -> Self {
        Self {
            input_props,
            render_options: None,
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.render_options = Some(options.normalized());
        self
    }

    pub fn codec(&self) -> Codec {
        self.render_options
            .as_ref()
            .map(|o| o.codec)
            .unwrap_or_default()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.input_props.code.trim().is_empty() {
            return Err(ConfigError::InvalidRequest("composition code is empty".to_string()));
        }
        if self.input_props.fps == 0 {
            return Err(ConfigError::InvalidRequest("fps must be greater than zero".to_string()));
        }
        if self.input_props.duration_in_frames == 0 {
            return Err(ConfigError::InvalidRequest(
                "durationInFrames must be greater than zero".to_string(),
            ));
        }
        if let Some(options) = &self.render_options {
            options.validate()?;
        }
        Ok(())
    }
}

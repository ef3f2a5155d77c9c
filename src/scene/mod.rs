use crate::error::VideoError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One unit of a script, rendered as one short clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    /// Scene number, unique within a script; defines render and display order
    #[serde(deserialize_with = "scene_number_from_json")]
    pub scene_number: u32,
    /// Slug line, e.g. "INT. COFFEE SHOP - DAY"
    pub setting: String,
    /// Short summary of the scene
    pub description: String,
    /// Exact prompt handed to the video model
    pub veo_prompt: String,
}

impl Scene {
    pub fn new(
        scene_number: u32,
        setting: impl Into<String>,
        description: impl Into<String>,
        veo_prompt: impl Into<String>,
    ) -> Self {
        Self {
            scene_number,
            setting: setting.into(),
            description: description.into(),
            veo_prompt: veo_prompt.into(),
        }
    }
}

/// A generated video script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    pub description: String,
    pub scenes: Vec<Scene>,
}

/// Accept any JSON number with an integral value, e.g. `2` or `2.0`.
fn scene_number_from_json<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.fract() != 0.0 || raw < 0.0 || raw > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!(
            "sceneNumber must be a whole number, got {}",
            raw
        )));
    }
    Ok(raw as u32)
}

/// Frame shape applied to every scene of one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            "9:16" | "portrait" => Ok(AspectRatio::Portrait),
            other => Err(VideoError::InvalidInput(format!(
                "unsupported aspect ratio '{}', expected 16:9 or 9:16",
                other
            ))),
        }
    }
}

/// Preset script styles offered to the author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScriptStyle {
    #[default]
    Cinematic,
    Documentary,
    Vlog,
    Commercial,
    SciFi,
    Fantasy,
    Comedy,
}

impl ScriptStyle {
    pub const ALL: [ScriptStyle; 7] = [
        ScriptStyle::Cinematic,
        ScriptStyle::Documentary,
        ScriptStyle::Vlog,
        ScriptStyle::Commercial,
        ScriptStyle::SciFi,
        ScriptStyle::Fantasy,
        ScriptStyle::Comedy,
    ];

    /// Label used both in the UI and in the generation prompt.
    pub fn label(&self) -> &'static str {
        match self {
            ScriptStyle::Cinematic => "Cinematic",
            ScriptStyle::Documentary => "Documentary",
            ScriptStyle::Vlog => "Vlog",
            ScriptStyle::Commercial => "Commercial",
            ScriptStyle::SciFi => "Sci-Fi",
            ScriptStyle::Fantasy => "Fantasy",
            ScriptStyle::Comedy => "Comedy",
        }
    }
}

impl fmt::Display for ScriptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ScriptStyle {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ScriptStyle::ALL
            .into_iter()
            .find(|style| style.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = ScriptStyle::ALL.iter().map(|s| s.label()).collect();
                VideoError::InvalidInput(format!(
                    "unknown style '{}', expected one of: {}",
                    wanted,
                    known.join(", ")
                ))
            })
    }
}

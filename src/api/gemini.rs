use crate::api::{clamp_progress, Operation, ScriptService, VideoService};
use crate::config::Config;
use crate::error::{Result, VideoError};
use crate::scene::{AspectRatio, Script, ScriptStyle};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

const VIDEO_RESOLUTION: &str = "720p";

/// Gemini / Veo REST client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    api_base: String,
    text_model: String,
    video_model: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    name: String,
    #[serde(default)]
    done: bool,
    metadata: Option<OperationMetadata>,
    response: Option<OperationResult>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationMetadata {
    #[serde(rename = "progressPercent")]
    progress_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OperationResult {
    #[serde(rename = "generateVideoResponse")]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples", default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

impl OperationResponse {
    fn into_operation(self, fail: fn(String) -> VideoError) -> Result<Operation> {
        if let Some(error) = self.error {
            return Err(fail(match error.code {
                Some(code) => format!("operation {} failed ({}): {}", self.name, code, error.message),
                None => format!("operation {} failed: {}", self.name, error.message),
            }));
        }

        let result_locator = self
            .response
            .and_then(|r| r.generate_video_response)
            .and_then(|r| r.generated_samples.into_iter().next())
            .and_then(|s| s.video)
            .and_then(|v| v.uri);

        Ok(Operation {
            name: self.name,
            done: self.done,
            progress_percent: self
                .metadata
                .and_then(|m| m.progress_percent)
                .map(clamp_progress),
            result_locator,
        })
    }
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(VideoError::Configuration(
                "API key is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| VideoError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            text_model: config.text_model.clone(),
            video_model: config.video_model.clone(),
            client,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    async fn request_script(&self, idea: &str, style: ScriptStyle) -> Result<Script> {
        let request_body = json!({
            "contents": [
                { "parts": [ { "text": build_script_prompt(idea, style) } ] }
            ],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": script_response_schema()
            }
        });

        let response = self
            .client
            .post(self.model_url(&self.text_model, "generateContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VideoError::Generation(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let body: GenerateContentResponse = response.json().await?;
        let generated_text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| VideoError::Generation("No content in Gemini response".to_string()))?;

        debug!("Generated script text: {}", generated_text);
        parse_script(&generated_text)
    }

    async fn request_submit(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<Operation> {
        let request_body = json!({
            "instances": [ { "prompt": prompt } ],
            "parameters": {
                "aspectRatio": aspect_ratio.as_str(),
                "resolution": VIDEO_RESOLUTION,
                "numberOfVideos": 1
            }
        });

        let response = self
            .client
            .post(self.model_url(&self.video_model, "predictLongRunning"))
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VideoError::Submission(format!(
                "Veo API returned {}: {}",
                status, error_text
            )));
        }

        let body: OperationResponse = response.json().await?;
        body.into_operation(VideoError::Submission)
    }

    async fn request_poll(&self, operation: &Operation) -> Result<Operation> {
        let response = self
            .client
            .get(format!("{}/{}", self.api_base, operation.name))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VideoError::Poll(format!(
                "status check for {} returned {}: {}",
                operation.name, status, error_text
            )));
        }

        let body: OperationResponse = response.json().await?;
        body.into_operation(VideoError::Poll)
    }

    async fn request_download(&self, locator: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(locator)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VideoError::Download(format!(
                "Failed to download video: {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?)
    }
}

/// Re-tag transport and decoding failures with the stage they happened in.
fn tag(err: VideoError, stage: fn(String) -> VideoError) -> VideoError {
    match err {
        VideoError::Http(e) => stage(e.to_string()),
        VideoError::Json(e) => stage(format!("malformed response: {}", e)),
        other => other,
    }
}

#[async_trait]
impl ScriptService for GeminiClient {
    async fn generate(&self, idea: &str, style: ScriptStyle) -> Result<Script> {
        info!("Generating {} script with {}", style, self.text_model);
        let script = self
            .request_script(idea, style)
            .await
            .map_err(|e| tag(e, VideoError::Generation))?;
        info!("Generated script '{}' with {} scenes", script.title, script.scenes.len());
        Ok(script)
    }
}

#[async_trait]
impl VideoService for GeminiClient {
    async fn submit(&self, prompt: &str, aspect_ratio: AspectRatio) -> Result<Operation> {
        let operation = self
            .request_submit(prompt, aspect_ratio)
            .await
            .map_err(|e| tag(e, VideoError::Submission))?;
        info!("Video generation submitted: {}", operation.name);
        Ok(operation)
    }

    async fn poll(&self, operation: &Operation) -> Result<Operation> {
        self.request_poll(operation)
            .await
            .map_err(|e| tag(e, VideoError::Poll))
    }

    async fn download(&self, locator: &str) -> Result<Bytes> {
        self.request_download(locator)
            .await
            .map_err(|e| tag(e, VideoError::Download))
    }
}

fn build_script_prompt(idea: &str, style: ScriptStyle) -> String {
    format!(
        "You are a professional screenwriter. Based on the following idea: '{}', create a video script \
with a '{}' style. The output must be a valid JSON object. The JSON should have a 'title' (string), \
a 'description' (string), and an array of 'scenes'. Each scene object in the array must have \
'sceneNumber' (number), 'setting' (string, e.g., 'INT. COFFEE SHOP - DAY'), 'description' (string, \
a short summary of the scene), and 'veoPrompt' (string, a detailed, vivid, and cinematic prompt for \
a text-to-video AI like Veo, describing the visual elements, characters, actions, camera angles, and \
mood of the scene in a single paragraph). Generate at least 3 scenes.",
        idea,
        style.label()
    )
}

fn script_response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "description": { "type": "STRING" },
            "scenes": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "sceneNumber": { "type": "INTEGER" },
                        "setting": { "type": "STRING" },
                        "description": { "type": "STRING" },
                        "veoPrompt": { "type": "STRING" }
                    },
                    "required": ["sceneNumber", "setting", "description", "veoPrompt"]
                }
            }
        },
        "required": ["title", "description", "scenes"]
    })
}

/// Parse the model output into a script, tolerating markdown code fences.
fn parse_script(text: &str) -> Result<Script> {
    let json_text = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let script: Script = serde_json::from_str(json_text).map_err(|e| {
        VideoError::Generation(format!(
            "Failed to generate a valid script, the response was not in the correct format: {}",
            e
        ))
    })?;

    if script.scenes.is_empty() {
        return Err(VideoError::Generation(
            "Generated script contains no scenes".to_string(),
        ));
    }

    Ok(script)
}

use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Image,
    Text,
    Refine,
    Recommendations,
}

/// Input handed to the AI collaborator. `prompt` carries the fixed
/// instructions plus any text context.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub kind: RequestKind,
    pub prompt: String,
    pub image: Option<Bytes>,
    pub food_name: Option<String>,
    pub description: Option<String>,
    pub context: Option<String>,
    pub previous: Option<Value>,
    pub feedback: Option<String>,
}

impl AnalysisRequest {
    pub fn new(kind: RequestKind, prompt: String) -> Self {
        Self {
            kind,
            prompt,
            image: None,
            food_name: None,
            description: None,
            context: None,
            previous: None,
            feedback: None,
        }
    }
}

/// The external model. Returns whatever JSON the model produced; shaping it
/// is the normalizer's job.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value, AnalysisError>;
}

lazy_static! {
    static ref CODE_FENCE_RE: Regex = Regex::new(r"```(?:json)?").expect("static regex");
}

/// Parse model text that may be wrapped in markdown code fences.
pub fn parse_model_text(text: &str) -> Result<Value, AnalysisError> {
    let cleaned = CODE_FENCE_RE.replace_all(text, "");
    serde_json::from_str(cleaned.trim()).map_err(|e| AnalysisError::Malformed(e.to_string()))
}

/// Talks to an HTTP analysis endpoint that fronts the model.
#[derive(Clone)]
pub struct HttpAnalysisProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value, AnalysisError> {
        let body = json!({
            "mode": request.kind,
            "prompt": request.prompt,
            "base64Image": request.image.as_deref().map(Base64::encode_string),
            "foodName": request.food_name,
            "description": request.description,
            "context": request.context,
            "previousResult": request.previous,
            "feedback": request.feedback,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = resp.status();
        let text = resp.text().await.map_err(map_reqwest)?;
        if !status.is_success() {
            warn!(%status, kind = ?request.kind, "analysis endpoint returned error");
            return Err(status_error(status, &text));
        }
        debug!(kind = ?request.kind, bytes = text.len(), "analysis response received");
        parse_model_text(&text)
    }
}

/// A refused connection means nothing is listening; anything else may pass.
fn map_reqwest(e: reqwest::Error) -> AnalysisError {
    if e.is_timeout() {
        AnalysisError::Timeout
    } else if e.is_connect() {
        warn!(error = %e, "analysis endpoint unreachable");
        AnalysisError::Unavailable
    } else {
        AnalysisError::Transient(e.to_string())
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> AnalysisError {
    if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
        AnalysisError::Unavailable
    } else {
        AnalysisError::Transient(format!("{status}: {body}"))
    }
}

/// Canned answers used when no analysis endpoint is configured.
#[derive(Clone)]
pub struct MockAnalysisProvider {
    delay: Duration,
}

impl MockAnalysisProvider {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockAnalysisProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl AnalysisProvider for MockAnalysisProvider {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value, AnalysisError> {
        tokio::time::sleep(self.delay).await;
        let value = match request.kind {
            RequestKind::Image => json!({
                "foodName": "Sample Meal (Mock)",
                "glycemicIndex": 55,
                "glycemicLoad": 15,
                "confidenceScore": 0.9,
                "nutritionalInfo": { "calories": 350, "carbs": 45, "protein": 12, "fat": 10, "fiber": 5, "sugar": 4 },
                "analysis": "This is a balanced meal with a moderate glycemic impact.",
                "recommendations": [
                    "Consider adding more leafy greens.",
                    "A 10-minute walk after this meal would be beneficial."
                ],
                "sugarSpeed": "Moderate",
                "energyStability": "Stable",
                "addedSugar": { "detected": false }
            }),
            RequestKind::Text => {
                let name = request.food_name.unwrap_or_default();
                json!({
                    "foodName": name,
                    "glycemicIndex": 60,
                    "glycemicLoad": 18,
                    "confidenceScore": 0.85,
                    "nutritionalInfo": { "calories": 250, "carbs": 30, "protein": 5, "fat": 8, "fiber": 3, "sugar": 2 },
                    "analysis": format!("AI Analysis for {name}."),
                    "recommendations": ["Consider a smaller portion."],
                    "sugarSpeed": "Moderate",
                    "energyStability": "Unsteady",
                    "addedSugar": { "detected": false },
                    "addedSugarLikely": false
                })
            }
            RequestKind::Refine => {
                let feedback = request.feedback.unwrap_or_default();
                let mut value = request.previous.unwrap_or_else(|| json!({}));
                if let Some(obj) = value.as_object_mut() {
                    obj.insert(
                        "analysis".into(),
                        json!(format!("Refined analysis based on feedback: \"{feedback}\".")),
                    );
                    obj.insert("confidenceScore".into(), json!(0.95));
                }
                value
            }
            RequestKind::Recommendations => json!([
                "Try Brown Rice or Quinoa instead for more fiber.",
                "Add a side of Cucumber Raita to lower the glycemic impact."
            ]),
        };
        Ok(value)
    }
}

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::cache::AnalysisCache;
use super::normalize::normalize;
use super::prompt;
use super::provider::{AnalysisProvider, AnalysisRequest, RequestKind};
use super::types::NutritionalAnalysisResult;
use crate::error::AnalysisError;

/// Front door to the AI collaborator: adds the timeout, the image cache and
/// normalization around raw provider calls.
pub struct AnalysisService {
    provider: Arc<dyn AnalysisProvider>,
    cache: AnalysisCache,
    timeout: Duration,
}

impl AnalysisService {
    pub fn new(provider: Arc<dyn AnalysisProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            cache: AnalysisCache::new(),
            timeout,
        }
    }

    async fn call(&self, request: AnalysisRequest) -> Result<Value, AnalysisError> {
        tokio::time::timeout(self.timeout, self.provider.analyze(request))
            .await
            .map_err(|_| AnalysisError::Timeout)?
    }

    /// Analyse a meal photo. Identical images are served from the cache.
    #[instrument(skip_all, fields(bytes = image.len()))]
    pub async fn analyze_food(&self, image: Bytes) -> Result<NutritionalAnalysisResult, AnalysisError> {
        let key = AnalysisCache::key(&image);
        if let Some(hit) = self.cache.get(&key) {
            debug!("analysis cache hit");
            return Ok(hit);
        }

        let mut request = AnalysisRequest::new(RequestKind::Image, prompt::SYSTEM_PROMPT.to_string());
        request.image = Some(image);
        let result = normalize(&self.call(request).await?);
        info!(food = %result.food_name, gl = result.glycemic_load, "image analysed");
        Ok(self.cache.put(key, result))
    }

    #[instrument(skip(self))]
    pub async fn analyze_text(
        &self,
        name: &str,
        description: &str,
        context: &str,
    ) -> Result<NutritionalAnalysisResult, AnalysisError> {
        let mut request = AnalysisRequest::new(
            RequestKind::Text,
            prompt::text_prompt(name, description, context),
        );
        request.food_name = Some(name.to_string());
        request.description = Some(description.to_string());
        request.context = Some(context.to_string());
        let result = normalize(&self.call(request).await?);
        info!(food = %result.food_name, gl = result.glycemic_load, "text analysed");
        Ok(result)
    }

    /// Re-run an earlier analysis in light of user feedback. Never cached.
    #[instrument(skip(self, image, previous))]
    pub async fn refine(
        &self,
        image: Option<Bytes>,
        previous: &NutritionalAnalysisResult,
        feedback: &str,
    ) -> Result<NutritionalAnalysisResult, AnalysisError> {
        let mut request = AnalysisRequest::new(
            RequestKind::Refine,
            prompt::refine_prompt(previous, feedback, image.is_some()),
        );
        request.image = image;
        request.previous = serde_json::to_value(previous).ok();
        request.feedback = Some(feedback.to_string());
        let result = normalize(&self.call(request).await?);
        info!(food = %result.food_name, gl = result.glycemic_load, "analysis refined");
        Ok(result)
    }

    /// Short advice list for a high-GL food.
    #[instrument(skip(self))]
    pub async fn recommendations_for(&self, food_name: &str) -> Result<Vec<String>, AnalysisError> {
        let mut request = AnalysisRequest::new(
            RequestKind::Recommendations,
            prompt::recommendations_prompt(food_name),
        );
        request.food_name = Some(food_name.to_string());
        let value = self.call(request).await?;
        let recs: Vec<String> = value
            .as_array()
            .ok_or_else(|| AnalysisError::Malformed("expected an array of strings".into()))?
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect();
        Ok(recs)
    }

    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }
}

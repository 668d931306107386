use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use base64ct::{Base64, Encoding};

use super::types::NutritionalAnalysisResult;

/// Bytes sampled from each of the start, middle and end of an image.
const SAMPLE_WINDOW: usize = 96;

/// Process-lifetime memo of image analyses, keyed by a sampled fingerprint
/// of the image bytes. Unbounded; nothing is ever evicted.
#[derive(Default)]
pub struct AnalysisCache {
    entries: Mutex<HashMap<String, NutritionalAnalysisResult>>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `len:start:middle:end`, each sample base64 encoded. Payloads small
    /// enough to fit in three windows are keyed on their full contents.
    pub fn key(image: &[u8]) -> String {
        let len = image.len();
        if len <= SAMPLE_WINDOW * 3 {
            return format!("{}:{}", len, Base64::encode_string(image));
        }
        let mid = len / 2 - SAMPLE_WINDOW / 2;
        format!(
            "{}:{}:{}:{}",
            len,
            Base64::encode_string(&image[..SAMPLE_WINDOW]),
            Base64::encode_string(&image[mid..mid + SAMPLE_WINDOW]),
            Base64::encode_string(&image[len - SAMPLE_WINDOW..]),
        )
    }

    pub fn get(&self, key: &str) -> Option<NutritionalAnalysisResult> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store `result` unless another analysis of the same image got there
    /// first; returns whichever result is now cached so concurrent callers
    /// agree.
    pub fn put(&self, key: String, result: NutritionalAnalysisResult) -> NutritionalAnalysisResult {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(result)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

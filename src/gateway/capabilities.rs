//! Typed operations over the generic call primitive.
//!
//! Each operation builds one call of a fixed [`CallKind`], sends its typed
//! arguments as the call's `context` (tagged with the operation's name under
//! `"operation"`) and projects the worker's payload into the return type. A
//! missing or `null` payload yields the return type's default.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::call::CallSettings;
use super::types::{Anomaly, Classification, Recommendation, SearchHit, Sentiment};
use super::Gateway;
use crate::worker::{CallKind, GatewayError, GatewayResult, OptionOverrides};

/// A failed capability operation.
#[derive(Error, Debug)]
#[error("{operation} failed: {source}")]
pub struct CapabilityError {
    /// Wire name of the operation, e.g. `summarize_text`.
    pub operation: &'static str,
    pub source: GatewayError,
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Typed view over a [`Gateway`].
///
/// The settings given here apply to every operation issued through the view.
#[derive(Debug, Clone)]
pub struct Capabilities<'g> {
    gateway: &'g Gateway,
    settings: CallSettings,
}

impl<'g> Capabilities<'g> {
    pub(crate) fn new(gateway: &'g Gateway) -> Self {
        Self {
            gateway,
            settings: CallSettings::default(),
        }
    }

    pub fn with_options(mut self, options: OptionOverrides) -> Self {
        self.settings.options = options;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.settings.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.settings.cancellation = Some(token);
        self
    }

    async fn invoke<T>(
        &self,
        operation: &'static str,
        kind: CallKind,
        prompt: String,
        args: Value,
    ) -> CapabilityResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let context = tag_operation(operation, args);
        self.gateway
            .call(kind, prompt, Some(context), &self.settings)
            .await
            .and_then(project)
            .map_err(|source| CapabilityError { operation, source })
    }

    pub async fn search(&self, query: &str, filters: Option<Value>) -> CapabilityResult<Vec<SearchHit>> {
        self.invoke(
            "search",
            CallKind::Search,
            query.to_string(),
            json!({ "query": query, "filters": filters }),
        )
        .await
    }

    pub async fn get_recommendations(
        &self,
        subject: &str,
        limit: usize,
    ) -> CapabilityResult<Vec<Recommendation>> {
        self.invoke(
            "get_recommendations",
            CallKind::Recommend,
            format!("Recommend up to {} items related to: {}", limit, subject),
            json!({ "subject": subject, "limit": limit }),
        )
        .await
    }

    pub async fn generate_content(&self, topic: &str, content_type: &str) -> CapabilityResult<String> {
        self.invoke(
            "generate_content",
            CallKind::Generate,
            format!("Write a {} about: {}", content_type, topic),
            json!({ "topic": topic, "contentType": content_type }),
        )
        .await
    }

    pub async fn analyze_sentiment(&self, text: &str) -> CapabilityResult<Sentiment> {
        self.invoke(
            "analyze_sentiment",
            CallKind::Analyze,
            format!("Analyze the sentiment of this text:\n\n{}", text),
            json!({ "text": text }),
        )
        .await
    }

    pub async fn summarize_text(&self, text: &str, max_words: usize) -> CapabilityResult<String> {
        self.invoke(
            "summarize_text",
            CallKind::Summarize,
            format!("Summarize the following in at most {} words:\n\n{}", max_words, text),
            json!({ "text": text, "maxWords": max_words }),
        )
        .await
    }

    /// Translate `text` into `target`. The source language is detected when
    /// not given.
    pub async fn translate_text(
        &self,
        text: &str,
        target: &str,
        source: Option<&str>,
    ) -> CapabilityResult<String> {
        let prompt = match source {
            Some(source) => format!("Translate from {} to {}:\n\n{}", source, target, text),
            None => format!("Translate to {}:\n\n{}", target, text),
        };
        self.invoke(
            "translate_text",
            CallKind::Translate,
            prompt,
            json!({ "text": text, "targetLanguage": target, "sourceLanguage": source }),
        )
        .await
    }

    pub async fn describe_image(&self, image_url: &str) -> CapabilityResult<String> {
        self.invoke(
            "describe_image",
            CallKind::Analyze,
            "Describe this image.".to_string(),
            json!({ "imageUrl": image_url }),
        )
        .await
    }

    pub async fn extract_keywords(&self, text: &str, limit: usize) -> CapabilityResult<Vec<String>> {
        self.invoke(
            "extract_keywords",
            CallKind::Analyze,
            format!("Extract up to {} keywords from:\n\n{}", limit, text),
            json!({ "text": text, "limit": limit }),
        )
        .await
    }

    pub async fn classify_content(
        &self,
        text: &str,
        categories: &[&str],
    ) -> CapabilityResult<Classification> {
        self.invoke(
            "classify_content",
            CallKind::Analyze,
            format!(
                "Classify the following into one of [{}]:\n\n{}",
                categories.join(", "),
                text
            ),
            json!({ "text": text, "categories": categories }),
        )
        .await
    }

    pub async fn generate_questions(&self, text: &str, count: usize) -> CapabilityResult<Vec<String>> {
        self.invoke(
            "generate_questions",
            CallKind::Generate,
            format!("Write {} questions about:\n\n{}", count, text),
            json!({ "text": text, "count": count }),
        )
        .await
    }

    pub async fn answer_question(&self, question: &str, context: &str) -> CapabilityResult<String> {
        self.invoke(
            "answer_question",
            CallKind::Generate,
            question.to_string(),
            json!({ "question": question, "context": context }),
        )
        .await
    }

    pub async fn generate_greeting(&self, name: &str, time_of_day: &str) -> CapabilityResult<String> {
        self.invoke(
            "generate_greeting",
            CallKind::Generate,
            format!("Greet {} this {}.", name, time_of_day),
            json!({ "name": name, "timeOfDay": time_of_day }),
        )
        .await
    }

    pub async fn suggest_activities(
        &self,
        mood: &str,
        context: Option<Value>,
    ) -> CapabilityResult<Vec<String>> {
        self.invoke(
            "suggest_activities",
            CallKind::Recommend,
            format!("Suggest activities for someone feeling {}.", mood),
            json!({ "mood": mood, "context": context }),
        )
        .await
    }

    /// `metrics` is passed through to the worker as-is.
    pub async fn generate_health_insights(&self, metrics: &Value) -> CapabilityResult<Vec<String>> {
        self.invoke(
            "generate_health_insights",
            CallKind::Analyze,
            "Give insights on these health metrics.".to_string(),
            json!({ "metrics": metrics }),
        )
        .await
    }

    pub async fn detect_anomalies(&self, series: &[f64]) -> CapabilityResult<Vec<Anomaly>> {
        self.invoke(
            "detect_anomalies",
            CallKind::Analyze,
            format!("Find anomalies in a series of {} values.", series.len()),
            json!({ "series": series }),
        )
        .await
    }

    pub async fn generate_code(&self, description: &str, language: &str) -> CapabilityResult<String> {
        self.invoke(
            "generate_code",
            CallKind::Generate,
            format!("Write {} code that does the following:\n\n{}", language, description),
            json!({ "description": description, "language": language }),
        )
        .await
    }

    pub async fn optimize_content(&self, content: &str, goal: &str) -> CapabilityResult<String> {
        self.invoke(
            "optimize_content",
            CallKind::Generate,
            format!("Rewrite the following to improve {}:\n\n{}", goal, content),
            json!({ "content": content, "goal": goal }),
        )
        .await
    }
}

fn tag_operation(operation: &str, args: Value) -> Value {
    let mut context = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    context.insert("operation".to_string(), Value::from(operation));
    Value::Object(context)
}

/// Project a payload into `T`; missing and `null` payloads become `T::default()`.
fn project<T>(payload: Option<Value>) -> GatewayResult<T>
where
    T: DeserializeOwned + Default,
{
    match payload {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(GatewayError::InvalidPayload),
    }
}

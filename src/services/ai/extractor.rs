use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::ExtractedBookingInfo;
use crate::services::ai::{LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You extract booking details from a student's message to an academic advising assistant.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "advisor_name": "advisor the student names, or null",
  "preferred_date": "the date phrase exactly as meant, e.g. 2025-01-15, next Monday, next week, or null",
  "preferred_time": "the time phrase, e.g. 14:00, 2pm, afternoon, or null",
  "reason": "why the student wants to meet, or null"
}

Rules:
- Never invent values. Use null for anything the message does not state.
- Resolve relative dates against today's date when you are certain; otherwise copy the phrase.
- Keep periods such as "next week" or "later this month" as phrases.
"#;

/// Pulls structured fields out of free text. Implementations may be slow or
/// fail; callers treat any error as "no opinion".
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    async fn extract(&self, utterance: &str) -> anyhow::Result<ExtractedBookingInfo>;
}

/// Extraction backed by a chat model, bounded by a timeout.
pub struct LlmExtractor {
    llm: Box<dyn LlmProvider>,
    timeout: Duration,
}

impl LlmExtractor {
    pub fn new(llm: Box<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }
}

#[async_trait]
impl StructuredExtractor for LlmExtractor {
    async fn extract(&self, utterance: &str) -> anyhow::Result<ExtractedBookingInfo> {
        let today = chrono::Local::now().date_naive();
        let system = format!("{SYSTEM_PROMPT}\nToday is {}.", describe_today(today));
        let messages = [Message::user(utterance)];

        let response = tokio::time::timeout(self.timeout, self.llm.chat(&system, &messages))
            .await
            .map_err(|_| anyhow::anyhow!("extractor timed out after {:?}", self.timeout))??;

        Ok(parse_extraction_response(&response))
    }
}

fn describe_today(today: NaiveDate) -> String {
    today.format("%A, %Y-%m-%d").to_string()
}

fn parse_extraction_response(response: &str) -> ExtractedBookingInfo {
    // Try direct parse first
    if let Ok(info) = serde_json::from_str::<ExtractedBookingInfo>(response) {
        return info;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(info) = serde_json::from_str::<ExtractedBookingInfo>(cleaned) {
        return info;
    }

    // Try to find JSON object in the response
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(info) = serde_json::from_str::<ExtractedBookingInfo>(&cleaned[start..=end]) {
                return info;
            }
        }
    }

    tracing::warn!("failed to parse extractor response as JSON, ignoring it");
    ExtractedBookingInfo::default()
}

/// Insertion-ordered map that evicts its oldest entry once full.
#[derive(Debug)]
pub struct BoundedCache<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Memoizes successful extractions per normalized utterance. Failures are
/// not cached so a transient timeout does not stick.
pub struct CachingExtractor {
    inner: Arc<dyn StructuredExtractor>,
    cache: Mutex<BoundedCache<ExtractedBookingInfo>>,
}

impl CachingExtractor {
    pub fn new(inner: Arc<dyn StructuredExtractor>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn key(utterance: &str) -> String {
        utterance.trim().to_lowercase()
    }
}

#[async_trait]
impl StructuredExtractor for CachingExtractor {
    async fn extract(&self, utterance: &str) -> anyhow::Result<ExtractedBookingInfo> {
        let key = Self::key(utterance);
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key)) {
            return Ok(hit);
        }

        let info = self.inner.extract(utterance).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, info.clone());
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_valid_json() {
        let json = r#"{"advisor_name":"Dr. Smith","preferred_date":"next Monday","preferred_time":"2pm","reason":null}"#;
        let info = parse_extraction_response(json);
        assert_eq!(info.advisor_name.as_deref(), Some("Dr. Smith"));
        assert_eq!(info.preferred_time.as_deref(), Some("2pm"));
        assert_eq!(info.reason, None);
    }

    #[test]
    fn test_parse_markdown_fenced_json() {
        let json = "```json\n{\"preferred_date\":\"2025-01-15\"}\n```";
        let info = parse_extraction_response(json);
        assert_eq!(info.preferred_date.as_deref(), Some("2025-01-15"));
    }

    #[test]
    fn test_parse_embedded_json() {
        let raw = "Sure! Here you go: {\"preferred_time\":\"morning\"} hope that helps";
        let info = parse_extraction_response(raw);
        assert_eq!(info.preferred_time.as_deref(), Some("morning"));
    }

    #[test]
    fn test_parse_fallback_is_empty() {
        let info = parse_extraction_response("I don't understand the format you want");
        assert!(info.is_empty());
    }

    #[test]
    fn test_bounded_cache_evicts_oldest() {
        let mut cache = BoundedCache::new(2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("a".into(), 10);
        cache.insert("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_zero_capacity_cache_stores_nothing() {
        let mut cache = BoundedCache::new(0);
        cache.insert("a".into(), 1);
        assert!(cache.is_empty());
    }

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl StructuredExtractor for Counting {
        async fn extract(&self, utterance: &str) -> anyhow::Result<ExtractedBookingInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("unavailable");
            }
            Ok(ExtractedBookingInfo {
                reason: Some(utterance.to_string()),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_caching_extractor_memoizes_success() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cached = CachingExtractor::new(inner.clone(), 8);

        cached.extract("Next Monday").await.unwrap();
        cached.extract("  next monday ").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_caching_extractor_does_not_cache_failures() {
        let inner = Arc::new(Counting {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let cached = CachingExtractor::new(inner.clone(), 8);

        assert!(cached.extract("tomorrow").await.is_err());
        assert!(cached.extract("tomorrow").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        async fn chat(&self, _system: &str, _messages: &[Message]) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".to_string())
        }
    }

    #[tokio::test]
    async fn test_llm_extractor_times_out() {
        let extractor = LlmExtractor::new(Box::new(Slow), Duration::from_millis(20));
        let err = extractor.extract("tomorrow").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}

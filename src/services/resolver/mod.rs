pub mod dates;
pub mod period;
pub mod times;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::Slot;
use crate::services::ai::extractor::StructuredExtractor;

pub use period::{PeriodSpec, PeriodUnit, TimeReference, WeekPosition};

/// What a date utterance resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum DateResolution {
    /// One or more concrete dates, sorted, all inside the booking horizon.
    Dates(Vec<NaiveDate>),
    /// A relative span with at least one date inside the booking horizon.
    Period(PeriodSpec),
}

impl DateResolution {
    /// Concrete dates to look up slots for.
    pub fn dates(&self, today: NaiveDate, horizon_days: i64) -> Vec<NaiveDate> {
        match self {
            DateResolution::Dates(dates) => dates.clone(),
            DateResolution::Period(spec) => spec.expand(today, horizon_days),
        }
    }
}

/// One tier of the resolver chain. `None` means "no opinion"; the next tier
/// gets a turn.
#[async_trait]
pub trait ResolverStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve_date(&self, utterance: &str, today: NaiveDate) -> Option<DateResolution>;

    async fn resolve_time(&self, utterance: &str, slots: &[Slot]) -> Option<Slot>;
}

/// Deterministic pattern rules.
pub struct RuleStrategy {
    horizon_days: i64,
}

impl RuleStrategy {
    pub fn new(horizon_days: i64) -> Self {
        Self { horizon_days }
    }
}

#[async_trait]
impl ResolverStrategy for RuleStrategy {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn resolve_date(&self, utterance: &str, today: NaiveDate) -> Option<DateResolution> {
        resolve_date_rules(utterance, today, self.horizon_days)
    }

    async fn resolve_time(&self, utterance: &str, slots: &[Slot]) -> Option<Slot> {
        times::match_slot(utterance, slots)
    }
}

/// Runs the structured extractor and feeds the phrases it returns through
/// the same rules, so both tiers validate identically.
pub struct ExtractorStrategy {
    extractor: Arc<dyn StructuredExtractor>,
    horizon_days: i64,
}

impl ExtractorStrategy {
    pub fn new(extractor: Arc<dyn StructuredExtractor>, horizon_days: i64) -> Self {
        Self {
            extractor,
            horizon_days,
        }
    }
}

#[async_trait]
impl ResolverStrategy for ExtractorStrategy {
    fn name(&self) -> &'static str {
        "extractor"
    }

    async fn resolve_date(&self, utterance: &str, today: NaiveDate) -> Option<DateResolution> {
        let info = match self.extractor.extract(utterance).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(error = %e, "extractor failed, deferring to rules");
                return None;
            }
        };
        let phrase = info.preferred_date?;
        resolve_date_rules(&phrase, today, self.horizon_days)
    }

    async fn resolve_time(&self, utterance: &str, slots: &[Slot]) -> Option<Slot> {
        let info = match self.extractor.extract(utterance).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!(error = %e, "extractor failed, deferring to rules");
                return None;
            }
        };
        let phrase = info.preferred_time?;
        times::match_slot(&phrase, slots)
    }
}

/// Ordered chain of strategies; the first validated answer wins.
pub struct DateTimeResolver {
    strategies: Vec<Box<dyn ResolverStrategy>>,
    horizon_days: i64,
}

impl DateTimeResolver {
    pub fn new(strategies: Vec<Box<dyn ResolverStrategy>>, horizon_days: i64) -> Self {
        Self {
            strategies,
            horizon_days,
        }
    }

    pub fn rules_only(horizon_days: i64) -> Self {
        Self::new(vec![Box::new(RuleStrategy::new(horizon_days))], horizon_days)
    }

    /// Extractor first, rules as the fallback.
    pub fn with_extractor(extractor: Arc<dyn StructuredExtractor>, horizon_days: i64) -> Self {
        Self::new(
            vec![
                Box::new(ExtractorStrategy::new(extractor, horizon_days)),
                Box::new(RuleStrategy::new(horizon_days)),
            ],
            horizon_days,
        )
    }

    pub fn horizon_days(&self) -> i64 {
        self.horizon_days
    }

    pub async fn resolve_date(&self, utterance: &str, today: NaiveDate) -> Option<DateResolution> {
        for strategy in &self.strategies {
            if let Some(resolution) = strategy.resolve_date(utterance, today).await {
                tracing::debug!(strategy = strategy.name(), ?resolution, "date resolved");
                return Some(resolution);
            }
        }
        None
    }

    pub async fn resolve_time(&self, utterance: &str, slots: &[Slot]) -> Option<Slot> {
        for strategy in &self.strategies {
            if let Some(slot) = strategy.resolve_time(utterance, slots).await {
                tracing::debug!(strategy = strategy.name(), slot = %slot.id(), "time resolved");
                return Some(slot);
            }
        }
        None
    }
}

/// Period phrases first, then explicit dates. Out-of-horizon dates are
/// dropped; nothing left means no candidate.
pub fn resolve_date_rules(utterance: &str, today: NaiveDate, horizon_days: i64) -> Option<DateResolution> {
    if let Some(spec) = period::classify_period(utterance) {
        if !spec.expand(today, horizon_days).is_empty() {
            return Some(DateResolution::Period(spec));
        }
        return None;
    }

    let dates: Vec<NaiveDate> = dates::parse_dates(utterance, today)
        .into_iter()
        .filter(|d| dates::within_horizon(*d, today, horizon_days))
        .collect();

    if dates.is_empty() {
        None
    } else {
        Some(DateResolution::Dates(dates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractedBookingInfo;
    use chrono::NaiveDateTime;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    struct FixedExtractor(anyhow::Result<ExtractedBookingInfo>);

    #[async_trait]
    impl StructuredExtractor for FixedExtractor {
        async fn extract(&self, _utterance: &str) -> anyhow::Result<ExtractedBookingInfo> {
            match &self.0 {
                Ok(info) => Ok(info.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    #[test]
    fn test_rules_reject_past_and_far_dates() {
        let today = d("2025-06-18");
        assert_eq!(resolve_date_rules("2025-06-01", today, 30), None);
        assert_eq!(resolve_date_rules("2025-09-01", today, 30), None);
        assert_eq!(
            resolve_date_rules("2025-06-20", today, 30),
            Some(DateResolution::Dates(vec![d("2025-06-20")]))
        );
    }

    #[test]
    fn test_rules_keep_in_range_subset() {
        let today = d("2025-06-18");
        let res = resolve_date_rules("2025-06-20 or 2025-09-01", today, 30).unwrap();
        assert_eq!(res, DateResolution::Dates(vec![d("2025-06-20")]));
    }

    #[test]
    fn test_rules_period() {
        let today = d("2025-06-18");
        match resolve_date_rules("next week", today, 30) {
            Some(DateResolution::Period(spec)) => assert_eq!(spec.unit, PeriodUnit::Week),
            other => panic!("expected period, got {other:?}"),
        }
        assert_eq!(resolve_date_rules("next year", today, 30), None);
    }

    #[tokio::test]
    async fn test_extractor_tier_wins_when_valid() {
        let extractor = FixedExtractor(Ok(ExtractedBookingInfo {
            preferred_date: Some("2025-06-25".into()),
            ..Default::default()
        }));
        let resolver = DateTimeResolver::with_extractor(Arc::new(extractor), 30);
        let res = resolver.resolve_date("tomorrow", d("2025-06-18")).await;
        assert_eq!(res, Some(DateResolution::Dates(vec![d("2025-06-25")])));
    }

    #[tokio::test]
    async fn test_falls_back_to_rules_when_extractor_fails() {
        let resolver = DateTimeResolver::with_extractor(
            Arc::new(FixedExtractor(Err(anyhow::anyhow!("timeout")))),
            30,
        );
        let res = resolver.resolve_date("tomorrow", d("2025-06-18")).await;
        assert_eq!(res, Some(DateResolution::Dates(vec![d("2025-06-19")])));
    }

    #[tokio::test]
    async fn test_invalid_extractor_answer_falls_through() {
        let extractor = FixedExtractor(Ok(ExtractedBookingInfo {
            preferred_date: Some("2024-01-01".into()),
            preferred_time: Some("11pm".into()),
            ..Default::default()
        }));
        let resolver = DateTimeResolver::with_extractor(Arc::new(extractor), 30);
        let res = resolver.resolve_date("tomorrow", d("2025-06-18")).await;
        assert_eq!(res, Some(DateResolution::Dates(vec![d("2025-06-19")])));

        let start = NaiveDateTime::parse_from_str("2030-01-07 14:00", "%Y-%m-%d %H:%M").unwrap();
        let slots = vec![Slot::new("A1", start)];
        let slot = resolver.resolve_time("2pm", &slots).await;
        assert_eq!(slot, Some(slots[0].clone()));
    }

    #[tokio::test]
    async fn test_nothing_resolves() {
        let resolver = DateTimeResolver::rules_only(30);
        assert_eq!(resolver.resolve_date("whenever", d("2025-06-18")).await, None);
        assert_eq!(resolver.resolve_time("whenever", &[]).await, None);
    }
}

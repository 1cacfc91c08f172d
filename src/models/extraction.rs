use serde::{Deserialize, Serialize};

/// What the structured extractor pulled out of one utterance. Any field may
/// be missing; the rule-based resolver covers the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedBookingInfo {
    #[serde(default, deserialize_with = "null_string")]
    pub advisor_name: Option<String>,
    #[serde(default, deserialize_with = "null_string")]
    pub preferred_date: Option<String>,
    #[serde(default, deserialize_with = "null_string")]
    pub preferred_time: Option<String>,
    #[serde(default, deserialize_with = "null_string")]
    pub reason: Option<String>,
}

impl ExtractedBookingInfo {
    pub fn is_empty(&self) -> bool {
        self.advisor_name.is_none()
            && self.preferred_date.is_none()
            && self.preferred_time.is_none()
            && self.reason.is_none()
    }
}

// Models like to answer "null" as a string.
fn null_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null") && !s.eq_ignore_ascii_case("none")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_null_is_none() {
        let info: ExtractedBookingInfo = serde_json::from_str(
            r#"{"advisor_name":"null","preferred_date":"next Monday","preferred_time":null,"reason":""}"#,
        )
        .unwrap();
        assert_eq!(info.advisor_name, None);
        assert_eq!(info.preferred_date.as_deref(), Some("next Monday"));
        assert_eq!(info.preferred_time, None);
        assert_eq!(info.reason, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let info: ExtractedBookingInfo = serde_json::from_str("{}").unwrap();
        assert!(info.is_empty());
    }
}

use serde::{Deserialize, Deserializer, Serialize};

/// `?search=` filter shared by simple catalog listings
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: usize,
}

/// Treat `?field=` as if the parameter were absent
pub fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_search_is_ignored() {
        let query: SearchQuery = serde_json::from_str(r#"{"search": "  "}"#).unwrap();
        assert!(query.search.is_none());

        let query: SearchQuery = serde_json::from_str(r#"{"search": " rust "}"#).unwrap();
        assert_eq!(query.search.as_deref(), Some("rust"));

        let query: SearchQuery = serde_json::from_str("{}").unwrap();
        assert!(query.search.is_none());
    }
}

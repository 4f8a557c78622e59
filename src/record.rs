use serde::{Deserialize, Serialize};

/// One API access entry extracted from a log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub server: String,
    pub program: String,
    pub date: String,        // YYYY-MM-DD when recognizable
    pub time: String,
    pub status_code: String,
    pub duration: String,    // as logged, e.g. "15.2ms"
    pub client_ip: String,
    pub http_method: String,
    pub api_path: String,
}

impl LogRecord {
    /// Replace the raw request path with the matched API prefix.
    pub fn with_api_path(self, api_path: impl Into<String>) -> Self {
        Self {
            api_path: api_path.into(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_api_path_keeps_other_fields() {
        let record = LogRecord {
            server: "web-01".to_string(),
            program: "user-service".to_string(),
            date: "2024-01-02".to_string(),
            time: "10:00:00".to_string(),
            status_code: "200".to_string(),
            duration: "15ms".to_string(),
            client_ip: "1.2.3.4".to_string(),
            http_method: "GET".to_string(),
            api_path: "/api/v1/users/42".to_string(),
        };

        let normalized = record.clone().with_api_path("/api/v1/users");
        assert_eq!(normalized.api_path, "/api/v1/users");
        assert_eq!(normalized.client_ip, record.client_ip);
        assert_eq!(normalized.date, record.date);
    }
}

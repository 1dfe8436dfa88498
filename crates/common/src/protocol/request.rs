use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// An HTTP request forwarded from the public endpoint to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelRequest {
    /// Unique identifier correlating this request with its response
    pub id: Uuid,

    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,

    /// Raw request target, including path and query string
    /// Example: "/api/v1/users?limit=10"
    pub path: String,

    /// Flattened HTTP headers; repeated values are joined with ", "
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Base64-encoded request body, omitted when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl TunnelRequest {
    /// Create a request with a fresh correlation id and no headers or body
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_creation() {
        let req = TunnelRequest::new("GET", "/api/users");

        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/users");
        assert!(req.headers.is_empty());
        assert!(!req.has_body());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = TunnelRequest::new("GET", "/");
        let b = TunnelRequest::new("GET", "/");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_request_serialization() {
        let mut req = TunnelRequest::new("POST", "/api/data?x=1");
        req.headers
            .insert("content-type".to_string(), "application/json".to_string());
        req.body = Some("eyJ0ZXN0IjoidmFsdWUifQ==".to_string());

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""method":"POST""#));
        assert!(json.contains(r#""path":"/api/data?x=1""#));
        assert!(json.contains(r#""body":"eyJ0ZXN0IjoidmFsdWUifQ==""#));

        let parsed: TunnelRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, req.id);
        assert_eq!(parsed.method, req.method);
        assert_eq!(parsed.path, req.path);
        assert!(parsed.has_body());
    }

    #[test]
    fn test_empty_body_is_omitted() {
        let req = TunnelRequest::new("GET", "/");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("body"));
    }

    #[test]
    fn test_missing_fields_default() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"id":"{}","method":"GET","path":"/test"}}"#, id);

        let parsed: TunnelRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, id);
        assert!(parsed.headers.is_empty());
        assert!(parsed.body.is_none());
    }

    #[test]
    fn test_flattened_header_values() {
        let mut req = TunnelRequest::new("GET", "/");
        req.headers.insert(
            "cookie".to_string(),
            "session=abc, token=xyz".to_string(),
        );

        let json = serde_json::to_string(&req).unwrap();
        let parsed: TunnelRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(
            parsed.headers.get("cookie").unwrap(),
            "session=abc, token=xyz"
        );
    }
}

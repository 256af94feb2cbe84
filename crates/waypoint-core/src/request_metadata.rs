use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;

use crate::audit::AuditContext;

/// Header carrying the analyst identity set by the dashboard's auth proxy.
pub const ANALYST_HEADER: &str = "x-analyst-id";

/// Caller identity and origin pulled from request headers, used for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    pub actor: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl RequestMetadata {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        // First hop of X-Forwarded-For is the client
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip"));

        Self {
            actor: header(ANALYST_HEADER).unwrap_or_else(|| "anonymous".to_string()),
            ip_address,
            user_agent: header("user-agent").unwrap_or_default(),
        }
    }

    pub fn audit_context(&self) -> AuditContext {
        AuditContext {
            actor: self.actor.clone(),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for RequestMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestMetadata::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ANALYST_HEADER, HeaderValue::from_static("ana@example.com"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("user-agent", HeaderValue::from_static("dashboard/2.1"));

        let metadata = RequestMetadata::from_headers(&headers);
        assert_eq!(metadata.actor, "ana@example.com");
        assert_eq!(metadata.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(metadata.user_agent, "dashboard/2.1");
    }

    #[test]
    fn test_metadata_defaults_to_anonymous() {
        let metadata = RequestMetadata::from_headers(&HeaderMap::new());
        assert_eq!(metadata.actor, "anonymous");
        assert!(metadata.ip_address.is_none());
        assert_eq!(metadata.audit_context().user_agent, "");
    }
}

//! Upstream token extraction from client `Authorization` headers.
//!
//! Clients send `Bearer <token>`. Two legacy shapes are also accepted:
//! - a comma-separated key list, of which the first key is used;
//! - a URL-encoded `<user>::<token>` pair (`%3A%3A`), of which the part after
//!   the separator is the token.

use actix_web::http::header::{HeaderMap, AUTHORIZATION};

use crate::error::ProxyError;

const BEARER_PREFIX: &str = "Bearer ";
const ENCODED_PAIR_SEPARATOR: &str = "%3A%3A";

/// Extract the upstream token from request headers.
pub fn extract_token(headers: &HeaderMap) -> Result<String, ProxyError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ProxyError::MissingAuthorization)?
        .to_str()
        .map_err(|_| ProxyError::InvalidAuthorization)?;

    let raw = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(ProxyError::InvalidAuthorization)?;

    normalize_token(raw).ok_or(ProxyError::MissingAuthorization)
}

/// Reduce a raw bearer value to a single token, or `None` if nothing usable
/// remains.
pub fn normalize_token(raw: &str) -> Option<String> {
    let first = raw.split(',').next().unwrap_or_default().trim();
    let token = match first.split_once(ENCODED_PAIR_SEPARATOR) {
        Some((_, rest)) => rest.split(ENCODED_PAIR_SEPARATOR).next().unwrap_or_default(),
        None => first,
    };
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn headers_with(value: &str) -> HeaderMap {
        TestRequest::default()
            .insert_header((AUTHORIZATION, value))
            .to_http_request()
            .headers()
            .clone()
    }

    #[test]
    fn test_plain_bearer() {
        assert_eq!(extract_token(&headers_with("Bearer abc123")).unwrap(), "abc123");
    }

    #[test]
    fn test_missing_header() {
        let headers = TestRequest::default().to_http_request().headers().clone();
        assert!(matches!(
            extract_token(&headers),
            Err(ProxyError::MissingAuthorization)
        ));
    }

    #[test]
    fn test_non_bearer_scheme() {
        assert!(matches!(
            extract_token(&headers_with("Basic dXNlcjpwYXNz")),
            Err(ProxyError::InvalidAuthorization)
        ));
    }

    #[test]
    fn test_empty_token() {
        assert!(matches!(
            extract_token(&headers_with("Bearer ,")),
            Err(ProxyError::MissingAuthorization)
        ));
    }

    #[test]
    fn test_first_of_several_keys() {
        assert_eq!(normalize_token("key-one , key-two").as_deref(), Some("key-one"));
    }

    #[test]
    fn test_encoded_pair() {
        assert_eq!(
            normalize_token("user_01J%3A%3AeyJhbGciOi").as_deref(),
            Some("eyJhbGciOi")
        );
        assert_eq!(
            normalize_token("a%3A%3Ab%3A%3Ac, other").as_deref(),
            Some("b")
        );
    }
}

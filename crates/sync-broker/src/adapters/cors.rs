//! CORS for browser submitters.

use crate::domain::config::CorsConfig;
use axum::http::{HeaderName, HeaderValue, Method};
use std::str::FromStr;
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

const WILDCARD: &str = "*";

/// Build the CORS layer for the submission surface.
///
/// A disabled config yields a layer that adds no headers, which leaves
/// cross-origin browsers to refuse the response themselves.
pub fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }

    let origins = if is_wildcard(&config.allowed_origins) {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_all::<HeaderValue>(&config.allowed_origins))
    };

    let headers = if is_wildcard(&config.allowed_headers) {
        AllowHeaders::any()
    } else {
        AllowHeaders::list(parse_all::<HeaderName>(&config.allowed_headers))
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list(parse_all::<Method>(&config.allowed_methods)))
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.max_age))
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v.trim() == WILDCARD)
}

/// Parse every entry, skipping the ones that are not valid.
fn parse_all<T: FromStr>(values: &[String]) -> Vec<T> {
    values
        .iter()
        .filter_map(|raw| match raw.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(value = %raw, "Ignoring invalid CORS entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(is_wildcard(&strings(&["http://a.test", " * "])));
        assert!(!is_wildcard(&strings(&["http://a.test"])));
    }

    #[test]
    fn test_invalid_entries_are_skipped() {
        let methods = parse_all::<Method>(&strings(&["GET", "NOT A METHOD", "post"]));
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0], Method::GET);

        let headers = parse_all::<HeaderName>(&strings(&["Content-Type", "bad header"]));
        assert_eq!(headers, vec![HeaderName::from_static("content-type")]);
    }

    #[test]
    fn test_layer_builds_for_explicit_origins() {
        let config = CorsConfig {
            allowed_origins: strings(&["http://localhost:5173"]),
            ..CorsConfig::default()
        };
        let _layer = create_cors_layer(&config);
        let _disabled = create_cors_layer(&CorsConfig {
            enabled: false,
            ..CorsConfig::default()
        });
    }
}

use std::collections::HashMap;
use std::io::Read;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDsn {
    pub scheme: String,
    pub public_key: String,
    pub host: String,
    pub project_id: String,
}

/// Parses `scheme://public_key@host/…/project_id`. An empty public key or a
/// missing trailing path segment makes the DSN invalid.
pub fn parse_dsn(dsn: &str) -> Option<ParsedDsn> {
    let url = url::Url::parse(dsn).ok()?;
    let public_key = url.username();
    if public_key.is_empty() {
        return None;
    }
    let host = url.host_str()?.to_string();
    let project_id = url
        .path_segments()?
        .last()
        .filter(|segment| !segment.is_empty())?
        .to_string();

    Some(ParsedDsn {
        scheme: url.scheme().to_string(),
        public_key: public_key.to_string(),
        host,
        project_id,
    })
}

/// Resolution order from §4.4: query param, then `X-Sentry-Auth`, then HTTP
/// Basic. The first key found wins; callers pass whichever sources they have.
pub fn resolve_sentry_key(
    query_params: &HashMap<String, String>,
    sentry_auth_header: Option<&str>,
    authorization_header: Option<&str>,
) -> Option<String> {
    if let Some(key) = query_params.get("sentry_key") {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }

    if let Some(header) = sentry_auth_header {
        if let Some(key) = parse_sentry_auth_header(header) {
            return Some(key);
        }
    }

    if let Some(header) = authorization_header {
        if let Some(key) = parse_basic_auth_header(header) {
            return Some(key);
        }
    }

    None
}

/// `Sentry sentry_key=abc, sentry_version=7` → `abc`.
fn parse_sentry_auth_header(header: &str) -> Option<String> {
    let rest = header.strip_prefix("Sentry ")?;
    rest.split(',').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("sentry_key=").map(str::to_string)
    })
}

/// `Authorization: Basic base64(key:...)` → the pre-colon portion.
fn parse_basic_auth_header(header: &str) -> Option<String> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    decoded.split(':').next().map(str::to_string).filter(|s| !s.is_empty())
}

pub fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(body);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dsn() {
        let dsn = parse_dsn("https://publickey123@o0.ingest.example.com/42").unwrap();
        assert_eq!(dsn.public_key, "publickey123");
        assert_eq!(dsn.host, "o0.ingest.example.com");
        assert_eq!(dsn.project_id, "42");
    }

    #[test]
    fn rejects_dsn_without_public_key() {
        assert!(parse_dsn("https://example.com/42").is_none());
    }

    #[test]
    fn query_param_wins_over_headers() {
        let mut query = HashMap::new();
        query.insert("sentry_key".to_string(), "from-query".to_string());
        let key = resolve_sentry_key(
            &query,
            Some("Sentry sentry_key=from-header,sentry_version=7"),
            None,
        );
        assert_eq!(key, Some("from-query".to_string()));
    }

    #[test]
    fn falls_back_to_sentry_auth_header() {
        let query = HashMap::new();
        let key = resolve_sentry_key(
            &query,
            Some("Sentry sentry_version=7,sentry_key=abc123"),
            None,
        );
        assert_eq!(key, Some("abc123".to_string()));
    }

    #[test]
    fn falls_back_to_basic_auth_header() {
        let query = HashMap::new();
        let encoded = BASE64.encode(b"mykey:");
        let header = format!("Basic {encoded}");
        let key = resolve_sentry_key(&query, None, Some(&header));
        assert_eq!(key, Some("mykey".to_string()));
    }

    #[test]
    fn no_source_yields_none() {
        let query = HashMap::new();
        assert_eq!(resolve_sentry_key(&query, None, None), None);
    }

    #[test]
    fn gunzip_roundtrips() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"hello world").unwrap();
        let compressed = encoder.finish().unwrap();
        let decompressed = gunzip(&compressed).unwrap();
        assert_eq!(decompressed, b"hello world");
    }
}

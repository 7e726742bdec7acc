//! Output filename inference.
//!
//! Precedence: `Content-Disposition` (`filename*` before `filename`), then the
//! last segment of the source URL path, then [`DEFAULT_FILENAME`]. Every step
//! is infallible; malformed input falls through to the next source.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use url::Url;

/// Name used when neither the headers nor the URL yield one.
pub const DEFAULT_FILENAME: &str = "downloaded_file";

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Where a resolved filename came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameSource {
    /// `filename=` parameter, quoted or bare.
    HeaderExact,
    /// `filename*=` extended parameter, percent-decoded.
    HeaderEncoded,
    /// Last segment of the source URL path.
    UrlPath,
    Default,
}

impl FilenameSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilenameSource::HeaderExact => "header_exact",
            FilenameSource::HeaderEncoded => "header_encoded",
            FilenameSource::UrlPath => "url_path",
            FilenameSource::Default => "default",
        }
    }
}

/// A sanitized, non-empty filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilename {
    pub name: String,
    pub source: FilenameSource,
}

/// Resolve the filename for a proxied download.
pub fn resolve_filename(headers: &HeaderMap, source_url: &str) -> ResolvedFilename {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| from_content_disposition(&String::from_utf8_lossy(value.as_bytes())))
        .or_else(|| from_url(source_url))
        .unwrap_or_else(|| ResolvedFilename {
            name: DEFAULT_FILENAME.to_string(),
            source: FilenameSource::Default,
        })
}

/// Percent-encode a filename for the `X-Filename` header.
pub fn encode_header_filename(name: &str) -> String {
    utf8_percent_encode(name, URI_COMPONENT).to_string()
}

/// Inverse of [`encode_header_filename`]; the result is sanitized again.
pub fn decode_header_filename(value: &str) -> String {
    let decoded = percent_decode_str(value).decode_utf8_lossy();
    sanitize(&decoded).unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

fn from_content_disposition(value: &str) -> Option<ResolvedFilename> {
    let mut exact = None;
    let mut encoded = None;

    for param in split_params(value) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => encoded = decode_extended(raw.trim()),
            "filename" => exact = Some(unquote(raw.trim())),
            _ => {}
        }
    }

    let encoded = encoded.and_then(|name| sanitize(&name)).map(|name| ResolvedFilename {
        name,
        source: FilenameSource::HeaderEncoded,
    });
    encoded.or_else(|| {
        exact.and_then(|name| sanitize(&name)).map(|name| ResolvedFilename {
            name,
            source: FilenameSource::HeaderExact,
        })
    })
}

fn from_url(source_url: &str) -> Option<ResolvedFilename> {
    let url = Url::parse(source_url).ok()?;
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    sanitize(&decoded).map(|name| ResolvedFilename {
        name,
        source: FilenameSource::UrlPath,
    })
}

/// Split a header value on `;`, ignoring separators inside quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

/// Strip surrounding quotes and backslash escapes from a parameter value.
fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"') else {
        return raw.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => break,
            _ => out.push(c),
        }
    }
    out
}

/// Decode an RFC 5987 extended value: `charset'language'percent-encoded`.
fn decode_extended(raw: &str) -> Option<String> {
    let raw = unquote(raw);
    let mut parts = raw.splitn(3, '\'');
    let (charset, encoded) = match (parts.next(), parts.next(), parts.next()) {
        (Some(charset), Some(_language), Some(encoded)) => (charset, encoded),
        // Lenient: some origins omit the charset and language.
        (Some(encoded), None, None) => ("utf-8", encoded),
        _ => return None,
    };

    let bytes: Vec<u8> = percent_decode_str(encoded).collect();
    let decoded = if charset.eq_ignore_ascii_case("iso-8859-1") {
        bytes.iter().map(|&b| b as char).collect()
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Some(decoded)
}

/// Reduce a candidate to a bare file name, or reject it.
fn sanitize(candidate: &str) -> Option<String> {
    let last = candidate.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(candidate);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn disposition(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_str(value).unwrap());
        headers
    }

    const URL: &str = "https://files.example.com/docs/other.bin?x=1";

    #[test]
    fn header_forms_all_yield_same_name() {
        for value in [
            "attachment; filename=\"x.pdf\"",
            "attachment; filename=x.pdf",
            "attachment; filename*=UTF-8''x%2Epdf",
        ] {
            let resolved = resolve_filename(&disposition(value), URL);
            assert_eq!(resolved.name, "x.pdf", "header: {value}");
        }
    }

    #[test]
    fn records_header_source() {
        let exact = resolve_filename(&disposition("inline; filename=\"a.pdf\""), URL);
        assert_eq!(exact.source, FilenameSource::HeaderExact);

        let encoded = resolve_filename(&disposition("attachment; filename*=UTF-8''a.pdf"), URL);
        assert_eq!(encoded.source, FilenameSource::HeaderEncoded);
    }

    #[test]
    fn extended_form_wins_over_plain() {
        let headers = disposition(
            "attachment; filename=\"fallback.pdf\"; filename*=UTF-8''%E2%82%AC%20rates.pdf",
        );
        let resolved = resolve_filename(&headers, URL);
        assert_eq!(resolved.name, "€ rates.pdf");
        assert_eq!(resolved.source, FilenameSource::HeaderEncoded);
    }

    #[test]
    fn latin1_extended_value() {
        let headers = disposition("attachment; filename*=iso-8859-1'en'%A3%20rates.pdf");
        assert_eq!(resolve_filename(&headers, URL).name, "£ rates.pdf");
    }

    #[test]
    fn quoted_value_keeps_semicolons_and_escapes() {
        let headers = disposition(r#"attachment; filename="a; \"b\".pdf"; size=10"#);
        assert_eq!(resolve_filename(&headers, URL).name, "a; \"b\".pdf");
    }

    #[test]
    fn surrounding_whitespace_is_stripped() {
        let headers = disposition("attachment;  filename =  \"  spaced.pdf \"  ");
        assert_eq!(resolve_filename(&headers, URL).name, "spaced.pdf");
    }

    #[test]
    fn falls_back_to_url_segment() {
        let resolved = resolve_filename(&HeaderMap::new(), "https://a.example/x/y/report.pdf?sig=abc#p2");
        assert_eq!(resolved.name, "report.pdf");
        assert_eq!(resolved.source, FilenameSource::UrlPath);
    }

    #[test]
    fn url_segment_is_percent_decoded() {
        let resolved = resolve_filename(&HeaderMap::new(), "https://a.example/my%20report.pdf");
        assert_eq!(resolved.name, "my report.pdf");
    }

    #[test]
    fn trailing_slash_uses_previous_segment() {
        let resolved = resolve_filename(&HeaderMap::new(), "https://a.example/files/archive/");
        assert_eq!(resolved.name, "archive");
    }

    #[test]
    fn unusable_header_falls_through_to_url() {
        for value in ["attachment", "attachment; filename=\"\"", "attachment; filename*=bogus'", "inline; filename=.."] {
            let resolved = resolve_filename(&disposition(value), "https://a.example/doc.pdf");
            assert_eq!(resolved.name, "doc.pdf", "header: {value}");
            assert_eq!(resolved.source, FilenameSource::UrlPath);
        }
    }

    #[test]
    fn default_when_nothing_usable() {
        for url in ["https://a.example/", "https://a.example", "not a url", ""] {
            let resolved = resolve_filename(&HeaderMap::new(), url);
            assert_eq!(resolved.name, DEFAULT_FILENAME, "url: {url}");
            assert_eq!(resolved.source, FilenameSource::Default);
        }
    }

    #[test]
    fn path_components_are_stripped() {
        let headers = disposition("attachment; filename=\"../../etc/passwd\"");
        assert_eq!(resolve_filename(&headers, URL).name, "passwd");

        let headers = disposition("attachment; filename*=UTF-8''..%5C..%5Cboot.ini");
        assert_eq!(resolve_filename(&headers, URL).name, "boot.ini");

        let resolved = resolve_filename(&HeaderMap::new(), "https://a.example/a/..%2F..%2Fsecret.txt");
        assert_eq!(resolved.name, "secret.txt");
    }

    #[test]
    fn resolution_is_repeatable() {
        let headers = disposition("attachment; filename*=UTF-8''x%2Epdf");
        assert_eq!(resolve_filename(&headers, URL), resolve_filename(&headers, URL));
    }

    #[test]
    fn header_encoding_matches_uri_component_rules() {
        assert_eq!(encode_header_filename("my report (v2).pdf"), "my%20report%20(v2).pdf");
        assert_eq!(encode_header_filename("a/b?c.pdf"), "a%2Fb%3Fc.pdf");
        assert_eq!(encode_header_filename("€.pdf"), "%E2%82%AC.pdf");
        assert_eq!(decode_header_filename("%E2%82%AC%20rates.pdf"), "€ rates.pdf");
        assert_eq!(decode_header_filename("..%2F..%2Fx.pdf"), "x.pdf");
    }
}

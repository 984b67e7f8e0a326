/*!
Content-type parsing and the supported media type set.

Header strings such as `text/html; charset=utf-8` are parsed into a typed
[`ContentType`] before they reach the fragment model, so nothing downstream
ever handles a raw, unvalidated content-type string.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{FragmentsError, Result};

/// Every bare mime type a fragment may be stored as.
pub const SUPPORTED_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "text/markdown",
    "text/csv",
    "application/json",
    "application/yaml",
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/avif",
    "image/gif",
];

/// File extensions callers may append to a fragment id, and the mime type each requests.
const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("gif", "image/gif"),
];

/// A parsed `Content-Type` value: bare mime type plus ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentType {
    mime: String,
    params: Vec<(String, String)>,
}

impl ContentType {
    /// Parse a content-type header value.
    ///
    /// Type, subtype and parameter names are case-insensitive and are
    /// lowercased; parameter values keep their case and may be quoted.
    ///
    /// # Example
    /// ```rust
    /// use fragments_core::ContentType;
    ///
    /// let ct = ContentType::parse("Text/HTML; charset=utf-8")?;
    /// assert_eq!(ct.mime(), "text/html");
    /// assert_eq!(ct.param("charset"), Some("utf-8"));
    /// # Ok::<(), fragments_core::FragmentsError>(())
    /// ```
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(';');
        let media = parts.next().unwrap_or_default().trim();

        let (kind, subtype) = media
            .split_once('/')
            .ok_or_else(|| FragmentsError::validation(format!("invalid media type: {value:?}")))?;
        if !is_token(kind) || !is_token(subtype) {
            return Err(FragmentsError::validation(format!(
                "invalid media type: {value:?}"
            )));
        }

        let mut params = Vec::new();
        for raw in parts {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (name, val) = raw.split_once('=').ok_or_else(|| {
                FragmentsError::validation(format!("invalid parameter {raw:?} in {value:?}"))
            })?;
            let name = name.trim();
            if !is_token(name) {
                return Err(FragmentsError::validation(format!(
                    "invalid parameter name {name:?} in {value:?}"
                )));
            }
            let val = unquote(val.trim()).ok_or_else(|| {
                FragmentsError::validation(format!("invalid parameter value in {value:?}"))
            })?;
            params.push((name.to_ascii_lowercase(), val));
        }

        Ok(Self {
            mime: format!(
                "{}/{}",
                kind.to_ascii_lowercase(),
                subtype.to_ascii_lowercase()
            ),
            params,
        })
    }

    /// The bare `type/subtype`, parameters stripped.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Look up a parameter by (lowercase) name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// True iff the mime type is `text/*`.
    pub fn is_text(&self) -> bool {
        self.mime.starts_with("text/")
    }

    /// True iff the bare mime type is in [`SUPPORTED_TYPES`].
    pub fn is_supported(&self) -> bool {
        SUPPORTED_TYPES.contains(&self.mime.as_str())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime)?;
        for (name, value) in &self.params {
            if is_token(value) {
                write!(f, "; {name}={value}")?;
            } else {
                write!(f, "; {name}=\"{}\"", value.replace('"', "\\\""))?;
            }
        }
        Ok(())
    }
}

impl FromStr for ContentType {
    type Err = FragmentsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentType {
    type Error = FragmentsError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        value.to_string()
    }
}

/// Returns true if we know how to work with this content-type value.
///
/// Usable at the system boundary before any fragment exists. Values that do
/// not parse are not supported.
pub fn is_supported_type(value: &str) -> bool {
    ContentType::parse(value).is_ok_and(|ct| ct.is_supported())
}

/// The mime type requested by a file extension, if the extension is known.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// The preferred extension for a supported mime type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .find(|(_, m)| *m == mime)
        .map(|(ext, _)| *ext)
}

/// A fragment reference as addressed by a caller: an id, optionally
/// suffixed with an extension naming the representation to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedIdentity {
    pub id: String,
    pub extension: Option<String>,
}

impl RequestedIdentity {
    /// The mime type the extension asks for.
    ///
    /// `Ok(None)` when no extension was given; `UnsupportedConversion` when
    /// the extension is not one we map.
    pub fn target_mime(&self) -> Result<Option<&'static str>> {
        match &self.extension {
            None => Ok(None),
            Some(ext) => mime_for_extension(ext)
                .map(Some)
                .ok_or_else(|| FragmentsError::unsupported_conversion(&self.id, format!(".{ext}"))),
        }
    }
}

/// Split `<id>[.<ext>]` into its parts at the first `.`.
pub fn parse_requested_identity(path: &str) -> Result<RequestedIdentity> {
    let path = path.trim().trim_start_matches('/');
    let (id, extension) = match path.split_once('.') {
        Some((id, ext)) => (id, Some(ext)),
        None => (path, None),
    };

    if id.is_empty() {
        return Err(FragmentsError::validation(format!(
            "missing fragment id in {path:?}"
        )));
    }
    if extension.is_some_and(str::is_empty) {
        return Err(FragmentsError::validation(format!(
            "empty extension in {path:?}"
        )));
    }

    Ok(RequestedIdentity {
        id: id.to_string(),
        extension: extension.map(str::to_string),
    })
}

/// RFC 7230 token characters.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

fn unquote(value: &str) -> Option<String> {
    if let Some(inner) = value.strip_prefix('"') {
        let inner = inner.strip_suffix('"')?;
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                out.push(chars.next()?);
            } else {
                out.push(c);
            }
        }
        Some(out)
    } else if is_token(value) {
        Some(value.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_parameters() {
        let ct = ContentType::parse("text/html; charset=utf-8").unwrap();
        assert_eq!(ct.mime(), "text/html");
        assert_eq!(ct.param("charset"), Some("utf-8"));
        assert_eq!(ct.to_string(), "text/html; charset=utf-8");
    }

    #[test]
    fn test_parse_normalizes_case_and_quotes() {
        let ct = ContentType::parse("Text/Plain; Charset=\"UTF-8\"").unwrap();
        assert_eq!(ct.mime(), "text/plain");
        assert_eq!(ct.param("charset"), Some("UTF-8"));
        assert_eq!(ct.to_string(), "text/plain; charset=UTF-8");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "text", "text/", "/plain", "text/plain; charset", "te xt/plain"] {
            let err = ContentType::parse(bad).unwrap_err();
            assert!(matches!(err, FragmentsError::Validation(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_supported_types() {
        for ty in SUPPORTED_TYPES {
            assert!(is_supported_type(ty), "{ty}");
        }
        assert!(is_supported_type("text/plain; charset=utf-8"));
        assert!(!is_supported_type("application/xml"));
        assert!(!is_supported_type("audio/mpeg"));
        assert!(!is_supported_type("not a type"));
    }

    #[test]
    fn test_is_text() {
        assert!(ContentType::parse("text/markdown").unwrap().is_text());
        assert!(!ContentType::parse("application/json").unwrap().is_text());
    }

    #[test]
    fn test_extension_mapping() {
        assert_eq!(mime_for_extension("yml"), Some("application/yaml"));
        assert_eq!(mime_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("exe"), None);
        assert_eq!(extension_for_mime("text/markdown"), Some("md"));
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
    }

    #[test]
    fn test_parse_requested_identity() {
        let plain = parse_requested_identity("abc123").unwrap();
        assert_eq!(plain.id, "abc123");
        assert_eq!(plain.extension, None);
        assert_eq!(plain.target_mime().unwrap(), None);

        let with_ext = parse_requested_identity("abc123.html").unwrap();
        assert_eq!(with_ext.id, "abc123");
        assert_eq!(with_ext.extension.as_deref(), Some("html"));
        assert_eq!(with_ext.target_mime().unwrap(), Some("text/html"));

        let unknown = parse_requested_identity("abc123.tar.gz").unwrap();
        assert_eq!(unknown.extension.as_deref(), Some("tar.gz"));
        assert!(matches!(
            unknown.target_mime(),
            Err(FragmentsError::UnsupportedConversion { .. })
        ));

        assert!(parse_requested_identity(".md").is_err());
        assert!(parse_requested_identity("abc.").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let ct = ContentType::parse("application/json").unwrap();
        let json = serde_json::to_string(&ct).unwrap();
        assert_eq!(json, "\"application/json\"");
        let back: ContentType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ct);
        assert!(serde_json::from_str::<ContentType>("\"garbage\"").is_err());
    }
}

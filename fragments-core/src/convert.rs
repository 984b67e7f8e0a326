/*!
Conversion engine: re-render fragment bytes as another content type.

[`convert`] is a pure function of `(source type, bytes, target type)`. A
target equal to the source is the identity; otherwise only the pairings in
the table below are supported, and anything else comes back as
[`Conversion::Unsupported`] rather than an error.

| Source              | Targets                         |
|---------------------|---------------------------------|
| `text/markdown`     | `text/html`, `text/plain`       |
| `text/html`         | `text/plain`                    |
| `text/csv`          | `application/json`, `text/plain`|
| `application/json`  | `application/yaml`, `text/plain`|
| `application/yaml`  | `text/plain`                    |
| `image/<subtype>`   | any other supported image type  |

AVIF sources are only routed when the crate is built with the `avif-decode`
feature, which links the system dav1d decoder; without it, AVIF can still
be produced but not read back, and `image/avif` to another type is
reported as unsupported.

Errors are reserved for supported conversions whose source bytes do not
decode as their declared type.
*/

use bytes::Bytes;
use image::{DynamicImage, ImageError, ImageFormat};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use std::io::Cursor;
use tracing::debug;

use crate::content_type::{ContentType, SUPPORTED_TYPES};
use crate::{FragmentsError, Result};

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<[^>]*>").expect("tag pattern is valid")
});

/// Outcome of a conversion request.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    /// Converted bytes and the mime type they now have
    Converted { data: Bytes, mime: &'static str },
    /// No conversion path exists between the two types
    Unsupported { from: String, to: String },
}

impl Conversion {
    /// Turn `Unsupported` into [`FragmentsError::UnsupportedConversion`].
    pub fn into_result(self) -> Result<(Bytes, &'static str)> {
        match self {
            Conversion::Converted { data, mime } => Ok((data, mime)),
            Conversion::Unsupported { from, to } => {
                Err(FragmentsError::unsupported_conversion(from, to))
            }
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Conversion::Converted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Identity,
    MarkdownToHtml,
    MarkdownToText,
    HtmlToText,
    CsvToJson,
    Passthrough,
    JsonToYaml,
    JsonToText,
    YamlToText,
    Image(ImageFormat, ImageFormat),
}

fn image_format(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/webp" => Some(ImageFormat::WebP),
        "image/avif" => Some(ImageFormat::Avif),
        "image/gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

fn route(from: &str, to: &str) -> Option<Route> {
    if !SUPPORTED_TYPES.contains(&from) || !SUPPORTED_TYPES.contains(&to) {
        return None;
    }
    if from == to {
        return Some(Route::Identity);
    }
    let route = match (from, to) {
        ("text/markdown", "text/html") => Route::MarkdownToHtml,
        ("text/markdown", "text/plain") => Route::MarkdownToText,
        ("text/html", "text/plain") => Route::HtmlToText,
        ("text/csv", "application/json") => Route::CsvToJson,
        ("text/csv", "text/plain") => Route::Passthrough,
        ("application/json", "application/yaml") => Route::JsonToYaml,
        ("application/json", "text/plain") => Route::JsonToText,
        ("application/yaml", "text/plain") => Route::YamlToText,
        _ => {
            let (src, dst) = (image_format(from)?, image_format(to)?);
            if !can_decode(src) {
                return None;
            }
            Route::Image(src, dst)
        }
    };
    Some(route)
}

/// Whether this build links a decoder for `format`.
fn can_decode(format: ImageFormat) -> bool {
    match format {
        ImageFormat::Avif => cfg!(feature = "avif-decode"),
        _ => true,
    }
}

/// Bare mime type of a content-type value, if it parses.
fn bare_mime(value: &str) -> Option<String> {
    ContentType::parse(value).ok().map(|ct| ct.mime().to_string())
}

/// Whether `convert(from, _, to)` has a conversion path.
///
/// Parameters such as `charset` are ignored on both sides.
pub fn can_convert(from: &str, to: &str) -> bool {
    match (bare_mime(from), bare_mime(to)) {
        (Some(from), Some(to)) => route(&from, &to).is_some(),
        _ => false,
    }
}

/// Every mime type `from` can be converted to, itself included.
pub fn targets_for(from: &str) -> Vec<&'static str> {
    let Some(from) = bare_mime(from) else {
        return Vec::new();
    };
    SUPPORTED_TYPES
        .iter()
        .copied()
        .filter(|to| route(&from, to).is_some())
        .collect()
}

/// Convert `data`, declared as `source_type`, into `target_type`.
///
/// # Example
/// ```rust
/// use bytes::Bytes;
/// use fragments_core::convert::{convert, Conversion};
///
/// let out = convert("text/markdown", Bytes::from_static(b"# Title"), "text/html")?;
/// match out {
///     Conversion::Converted { data, mime } => {
///         assert_eq!(mime, "text/html");
///         assert!(String::from_utf8_lossy(&data).contains("<h1>Title</h1>"));
///     }
///     Conversion::Unsupported { .. } => unreachable!(),
/// }
/// # Ok::<(), fragments_core::FragmentsError>(())
/// ```
///
/// # Errors
/// * `FragmentsError::InvalidPayload` - the bytes do not decode as `source_type`
pub fn convert(source_type: &str, data: Bytes, target_type: &str) -> Result<Conversion> {
    let unsupported = || Conversion::Unsupported {
        from: source_type.to_string(),
        to: target_type.to_string(),
    };

    let (Some(from), Some(to)) = (bare_mime(source_type), bare_mime(target_type)) else {
        return Ok(record_unsupported(unsupported()));
    };
    let Some(route) = route(&from, &to) else {
        return Ok(record_unsupported(unsupported()));
    };
    // route() only succeeds for supported types
    let mime = SUPPORTED_TYPES
        .iter()
        .copied()
        .find(|m| *m == to)
        .unwrap_or("application/octet-stream");

    let converted = match route {
        Route::Identity | Route::Passthrough => data,
        Route::MarkdownToHtml => Bytes::from(markdown_to_html(as_text(&data, &from)?)),
        Route::MarkdownToText => {
            Bytes::from(strip_tags(&markdown_to_html(as_text(&data, &from)?)))
        }
        Route::HtmlToText => Bytes::from(strip_tags(as_text(&data, &from)?)),
        Route::CsvToJson => Bytes::from(csv_to_json(&data)?),
        Route::JsonToYaml => Bytes::from(json_to_yaml(&data)?),
        Route::JsonToText => Bytes::from(json_to_text(&data)?),
        Route::YamlToText => Bytes::from(yaml_to_text(&data)?),
        Route::Image(src, dst) => match reencode_image(&data, src, dst, &from, &to)? {
            Some(out) => Bytes::from(out),
            None => return Ok(record_unsupported(unsupported())),
        },
    };

    debug!(from = %from, to = %to, ?route, size = converted.len(), "Converted fragment data");
    #[cfg(feature = "metrics")]
    crate::observability::FragmentsMetrics::global().record_conversion(&from, &to);

    Ok(Conversion::Converted {
        data: converted,
        mime,
    })
}

fn record_unsupported(conversion: Conversion) -> Conversion {
    if let Conversion::Unsupported { from, to } = &conversion {
        debug!(from = %from, to = %to, "Unsupported conversion requested");
    }
    #[cfg(feature = "metrics")]
    crate::observability::FragmentsMetrics::global().record_unsupported_conversion();
    conversion
}

fn as_text<'a>(data: &'a [u8], mime: &str) -> Result<&'a str> {
    std::str::from_utf8(data)
        .map_err(|e| FragmentsError::invalid_payload(format!("{mime} data is not valid UTF-8: {e}")))
}

fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

/// Remove all tags and comments, then decode the basic character entities.
fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        // last, so "&amp;lt;" stays "&lt;"
        .replace("&amp;", "&")
}

/// First row is the header; each following row becomes an object keyed by it.
///
/// Short rows fill missing columns with `""`; extra columns are dropped.
fn csv_to_json(data: &[u8]) -> Result<Vec<u8>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| FragmentsError::invalid_payload(format!("Invalid CSV header: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| FragmentsError::invalid_payload(format!("Invalid CSV row: {e}")))?;
        let row: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                (
                    header.to_string(),
                    serde_json::Value::String(record.get(i).unwrap_or_default().to_string()),
                )
            })
            .collect();
        rows.push(serde_json::Value::Object(row));
    }

    Ok(serde_json::to_vec_pretty(&rows)?)
}

fn parse_json(data: &[u8]) -> Result<serde_json::Value> {
    serde_json::from_slice(data)
        .map_err(|e| FragmentsError::invalid_payload(format!("Invalid JSON: {e}")))
}

fn json_to_yaml(data: &[u8]) -> Result<String> {
    serde_yaml_ng::to_string(&parse_json(data)?)
        .map_err(|e| FragmentsError::invalid_payload(format!("Cannot render as YAML: {e}")))
}

fn json_to_text(data: &[u8]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&parse_json(data)?)?)
}

fn yaml_to_text(data: &[u8]) -> Result<String> {
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_slice(data)
        .map_err(|e| FragmentsError::invalid_payload(format!("Invalid YAML: {e}")))?;
    serde_yaml_ng::to_string(&value)
        .map_err(|e| FragmentsError::invalid_payload(format!("Cannot render YAML: {e}")))
}

/// Decode and re-encode; `Ok(None)` when the codec is missing from this build.
fn reencode_image(
    data: &[u8],
    src: ImageFormat,
    dst: ImageFormat,
    from: &str,
    to: &str,
) -> Result<Option<Vec<u8>>> {
    let decoded = match image::load_from_memory_with_format(data, src) {
        Ok(decoded) => decoded,
        Err(ImageError::Unsupported(_)) => return Ok(None),
        Err(e) => {
            return Err(FragmentsError::invalid_payload(format!(
                "Cannot decode {from}: {e}"
            )))
        }
    };

    // JPEG has no alpha channel; every other target takes RGBA
    let pixels = match dst {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(decoded.to_rgb8()),
        _ => DynamicImage::ImageRgba8(decoded.to_rgba8()),
    };

    let mut out = Vec::new();
    match pixels.write_to(&mut Cursor::new(&mut out), dst) {
        Ok(()) => Ok(Some(out)),
        Err(ImageError::Unsupported(_)) => Ok(None),
        Err(e) => Err(FragmentsError::invalid_payload(format!(
            "Cannot encode {to}: {e}"
        ))),
    }
}

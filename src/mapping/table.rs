//! Bidirectional HTTP ↔ CoAP lookup tables.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use axum::http::{Method, StatusCode};

use crate::coap::message::Code;
use crate::coap::option;
use crate::mapping::properties::{self, MappingError};

const NOT_IMPLEMENTED: &str = "error.501";

/// Content-format ids used by the built-in media table.
pub mod media {
    pub const TEXT_PLAIN: u16 = 0;
    pub const TEXT_HTML: u16 = 3;
    pub const IMAGE_GIF: u16 = 21;
    pub const IMAGE_JPEG: u16 = 22;
    pub const IMAGE_PNG: u16 = 23;
    pub const IMAGE_TIFF: u16 = 24;
    pub const APPLICATION_LINK_FORMAT: u16 = 40;
    pub const APPLICATION_XML: u16 = 41;
    pub const APPLICATION_JSON: u16 = 50;
}

/// Immutable lookup tables, built once at startup.
///
/// Status and code lookups are total: anything unmapped falls back to
/// bad gateway in the respective protocol.
#[derive(Debug, Clone)]
pub struct MappingTable {
    /// Lowercase HTTP method name → CoAP method, `None` when explicitly unsupported.
    http_methods: HashMap<String, Option<Code>>,
    coap_methods: HashMap<u8, Method>,
    http_status: HashMap<u16, Code>,
    coap_status: HashMap<u8, StatusCode>,
    header_options: HashMap<String, u16>,
    option_headers: HashMap<u16, String>,
    media_formats: HashMap<String, u16>,
    format_media: HashMap<u16, String>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MappingTable {
    /// The built-in defaults.
    pub fn builtin() -> Self {
        let http_methods = [
            ("head", Some(Code::GET)),
            ("get", Some(Code::GET)),
            ("post", Some(Code::POST)),
            ("put", Some(Code::PUT)),
            ("delete", Some(Code::DELETE)),
            ("options", None),
            ("trace", None),
            ("connect", None),
        ]
        .into_iter()
        .map(|(name, code)| (name.to_string(), code))
        .collect();

        let coap_methods = [
            (Code::GET.0, Method::GET),
            (Code::POST.0, Method::POST),
            (Code::PUT.0, Method::PUT),
            (Code::DELETE.0, Method::DELETE),
        ]
        .into_iter()
        .collect();

        let mut http_status: HashMap<u16, Code> = HashMap::new();
        for status in [100, 101, 102] {
            http_status.insert(status, Code::BAD_GATEWAY);
        }
        for status in [200, 202, 203, 205, 206, 207] {
            http_status.insert(status, Code::CONTENT);
        }
        http_status.insert(201, Code::CREATED);
        http_status.insert(204, Code::CHANGED);
        for status in [300, 301, 302, 303, 305, 307] {
            http_status.insert(status, Code::BAD_GATEWAY);
        }
        http_status.insert(304, Code::VALID);
        for status in (400..=424).filter(|s| *s != 421) {
            http_status.insert(status, Code::BAD_REQUEST);
        }
        http_status.insert(401, Code::UNAUTHORIZED);
        http_status.insert(403, Code::FORBIDDEN);
        http_status.insert(404, Code::NOT_FOUND);
        http_status.insert(405, Code::METHOD_NOT_ALLOWED);
        http_status.insert(406, Code::NOT_ACCEPTABLE);
        http_status.insert(412, Code::PRECONDITION_FAILED);
        http_status.insert(413, Code::REQUEST_ENTITY_TOO_LARGE);
        http_status.insert(415, Code::UNSUPPORTED_CONTENT_FORMAT);
        http_status.insert(500, Code::INTERNAL_SERVER_ERROR);
        http_status.insert(501, Code::NOT_IMPLEMENTED);
        http_status.insert(502, Code::BAD_GATEWAY);
        http_status.insert(503, Code::SERVICE_UNAVAILABLE);
        http_status.insert(504, Code::GATEWAY_TIMEOUT);
        http_status.insert(505, Code::BAD_GATEWAY);
        http_status.insert(507, Code::INTERNAL_SERVER_ERROR);

        let coap_status = [
            (Code::CREATED, StatusCode::CREATED),
            (Code::DELETED, StatusCode::NO_CONTENT),
            (Code::VALID, StatusCode::NOT_MODIFIED),
            (Code::CHANGED, StatusCode::NO_CONTENT),
            (Code::CONTENT, StatusCode::OK),
            (Code::BAD_REQUEST, StatusCode::BAD_REQUEST),
            (Code::UNAUTHORIZED, StatusCode::UNAUTHORIZED),
            (Code::BAD_OPTION, StatusCode::BAD_REQUEST),
            (Code::FORBIDDEN, StatusCode::FORBIDDEN),
            (Code::NOT_FOUND, StatusCode::NOT_FOUND),
            (Code::METHOD_NOT_ALLOWED, StatusCode::METHOD_NOT_ALLOWED),
            (Code::NOT_ACCEPTABLE, StatusCode::NOT_ACCEPTABLE),
            (Code::PRECONDITION_FAILED, StatusCode::PRECONDITION_FAILED),
            (Code::REQUEST_ENTITY_TOO_LARGE, StatusCode::PAYLOAD_TOO_LARGE),
            (Code::UNSUPPORTED_CONTENT_FORMAT, StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (Code::INTERNAL_SERVER_ERROR, StatusCode::INTERNAL_SERVER_ERROR),
            (Code::NOT_IMPLEMENTED, StatusCode::NOT_IMPLEMENTED),
            (Code::BAD_GATEWAY, StatusCode::BAD_GATEWAY),
            (Code::SERVICE_UNAVAILABLE, StatusCode::SERVICE_UNAVAILABLE),
            (Code::GATEWAY_TIMEOUT, StatusCode::GATEWAY_TIMEOUT),
            (Code::PROXYING_NOT_SUPPORTED, StatusCode::BAD_GATEWAY),
        ]
        .into_iter()
        .map(|(code, status)| (code.0, status))
        .collect();

        let header_options = [
            ("content-type", option::CONTENT_FORMAT),
            ("accept", option::ACCEPT),
            ("if-match", option::IF_MATCH),
            ("if-none-match", option::IF_NONE_MATCH),
            ("etag", option::ETAG),
            ("cache-control", option::MAX_AGE),
        ]
        .into_iter()
        .map(|(name, number)| (name.to_string(), number))
        .collect();

        let option_headers = [
            (option::CONTENT_FORMAT, "content-type"),
            (option::MAX_AGE, "cache-control"),
            (option::ETAG, "etag"),
            (option::LOCATION_PATH, "location"),
            (option::LOCATION_QUERY, "location"),
            (option::ACCEPT, "accept"),
            (option::IF_MATCH, "if-match"),
            (option::IF_NONE_MATCH, "if-none-match"),
        ]
        .into_iter()
        .map(|(number, name)| (number, name.to_string()))
        .collect();

        let media_formats = [
            ("text/plain", media::TEXT_PLAIN),
            ("text/html", media::TEXT_HTML),
            ("application/link-format", media::APPLICATION_LINK_FORMAT),
            ("application/xml", media::APPLICATION_XML),
            ("application/json", media::APPLICATION_JSON),
            ("image/gif", media::IMAGE_GIF),
            ("image/jpeg", media::IMAGE_JPEG),
            ("image/png", media::IMAGE_PNG),
            ("image/tiff", media::IMAGE_TIFF),
        ]
        .into_iter()
        .map(|(mime, id)| (mime.to_string(), id))
        .collect();

        let format_media = [
            (media::TEXT_PLAIN, "text/plain; charset=utf-8"),
            (media::TEXT_HTML, "text/html"),
            (media::APPLICATION_LINK_FORMAT, "application/link-format"),
            (media::APPLICATION_XML, "application/xml"),
            (media::APPLICATION_JSON, "application/json; charset=UTF-8"),
            (media::IMAGE_GIF, "image/gif"),
            (media::IMAGE_JPEG, "image/jpeg"),
            (media::IMAGE_PNG, "image/png"),
            (media::IMAGE_TIFF, "image/tiff"),
        ]
        .into_iter()
        .map(|(id, mime)| (id, mime.to_string()))
        .collect();

        Self {
            http_methods,
            coap_methods,
            http_status,
            coap_status,
            header_options,
            option_headers,
            media_formats,
            format_media,
        }
    }

    /// Built-in defaults overlaid with the properties file at `path`.
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let text = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::builtin().with_overrides(&text)?;
        tracing::info!(path = %path.display(), "Mapping overrides loaded");
        Ok(table)
    }

    /// Apply `key=value` overrides on top of this table.
    pub fn with_overrides(mut self, text: &str) -> Result<Self, MappingError> {
        for (key, value) in properties::parse(text)? {
            self.apply(&key, &value)?;
        }
        Ok(self)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), MappingError> {
        let invalid = || MappingError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        if let Some(name) = key.strip_prefix("http.request.method.") {
            let code = if value == NOT_IMPLEMENTED {
                None
            } else {
                Some(Code(value.parse().map_err(|_| invalid())?))
            };
            self.http_methods.insert(name.to_ascii_lowercase(), code);
        } else if let Some(code) = key.strip_prefix("coap.request.method.") {
            let code: u8 = code.parse().map_err(|_| invalid())?;
            let method = Method::from_bytes(value.to_ascii_uppercase().as_bytes())
                .map_err(|_| invalid())?;
            self.coap_methods.insert(code, method);
        } else if let Some(status) = key.strip_prefix("http.response.code.") {
            let status: u16 = status.parse().map_err(|_| invalid())?;
            let code: u8 = value.parse().map_err(|_| invalid())?;
            self.http_status.insert(status, Code(code));
        } else if let Some(code) = key.strip_prefix("coap.response.code.") {
            let code: u8 = code.parse().map_err(|_| invalid())?;
            let status = value
                .parse::<u16>()
                .ok()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .ok_or_else(invalid)?;
            self.coap_status.insert(code, status);
        } else if let Some(header) = key.strip_prefix("http.message.header.") {
            let number: u16 = value.parse().map_err(|_| invalid())?;
            self.header_options.insert(header.to_ascii_lowercase(), number);
        } else if let Some(number) = key.strip_prefix("coap.message.option.") {
            let number: u16 = number.parse().map_err(|_| invalid())?;
            self.option_headers.insert(number, value.to_ascii_lowercase());
        } else if let Some(mime) = key.strip_prefix("http.message.content-type.") {
            let id: u16 = value.parse().map_err(|_| invalid())?;
            self.media_formats.insert(mime.to_ascii_lowercase(), id);
        } else if let Some(id) = key.strip_prefix("coap.message.media.") {
            let id: u16 = id.parse().map_err(|_| invalid())?;
            self.format_media.insert(id, value.to_string());
        } else {
            tracing::warn!(key = %key, "Ignoring unknown mapping key");
        }
        Ok(())
    }

    /// CoAP method for an HTTP method; `None` when the method is unsupported.
    pub fn coap_method(&self, method: &Method) -> Option<Code> {
        self.http_methods
            .get(&method.as_str().to_ascii_lowercase())
            .copied()
            .flatten()
    }

    /// HTTP method for a CoAP method code.
    pub fn http_method(&self, code: Code) -> Option<Method> {
        self.coap_methods.get(&code.0).cloned()
    }

    /// CoAP response code for an HTTP status, 5.02 when unmapped.
    pub fn coap_code(&self, status: StatusCode) -> Code {
        self.http_status
            .get(&status.as_u16())
            .copied()
            .unwrap_or(Code::BAD_GATEWAY)
    }

    /// HTTP status for a CoAP response code, 502 when unmapped.
    pub fn http_status(&self, code: Code) -> StatusCode {
        self.coap_status
            .get(&code.0)
            .copied()
            .unwrap_or(StatusCode::BAD_GATEWAY)
    }

    pub fn option_for_header(&self, name: &str) -> Option<u16> {
        self.header_options.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn header_for_option(&self, number: u16) -> Option<&str> {
        self.option_headers.get(&number).map(String::as_str)
    }

    /// Content-format id for a media type. Parameters are ignored unless the
    /// full value is mapped.
    pub fn content_format(&self, media_type: &str) -> Option<u16> {
        let normalized = media_type.trim().to_ascii_lowercase();
        if let Some(id) = self.media_formats.get(&normalized) {
            return Some(*id);
        }
        let essence = normalized.split(';').next().unwrap_or_default().trim();
        self.media_formats.get(essence).copied()
    }

    pub fn media_type(&self, format: u16) -> Option<&str> {
        self.format_media.get(&format).map(String::as_str)
    }
}

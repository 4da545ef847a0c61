//! CoAP request/response model.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;

use crate::coap::option::OptionSet;

pub const DEFAULT_COAP_PORT: u16 = 5683;
pub const DEFAULT_COAPS_PORT: u16 = 5684;

/// A CoAP method or response code (`class.detail`, RFC 7252 §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const EMPTY: Code = Code(0);

    pub const GET: Code = Code(1);
    pub const POST: Code = Code(2);
    pub const PUT: Code = Code(3);
    pub const DELETE: Code = Code(4);
    pub const FETCH: Code = Code(5);
    pub const PATCH: Code = Code(6);
    pub const IPATCH: Code = Code(7);

    pub const CREATED: Code = Code(65);
    pub const DELETED: Code = Code(66);
    pub const VALID: Code = Code(67);
    pub const CHANGED: Code = Code(68);
    pub const CONTENT: Code = Code(69);

    pub const BAD_REQUEST: Code = Code(128);
    pub const UNAUTHORIZED: Code = Code(129);
    pub const BAD_OPTION: Code = Code(130);
    pub const FORBIDDEN: Code = Code(131);
    pub const NOT_FOUND: Code = Code(132);
    pub const METHOD_NOT_ALLOWED: Code = Code(133);
    pub const NOT_ACCEPTABLE: Code = Code(134);
    pub const PRECONDITION_FAILED: Code = Code(140);
    pub const REQUEST_ENTITY_TOO_LARGE: Code = Code(141);
    pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code(143);

    pub const INTERNAL_SERVER_ERROR: Code = Code(160);
    pub const NOT_IMPLEMENTED: Code = Code(161);
    pub const BAD_GATEWAY: Code = Code(162);
    pub const SERVICE_UNAVAILABLE: Code = Code(163);
    pub const GATEWAY_TIMEOUT: Code = Code(164);
    pub const PROXYING_NOT_SUPPORTED: Code = Code(165);

    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    pub fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    pub fn is_request(self) -> bool {
        self.class() == 0 && self.0 != 0
    }

    pub fn is_success(self) -> bool {
        self.class() == 2
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// Message type (RFC 7252 §4.3).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Confirmable = 0,
    NonConfirmable = 1,
    Acknowledgement = 2,
    Reset = 3,
}

impl From<u8> for MessageType {
    fn from(val: u8) -> Self {
        match val & 0x03 {
            0 => MessageType::Confirmable,
            1 => MessageType::NonConfirmable,
            2 => MessageType::Acknowledgement,
            _ => MessageType::Reset,
        }
    }
}

/// Where an outbound request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// A CoAP request.
#[derive(Debug, Clone, PartialEq)]
pub struct CoapRequest {
    pub method: Code,
    pub mtype: MessageType,
    pub options: OptionSet,
    pub payload: Bytes,
    /// Resolved target; `None` until a translator or the ingress fills it in.
    pub destination: Option<Destination>,
}

impl CoapRequest {
    pub fn new(method: Code) -> Self {
        Self {
            method,
            mtype: MessageType::Confirmable,
            options: OptionSet::new(),
            payload: Bytes::new(),
            destination: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Code::GET)
    }

    pub fn is_confirmable(&self) -> bool {
        self.mtype == MessageType::Confirmable
    }

    pub fn set_confirmable(&mut self, confirmable: bool) {
        self.mtype = if confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        };
    }

    pub fn with_proxy_uri(mut self, uri: &str) -> Self {
        self.options.set_proxy_uri(uri);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Path of the request as a `/`-joined string.
    pub fn path(&self) -> String {
        format!("/{}", self.options.uri_path().join("/"))
    }
}

impl fmt::Display for CoapRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_confirmable() { "CON" } else { "NON" };
        write!(f, "{}-{} {}", kind, self.method, self.path())?;
        if let Some(proxy_uri) = self.options.proxy_uri() {
            write!(f, " proxy-uri={}", proxy_uri)?;
        }
        if let Some(dest) = &self.destination {
            write!(f, " -> {}", dest)?;
        }
        Ok(())
    }
}

/// A CoAP response.
#[derive(Debug, Clone, PartialEq)]
pub struct CoapResponse {
    pub code: Code,
    pub options: OptionSet,
    pub payload: Bytes,
    /// Receipt time of the response this one was built from, if known.
    pub timestamp: Option<SystemTime>,
}

impl CoapResponse {
    pub fn new(code: Code) -> Self {
        Self {
            code,
            options: OptionSet::new(),
            payload: Bytes::new(),
            timestamp: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_content_format(mut self, format: u16) -> Self {
        self.options.set_content_format(format);
        self
    }

    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for CoapResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.code, self.payload.len())?;
        if let Some(cf) = self.options.content_format() {
            write!(f, " cf={}", cf)?;
        }
        Ok(())
    }
}

/// Default port for a CoAP URI scheme.
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "coap" => Some(DEFAULT_COAP_PORT),
        "coaps" => Some(DEFAULT_COAPS_PORT),
        _ => None,
    }
}

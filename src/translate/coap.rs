//! CoAP → CoAP forwarding rewrite.
//!
//! The inbound Proxy-Uri is decoded and resolved into a structured
//! destination. A `coap2http/` marker inside the URI splits it into the next
//! hop (up to and including the marker) and the Proxy-Uri carried onward.

use url::{Host, Url};

use crate::coap::message::{default_port, CoapRequest, CoapResponse, Destination};
use crate::coap::option;
use crate::translate::error::TranslationError;

/// Path segment that chains a second, HTTP-facing proxy hop.
pub const COAP2HTTP_MARKER: &str = "coap2http/";

/// Options that never survive a forwarding hop.
const STRIPPED: [u16; 5] = [
    option::PROXY_URI,
    option::BLOCK1,
    option::BLOCK2,
    option::URI_PATH,
    option::URI_QUERY,
];

/// Build the outbound request for a proxied CoAP request.
pub fn coap_to_coap(incoming: &CoapRequest) -> Result<CoapRequest, TranslationError> {
    let raw = incoming
        .options
        .first(option::PROXY_URI)
        .ok_or(TranslationError::MissingProxyTarget)?;
    let decoded = percent_decode(raw)?;
    let (target, next_hop) = split_marker(&decoded);

    let url = Url::parse(target)
        .map_err(|e| TranslationError::MalformedProxyTarget(format!("{}: {}", target, e)))?;
    let port = default_port(url.scheme())
        .ok_or_else(|| TranslationError::UnsupportedScheme(url.scheme().to_string()))?;

    let mut outgoing = CoapRequest::new(incoming.method);
    outgoing.mtype = incoming.mtype;
    outgoing.payload = incoming.payload.clone();
    outgoing.options = incoming.options.clone();
    for number in STRIPPED {
        outgoing.options.remove(number);
    }

    if let Some(segments) = url.path_segments() {
        for segment in segments.filter(|s| !s.is_empty()) {
            outgoing.options.push(option::URI_PATH, decode_component(segment));
        }
    }
    if let Some(query) = url.query() {
        for param in query.split('&').filter(|p| !p.is_empty()) {
            outgoing.options.push(option::URI_QUERY, decode_component(param));
        }
    }
    if let Some(next_hop) = next_hop {
        outgoing.options.set_proxy_uri(next_hop);
    }

    outgoing.destination = Some(Destination {
        scheme: url.scheme().to_string(),
        host: host_of(&url),
        port: url.port().unwrap_or(port),
    });
    Ok(outgoing)
}

/// Copy an upstream response for relay to the client.
pub fn copy_response(response: &CoapResponse) -> CoapResponse {
    CoapResponse {
        code: response.code,
        options: response.options.clone(),
        payload: response.payload.clone(),
        timestamp: response.timestamp,
    }
}

/// Split `uri` at a `coap2http/` marker found after position 0.
///
/// Returns the part up to and including the marker, and the non-empty rest.
pub fn split_marker(uri: &str) -> (&str, Option<&str>) {
    match uri.find(COAP2HTTP_MARKER) {
        Some(pos) if pos > 0 => {
            let end = pos + COAP2HTTP_MARKER.len();
            let rest = &uri[end..];
            if rest.is_empty() {
                (uri, None)
            } else {
                (&uri[..end], Some(rest))
            }
        }
        _ => (uri, None),
    }
}

/// Strict `application/x-www-form-urlencoded` style decoding.
///
/// `+` becomes a space; a `%` must be followed by two hex digits and the
/// result must be valid UTF-8.
pub fn percent_decode(raw: &[u8]) -> Result<String, TranslationError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'%' => {
                let byte = raw
                    .get(i + 1..i + 3)
                    .and_then(|hex| Some(hex_value(hex[0])? << 4 | hex_value(hex[1])?))
                    .ok_or_else(|| {
                        TranslationError::MalformedProxyTarget(format!(
                            "bad escape at byte {}",
                            i
                        ))
                    })?;
                out.push(byte);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out)
        .map_err(|_| TranslationError::MalformedProxyTarget("not valid UTF-8".to_string()))
}

/// Decode a URL path segment or query parameter, keeping it verbatim if it
/// does not decode cleanly.
pub fn decode_component(component: &str) -> String {
    if !component.contains('%') {
        return component.to_string();
    }
    percent_decode(component.replace('+', "%2B").as_bytes())
        .unwrap_or_else(|_| component.to_string())
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn host_of(url: &Url) -> String {
    match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap::message::{Code, MessageType};
    use std::time::SystemTime;

    fn proxied(uri: &str) -> CoapRequest {
        let mut request = CoapRequest::get().with_proxy_uri(uri);
        request.options.push(option::URI_PATH, "coap2coap");
        request
    }

    #[test]
    fn resolves_destination_from_proxy_uri() {
        let out = coap_to_coap(&proxied("coap://node1:5700/sensors/temp?unit=c&raw")).unwrap();
        let dest = out.destination.unwrap();
        assert_eq!(dest.scheme, "coap");
        assert_eq!(dest.host, "node1");
        assert_eq!(dest.port, 5700);
        assert_eq!(out.options.uri_path(), vec!["sensors", "temp"]);
        assert_eq!(out.options.uri_query(), vec!["unit=c", "raw"]);
        assert!(!out.options.has_proxy_uri());
    }

    #[test]
    fn default_ports_by_scheme() {
        let plain = coap_to_coap(&proxied("coap://node1/x")).unwrap();
        assert_eq!(plain.destination.unwrap().port, 5683);
        let secure = coap_to_coap(&proxied("coaps://node1/x")).unwrap();
        assert_eq!(secure.destination.unwrap().port, 5684);
        let v6 = coap_to_coap(&proxied("coap://[::1]/x")).unwrap();
        assert_eq!(v6.destination.unwrap().host, "::1");
    }

    #[test]
    fn strips_forwarding_options_and_keeps_the_rest() {
        let mut request = proxied("coap://node1/a");
        request.set_confirmable(false);
        request.options.push(option::BLOCK2, vec![0x06]);
        request.options.push(option::BLOCK1, vec![0x0e]);
        request.options.push(option::URI_QUERY, "stale=1");
        request.options.push(option::ETAG, vec![1, 2, 3]);
        request.options.set_content_format(50);
        request.payload = bytes::Bytes::from_static(b"{\"on\":true}");

        let out = coap_to_coap(&request).unwrap();
        assert_eq!(out.mtype, MessageType::NonConfirmable);
        assert_eq!(out.method, Code::GET);
        assert_eq!(out.payload, request.payload);

        let mut expected = request.options.clone();
        for number in STRIPPED {
            expected.remove(number);
        }
        expected.push(option::URI_PATH, "a");
        assert_eq!(out.options, expected);
    }

    #[test]
    fn marker_splits_next_hop() {
        let out =
            coap_to_coap(&proxied("coap://hop2/coap2http/http://example.org/robots.txt")).unwrap();
        assert_eq!(out.destination.unwrap().host, "hop2");
        assert_eq!(out.options.uri_path(), vec!["coap2http"]);
        assert_eq!(out.options.proxy_uri(), Some("http://example.org/robots.txt"));
    }

    #[test]
    fn split_marker_edge_cases() {
        assert_eq!(split_marker("coap2http/http://x"), ("coap2http/http://x", None));
        assert_eq!(split_marker("coap://h/coap2http/"), ("coap://h/coap2http/", None));
        assert_eq!(split_marker("coap://h/a"), ("coap://h/a", None));
    }

    #[test]
    fn proxy_uri_is_percent_decoded() {
        let out = coap_to_coap(&proxied("coap%3A%2F%2Fnode1%2Fa+b")).unwrap();
        assert_eq!(out.destination.unwrap().host, "node1");
        assert_eq!(out.options.uri_path(), vec!["a b"]);
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!(matches!(
            coap_to_coap(&proxied("coap://node1/%zz")),
            Err(TranslationError::MalformedProxyTarget(_))
        ));
        assert!(matches!(
            coap_to_coap(&proxied("coap://node1/%e2%82")),
            Err(TranslationError::MalformedProxyTarget(_))
        ));
        assert!(matches!(
            coap_to_coap(&proxied("not a uri")),
            Err(TranslationError::MalformedProxyTarget(_))
        ));
        assert_eq!(
            coap_to_coap(&CoapRequest::get()),
            Err(TranslationError::MissingProxyTarget)
        );
        assert_eq!(
            coap_to_coap(&proxied("ftp://node1/a")),
            Err(TranslationError::UnsupportedScheme("ftp".to_string()))
        );
    }

    #[test]
    fn copy_response_preserves_every_field() {
        let mut response = CoapResponse::new(Code::CONTENT).with_payload("22.5");
        response.options.set_content_format(0);
        response.options.push(option::ETAG, vec![0xab]);
        response.timestamp = Some(SystemTime::UNIX_EPOCH);

        let copy = copy_response(&response);
        assert_eq!(copy, response);
    }
}

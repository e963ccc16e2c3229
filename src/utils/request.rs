use std::str::FromStr;

use http::{HeaderName, Uri};
use once_cell::sync::Lazy;
use pingora::{http::RequestHeader, proxy::Session, ErrorType::*, OrErr, Result};
use url::form_urlencoded;

use crate::config::{STATIC_PATH_PREFIXES, STATIC_PATH_SUFFIXES};

/// Retrieves the request host from the request header.
///
/// Prefers the URI authority (absolute-form requests), then the `Host`
/// header with any port stripped.
pub fn get_request_host(header: &RequestHeader) -> Option<&str> {
    if let Some(host) = header.uri.host() {
        return Some(host);
    }
    if let Some(host) = header.headers.get(http::header::HOST) {
        if let Ok(value) = host.to_str().map(|host| host.split(':').next()) {
            return value;
        }
    }
    None
}

/// Returns the first occurrence of a query parameter, trimmed.
pub fn get_query_param<'a>(header: &'a RequestHeader, name: &str) -> Option<&'a str> {
    if let Some(query) = header.uri.query() {
        for item in query.split('&') {
            if let Some((k, v)) = item.split_once('=') {
                if k == name {
                    return Some(v.trim());
                }
            }
        }
    }
    None
}

/// Rebuilds a query string with `name` set to `value`.
///
/// Other pairs are passed through verbatim in their original order; any
/// existing pairs for `name` are dropped so the parameter ends up with
/// exactly one value. Setting an already-identical value is a no-op shape:
/// the output still carries `name=value` once.
pub fn upsert_query_param(query: &str, name: &str, value: &str) -> String {
    let mut parts: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            key != name
        })
        .map(|pair| pair.to_string())
        .collect();

    let encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
    parts.push(format!("{name}={encoded}"));
    parts.join("&")
}

pub fn merge_path_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    if path.contains('?') {
        format!("{path}&{query}")
    } else {
        format!("{path}?{query}")
    }
}

/// Replaces the logical path and query of a request in place.
pub fn rewrite_uri(header: &mut RequestHeader, path: &str, query: &str) -> Result<()> {
    let merged = merge_path_query(path, query);
    let uri = Uri::try_from(merged.as_str())
        .or_err_with(InvalidHTTPHeader, || format!("Invalid rewritten uri {merged}"))?;
    header.set_uri(uri);
    Ok(())
}

/// Whether the path addresses a static asset (stylesheets, scripts, images,
/// fonts, favicon). Asset requests keep their path even on tenant hosts.
pub fn is_static_asset(path: &str) -> bool {
    let path = path.to_lowercase();
    STATIC_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
        || STATIC_PATH_SUFFIXES.iter().any(|s| path.ends_with(s))
}

static HTTP_HEADER_X_FORWARDED_FOR: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_str("X-Forwarded-For").unwrap());

static HTTP_HEADER_X_REAL_IP: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_str("X-Real-Ip").unwrap());

/// Get remote address from session.
fn get_remote_addr(session: &Session) -> Option<(String, u16)> {
    session
        .client_addr()
        .and_then(|addr| addr.as_inet())
        .map(|addr| (addr.ip().to_string(), addr.port()))
}

/// Gets client IP from `X-Forwarded-For`, `X-Real-IP`, or remote address.
pub fn get_client_ip(session: &Session) -> String {
    if let Some(value) = session.get_header(HTTP_HEADER_X_FORWARDED_FOR.clone()) {
        if let Ok(forwarded) = value.to_str() {
            if let Some(ip) = forwarded.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }

    if let Some(value) = session.get_header(HTTP_HEADER_X_REAL_IP.clone()) {
        if let Ok(real_ip) = value.to_str() {
            return real_ip.trim().to_string();
        }
    }

    if let Some((addr, _)) = get_remote_addr(session) {
        return addr;
    }

    "".to_string()
}

#[test]
fn get_request_host_strips_port_from_host_header() {
    let mut header = RequestHeader::build("GET", b"/Menu", None).unwrap();
    header.insert_header("Host", "pizza.res-menu.example.org:8080").unwrap();
    assert_eq!(
        get_request_host(&header),
        Some("pizza.res-menu.example.org")
    );
}

#[test]
fn get_request_host_prefers_uri_authority() {
    let mut header = RequestHeader::build("GET", b"/Menu", None).unwrap();
    header.set_uri(Uri::try_from("http://sushi.res-menu.example.org/Menu").unwrap());
    header.insert_header("Host", "other.example.org").unwrap();
    assert_eq!(get_request_host(&header), Some("sushi.res-menu.example.org"));
}

#[test]
fn get_query_param_returns_first_occurrence() {
    let header =
        RequestHeader::build("GET", b"/Menu?subdomain=pizza&subdomain=sushi", None).unwrap();
    assert_eq!(get_query_param(&header, "subdomain"), Some("pizza"));
    assert_eq!(get_query_param(&header, "missing"), None);
}

#[test]
fn upsert_query_param_appends_when_absent() {
    assert_eq!(upsert_query_param("", "subdomain", "pizza"), "subdomain=pizza");
    assert_eq!(
        upsert_query_param("table=4", "subdomain", "pizza"),
        "table=4&subdomain=pizza"
    );
}

#[test]
fn upsert_query_param_overwrites_all_existing_values() {
    assert_eq!(
        upsert_query_param("subdomain=old&table=4&subdomain=older", "subdomain", "pizza"),
        "table=4&subdomain=pizza"
    );
}

#[test]
fn upsert_query_param_percent_encodes_value() {
    assert_eq!(
        upsert_query_param("", "subdomain", "a b"),
        "subdomain=a+b"
    );
}

#[test]
fn merge_path_query_handles_empty_and_existing_query() {
    assert_eq!(merge_path_query("/Menu", ""), "/Menu");
    assert_eq!(merge_path_query("/Menu", "a=1"), "/Menu?a=1");
    assert_eq!(merge_path_query("/Menu?a=1", "b=2"), "/Menu?a=1&b=2");
}

#[test]
fn rewrite_uri_replaces_path_and_query_in_place() {
    let mut header = RequestHeader::build("GET", b"/?utm=x", None).unwrap();
    rewrite_uri(&mut header, "/Menu/pizza", "subdomain=pizza").unwrap();
    assert_eq!(header.uri.path(), "/Menu/pizza");
    assert_eq!(header.uri.query(), Some("subdomain=pizza"));
}

#[test]
fn is_static_asset_matches_prefixes_and_suffixes_case_insensitively() {
    assert!(is_static_asset("/css/site.css"));
    assert!(is_static_asset("/images/logo.png"));
    assert!(is_static_asset("/Uploads/Menu.JPG"));
    assert!(is_static_asset("/favicon.ico"));
    assert!(!is_static_asset("/Menu/pizza"));
    assert!(!is_static_asset("/"));
}

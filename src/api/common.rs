//! Common API utilities and shared types

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::PagedResult;

pub const COMMENT_NAME_COOKIE: &str = "ECMS_COMMENT_NAME";
pub const COMMENT_EMAIL_COOKIE: &str = "ECMS_COMMENT_EMAIL";

/// Editor listings show this many rows per page
pub const EDITOR_PER_PAGE: u32 = 30;

// ============================================================================
// Pagination
// ============================================================================

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// One page of a listing with its paging numbers
#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for PageResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
        }
    }
}

// ============================================================================
// Request details
// ============================================================================

/// Address of the client: the first `X-Forwarded-For` hop, `X-Real-IP`, or
/// the socket peer when the server was started with connect info
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = header_str(&parts.headers, "x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let real_ip = || header_str(&parts.headers, "x-real-ip").map(|v| v.trim().to_string());
        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };
        Ok(ClientIp(forwarded.or_else(real_ip).or_else(peer)))
    }
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Value of cookie `name`, percent-decoded
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| urlencoding::decode(value).ok().map(|v| v.into_owned()))
}

/// `Set-Cookie` value remembering a comment form field
pub fn remember_cookie(name: &str, value: &str) -> String {
    format!("{}={}; Path=/; Max-Age=31536000; SameSite=Lax", name, urlencoding::encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn test_cookie_round_trip() {
        let set = remember_cookie(COMMENT_NAME_COOKIE, "Ann Smith");
        assert!(set.starts_with("ECMS_COMMENT_NAME=Ann%20Smith;"));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; ECMS_COMMENT_EMAIL=ann%40example.com"),
        );
        assert_eq!(
            cookie_value(&headers, COMMENT_EMAIL_COOKIE).as_deref(),
            Some("ann@example.com")
        );
        assert!(cookie_value(&headers, COMMENT_NAME_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_client_ip_prefers_forwarded_header() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));

        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ip.is_none());
    }

    #[test]
    fn test_page_response_counts_pages() {
        let result = PagedResult::new(vec![1, 2], 25, &crate::models::ListParams::new(2, 10));
        let response = PageResponse::from(result);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.page, 2);
    }
}

//! HTTP request/response values for the CMDB client.
//!
//! # Design
//! Requests are described as plain data before they are executed. Each
//! `CmdbClient::build_*` method returns an `HttpRequest` carrying the fully
//! signed parameter set, so tests can inspect exactly what would go on the
//! wire — URL, placement (body vs query) and auth fields — without a server.

use crate::sign::Params;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// An outgoing CMDB request described as plain data.
///
/// Read operations carry their parameters in `query`; mutating operations
/// carry them in `body` as a JSON object. Exactly one of the two is
/// populated per request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Params>,
}

impl HttpRequest {
    pub(crate) fn with_body(method: HttpMethod, url: String, body: Params) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub(crate) fn with_query(url: String, query: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            query,
            body: None,
        }
    }
}

/// An HTTP response reduced to what the parsers need.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

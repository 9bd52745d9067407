use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};

use minirpc_common::{code, RpcError, STATUS_CODE_HEADER, STATUS_MSG_HEADER};

/// HTTP response type produced by the server
pub type HttpResponse = Response<Full<Bytes>>;

/// Outcome of one call before it is written as HTTP.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
    pub body: Bytes,
}

impl Reply {
    pub fn success(body: Bytes) -> Self {
        Self {
            status: StatusCode::OK,
            code: code::OK,
            msg: code::SUCCESS_MSG.to_string(),
            body,
        }
    }

    /// A transport-level failure: no body, status derived from the error code.
    pub fn error(err: &RpcError) -> Self {
        let code = err.code();
        Self {
            status: http_status(code),
            code,
            msg: err.to_string(),
            body: Bytes::new(),
        }
    }

    /// Writes the reply with the reserved status headers.
    pub fn into_response(self, content_type: &'static str) -> HttpResponse {
        let has_body = !self.body.is_empty();
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(STATUS_CODE_HEADER, HeaderValue::from(self.code));
        headers.insert(STATUS_MSG_HEADER, header_text(&self.msg));
        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response
    }
}

/// HTTP status used when an error is not enveloped.
pub fn http_status(code: i32) -> StatusCode {
    match code {
        code::BAD_REQUEST => StatusCode::BAD_REQUEST,
        code::NOT_FOUND => StatusCode::NOT_FOUND,
        code::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        code::UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
        code::DEADLINE_EXCEEDED => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Header form of a status message. Control characters become spaces;
/// non-ASCII text is kept as raw UTF-8 bytes.
fn header_text(msg: &str) -> HeaderValue {
    let cleaned = msg.replace(|c: char| c.is_control(), " ");
    HeaderValue::from_bytes(cleaned.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("error"))
}

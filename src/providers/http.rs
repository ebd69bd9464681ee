use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use reqwest::{RequestBuilder, Response, StatusCode};

use crate::error::{MendError, Result};

/// Sends a request, turning transport failures into `Connectivity` errors.
pub(super) async fn send(
    service: &'static str,
    operation: &str,
    request: RequestBuilder,
) -> Result<Response> {
    debug!("{service}: {operation}");
    request
        .send()
        .await
        .map_err(|e| MendError::connectivity(service, operation, e))
}

/// Passes successful responses through; rejected credentials become
/// `Connectivity`, every other failure status becomes `Api`.
pub(super) async fn ensure_success(
    service: &'static str,
    operation: &str,
    response: Response,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(MendError::Connectivity {
            service,
            operation: operation.to_string(),
            message: format!("credentials rejected (status {})", status.as_u16()),
        });
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());
    Err(MendError::Api {
        service,
        operation: operation.to_string(),
        status: status.as_u16(),
        message,
    })
}

pub(super) async fn read_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    operation: &str,
    response: Response,
) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| MendError::Parse(format!("{service} response to {operation}: {e}")))
}

pub(super) async fn read_text(
    service: &'static str,
    operation: &str,
    response: Response,
) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| MendError::connectivity(service, operation, e))
}

/// Decodes base64 file content as returned by the repository APIs.
/// GitHub wraps the payload at 60 columns, so whitespace is dropped first.
pub(super) fn decode_content(path: &str, encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| MendError::Parse(format!("content of {path} is not valid base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| MendError::Parse(format!("content of {path} is not UTF-8: {e}")))
}

pub(super) fn encode_content(content: &str) -> String {
    STANDARD.encode(content.as_bytes())
}

/// Percent-encodes each segment of a repository path, keeping the slashes.
pub(super) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = "ZGVmIHRl\nc3RfYSgp\nOiBwYXNz\n";
        assert_eq!(decode_content("t.py", encoded).unwrap(), "def test_a(): pass");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = decode_content("tests/t.py", "%%%").unwrap_err();
        assert!(err.to_string().contains("tests/t.py"));
    }

    #[test]
    fn encode_then_decode_preserves_unicode() {
        let encoded = encode_content("assert 'zażółć' == x\n");
        assert_eq!(decode_content("t.py", &encoded).unwrap(), "assert 'zażółć' == x\n");
    }

    #[test]
    fn encodes_path_segments() {
        assert_eq!(encode_path("tests/my test.py"), "tests/my%20test.py");
        assert_eq!(encode_path("a/b/c.py"), "a/b/c.py");
    }
}

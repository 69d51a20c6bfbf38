//! Shared blocking transport for the vendor adapters.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::BackendError;

/// HTTP statuses that signal a momentary vendor or gateway condition.
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 502, 503, 504];

/// Build the blocking client every adapter uses.
pub fn build_client(timeout_secs: u64) -> Result<Client, BackendError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BackendError::Unavailable(format!("failed to create HTTP client: {e}")))
}

/// Send a request and decode the JSON envelope.
///
/// Transport faults and non-2xx statuses are classified here so that every
/// adapter reports them identically.
pub fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    endpoint: &str,
) -> Result<T, BackendError> {
    let response = request
        .send()
        .map_err(|e| classify_transport_error(&e, endpoint))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(classify_status(status, body));
    }

    // The body is read lazily; a stall here is still a transport fault.
    let body = response
        .bytes()
        .map_err(|e| classify_transport_error(&e, endpoint))?;

    serde_json::from_slice(&body).map_err(|e| BackendError::MalformedResponse(e.to_string()))
}

/// Map a reqwest failure onto the backend error taxonomy.
pub fn classify_transport_error(e: &reqwest::Error, endpoint: &str) -> BackendError {
    if e.is_timeout() {
        BackendError::Transient(format!("request to {endpoint} timed out"))
    } else if e.is_connect() {
        BackendError::Transient(format!("cannot connect to {endpoint}: {e}"))
    } else if e.is_request() {
        BackendError::Transient(format!("request to {endpoint} failed: {e}"))
    } else if e.is_decode() || e.is_body() {
        BackendError::MalformedResponse(e.to_string())
    } else {
        BackendError::Permanent {
            status: e.status().map(|s| s.as_u16()),
            body: e.to_string(),
        }
    }
}

/// Map a non-success HTTP status onto the backend error taxonomy.
pub fn classify_status(status: StatusCode, body: String) -> BackendError {
    if RETRYABLE_STATUSES.contains(&status.as_u16()) {
        BackendError::Transient(format!("HTTP {}: {}", status.as_u16(), body))
    } else {
        BackendError::Permanent {
            status: Some(status.as_u16()),
            body,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn auth_rejection_is_permanent() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "invalid api key".into());
        assert_eq!(
            err,
            BackendError::Permanent {
                status: Some(401),
                body: "invalid api key".into()
            }
        );
    }

    #[test]
    fn bad_request_is_permanent() {
        let err = classify_status(StatusCode::BAD_REQUEST, "bad".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn gateway_and_rate_limit_statuses_are_transient() {
        for code in [408u16, 429, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(classify_status(status, String::new()).is_transient(), "{code}");
        }
    }

    #[test]
    fn internal_server_error_is_permanent() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn refused_connection_is_transient() {
        // Port 9 on localhost is the discard port; nothing listens there in CI.
        let client = build_client(2).unwrap();
        let result: Result<serde_json::Value, _> =
            send_json(client.get("http://127.0.0.1:9/"), "http://127.0.0.1:9");
        assert!(matches!(result, Err(BackendError::Transient(_))));
    }

    #[test]
    fn body_read_timeout_is_transient() {
        let (base_url, _server) = test_server::serve_stalled_body(Duration::from_secs(4));
        let client = build_client(1).unwrap();
        let result: Result<serde_json::Value, _> = send_json(client.get(&base_url), &base_url);
        assert!(matches!(result, Err(BackendError::Transient(_))), "{result:?}");
    }

    #[test]
    fn truncated_json_envelope_is_malformed() {
        let (base_url, server) = test_server::serve_once("200 OK", r#"{"choices": ["#);
        let client = build_client(5).unwrap();
        let result: Result<serde_json::Value, _> = send_json(client.get(&base_url), &base_url);
        assert!(matches!(result, Err(BackendError::MalformedResponse(_))));
        server.join().unwrap();
    }

    #[test]
    fn error_status_over_the_wire_is_classified() {
        let (base_url, server) = test_server::serve_once("503 Service Unavailable", "{}");
        let client = build_client(5).unwrap();
        let result: Result<serde_json::Value, _> = send_json(client.get(&base_url), &base_url);
        assert!(result.unwrap_err().is_transient());
        server.join().unwrap();

        let (base_url, server) =
            test_server::serve_once("401 Unauthorized", r#"{"error":"bad key"}"#);
        let result: Result<serde_json::Value, _> = send_json(client.get(&base_url), &base_url);
        assert_eq!(
            result.unwrap_err(),
            BackendError::Permanent {
                status: Some(401),
                body: r#"{"error":"bad key"}"#.into()
            }
        );
        server.join().unwrap();
    }
}

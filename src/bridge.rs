//! Security boundary between untrusted callers and the gateway.
//!
//! The untrusted side (a UI, a script, anything reading JSON) can name a
//! registered endpoint and pass scalar parameters. It cannot supply a URL,
//! a header, a method, or reach the registry, cache or limiter directly;
//! [`Bridge`] owns the [`Gateway`] and exposes exactly three operations.
//!
//! Wire format, one JSON object per call:
//!
//! ```text
//! {"op":"fetch","endpointId":"apod","params":{"date":"2024-01-01"},"noCache":false}
//! {"op":"fetch_with_retry","endpointId":"apod","params":{}}
//! {"op":"clear_cache"}
//! ```
//!
//! Every call, well-formed or not, yields a [`BridgeResponse`]:
//!
//! ```text
//! {"data":{..},"error":null,"statusCode":null,"stale":false}
//! {"data":null,"error":"RATE_LIMITED","statusCode":429,"stale":false}
//! ```

use std::io;

use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::RATE_LIMITED_SENTINEL;
use crate::types::{FetchOptions, Fetched, Params};
use crate::{Gateway, GatewayError, Result};

/// Fallback reply if a response cannot be serialised.
const SERIALIZE_FAILURE: &str =
    r#"{"data":null,"error":"internal error: response serialisation failed","statusCode":null,"stale":false}"#;

/// Default cap on a single JSON-lines call, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// One call from the untrusted side.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeCall {
    Fetch(FetchCall),
    FetchWithRetry(FetchCall),
    ClearCache,
}

/// Arguments of a fetch call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FetchCall {
    pub endpoint_id: String,
    /// Object of scalars; `null` members and a missing object mean "absent".
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub no_cache: bool,
}

/// Result of one call, as seen by the untrusted side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResponse {
    pub data: Option<Value>,
    pub error: Option<String>,
    pub status_code: Option<u16>,
    /// Set when `data` is a previous success served because the refresh failed.
    pub stale: bool,
}

impl BridgeResponse {
    /// Whether the call was throttled (locally or by the provider).
    pub fn is_rate_limited(&self) -> bool {
        self.error.as_deref() == Some(RATE_LIMITED_SENTINEL)
    }

    fn failure(error: &GatewayError) -> Self {
        let message = if error.is_rate_limited() {
            RATE_LIMITED_SENTINEL.to_string()
        } else {
            error.to_string()
        };
        Self {
            data: None,
            error: Some(message),
            status_code: error.status_code(),
            stale: false,
        }
    }
}

impl From<Result<Fetched>> for BridgeResponse {
    fn from(result: Result<Fetched>) -> Self {
        match result {
            Ok(fetched) => Self {
                stale: fetched.is_stale(),
                data: Some(Value::clone(&fetched.data)),
                error: None,
                status_code: None,
            },
            Err(e) => Self::failure(&e),
        }
    }
}

/// The capability surface handed to untrusted callers.
pub struct Bridge {
    gateway: Gateway,
    max_line_bytes: usize,
}

impl Bridge {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Longest call [`serve`](Self::serve) will buffer. Longer lines are
    /// discarded and answered with an error.
    pub fn max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max.max(1);
        self
    }

    /// Single attempt; see [`Gateway::fetch`].
    pub async fn fetch(&self, endpoint_id: &str, params: Value, no_cache: bool) -> BridgeResponse {
        let params = match Params::from_json(params) {
            Ok(params) => params,
            Err(e) => return BridgeResponse::failure(&e),
        };
        let options = FetchOptions::new().no_cache(no_cache);
        self.gateway.fetch(endpoint_id, &params, options).await.into()
    }

    /// Retrying fetch with stale fallback; see [`Gateway::fetch_with_retry`].
    pub async fn fetch_with_retry(
        &self,
        endpoint_id: &str,
        params: Value,
        no_cache: bool,
    ) -> BridgeResponse {
        let params = match Params::from_json(params) {
            Ok(params) => params,
            Err(e) => return BridgeResponse::failure(&e),
        };
        let options = FetchOptions::new().no_cache(no_cache);
        self.gateway
            .fetch_with_retry(endpoint_id, &params, options)
            .await
            .into()
    }

    pub fn clear_cache(&self) -> BridgeResponse {
        self.gateway.clear_cache();
        BridgeResponse::default()
    }

    pub async fn dispatch(&self, call: BridgeCall) -> BridgeResponse {
        match call {
            BridgeCall::Fetch(call) => {
                self.fetch(&call.endpoint_id, call.params, call.no_cache)
                    .await
            }
            BridgeCall::FetchWithRetry(call) => {
                self.fetch_with_retry(&call.endpoint_id, call.params, call.no_cache)
                    .await
            }
            BridgeCall::ClearCache => self.clear_cache(),
        }
    }

    /// Decode one JSON call, run it, and encode the response.
    ///
    /// Malformed input produces an error response.
    pub async fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<BridgeCall>(line) {
            Ok(call) => self.dispatch(call).await,
            Err(e) => {
                debug!(error = %e, "malformed bridge call");
                BridgeResponse::failure(&GatewayError::Validation(format!("malformed call: {e}")))
            }
        };
        encode(&response)
    }

    /// Serve JSON-lines calls from `reader`, writing one response line per call.
    ///
    /// Up to `concurrency` calls run at once; responses are written in the
    /// order the calls arrived. Blank lines are skipped. Lines that are not
    /// UTF-8 or exceed the line cap get an error reply and serving goes on.
    /// Returns when the reader reaches EOF, or on a reader/writer I/O error.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W, concurrency: usize) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let max = self.max_line_bytes;
        let frames = stream::unfold(Some(reader), move |state| async move {
            let mut reader = state?;
            match read_frame(&mut reader, max).await {
                Ok(Some(frame)) => Some((Ok(frame), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        });
        let mut replies = std::pin::pin!(
            frames
                .map(|frame: io::Result<Frame>| async move {
                    match frame {
                        Err(e) => Err(e),
                        Ok(Frame::Line(bytes)) => Ok(self.handle_frame(bytes).await),
                        Ok(Frame::Oversized) => {
                            debug!(max, "bridge call exceeds line cap");
                            Ok(Some(encode(&BridgeResponse::failure(&GatewayError::Validation(
                                format!("malformed call: line exceeds {max} bytes"),
                            )))))
                        }
                    }
                })
                .buffered(concurrency.max(1))
        );

        while let Some(reply) = replies.next().await {
            if let Some(mut reply) = reply? {
                reply.push('\n');
                writer.write_all(reply.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    async fn handle_frame(&self, bytes: Vec<u8>) -> Option<String> {
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "bridge call is not UTF-8");
                return Some(encode(&BridgeResponse::failure(&GatewayError::Validation(
                    "malformed call: line is not valid UTF-8".into(),
                ))));
            }
        };
        if line.trim().is_empty() {
            return None;
        }
        Some(self.handle_json(&line).await)
    }
}

fn encode(response: &BridgeResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialise bridge response");
        SERIALIZE_FAILURE.to_string()
    })
}

/// One newline-delimited call as read off the wire.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(Vec<u8>),
    /// Longer than the cap; the bytes were discarded up to the newline.
    Oversized,
}

/// Read the next frame, buffering at most `max` bytes of it.
///
/// `Ok(None)` at EOF with nothing read.
async fn read_frame<R>(reader: &mut R, max: usize) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut oversized = false;
    let mut read_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !read_any {
                return Ok(None);
            }
            break;
        }
        read_any = true;
        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = &available[..newline.unwrap_or(available.len())];
        if !oversized {
            if line.len() + chunk.len() > max {
                oversized = true;
                line = Vec::new();
            } else {
                line.extend_from_slice(chunk);
            }
        }
        let consumed = newline.map_or(available.len(), |i| i + 1);
        reader.consume(consumed);
        if newline.is_some() {
            break;
        }
    }
    if oversized {
        return Ok(Some(Frame::Oversized));
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(Frame::Line(line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RateLimitOrigin;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn decode_fetch_call() {
        let call: BridgeCall = serde_json::from_str(
            r#"{"op":"fetch","endpointId":"apod","params":{"date":"2024-01-01"},"noCache":true}"#,
        )
        .unwrap();
        assert_eq!(
            call,
            BridgeCall::Fetch(FetchCall {
                endpoint_id: "apod".into(),
                params: json!({"date": "2024-01-01"}),
                no_cache: true,
            })
        );
    }

    #[test]
    fn decode_defaults() {
        let call: BridgeCall =
            serde_json::from_str(r#"{"op":"fetch_with_retry","endpointId":"iss-position"}"#)
                .unwrap();
        match call {
            BridgeCall::FetchWithRetry(call) => {
                assert_eq!(call.params, Value::Null);
                assert!(!call.no_cache);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn decode_clear_cache() {
        let call: BridgeCall = serde_json::from_str(r#"{"op":"clear_cache"}"#).unwrap();
        assert_eq!(call, BridgeCall::ClearCache);
    }

    #[test]
    fn url_field_is_rejected() {
        let result = serde_json::from_str::<BridgeCall>(
            r#"{"op":"fetch","endpointId":"apod","url":"https://evil.example"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let result = serde_json::from_str::<BridgeCall>(r#"{"op":"register","endpointId":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn response_shapes() {
        let ok = BridgeResponse::from(Ok(Fetched::stale(Arc::new(json!({"a": 1})))));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"data": {"a": 1}, "error": null, "statusCode": null, "stale": true})
        );

        let local = BridgeResponse::from(Err(GatewayError::RateLimited {
            origin: RateLimitOrigin::Local,
        }));
        assert!(local.is_rate_limited());
        assert_eq!(local.status_code, None);

        let provider = BridgeResponse::from(Err(GatewayError::RateLimited {
            origin: RateLimitOrigin::Provider,
        }));
        assert_eq!(provider.error.as_deref(), Some("RATE_LIMITED"));
        assert_eq!(provider.status_code, Some(429));

        let http = BridgeResponse::from(Err(GatewayError::Http {
            status: 500,
            message: "HTTP 500: Internal Server Error".into(),
        }));
        assert_eq!(http.error.as_deref(), Some("HTTP 500: Internal Server Error"));
        assert_eq!(http.status_code, Some(500));
        assert!(!http.is_rate_limited());
    }

    #[tokio::test]
    async fn frames_split_on_newline_and_strip_cr() {
        let mut reader: &[u8] = b"one\r\n\ntwo";
        assert_eq!(
            read_frame(&mut reader, 16).await.unwrap(),
            Some(Frame::Line(b"one".to_vec()))
        );
        assert_eq!(
            read_frame(&mut reader, 16).await.unwrap(),
            Some(Frame::Line(Vec::new()))
        );
        assert_eq!(
            read_frame(&mut reader, 16).await.unwrap(),
            Some(Frame::Line(b"two".to_vec()))
        );
        assert_eq!(read_frame(&mut reader, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frame_is_discarded_to_newline() {
        let mut reader: &[u8] = b"0123456789abcdef\nok\n";
        assert_eq!(
            read_frame(&mut reader, 8).await.unwrap(),
            Some(Frame::Oversized)
        );
        assert_eq!(
            read_frame(&mut reader, 8).await.unwrap(),
            Some(Frame::Line(b"ok".to_vec()))
        );
    }
}

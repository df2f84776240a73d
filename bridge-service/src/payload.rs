use std::io::Cursor;

use bytes::Bytes;
use serde_json::{Map, Value, json};
use utils::time::Time;

pub type Payload = Map<String, Value>;

pub const DEFAULT_STATE: &str = "triggered";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("JSON body must be an object, got {0}")]
    NotAnObject(&'static str),
    #[error("Request body is neither JSON nor valid UTF-8 text: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("Invalid multipart form body: {0}")]
    Multipart(String),
}

impl From<multer::Error> for PayloadError {
    fn from(e: multer::Error) -> Self {
        PayloadError::Multipart(e.to_string())
    }
}

/// The parts of an HTTP request that contribute to a payload
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Multipart,
    Raw,
}

impl BodyKind {
    fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return BodyKind::Raw;
        };

        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        {
            BodyKind::Json
        } else if mime == "application/x-www-form-urlencoded" {
            BodyKind::Form
        } else if mime == "multipart/form-data" {
            BodyKind::Multipart
        } else {
            BodyKind::Raw
        }
    }
}

/// Builds the MQTT payload of a request.
///
/// Query parameters are merged first and body fields override them. A JSON body is
/// used when the content type says so, form fields when the body is url-encoded or
/// multipart, and any other non-empty body is tried as JSON before being kept
/// verbatim under `data`. A request that contributes nothing gets the default
/// `{"state": "triggered", "timestamp": <received_at>}`.
pub async fn build_payload(
    request: &RequestParts,
    received_at: Time,
) -> Result<Payload, PayloadError> {
    let mut payload = Payload::new();

    if let Some(query) = &request.query {
        merge_url_encoded(&mut payload, query.as_bytes());
    }

    let content_type = request.content_type.as_deref();
    match BodyKind::from_content_type(content_type) {
        BodyKind::Form => merge_url_encoded(&mut payload, &request.body),
        BodyKind::Multipart => {
            if !request.body.is_empty() {
                merge_multipart(
                    &mut payload,
                    content_type.unwrap_or_default(),
                    request.body.clone(),
                )
                .await?;
            }
        }
        BodyKind::Json | BodyKind::Raw => {
            if !request.body.is_empty() {
                merge_json_or_text(&mut payload, &request.body)?;
            }
        }
    }

    if payload.is_empty() {
        return Ok(default_payload(received_at));
    }

    Ok(payload)
}

#[must_use]
pub fn default_payload(received_at: Time) -> Payload {
    let mut payload = Payload::new();
    payload.insert("state".to_string(), json!(DEFAULT_STATE));
    payload.insert(
        "timestamp".to_string(),
        json!(received_at.as_unix_timestamp_f64()),
    );
    payload
}

// A repeated key keeps its first value
fn merge_url_encoded(payload: &mut Payload, input: &[u8]) {
    let mut seen = Payload::new();
    for (key, value) in form_urlencoded::parse(input) {
        if !seen.contains_key(key.as_ref()) {
            seen.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
    payload.extend(seen);
}

// Text fields only, first value wins; uploaded files are not form fields
async fn merge_multipart(
    payload: &mut Payload,
    content_type: &str,
    body: Bytes,
) -> Result<(), PayloadError> {
    let boundary = multer::parse_boundary(content_type)?;
    let mut multipart = multer::Multipart::with_reader(Cursor::new(body), boundary);

    let mut seen = Payload::new();
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };
        let value = field.text().await?;
        if !seen.contains_key(&name) {
            seen.insert(name, Value::String(value));
        }
    }
    payload.extend(seen);

    Ok(())
}

fn merge_json_or_text(payload: &mut Payload, body: &[u8]) -> Result<(), PayloadError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => payload.extend(fields),
        Ok(other) => return Err(PayloadError::NotAnObject(json_kind(&other))),
        Err(_) => {
            let text = std::str::from_utf8(body)?;
            payload.insert("data".to_string(), Value::String(text.to_string()));
        }
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn at() -> Time {
        Time::from_secs_since_epoch(1_700_000_000)
    }

    fn request(query: Option<&str>, content_type: Option<&str>, body: &str) -> RequestParts {
        RequestParts {
            query: query.map(ToOwned::to_owned),
            content_type: content_type.map(ToOwned::to_owned),
            body: Bytes::from(body.to_owned()),
        }
    }

    /// A `multipart/form-data` body with boundary `X`; parts are (name, file name, value)
    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, file_name, value) in parts {
            body.push_str("--X\r\n");
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n"
                )),
            }
            body.push_str(&format!("\r\n{value}\r\n"));
        }
        body.push_str("--X--\r\n");
        body
    }

    const MULTIPART: &str = "multipart/form-data; boundary=X";

    fn as_value(payload: Payload) -> Value {
        Value::Object(payload)
    }

    async fn build(req: &RequestParts) -> Value {
        as_value(build_payload(req, at()).await.unwrap())
    }

    #[tokio::test]
    async fn query_only() {
        let payload = build(&request(Some("a=1&b=2"), None, "")).await;
        assert_eq!(payload, json!({"a": "1", "b": "2"}));
    }

    #[tokio::test]
    async fn json_only() {
        let payload = build(&request(None, Some("application/json"), r#"{"x":1}"#)).await;
        assert_eq!(payload, json!({"x": 1}));
    }

    #[tokio::test]
    async fn json_overrides_query() {
        let payload = build(&request(
            Some("x=from-query&q=kept"),
            Some("application/json"),
            r#"{"x":{"nested":true},"y":null}"#,
        ))
        .await;
        assert_eq!(payload, json!({"x": {"nested": true}, "q": "kept", "y": null}));
    }

    #[tokio::test]
    async fn form_overrides_query() {
        let payload = build(&request(
            Some("state=off&room=hall"),
            Some("application/x-www-form-urlencoded"),
            "state=on&level=50+percent",
        ))
        .await;
        assert_eq!(
            payload,
            json!({"state": "on", "room": "hall", "level": "50 percent"})
        );
    }

    #[tokio::test]
    async fn multipart_fields_become_the_payload() {
        let body = multipart_body(&[("state", None, "on"), ("level", None, "50 percent")]);
        let payload = build(&request(None, Some(MULTIPART), &body)).await;
        assert_eq!(payload, json!({"state": "on", "level": "50 percent"}));
    }

    #[tokio::test]
    async fn multipart_overrides_query_and_keeps_first_value() {
        let body = multipart_body(&[("state", None, "on"), ("state", None, "off")]);
        let payload = build(&request(Some("state=idle&room=hall"), Some(MULTIPART), &body)).await;
        assert_eq!(payload, json!({"state": "on", "room": "hall"}));
    }

    #[tokio::test]
    async fn multipart_file_parts_are_skipped() {
        let body = multipart_body(&[
            ("snapshot", Some("door.jpg"), "not-really-a-jpeg"),
            ("camera", None, "front"),
        ]);
        let payload = build(&request(None, Some(MULTIPART), &body)).await;
        assert_eq!(payload, json!({"camera": "front"}));
    }

    #[tokio::test]
    async fn multipart_with_only_files_gets_default_payload() {
        let body = multipart_body(&[("snapshot", Some("door.jpg"), "bytes")]);
        let payload = build(&request(None, Some(MULTIPART), &body)).await;
        assert_eq!(
            payload,
            json!({"state": "triggered", "timestamp": 1_700_000_000.0})
        );
    }

    #[rstest]
    #[case::missing_boundary("multipart/form-data", "--X\r\n")]
    #[case::truncated(MULTIPART, "--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue")]
    #[tokio::test]
    async fn malformed_multipart_is_an_error(#[case] content_type: &str, #[case] body: &str) {
        let err = build_payload(&request(None, Some(content_type), body), at())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PayloadError::Multipart(_)),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn repeated_keys_keep_first_value() {
        let payload = build(&request(Some("a=1&a=2&b=%2Fx"), None, "")).await;
        assert_eq!(payload, json!({"a": "1", "b": "/x"}));
    }

    #[tokio::test]
    async fn key_order_is_preserved() {
        let payload = build_payload(
            &request(Some("z=1&a=2"), Some("application/json"), r#"{"m":3}"#),
            at(),
        )
        .await
        .unwrap();
        let keys = payload.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[rstest]
    #[case(None)]
    #[case(Some("text/plain"))]
    #[case(Some("application/octet-stream"))]
    #[tokio::test]
    async fn raw_json_body_is_sniffed(#[case] content_type: Option<&str>) {
        let payload = build(&request(None, content_type, r#"{"brightness":80}"#)).await;
        assert_eq!(payload, json!({"brightness": 80}));
    }

    #[rstest]
    #[case(None, "ON")]
    #[case(Some("text/plain"), "hello world")]
    #[case(Some("application/json"), "{not json")]
    #[case(Some("application/json; charset=utf-8"), "{\"x\": ")]
    #[tokio::test]
    async fn non_json_body_goes_to_data(#[case] content_type: Option<&str>, #[case] body: &str) {
        let payload = build(&request(Some("a=1"), content_type, body)).await;
        assert_eq!(payload, json!({"a": "1", "data": body}));
    }

    #[rstest]
    #[case("[1,2]", "an array")]
    #[case("42", "a number")]
    #[case("\"on\"", "a string")]
    #[case("true", "a boolean")]
    #[case("null", "null")]
    #[tokio::test]
    async fn json_body_must_be_an_object(#[case] body: &str, #[case] kind: &'static str) {
        let err = build_payload(&request(None, Some("application/json"), body), at())
            .await
            .unwrap_err();
        assert_eq!(err, PayloadError::NotAnObject(kind));
    }

    #[tokio::test]
    async fn invalid_utf8_raw_body() {
        let req = RequestParts {
            query: None,
            content_type: Some("application/octet-stream".to_string()),
            body: Bytes::from_static(&[0xff, 0xfe, 0x00]),
        };
        assert!(matches!(
            build_payload(&req, at()).await,
            Err(PayloadError::NotUtf8(_))
        ));
    }

    #[rstest]
    #[case(request(None, None, ""))]
    #[case(request(Some(""), None, ""))]
    #[case(request(None, Some("application/json"), ""))]
    #[case(request(None, Some("application/x-www-form-urlencoded"), ""))]
    #[case(request(None, Some(MULTIPART), ""))]
    #[case(request(None, Some("application/json"), "{}"))]
    #[tokio::test]
    async fn empty_request_gets_default_payload(#[case] req: RequestParts) {
        assert_eq!(
            build(&req).await,
            json!({"state": "triggered", "timestamp": 1_700_000_000.0})
        );
    }

    #[rstest]
    #[case(None, BodyKind::Raw)]
    #[case(Some("application/json"), BodyKind::Json)]
    #[case(Some("Application/JSON; charset=UTF-8"), BodyKind::Json)]
    #[case(Some("application/vnd.api+json"), BodyKind::Json)]
    #[case(Some("application/x-www-form-urlencoded"), BodyKind::Form)]
    #[case(Some("application/x-www-form-urlencoded; charset=utf-8"), BodyKind::Form)]
    #[case(Some("multipart/form-data; boundary=x"), BodyKind::Multipart)]
    #[case(Some("Multipart/Form-Data"), BodyKind::Multipart)]
    #[case(Some("multipart/mixed; boundary=x"), BodyKind::Raw)]
    #[case(Some("text/json"), BodyKind::Raw)]
    fn body_kind_from_content_type(#[case] content_type: Option<&str>, #[case] expected: BodyKind) {
        assert_eq!(BodyKind::from_content_type(content_type), expected);
    }
}

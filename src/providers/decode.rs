use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::ProviderError;

/// How a backend's successful response is turned into image bytes. Chosen
/// per backend by configuration; responses are never sniffed to pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    #[serde(alias = "raw", alias = "binary")]
    RawBinary,
    #[serde(alias = "base64", alias = "json")]
    Base64Json,
    #[serde(alias = "chat", alias = "chat_data_url", alias = "data_url")]
    ChatCompletionDataUrl,
}

/// Content type and body of a 2xx backend response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Inline(Vec<u8>),
    /// Plain URL that needs one follow-up GET.
    Remote(String),
}

impl DecodeStrategy {
    pub fn accept_header(&self) -> &'static str {
        match self {
            DecodeStrategy::RawBinary => "image/*",
            DecodeStrategy::Base64Json | DecodeStrategy::ChatCompletionDataUrl => {
                "application/json"
            }
        }
    }

    pub fn normalize(
        &self,
        backend: &str,
        response: &RawResponse,
    ) -> Result<ImagePayload, ProviderError> {
        match self {
            DecodeStrategy::RawBinary => {
                if let Some(content_type) = response
                    .content_type
                    .as_deref()
                    .filter(|value| value.starts_with("application/json"))
                {
                    return Err(ProviderError::decode(
                        backend,
                        format!("expected an image body, got {content_type}"),
                    ));
                }
                if response.body.is_empty() {
                    return Err(ProviderError::missing_field(backend, "image body"));
                }
                Ok(ImagePayload::Inline(response.body.to_vec()))
            }
            DecodeStrategy::Base64Json => {
                let payload: Value = parse_json(backend, &response.body)?;
                let encoded = base64_field(&payload)
                    .ok_or_else(|| ProviderError::missing_field(backend, "image"))?;
                let data = BASE64_STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|err| ProviderError::decode(backend, format!("base64: {err}")))?;
                Ok(ImagePayload::Inline(data))
            }
            DecodeStrategy::ChatCompletionDataUrl => {
                let payload: ChatResponse = parse_json(backend, &response.body)?;
                let reference = payload.image_reference().ok_or_else(|| {
                    ProviderError::missing_field(backend, "choices[0].message image")
                })?;
                if reference.starts_with("data:") {
                    let data = decode_data_url(&reference)
                        .map_err(|detail| ProviderError::decode(backend, detail))?;
                    Ok(ImagePayload::Inline(data))
                } else {
                    Ok(ImagePayload::Remote(reference))
                }
            }
        }
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(backend: &str, body: &[u8]) -> Result<T, ProviderError> {
    serde_json::from_slice(body)
        .map_err(|err| ProviderError::decode(backend, format!("invalid JSON response: {err}")))
}

/// Known envelopes: Stability (`image`, `base64`, `artifacts[0].base64`) and
/// OpenAI-style (`data[0].b64_json`).
fn base64_field(payload: &Value) -> Option<&str> {
    payload
        .get("image")
        .or_else(|| payload.get("base64"))
        .or_else(|| first_row(payload, "artifacts").and_then(|row| row.get("base64")))
        .or_else(|| first_row(payload, "data").and_then(|row| row.get("b64_json")))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn first_row<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload.get(key).and_then(Value::as_array).and_then(|rows| rows.first())
}

/// Decodes `data:image/<type>;base64,<payload>` by splitting on the first comma.
pub fn decode_data_url(value: &str) -> Result<Vec<u8>, String> {
    let (meta, payload) = value
        .split_once(',')
        .ok_or_else(|| "data URL has no payload".to_string())?;
    let meta = meta.trim();
    if !meta.starts_with("data:image/") || !meta.ends_with(";base64") {
        return Err(format!("unsupported data URL header `{meta}`"));
    }
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| format!("data URL base64: {err}"))
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn image_reference(&self) -> Option<String> {
        self.choices
            .iter()
            .find_map(|choice| choice.message.as_ref()?.image_reference())
    }
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<ChatMessageContent>,
    #[serde(default)]
    images: Vec<ChatSegment>,
}

impl ChatMessage {
    fn image_reference(&self) -> Option<String> {
        self.images
            .iter()
            .find_map(ChatSegment::image_url)
            .or_else(|| self.content.as_ref()?.image_reference())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatMessageContent {
    Text(String),
    Segments(Vec<ChatSegment>),
}

impl ChatMessageContent {
    fn image_reference(&self) -> Option<String> {
        match self {
            ChatMessageContent::Text(text) => find_embedded_reference(text),
            ChatMessageContent::Segments(segments) => segments
                .iter()
                .find_map(ChatSegment::image_url)
                .or_else(|| {
                    segments
                        .iter()
                        .filter_map(|segment| segment.text.as_deref())
                        .find_map(find_embedded_reference)
                }),
        }
    }
}

#[derive(Deserialize)]
struct ChatSegment {
    #[serde(rename = "type", default)]
    _kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image_url: Option<ChatImageUrl>,
}

impl ChatSegment {
    fn image_url(&self) -> Option<String> {
        let url = match self.image_url.as_ref()? {
            ChatImageUrl::Object { url } => url,
            ChatImageUrl::Plain(url) => url,
        };
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChatImageUrl {
    Object { url: String },
    Plain(String),
}

/// First `data:image/...` URL in free text, else the first http(s) URL.
fn find_embedded_reference(text: &str) -> Option<String> {
    let start = text
        .find("data:image/")
        .or_else(|| text.find("https://"))
        .or_else(|| text.find("http://"))?;
    let tail = &text[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || matches!(c, ')' | '"' | '\'' | ']' | '>'))
        .unwrap_or(tail.len());
    Some(tail[..end].to_string())
}

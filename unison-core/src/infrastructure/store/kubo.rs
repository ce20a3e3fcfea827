//! IPFS (Kubo) HTTP RPC client: `/api/v0/*`, every call a POST.

use crate::foundation::{ContentId, UnisonError};
use crate::infrastructure::store::traits::{ContentStore, Result, TopicBus, TopicSubscription};
use crate::store_err;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, trace, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Path")]
    path: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct PubsubMessage {
    data: String,
}

#[derive(Clone)]
pub struct KuboClient {
    client: Client,
    base_url: String,
    rpc_timeout: Duration,
}

impl KuboClient {
    pub fn new(api_url: &str, rpc_timeout: Duration) -> Result<Self> {
        let client = Client::builder().build().map_err(|err| store_err!("http client build", err))?;
        Ok(Self { client, base_url: api_url.trim_end_matches('/').to_string(), rpc_timeout })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}/api/v0/{}", self.base_url, path)).timeout(self.rpc_timeout)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response> {
        trace!("kubo: request op={}", operation);
        let response = request.send().await.map_err(|err| classify(operation, err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.message).unwrap_or(body);
        Err(store_err!(operation, format!("http_status={status} message={message}")))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        let body = self.send(operation, request).await?.text().await.map_err(|err| classify(operation, err))?;
        // Streaming endpoints emit one JSON object per line; the last one carries the result.
        let line = body.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default();
        serde_json::from_str(line).map_err(|err| store_err!(operation, format!("decode response: {err}")))
    }
}

/// Kubo pubsub topics travel multibase-encoded: `u` + unpadded base64url.
pub fn encode_topic(topic: &str) -> String {
    format!("u{}", URL_SAFE_NO_PAD.encode(topic.as_bytes()))
}

pub fn decode_multibase(data: &str) -> Result<Vec<u8>> {
    let encoded = data.strip_prefix('u').ok_or_else(|| UnisonError::EncodingError(format!("unsupported multibase prefix: {data:.8}")))?;
    URL_SAFE_NO_PAD.decode(encoded).map_err(|err| UnisonError::EncodingError(err.to_string()))
}

fn classify(operation: &str, err: reqwest::Error) -> UnisonError {
    if err.is_timeout() {
        store_err!(format!("{operation}_timeout"), err)
    } else {
        store_err!(operation, err)
    }
}

fn is_not_pinned(err: &UnisonError) -> bool {
    matches!(err, UnisonError::StoreError { details, .. } if details.contains("not pinned"))
}

#[async_trait]
impl ContentStore for KuboClient {
    async fn add(&self, bytes: Bytes) -> Result<ContentId> {
        let form = Form::new().part("file", Part::stream(bytes).file_name("data"));
        let request = self.post("add").query(&[("pin", "true"), ("quiet", "true")]).multipart(form);
        let response: AddResponse = self.send_json("add", request).await?;
        Ok(ContentId::new(response.hash))
    }

    async fn fetch(&self, content_id: &ContentId) -> Result<Bytes> {
        let request = self.post("cat").query(&[("arg", content_id.as_str())]);
        self.send("cat", request).await?.bytes().await.map_err(|err| classify("cat", err))
    }

    async fn pin(&self, content_id: &ContentId) -> Result<()> {
        self.send("pin/add", self.post("pin/add").query(&[("arg", content_id.as_str())])).await.map(|_| ())
    }

    async fn unpin(&self, content_id: &ContentId) -> Result<()> {
        match self.send("pin/rm", self.post("pin/rm").query(&[("arg", content_id.as_str())])).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_pinned(&err) => {
                debug!("kubo: unpin of unpinned content ignored content_id={}", content_id);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn publish_name(&self, key: &str, content_id: &ContentId, ttl: &str, lifetime: &str, allow_offline: bool) -> Result<String> {
        let path = format!("/ipfs/{content_id}");
        let allow_offline = if allow_offline { "true" } else { "false" };
        let request = self.post("name/publish").query(&[
            ("arg", path.as_str()),
            ("key", key),
            ("ttl", ttl),
            ("lifetime", lifetime),
            ("allow-offline", allow_offline),
            ("resolve", "false"),
        ]);
        let response: PublishResponse = self.send_json("name/publish", request).await?;
        Ok(response.name)
    }

    async fn resolve_name(&self, name: &str) -> Result<ContentId> {
        let arg = if name.starts_with("/ipns/") { name.to_string() } else { format!("/ipns/{name}") };
        let request = self.post("name/resolve").query(&[("arg", arg.as_str())]);
        let response: ResolveResponse = self.send_json("name/resolve", request).await?;
        let cid = response.path.trim_start_matches("/ipfs/");
        Ok(ContentId::from(cid))
    }

    async fn gc(&self) -> Result<()> {
        self.send("repo/gc", self.post("repo/gc").query(&[("quiet", "true")])).await?.bytes().await.map_err(|err| classify("repo/gc", err))?;
        Ok(())
    }
}

#[async_trait]
impl TopicBus for KuboClient {
    async fn publish_topic(&self, topic: &str, bytes: Vec<u8>) -> Result<()> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name("data"));
        let request = self.post("pubsub/pub").query(&[("arg", encode_topic(topic))]).multipart(form);
        self.send("pubsub/pub", request).await.map(|_| ())
    }

    async fn subscribe_topic(&self, topic: &str) -> Result<TopicSubscription> {
        // Long-lived stream: no per-call timeout.
        let request = self.client.post(format!("{}/api/v0/pubsub/sub", self.base_url)).query(&[("arg", encode_topic(topic))]);
        let response = self.send("pubsub/sub", request).await?;
        let topic = topic.to_string();
        let mut body = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(store_err!("pubsub/sub", err));
                        break;
                    }
                };
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    match serde_json::from_slice::<PubsubMessage>(&line) {
                        Ok(message) => yield decode_multibase(&message.data),
                        Err(err) => warn!("kubo: undecodable pubsub line topic={} error={}", topic, err),
                    }
                }
            }
            debug!("kubo: pubsub stream closed topic={}", topic);
        };
        Ok(TopicSubscription::new(Box::pin(stream)))
    }
}

//! HTTP bridge client: connects the agent's identity through a local bridge
//! daemon and streams inbound messages as NDJSON.

use crate::identity::{EncryptionKey, Environment, Signer};
use crate::network::client::{ClientError, Conversation, MessageStream, MessagingClient};
use crate::network::types::{Member, Message};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Applies to every call except the long-lived message stream.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// The bridge sends keepalives well inside this window.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const MAX_FRAME_BYTES: usize = 1 << 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    inbox_id: String,
    #[serde(default)]
    signature_request: Option<SignatureRequest>,
}

#[derive(Debug, Deserialize)]
struct SignatureRequest {
    id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamFrame {
    Message { message: Message },
    Keepalive,
    Error { error: String },
}

#[derive(Debug, Deserialize)]
struct InboxState {
    #[serde(default)]
    addresses: Vec<String>,
}

async fn error_from_response(what: &str, res: reqwest::Response) -> ClientError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    ClientError::Api(format!("{} failed: {} {}", what, status, body))
}

/// Decode one NDJSON line. `None` for blank lines and keepalives.
fn parse_frame(line: &[u8]) -> Option<Result<Message, ClientError>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamFrame>(line) {
        Ok(StreamFrame::Message { message }) => Some(Ok(message)),
        Ok(StreamFrame::Keepalive) => None,
        Ok(StreamFrame::Error { error }) => Some(Err(ClientError::Stream(error))),
        Err(e) => Some(Err(ClientError::Stream(format!("malformed frame: {}", e)))),
    }
}

/// Split a byte stream into NDJSON frames. A transport error, an oversized line,
/// or no data for `idle_timeout` yields one error and ends the stream.
fn frame_stream<S, B, E>(bytes: S, idle_timeout: Duration, max_frame: usize) -> MessageStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let bytes = Box::pin(bytes.fuse());
    futures_util::stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        move |(mut bytes, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=i).collect();
                    match parse_frame(&line) {
                        Some(item) => return Some((item, (bytes, buffer, false))),
                        None => continue,
                    }
                }
                if buffer.len() > max_frame {
                    let err = ClientError::Stream(format!(
                        "frame exceeds {} bytes without a newline",
                        max_frame
                    ));
                    return Some((Err(err), (bytes, Vec::new(), true)));
                }
                match tokio::time::timeout(idle_timeout, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => buffer.extend_from_slice(chunk.as_ref()),
                    Ok(Some(Err(e))) => return Some((Err(e.into()), (bytes, buffer, true))),
                    Ok(None) => {
                        // Flush a trailing frame with no newline, then end.
                        let rest = std::mem::take(&mut buffer);
                        return parse_frame(&rest).map(|item| (item, (bytes, buffer, true)));
                    }
                    Err(_) => {
                        let err = ClientError::Stream(format!(
                            "no data for {}s",
                            idle_timeout.as_secs_f32()
                        ));
                        return Some((Err(err), (bytes, buffer, true)));
                    }
                }
            }
        },
    )
    .boxed()
}

/// Client for one inbox on the bridge.
pub struct BridgeClient {
    base_url: String,
    inbox_id: String,
    address: String,
    env: Environment,
    client: reqwest::Client,
}

impl BridgeClient {
    /// Register the signer with the bridge (completing a signature request if the
    /// network asks for one) and return a client bound to the resulting inbox.
    pub async fn connect(
        base_url: &str,
        signer: &Signer,
        encryption_key: &EncryptionKey,
        env: Environment,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let body = serde_json::json!({
            "address": signer.address(),
            "env": env.as_str(),
            "dbEncryptionKey": encryption_key.to_hex(),
        });
        let res = client
            .post(format!("{}/v1/clients", base_url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response("connect", res).await);
        }
        let data: ConnectResponse = res.json().await?;

        if let Some(request) = data.signature_request {
            log::debug!("bridge: signing identity request {}", request.id);
            let signature = signer.sign_personal_message(&request.text)?;
            let body = serde_json::json!({ "requestId": request.id, "signature": signature });
            let res = client
                .post(format!("{}/v1/clients/{}/signatures", base_url, data.inbox_id))
                .timeout(REQUEST_TIMEOUT)
                .json(&body)
                .send()
                .await?;
            if !res.status().is_success() {
                return Err(error_from_response("identity signature", res).await);
            }
        }

        log::info!(
            "bridge: connected {} as inbox {} ({})",
            signer.address(),
            data.inbox_id,
            env
        );
        Ok(Self {
            base_url,
            inbox_id: data.inbox_id,
            address: signer.address().to_string(),
            env,
            client,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    fn client_url(&self, path: &str) -> String {
        format!("{}/v1/clients/{}{}", self.base_url, self.inbox_id, path)
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    fn inbox_id(&self) -> &str {
        &self.inbox_id
    }

    async fn sync_conversations(&self) -> Result<(), ClientError> {
        let res = self
            .client
            .post(self.client_url("/conversations/sync"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response("sync", res).await);
        }
        Ok(())
    }

    async fn stream_messages(&self) -> Result<MessageStream, ClientError> {
        let res = self
            .client
            .get(self.client_url("/messages/stream"))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response("stream", res).await);
        }
        Ok(frame_stream(
            res.bytes_stream(),
            STREAM_IDLE_TIMEOUT,
            MAX_FRAME_BYTES,
        ))
    }

    async fn get_conversation_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Arc<dyn Conversation>>, ClientError> {
        let url = self.client_url(&format!("/conversations/{}", id));
        let res = self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(error_from_response("get conversation", res).await);
        }
        Ok(Some(Arc::new(BridgeConversation {
            id: id.to_string(),
            url,
            client: self.client.clone(),
        })))
    }

    async fn resolve_address_for_inbox_id(
        &self,
        inbox_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let url = format!("{}/v1/inboxes/{}", self.base_url, inbox_id);
        let res = self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(error_from_response("inbox lookup", res).await);
        }
        let state: InboxState = res.json().await?;
        Ok(state.addresses.into_iter().find(|a| !a.trim().is_empty()))
    }
}

/// Conversation handle backed by the bridge.
struct BridgeConversation {
    id: String,
    url: String,
    client: reqwest::Client,
}

#[async_trait]
impl Conversation for BridgeConversation {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, text: &str) -> Result<(), ClientError> {
        let body = serde_json::json!({ "content": text });
        let res = self
            .client
            .post(format!("{}/messages", self.url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response("send", res).await);
        }
        Ok(())
    }

    async fn members(&self) -> Result<Vec<Member>, ClientError> {
        let res = self
            .client
            .get(format!("{}/members", self.url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(error_from_response("members", res).await);
        }
        Ok(res.json().await?)
    }
}

//! [`RemoteStore`] over the directory service's REST API and SSE change stream.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::remote::{ChangeStream, RemoteStore};
use super::ClientError;
use crate::api::EditApproval;
use crate::auth::ADMIN_KEY_HEADER;
use crate::config::ClientConfig;
use crate::errors::{codes, ErrorDetails};
use crate::models::{
    ChangeEvent, DirectorySnapshot, Moderation, NewVote, RecordVisitRequest, Resource,
    ResourceEdit, ResourceFields, VisitorCount, VisitorRecord, Vote, VoteCounts, VoteKind,
    VoteLookup,
};

/// Which failure to report when the transport or service gives no specific code.
#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn failure(self, message: String) -> ClientError {
        match self {
            Access::Read => ClientError::RemoteReadFailed(message),
            Access::Write => ClientError::RemoteWriteFailed(message),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    error: Option<ErrorDetails>,
}

/// HTTP client for the directory service.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    admin_key: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, admin_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_url.clone(), config.admin_key.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.admin_key {
            Some(key) => request.header(ADMIN_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        access: Access,
    ) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| access.failure(format!("Request failed: {}", e)))?;
        let status = response.status();

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| access.failure(format!("Invalid response ({}): {}", status, e)))?;

        if !envelope.success {
            let (code, message) = match envelope.error {
                Some(details) => (details.code, details.message),
                None => (String::new(), format!("Request failed with status {}", status)),
            };
            return Err(classify(access, &code, message));
        }

        serde_json::from_value(envelope.data)
            .map_err(|e| access.failure(format!("Unexpected payload: {}", e)))
    }
}

fn classify(access: Access, code: &str, message: String) -> ClientError {
    match code {
        codes::NOT_PENDING => ClientError::NotPending(message),
        codes::NOT_FOUND => ClientError::NotFound(message),
        codes::VALIDATION_ERROR => ClientError::ValidationFailed(message),
        _ => access.failure(message),
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_snapshot(&self) -> Result<DirectorySnapshot, ClientError> {
        self.send(self.client.get(self.url("/snapshot")), Access::Read)
            .await
    }

    async fn insert_resource(&self, fields: &ResourceFields) -> Result<Resource, ClientError> {
        self.send(
            self.client.post(self.url("/resources")).json(fields),
            Access::Write,
        )
        .await
    }

    async fn admin_insert_resource(
        &self,
        fields: &ResourceFields,
    ) -> Result<Resource, ClientError> {
        let request = self.client.post(self.url("/admin/resources")).json(fields);
        self.send(self.admin(request), Access::Write).await
    }

    async fn admin_update_resource(
        &self,
        id: &str,
        fields: &ResourceFields,
    ) -> Result<Resource, ClientError> {
        let request = self
            .client
            .put(self.url(&format!("/admin/resources/{}", id)))
            .json(fields);
        self.send(self.admin(request), Access::Write).await
    }

    async fn moderate_resource(
        &self,
        id: &str,
        decision: Moderation,
    ) -> Result<Resource, ClientError> {
        let action = match decision {
            Moderation::Approve => "approve",
            Moderation::Reject => "reject",
        };
        let request = self
            .client
            .post(self.url(&format!("/admin/resources/{}/{}", id, action)));
        self.send(self.admin(request), Access::Write).await
    }

    async fn delete_resource(&self, id: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .delete(self.url(&format!("/admin/resources/{}", id)));
        self.send(self.admin(request), Access::Write).await
    }

    async fn insert_edit(
        &self,
        resource_id: &str,
        fields: &ResourceFields,
    ) -> Result<ResourceEdit, ClientError> {
        self.send(
            self.client
                .post(self.url(&format!("/resources/{}/edits", resource_id)))
                .json(fields),
            Access::Write,
        )
        .await
    }

    async fn approve_edit(&self, edit_id: &str) -> Result<(ResourceEdit, Resource), ClientError> {
        let approval: EditApproval = self
            .send(
                self.client
                    .post(self.url(&format!("/edits/{}/approve", edit_id))),
                Access::Write,
            )
            .await?;
        Ok((approval.edit, approval.resource))
    }

    async fn reject_edit(&self, edit_id: &str) -> Result<ResourceEdit, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/admin/edits/{}/reject", edit_id)));
        self.send(self.admin(request), Access::Write).await
    }

    async fn find_vote(
        &self,
        kind: VoteKind,
        lookup: &VoteLookup,
    ) -> Result<Option<Vote>, ClientError> {
        let votes: Vec<Vote> = self
            .send(
                self.client
                    .get(self.url(&format!("/votes/{}", kind.as_str())))
                    .query(lookup),
                Access::Read,
            )
            .await?;
        Ok(votes.into_iter().next())
    }

    async fn insert_vote(&self, kind: VoteKind, vote: &NewVote) -> Result<Vote, ClientError> {
        self.send(
            self.client
                .post(self.url(&format!("/votes/{}", kind.as_str())))
                .json(vote),
            Access::Write,
        )
        .await
    }

    async fn vote_counts(&self, resource_id: &str) -> Result<VoteCounts, ClientError> {
        self.send(
            self.client
                .get(self.url(&format!("/resources/{}/counts", resource_id))),
            Access::Read,
        )
        .await
    }

    async fn record_visit(
        &self,
        request: &RecordVisitRequest,
    ) -> Result<VisitorRecord, ClientError> {
        self.send(
            self.client.post(self.url("/visitors")).json(request),
            Access::Write,
        )
        .await
    }

    async fn visitor_count(&self) -> Result<i64, ClientError> {
        let count: VisitorCount = self
            .send(self.client.get(self.url("/visitors/count")), Access::Read)
            .await?;
        Ok(count.total_visitors)
    }

    async fn subscribe_changes(&self) -> Result<ChangeStream, ClientError> {
        let response = self
            .client
            .get(self.url("/changes"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ClientError::RemoteReadFailed(format!("Subscribe failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ClientError::RemoteReadFailed(format!(
                "Subscribe failed with status {}",
                response.status()
            )));
        }

        let bytes = response.bytes_stream().boxed();
        let stream = futures::stream::unfold(
            (bytes, Vec::<u8>::new()),
            |(mut bytes, mut buffer)| async move {
                loop {
                    if let Some(end) = frame_end(&buffer) {
                        let frame: Vec<u8> = buffer.drain(..end + 2).collect();
                        let frame = String::from_utf8_lossy(&frame[..end]).into_owned();
                        match parse_frame(&frame) {
                            Some(item) => return Some((item, (bytes, buffer))),
                            None => continue,
                        }
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'))
                        }
                        Some(Err(e)) => {
                            let failure = ClientError::RemoteReadFailed(format!(
                                "Change stream interrupted: {}",
                                e
                            ));
                            return Some((Err(failure), (bytes, buffer)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}

/// Index of the blank line terminating the first complete SSE frame.
fn frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

/// Decode one SSE frame. Keep-alive comments and unknown events yield `None`.
fn parse_frame(frame: &str) -> Option<Result<ChangeEvent, ClientError>> {
    let mut event = "message";
    let mut data = String::new();

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix("event:") {
            event = value.trim();
        } else if let Some(value) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    match event {
        "change" => Some(serde_json::from_str(&data).map_err(|e| {
            ClientError::RemoteReadFailed(format!("Undecodable change event: {}", e))
        })),
        "lagged" => Some(Err(ClientError::RemoteReadFailed(
            "Change stream lagged; notifications were dropped".to_string(),
        ))),
        _ => None,
    }
}

use crate::controller::{Controller, StreamId};
use crate::error::ControlError;
use async_trait::async_trait;
use eternity_core::{
    CreateSaveRequest, Host, HostId, Instance, InstanceId, InstanceSpec, SaveSnapshot,
    SaveUploadResult, TransferSaveRequest,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// JSON-over-HTTP client for the controller API.
#[derive(Clone, Debug)]
pub struct HttpController {
    client: Client,
    base: Url,
    token: Option<String>,
}

#[derive(Serialize)]
struct StartBody<'a> {
    save: Option<&'a str>,
}

#[derive(Serialize)]
struct AssignBody {
    host_id: HostId,
}

#[derive(Serialize)]
struct RconBody<'a> {
    command: &'a str,
}

#[derive(Deserialize)]
struct RconReply {
    output: String,
}

#[derive(Deserialize)]
struct DownloadTicket {
    stream_id: StreamId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpController {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ControlError> {
        let base =
            Url::parse(base_url).map_err(|e| ControlError::Url(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ControlError::Url(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ControlError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ControlError::Url(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!("{method} {url}");
        let req = self.client.request(method, url);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ControlError> {
        let resp = req.send().await.map_err(ControlError::Transport)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ControlError::rejected(status.as_u16(), rejection_message(&body)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ControlError> {
        let resp = self.send(self.request(Method::GET, url)).await?;
        Ok(resp.json().await?)
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ControlError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(segments)?;
        let resp = self.send(self.request(Method::POST, url).json(body)).await?;
        Ok(resp.json().await?)
    }

    async fn post_ack<B>(&self, segments: &[&str], body: &B) -> Result<(), ControlError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.url(segments)?;
        self.send(self.request(Method::POST, url).json(body)).await?;
        Ok(())
    }
}

/// Prefer the `error` field of a JSON error body, fall back to the raw text.
fn rejection_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no message".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Controller for HttpController {
    async fn list_instances(&self) -> Result<Vec<Instance>, ControlError> {
        self.get_json(self.url(&["api", "instances"])?).await
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, ControlError> {
        self.get_json(self.url(&["api", "hosts"])?).await
    }

    async fn list_saves(
        &self,
        instance: Option<InstanceId>,
    ) -> Result<Vec<SaveSnapshot>, ControlError> {
        let mut url = self.url(&["api", "saves"])?;
        if let Some(id) = instance {
            url.query_pairs_mut().append_pair("instance_id", &id.to_string());
        }
        self.get_json(url).await
    }

    async fn stop_instance(&self, instance: InstanceId) -> Result<(), ControlError> {
        let id = instance.to_string();
        self.post_ack(&["api", "instances", id.as_str(), "stop"], &serde_json::json!({}))
            .await
    }

    async fn start_instance(
        &self,
        instance: InstanceId,
        save: Option<&str>,
    ) -> Result<(), ControlError> {
        let id = instance.to_string();
        self.post_ack(&["api", "instances", id.as_str(), "start"], &StartBody { save })
            .await
    }

    async fn assign_instance(
        &self,
        instance: InstanceId,
        host: HostId,
    ) -> Result<(), ControlError> {
        let id = instance.to_string();
        self.post_ack(&["api", "instances", id.as_str(), "assign"], &AssignBody { host_id: host })
            .await
    }

    async fn request_download(
        &self,
        instance: InstanceId,
        save: &str,
    ) -> Result<StreamId, ControlError> {
        let id = instance.to_string();
        let ticket: DownloadTicket = self
            .post_json(
                &["api", "instances", id.as_str(), "saves", save, "download"],
                &serde_json::json!({}),
            )
            .await?;
        Ok(ticket.stream_id)
    }

    async fn fetch_stream(
        &self,
        stream: &str,
        out: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, ControlError> {
        let url = self.url(&["api", "stream", stream])?;
        let mut resp = self.send(self.request(Method::GET, url)).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await.map_err(ControlError::Transport)? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }

    async fn upload_save(
        &self,
        instance: InstanceId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<SaveUploadResult, ControlError> {
        let mut url = self.url(&["api", "upload-save"])?;
        url.query_pairs_mut()
            .append_pair("instance_id", &instance.to_string())
            .append_pair("filename", filename);
        let req = self
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/zip")
            .body(bytes);
        let resp = self.send(req).await?;
        Ok(resp.json().await?)
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<(), ControlError> {
        self.post_ack(&["api", "instances"], spec).await
    }

    async fn transfer_save(&self, request: &TransferSaveRequest) -> Result<(), ControlError> {
        let id = request.source_instance.to_string();
        self.post_ack(&["api", "instances", id.as_str(), "saves", "transfer"], request)
            .await
    }

    async fn create_save(
        &self,
        instance: InstanceId,
        request: &CreateSaveRequest,
    ) -> Result<(), ControlError> {
        let id = instance.to_string();
        self.post_ack(&["api", "instances", id.as_str(), "saves", "create"], request)
            .await
    }

    async fn send_rcon(&self, instance: InstanceId, command: &str) -> Result<String, ControlError> {
        let id = instance.to_string();
        let reply: RconReply = self
            .post_json(&["api", "instances", id.as_str(), "rcon"], &RconBody { command })
            .await?;
        Ok(reply.output)
    }
}

//! WebSocket channel provider.
//!
//! The channel address embeds the project id, e.g.
//! `ws://localhost:8000/api/v1/projects/P1/subscribe`. `http(s)` server URLs
//! are mapped to `ws(s)`.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::channel::{Channel, ChannelConnector, ProjectId};
use crate::errors::SyncError;

pub const DEFAULT_PATH_TEMPLATE: &str = "/api/v1/projects/{project_id}/subscribe";

/// Opens one WebSocket per project.
#[derive(Debug, Clone)]
pub struct WsConnector {
    server_url: String,
    path_template: String,
}

impl WsConnector {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
        }
    }

    /// Override the path; `{project_id}` is replaced with the target.
    pub fn with_path_template(mut self, template: impl Into<String>) -> Self {
        self.path_template = template.into();
        self
    }

    pub fn channel_url(&self, project_id: &ProjectId) -> String {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        let path = self
            .path_template
            .replace("{project_id}", project_id.as_str());
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn connect(&self, project_id: &ProjectId) -> Result<Box<dyn Channel>, SyncError> {
        let url = self.channel_url(project_id);
        debug!(%url, "Opening WebSocket channel");
        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| SyncError::Connect {
                    url: url.clone(),
                    message: e.to_string(),
                })?;
        Ok(Box::new(WsChannel { stream }))
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open WebSocket channel.
pub struct WsChannel {
    stream: WsStream,
}

#[async_trait]
impl Channel for WsChannel {
    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => {
                        warn!(error = %e, len = bytes.len(), "Skipping binary frame that is not UTF-8");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Peer closed WebSocket channel");
                    return None;
                }
                // Pongs are queued by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(SyncError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }
}

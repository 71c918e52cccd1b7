use std::time::Duration;

use atlas_types::models::{Deployment, Room};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::{SyncError, net_err};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Interface to one deployment's display channel.
///
/// The chat-platform rendering itself lives outside this service; the
/// coordinator only needs "put this room up, give me a message id" and
/// "take that message down".
pub trait DisplaySurface: Send + Sync + 'static {
    /// Render a room in the deployment's display channel. Returns the id
    /// of the rendered message.
    fn render<'a>(
        &'a self,
        deployment: &'a Deployment,
        room: &'a Room,
    ) -> BoxFuture<'a, Result<i64, SyncError>>;

    /// Take down a previously rendered message.
    fn remove<'a>(
        &'a self,
        deployment: &'a Deployment,
        message_id: i64,
    ) -> BoxFuture<'a, Result<(), SyncError>>;
}

/// Production surface: each deployment's hosting layer exposes a small
/// render endpoint next to its display channel.
pub struct HttpSurface {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    message_id: i64,
}

impl HttpSurface {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for HttpSurface {
    fn render<'a>(
        &'a self,
        deployment: &'a Deployment,
        room: &'a Room,
    ) -> BoxFuture<'a, Result<i64, SyncError>> {
        async move {
            let url = format!("{}/render", deployment.display_url.trim_end_matches('/'));
            let resp = self
                .client
                .post(&url)
                .timeout(CALL_TIMEOUT)
                .json(room)
                .send()
                .await
                .map_err(net_err)?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SyncError::from_status(status, body));
            }

            let body: RenderResponse = resp.json().await.map_err(net_err)?;
            Ok(body.message_id)
        }
        .boxed()
    }

    fn remove<'a>(
        &'a self,
        deployment: &'a Deployment,
        message_id: i64,
    ) -> BoxFuture<'a, Result<(), SyncError>> {
        async move {
            let url = format!(
                "{}/messages/{}",
                deployment.display_url.trim_end_matches('/'),
                message_id
            );
            let resp = self
                .client
                .delete(&url)
                .timeout(CALL_TIMEOUT)
                .send()
                .await
                .map_err(net_err)?;

            let status = resp.status();
            // Already gone is fine — removal is idempotent.
            if !status.is_success() && status.as_u16() != 404 {
                let body = resp.text().await.unwrap_or_default();
                return Err(SyncError::from_status(status, body));
            }
            Ok(())
        }
        .boxed()
    }
}

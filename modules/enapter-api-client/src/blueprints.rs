use bytes::Bytes;
use http::Method;
use tracing::{debug, instrument};

use crate::client::Client;
use crate::error::ClientError;

const DOWNLOAD_PATH: &str = "/blueprints/v1/download";

/// Blueprints API, obtained from [`Client::blueprints`].
#[derive(Debug, Clone, Copy)]
pub struct BlueprintsApi<'a> {
    client: &'a Client,
}

impl<'a> BlueprintsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Download a blueprint archive as raw bytes.
    ///
    /// # Errors
    /// Fails on transport failure, server rejection or when the body cannot
    /// be read to the end.
    #[instrument(skip(self))]
    pub async fn download(&self, blueprint_id: &str) -> Result<Bytes, ClientError> {
        let mut req = self.client.new_request(Method::GET, DOWNLOAD_PATH)?;
        req.set_query_param("blueprint_id", blueprint_id);

        let archive = self.client.send(&req).await?.bytes().await?;
        debug!(size = archive.len(), "blueprint downloaded");
        Ok(archive)
    }
}

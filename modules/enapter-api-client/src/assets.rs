use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::client::Client;
use crate::error::{ClientError, ErrorDetail};
use crate::request::Request;

const DEVICES_PATH: &str = "/api/v1/devices";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Endpoint,
    Ucm,
    Gateway,
    /// A type this client does not know about yet.
    #[serde(other)]
    Unknown,
}

impl DeviceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Endpoint => "endpoint",
            DeviceType::Ucm => "ucm",
            DeviceType::Gateway => "gateway",
            DeviceType::Unknown => "unknown",
        }
    }
}

/// Optional device sections to include in the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpandDeviceParams {
    pub manifest: bool,
    pub properties: bool,
    pub connectivity: bool,
}

impl ExpandDeviceParams {
    /// Everything the API can expand.
    #[must_use]
    pub fn all() -> Self {
        Self {
            manifest: true,
            properties: true,
            connectivity: true,
        }
    }

    fn encode(self) -> String {
        [
            (self.manifest, "manifest"),
            (self.properties, "properties"),
            (self.connectivity, "connectivity"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect::<Vec<_>>()
        .join(",")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicesQuery {
    pub page_token: Option<String>,
    pub page_size: Option<u32>,
    /// Only list devices of these types. [`DeviceType::Unknown`] is ignored.
    pub filter_type_in: Vec<DeviceType>,
    pub expand: ExpandDeviceParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceByIdQuery {
    pub id: String,
    pub expand: ExpandDeviceParams,
}

impl DeviceByIdQuery {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            expand: ExpandDeviceParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConnectivity {
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity: Option<DeviceConnectivity>,
    /// Device manifest, kept as raw JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
}

/// One page of devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
    /// Token for the next page; empty or absent on the last one.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl DevicesResponse {
    /// Token to pass as [`DevicesQuery::page_token`] to fetch the next page.
    #[must_use]
    pub fn next_page(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceByIdResponse {
    pub device: Device,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

/// Devices API, obtained from [`Client::assets`].
#[derive(Debug, Clone, Copy)]
pub struct AssetsApi<'a> {
    client: &'a Client,
}

impl<'a> AssetsApi<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// List devices, one page at a time.
    ///
    /// # Errors
    /// Fails on transport failure, server rejection or an undecodable body.
    #[instrument(skip_all, fields(page_size = query.page_size))]
    pub async fn devices(&self, query: &DevicesQuery) -> Result<DevicesResponse, ClientError> {
        let mut req = self.client.new_request(Method::GET, DEVICES_PATH)?;
        set_non_empty(&mut req, "page_token", query.page_token.as_deref().unwrap_or_default());
        if let Some(size) = query.page_size.filter(|s| *s != 0) {
            req.set_query_param("page_size", &size.to_string());
        }
        set_non_empty(&mut req, "expand", &query.expand.encode());
        set_non_empty(&mut req, "filter[type_in]", &encode_types(&query.filter_type_in));

        let page: DevicesResponse = self.client.send(&req).await?.json().await?;
        debug!(devices = page.devices.len(), "devices listed");
        Ok(page)
    }

    /// Fetch a single device.
    ///
    /// # Errors
    /// Fails on transport failure, server rejection (for example 404 for an
    /// unknown ID) or an undecodable body.
    #[instrument(skip_all, fields(device_id = %query.id))]
    pub async fn device_by_id(
        &self,
        query: &DeviceByIdQuery,
    ) -> Result<DeviceByIdResponse, ClientError> {
        let path = format!("{DEVICES_PATH}/{}", urlencoding::encode(&query.id));
        let mut req = self.client.new_request(Method::GET, &path)?;
        set_non_empty(&mut req, "expand", &query.expand.encode());

        self.client.send(&req).await?.json().await
    }
}

fn set_non_empty(req: &mut Request, key: &str, value: &str) {
    if !value.is_empty() {
        req.set_query_param(key, value);
    }
}

/// `Unknown` only exists for decoding and is never sent as a filter.
fn encode_types(types: &[DeviceType]) -> String {
    types
        .iter()
        .copied()
        .filter(|t| *t != DeviceType::Unknown)
        .map(DeviceType::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

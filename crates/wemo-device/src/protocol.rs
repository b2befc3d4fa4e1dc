// # UPnP/SOAP Device Protocol
//
// Describes and controls plugs over plain HTTP:
//
// - Describe: `GET http://ip:port/setup.xml`
// - Control: SOAP `POST` to the basic event control URL
//
// | Operation      | SOAP action       | Reply field   |
// |----------------|-------------------|---------------|
// | on / off       | SetBinaryState    | BinaryState   |
// | get_state      | GetBinaryState    | BinaryState   |
// | get_setup_info | GetHKSetupInfo    | HKSetupCode   |
//
// `BinaryState` may carry extra fields separated by `|` on newer firmware;
// only the first one matters. Anything non-zero means on.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use wemo_core::traits::{DeviceDescriptor, DeviceHandle, DeviceProtocol, SetupInfo};
use wemo_core::{Error, Result};

use crate::description::{BASIC_EVENT_SERVICE, DEFAULT_CONTROL_PATH, DeviceDescription, attr};
use crate::xml::{element_text, escape, leaf_elements};

/// Default bound for one HTTP exchange with a device
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Wemo UPnP protocol
#[derive(Debug, Clone)]
pub struct UpnpProtocol {
    client: reqwest::Client,
}

impl UpnpProtocol {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Fetch and parse the description at a full URL (as found in SSDP replies)
    pub async fn describe_url(&self, url: &str, address: SocketAddr) -> Result<DeviceDescriptor> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::identify_failed(address, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::identify_failed(
                address,
                format!("HTTP {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::identify_failed(address, e.to_string()))?;

        let description = DeviceDescription::parse(&body)
            .ok_or_else(|| Error::identify_failed(address, "not a switchable plug"))?;

        Ok(description.into_descriptor(address))
    }
}

impl Default for UpnpProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

#[async_trait]
impl DeviceProtocol for UpnpProtocol {
    fn protocol_name(&self) -> &'static str {
        "upnp"
    }

    async fn describe(&self, address: SocketAddr) -> Result<DeviceDescriptor> {
        let url = format!("http://{}/setup.xml", address);
        self.describe_url(&url, address).await
    }

    fn connect(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn DeviceHandle>> {
        let control_path = descriptor
            .attributes
            .get(attr::CONTROL_PATH)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONTROL_PATH);

        Ok(Arc::new(UpnpHandle {
            name: descriptor.name.clone(),
            control_url: format!("http://{}{}", descriptor.address, control_path),
            client: self.client.clone(),
        }))
    }
}

/// Control handle for one plug
///
/// Holds no connection; every call is a fresh HTTP exchange.
#[derive(Debug, Clone)]
pub struct UpnpHandle {
    name: String,
    control_url: String,
    client: reqwest::Client,
}

impl UpnpHandle {
    pub fn control_url(&self) -> &str {
        &self.control_url
    }

    async fn soap(&self, action: &str, arguments: &[(&str, &str)]) -> Result<String> {
        let args: String = arguments
            .iter()
            .map(|(name, value)| format!("<{0}>{1}</{0}>", name, escape(value)))
            .collect();

        let envelope = format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" "#,
                r#"s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
                r#"<s:Body><u:{action} xmlns:u="{service}">{args}</u:{action}></s:Body>"#,
                r#"</s:Envelope>"#
            ),
            action = action,
            service = BASIC_EVENT_SERVICE,
            args = args
        );

        tracing::trace!("{} -> {}", action, self.control_url);

        let response = self
            .client
            .post(&self.control_url)
            .header("Content-Type", r#"text/xml; charset="utf-8""#)
            .header("SOAPACTION", format!("\"{}#{}\"", BASIC_EVENT_SERVICE, action))
            .body(envelope)
            .send()
            .await
            .map_err(|e| Error::device_action(&self.name, format!("{} failed: {}", action, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::device_action(&self.name, format!("{} reply: {}", action, e)))?;

        if !status.is_success() {
            return Err(Error::device_action(
                &self.name,
                format!("{} returned HTTP {}", action, status),
            ));
        }

        Ok(body)
    }

    async fn set_binary_state(&self, on: bool) -> Result<()> {
        let body = self
            .soap("SetBinaryState", &[("BinaryState", if on { "1" } else { "0" })])
            .await?;

        if element_text(&body, "BinaryState").is_some_and(|s| s.eq_ignore_ascii_case("error")) {
            return Err(Error::device_action(&self.name, "device rejected SetBinaryState"));
        }

        tracing::debug!("{} switched {}", self.name, if on { "on" } else { "off" });
        Ok(())
    }
}

#[async_trait]
impl DeviceHandle for UpnpHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on(&self) -> Result<()> {
        self.set_binary_state(true).await
    }

    async fn off(&self) -> Result<()> {
        self.set_binary_state(false).await
    }

    async fn get_state(&self) -> Result<bool> {
        let body = self.soap("GetBinaryState", &[]).await?;
        let state = element_text(&body, "BinaryState").ok_or_else(|| {
            Error::device_action(&self.name, "GetBinaryState reply has no BinaryState")
        })?;
        parse_binary_state(&state)
            .ok_or_else(|| Error::device_action(&self.name, format!("bad BinaryState {:?}", state)))
    }

    async fn get_setup_info(&self) -> Result<SetupInfo> {
        let body = self.soap("GetHKSetupInfo", &[]).await?;
        let mut fields: std::collections::BTreeMap<String, String> =
            leaf_elements(&body).into_iter().collect();
        let setup_code = fields.remove("HKSetupCode").filter(|c| !c.is_empty());

        Ok(SetupInfo { setup_code, fields })
    }
}

/// First `|`-separated field, non-zero means on
fn parse_binary_state(text: &str) -> Option<bool> {
    let first = text.split('|').next()?.trim();
    first.parse::<u32>().ok().map(|v| v != 0)
}

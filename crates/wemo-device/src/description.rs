//! Parsing of the `setup.xml` device description

use std::net::SocketAddr;

use wemo_core::traits::{Capability, DeviceDescriptor};

use crate::xml::{element_bodies, element_text};

/// Service type that carries switching, state and setup-info actions
pub const BASIC_EVENT_SERVICE: &str = "urn:Belkin:service:basicevent:1";

/// Control path used when the description omits one
pub const DEFAULT_CONTROL_PATH: &str = "/upnp/control/basicevent1";

/// Attribute keys written into [`DeviceDescriptor::attributes`]
pub mod attr {
    pub const UDN: &str = "udn";
    pub const MODEL: &str = "model";
    pub const MAC: &str = "mac";
    pub const FIRMWARE: &str = "firmware";
    pub const DEVICE_TYPE: &str = "device_type";
    pub const SERIAL: &str = "serial";
    pub const CONTROL_PATH: &str = "control_path";
}

/// Fields of interest from a device description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub friendly_name: String,
    pub device_type: Option<String>,
    pub udn: Option<String>,
    pub model_name: Option<String>,
    pub mac_address: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<String>,
    /// Control URL path of the basic event service
    pub control_path: String,
}

impl DeviceDescription {
    /// Parse a description document
    ///
    /// Returns `None` unless the document has a friendly name and a basic
    /// event service, i.e. unless it describes a switchable plug.
    pub fn parse(xml: &str) -> Option<Self> {
        let friendly_name = element_text(xml, "friendlyName").filter(|n| !n.is_empty())?;

        let control_path = element_bodies(xml, "service")
            .into_iter()
            .find(|service| {
                element_text(service, "serviceType")
                    .is_some_and(|t| t.eq_ignore_ascii_case(BASIC_EVENT_SERVICE))
            })
            .map(|service| {
                element_text(service, "controlURL")
                    .filter(|url| !url.is_empty())
                    .map(|url| normalize_path(&url))
                    .unwrap_or_else(|| DEFAULT_CONTROL_PATH.to_string())
            })?;

        Some(Self {
            friendly_name,
            device_type: element_text(xml, "deviceType"),
            udn: element_text(xml, "UDN"),
            model_name: element_text(xml, "modelName"),
            mac_address: element_text(xml, "macAddress"),
            firmware_version: element_text(xml, "firmwareVersion"),
            serial_number: element_text(xml, "serialNumber"),
            control_path,
        })
    }

    /// Registry descriptor for a device reachable at `address`
    pub fn into_descriptor(self, address: SocketAddr) -> DeviceDescriptor {
        let mut descriptor = DeviceDescriptor::new(self.friendly_name, address)
            .with_capability(Capability::PowerToggle)
            .with_capability(Capability::StateQuery)
            .with_capability(Capability::SetupInfo)
            .with_attribute(attr::CONTROL_PATH, self.control_path);

        let optional = [
            (attr::UDN, self.udn),
            (attr::MODEL, self.model_name),
            (attr::MAC, self.mac_address),
            (attr::FIRMWARE, self.firmware_version),
            (attr::DEVICE_TYPE, self.device_type),
            (attr::SERIAL, self.serial_number),
        ];
        for (key, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                descriptor = descriptor.with_attribute(key, value);
            }
        }

        descriptor
    }
}

fn normalize_path(url: &str) -> String {
    if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{}", url)
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_SETUP_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:Belkin:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:Belkin:device:controllee:1</deviceType>
    <friendlyName>Living Room Lamp</friendlyName>
    <manufacturer>Belkin International Inc.</manufacturer>
    <modelName>Socket</modelName>
    <modelNumber>1.0</modelNumber>
    <serialNumber>221517K0101769</serialNumber>
    <UDN>uuid:Socket-1_0-221517K0101769</UDN>
    <macAddress>94103E3A1B2C</macAddress>
    <firmwareVersion>WeMo_WW_2.00.11453.PVT-OWRT-SNS</firmwareVersion>
    <serviceList>
      <service>
        <serviceType>urn:Belkin:service:WiFiSetup:1</serviceType>
        <serviceId>urn:Belkin:serviceId:WiFiSetup1</serviceId>
        <controlURL>/upnp/control/WiFiSetup1</controlURL>
      </service>
      <service>
        <serviceType>urn:Belkin:service:basicevent:1</serviceType>
        <serviceId>urn:Belkin:serviceId:basicevent1</serviceId>
        <controlURL>/upnp/control/basicevent1</controlURL>
        <eventSubURL>/upnp/event/basicevent1</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

// # SSDP Quick Discovery
//
// Multicasts one M-SEARCH for the basic event service and collects unicast
// replies until the listen window closes. Each distinct `LOCATION` is then
// described through the UPnP protocol.
//
// Multicast does not cross VLANs or survive many consumer mesh setups, so
// this only complements the deep scan.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};

use wemo_core::traits::{DeviceDescriptor, QuickDiscovery};
use wemo_core::Result;

use crate::description::BASIC_EVENT_SERVICE;
use crate::protocol::UpnpProtocol;

/// SSDP multicast group and port
pub const SSDP_MULTICAST: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 255, 255, 250), 1900);

const DESCRIBE_CONCURRENCY: usize = 8;

pub struct SsdpDiscovery {
    protocol: UpnpProtocol,
    listen: Duration,
    target: SocketAddr,
}

impl SsdpDiscovery {
    /// Create a discoverer
    ///
    /// # Parameters
    ///
    /// - `protocol`: Describes each responder
    /// - `listen`: How long to collect replies
    pub fn new(protocol: UpnpProtocol, listen: Duration) -> Self {
        Self {
            protocol,
            listen,
            target: SocketAddr::V4(SSDP_MULTICAST),
        }
    }

    /// Send the search somewhere other than the multicast group
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    /// Distinct `LOCATION` URLs heard during the listen window
    pub async fn search(&self) -> Result<Vec<String>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let request = m_search_request(self.listen);
        socket.send_to(request.as_bytes(), self.target).await?;

        let deadline = Instant::now() + self.listen;
        let mut buf = vec![0u8; 4096];
        let mut locations = BTreeSet::new();

        loop {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    tracing::warn!("SSDP receive failed: {}", e);
                    break;
                }
                Ok(Ok((len, from))) => {
                    let reply = String::from_utf8_lossy(&buf[..len]);
                    match header_value(&reply, "location") {
                        Some(location) => {
                            if locations.insert(location.to_string()) {
                                tracing::debug!("SSDP reply from {}: {}", from, location);
                            }
                        }
                        None => tracing::trace!("SSDP reply from {} without LOCATION", from),
                    }
                }
            }
        }

        Ok(locations.into_iter().collect())
    }
}

#[async_trait]
impl QuickDiscovery for SsdpDiscovery {
    async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let locations = self.search().await?;
        let protocol = &self.protocol;

        let found: Vec<DeviceDescriptor> = stream::iter(locations)
            .map(|location| async move {
                let address = location_address(&location)?;
                match protocol.describe_url(&location, address).await {
                    Ok(descriptor) => Some(descriptor),
                    Err(e) => {
                        tracing::debug!("Ignoring SSDP responder {}: {}", location, e);
                        None
                    }
                }
            })
            .buffer_unordered(DESCRIBE_CONCURRENCY)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        tracing::info!("Quick discovery found {} devices", found.len());
        Ok(found)
    }
}

fn m_search_request(listen: Duration) -> String {
    let mx = listen.as_secs().clamp(1, 5);
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         \r\n",
        SSDP_MULTICAST, mx, BASIC_EVENT_SERVICE
    )
}

/// Value of a header in an SSDP message, name matched case-insensitively
fn header_value<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    message.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim())
            .filter(|v| !v.is_empty())
    })
}

/// IPv4 socket address of a description URL
fn location_address(location: &str) -> Option<SocketAddr> {
    let url = reqwest::Url::parse(location).ok()?;
    let ip: Ipv4Addr = url.host_str()?.parse().ok()?;
    let port = url.port_or_known_default()?;
    Some(SocketAddr::from((ip, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::SAMPLE_SETUP_XML;
    use mockito::Server;

    #[test]
    fn search_request_targets_basic_event() {
        let request = m_search_request(Duration::from_secs(3));
        assert!(request.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(request.contains("ST: urn:Belkin:service:basicevent:1\r\n"));
        assert!(request.contains("MX: 3\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let reply = "HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=86400\r\nLocation: http://192.168.1.20:49153/setup.xml\r\nST: urn:Belkin:service:basicevent:1\r\n\r\n";
        assert_eq!(
            header_value(reply, "LOCATION"),
            Some("http://192.168.1.20:49153/setup.xml")
        );
        assert_eq!(header_value(reply, "USN"), None);
    }

    #[test]
    fn location_must_be_ipv4() {
        assert_eq!(
            location_address("http://192.168.1.20:49153/setup.xml"),
            Some("192.168.1.20:49153".parse().unwrap())
        );
        assert_eq!(location_address("http://wemo.local/setup.xml"), None);
        assert_eq!(location_address("not a url"), None);
    }

    #[tokio::test]
    async fn collects_and_dedups_responders() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/setup.xml")
            .with_status(200)
            .with_body(SAMPLE_SETUP_XML)
            .expect(1)
            .create_async()
            .await;
        let location = format!("{}/setup.xml", server.url());

        // Stand-in for the multicast group: answers every search twice
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_addr = responder.local_addr().unwrap();
        let reply = format!(
            "HTTP/1.1 200 OK\r\nLOCATION: {}\r\nST: {}\r\n\r\n",
            location, BASIC_EVENT_SERVICE
        );
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (len, from) = responder.recv_from(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..len]).contains(BASIC_EVENT_SERVICE));
            responder.send_to(reply.as_bytes(), from).await.unwrap();
            responder.send_to(reply.as_bytes(), from).await.unwrap();
        });

        let discovery = SsdpDiscovery::new(UpnpProtocol::default(), Duration::from_millis(300))
            .with_target(responder_addr);
        let found = discovery.discover().await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Living Room Lamp");
        mock.assert_async().await;
    }
}

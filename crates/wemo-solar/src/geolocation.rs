//! IP geolocation via ipinfo.io

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use wemo_core::traits::{GeoCoordinates, GeoLocator};
use wemo_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://ipinfo.io";

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
}

/// Coordinates of the host's public IP
pub struct IpInfoLocator {
    base_url: String,
    client: reqwest::Client,
}

impl IpInfoLocator {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: crate::http_client(timeout),
        }
    }
}

#[async_trait]
impl GeoLocator for IpInfoLocator {
    async fn locate(&self) -> Result<GeoCoordinates> {
        let url = format!("{}/json", self.base_url);
        tracing::debug!("Looking up location via {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::http(format!("geolocation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "geolocation returned HTTP {}",
                response.status()
            )));
        }

        let body: IpInfoResponse = response
            .json()
            .await
            .map_err(|e| Error::http(format!("geolocation response unreadable: {}", e)))?;

        let loc = body
            .loc
            .ok_or_else(|| Error::http("geolocation response has no loc field"))?;
        parse_loc(&loc)
    }
}

/// Parse `"lat,lng"`
pub(crate) fn parse_loc(loc: &str) -> Result<GeoCoordinates> {
    let Some((lat, lng)) = loc.split_once(',') else {
        return Err(Error::invalid_input(format!("malformed location {:?}", loc)));
    };

    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad latitude in {:?}", loc)))?;
    let lng: f64 = lng
        .trim()
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad longitude in {:?}", loc)))?;

    GeoCoordinates::new(lat, lng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn parses_loc_pairs() {
        let coords = parse_loc("40.7143,-74.0060").unwrap();
        assert_eq!(coords.lat, 40.7143);
        assert_eq!(coords.lng, -74.006);

        assert!(parse_loc("40.7").is_err());
        assert!(parse_loc("north,west").is_err());
        assert!(parse_loc("95.0,10.0").is_err());
    }

    #[tokio::test]
    async fn locates_from_service() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ip": "203.0.113.7", "city": "Oslo", "loc": "59.9127,10.7461"}"#)
            .create_async()
            .await;

        let locator = IpInfoLocator::with_base_url(server.url(), Duration::from_secs(2));
        let coords = locator.locate().await.unwrap();

        assert_eq!(coords.lat, 59.9127);
        assert_eq!(coords.lng, 10.7461);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_loc_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .with_status(200)
            .with_body(r#"{"ip": "203.0.113.7", "bogon": true}"#)
            .create_async()
            .await;

        let locator = IpInfoLocator::with_base_url(server.url(), Duration::from_secs(2));
        assert!(matches!(locator.locate().await, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn http_error_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .with_status(429)
            .create_async()
            .await;

        let locator = IpInfoLocator::with_base_url(server.url(), Duration::from_secs(2));
        assert!(matches!(locator.locate().await, Err(Error::Http(_))));
    }
}

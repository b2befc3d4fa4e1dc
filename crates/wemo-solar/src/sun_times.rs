//! Sunrise/sunset via api.sunrise-sunset.org

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;

use wemo_core::traits::{GeoCoordinates, SunTimesSource, SunTimesUtc};
use wemo_core::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.sunrise-sunset.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    results: Option<ApiResults>,
}

#[derive(Debug, Deserialize)]
struct ApiResults {
    sunrise: String,
    sunset: String,
}

pub struct SunriseSunsetClient {
    base_url: String,
    client: reqwest::Client,
}

impl SunriseSunsetClient {
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
impl SunTimesSource for SunriseSunsetClient {
    async fn fetch(&self, coords: GeoCoordinates, date: NaiveDate) -> Result<SunTimesUtc> {
        let url = format!("{}/json", self.base_url);
        let query = [
            ("lat", coords.lat.to_string()),
            ("lng", coords.lng.to_string()),
            ("date", date.format("%Y-%m-%d").to_string()),
            ("formatted", "0".to_string()),
        ];

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::http(format!("solar request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "solar service returned HTTP {}",
                response.status()
            )));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::http(format!("solar response unreadable: {}", e)))?;

        if body.status != "OK" {
            return Err(Error::solar_unavailable(format!(
                "solar service status {}",
                body.status
            )));
        }

        let results = body
            .results
            .ok_or_else(|| Error::solar_unavailable("solar response has no results"))?;

        Ok(SunTimesUtc {
            sunrise: parse_instant(&results.sunrise)?,
            sunset: parse_instant(&results.sunset)?,
        })
    }
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::invalid_input(format!("bad timestamp {:?}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};

    fn coords() -> GeoCoordinates {
        GeoCoordinates::new(40.5, -74.25).unwrap()
    }

    fn march_10() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn fetches_utc_times_for_date() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("lat".into(), "40.5".into()),
                Matcher::UrlEncoded("lng".into(), "-74.25".into()),
                Matcher::UrlEncoded("date".into(), "2025-03-10".into()),
                Matcher::UrlEncoded("formatted".into(), "0".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results": {"sunrise": "2025-03-10T11:10:02+00:00",
                    "sunset": "2025-03-10T23:04:41+00:00", "day_length": 42879},
                    "status": "OK", "tzid": "UTC"}"#,
            )
            .create_async()
            .await;

        let client = SunriseSunsetClient::with_base_url(server.url(), Duration::from_secs(5));
        let times = client.fetch(coords(), march_10()).await.unwrap();

        assert_eq!(times.sunrise, Utc.with_ymd_and_hms(2025, 3, 10, 11, 10, 2).unwrap());
        assert_eq!(times.sunset, Utc.with_ymd_and_hms(2025, 3, 10, 23, 4, 41).unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn malformed_results_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"results": "", "status": "INVALID_REQUEST"}"#)
            .create_async()
            .await;

        let client = SunriseSunsetClient::with_base_url(server.url(), Duration::from_secs(5));
        let result = client.fetch(coords(), march_10()).await;

        // "results" is not an object here, so the body fails to decode
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_field_is_checked() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status": "OVER_QUERY_LIMIT"}"#)
            .create_async()
            .await;

        let client = SunriseSunsetClient::with_base_url(server.url(), Duration::from_secs(5));
        assert!(matches!(
            client.fetch(coords(), march_10()).await,
            Err(Error::SolarUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn server_error_is_http_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = SunriseSunsetClient::with_base_url(server.url(), Duration::from_secs(5));
        assert!(matches!(
            client.fetch(coords(), march_10()).await,
            Err(Error::Http(_))
        ));
    }
}

// # Solar Lookups over HTTP
//
// Backends for the two external lookups the solar provider needs:
//
// - **IpInfoLocator**: Best-effort coordinates from the public IP
//   (`GET https://ipinfo.io/json`, field `loc = "lat,lng"`)
// - **SunriseSunsetClient**: UTC sunrise/sunset for a date and position
//   (`GET https://api.sunrise-sunset.org/json?lat&lng&date&formatted=0`)
//
// Neither backend retries. The solar provider decides when to try again.
// Base URLs are overridable so tests can point at a local mock server.

mod geolocation;
mod sun_times;

pub use geolocation::IpInfoLocator;
pub use sun_times::SunriseSunsetClient;

use std::time::Duration;

/// Build a client with a request timeout, falling back to defaults
fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("wemod/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

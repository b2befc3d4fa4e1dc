// # Solar Time Provider
//
// Caches today's sunrise and sunset in local wall-clock time.
//
// ## Lookup Order
//
// 1. Today's snapshot already cached: return it, no network
// 2. Inside the failure backoff window: report unavailable, no network
// 3. Coordinates from memory, configuration, then the settings store
// 4. Still none: one geolocation lookup (no retry), persisted on success
// 5. Fetch UTC sunrise/sunset for today, convert to local time, cache
//
// The state lock is held across the fetch, so concurrent callers on a cold
// cache cause exactly one request.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};

use crate::clock::Clock;
use crate::config::SolarConfig;
use crate::schedule::SolarSnapshot;
use crate::traits::{GeoCoordinates, GeoLocator, SettingsStore, SolarTimes, SunTimesSource};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct SolarState {
    coords: Option<GeoCoordinates>,
    snapshot: Option<SolarSnapshot>,
    retry_after: Option<Instant>,
}

pub struct SolarProvider {
    locator: Arc<dyn GeoLocator>,
    source: Arc<dyn SunTimesSource>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    configured: Option<GeoCoordinates>,
    geolocation_timeout: Duration,
    fetch_timeout: Duration,
    failure_backoff: Duration,
    state: Mutex<SolarState>,
}

impl SolarProvider {
    /// Create a provider
    ///
    /// # Parameters
    ///
    /// - `locator`: One-off IP geolocation
    /// - `source`: Sunrise/sunset lookup
    /// - `settings`: Where coordinates are read from and persisted to
    /// - `clock`: Decides what "today" is
    /// - `config`: Timeouts, backoff and optional fixed coordinates
    pub fn new(
        locator: Arc<dyn GeoLocator>,
        source: Arc<dyn SunTimesSource>,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        config: &SolarConfig,
    ) -> Self {
        Self {
            locator,
            source,
            settings,
            clock,
            configured: config.coordinates,
            geolocation_timeout: config.geolocation_timeout(),
            fetch_timeout: config.fetch_timeout(),
            failure_backoff: config.failure_backoff(),
            state: Mutex::new(SolarState::default()),
        }
    }

    /// Today's solar times, or `None` if they cannot be obtained right now
    pub async fn get_solar_times(&self) -> Option<SolarSnapshot> {
        self.try_solar_times().await.ok()
    }

    /// Today's solar times
    ///
    /// # Returns
    ///
    /// - `Ok(SolarSnapshot)`: Cached or freshly fetched times for today
    /// - `Err(Error::SolarUnavailable)`: Lookup failed or still backing off
    pub async fn try_solar_times(&self) -> Result<SolarSnapshot> {
        let today = self.clock.today();
        let mut state = self.state.lock().await;

        if let Some(snapshot) = state.snapshot
            && snapshot.date == today
        {
            return Ok(snapshot);
        }

        if let Some(until) = state.retry_after
            && Instant::now() < until
        {
            return Err(Error::solar_unavailable("backing off after a failed lookup"));
        }

        match self.refresh(&mut state, today).await {
            Ok(snapshot) => {
                tracing::info!(
                    "Solar times for {}: sunrise {}, sunset {}",
                    today,
                    snapshot.sunrise_hhmm(),
                    snapshot.sunset_hhmm()
                );
                state.snapshot = Some(snapshot);
                state.retry_after = None;
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    "Solar lookup failed: {}. Next attempt in {:?}",
                    e,
                    self.failure_backoff
                );
                state.retry_after = Some(Instant::now() + self.failure_backoff);
                Err(Error::solar_unavailable(e.to_string()))
            }
        }
    }

    /// Coordinates currently in use, if resolved
    pub async fn coordinates(&self) -> Option<GeoCoordinates> {
        self.state.lock().await.coords
    }

    async fn refresh(&self, state: &mut SolarState, today: NaiveDate) -> Result<SolarSnapshot> {
        let coords = self.resolve_coordinates(state).await?;

        let times = timeout(self.fetch_timeout, self.source.fetch(coords, today))
            .await
            .map_err(|_| {
                Error::timeout(format!("solar lookup exceeded {:?}", self.fetch_timeout))
            })??;

        Ok(SolarSnapshot::new(
            today,
            to_local_time(times.sunrise),
            to_local_time(times.sunset),
        ))
    }

    async fn resolve_coordinates(&self, state: &mut SolarState) -> Result<GeoCoordinates> {
        if let Some(coords) = state.coords {
            return Ok(coords);
        }

        if let Some(coords) = self.configured {
            state.coords = Some(coords);
            return Ok(coords);
        }

        match self.settings.load_coordinates().await {
            Ok(Some(coords)) => {
                state.coords = Some(coords);
                return Ok(coords);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cannot read stored coordinates: {}", e),
        }

        let coords = timeout(self.geolocation_timeout, self.locator.locate())
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "geolocation exceeded {:?}",
                    self.geolocation_timeout
                ))
            })??;
        coords.validate()?;

        tracing::info!("Located at {:.4}, {:.4}", coords.lat, coords.lng);
        if let Err(e) = self.settings.save_coordinates(coords).await {
            tracing::warn!("Failed to persist coordinates: {}", e);
        }

        state.coords = Some(coords);
        Ok(coords)
    }
}

/// Standard UTC to local conversion, DST-aware
fn to_local_time(instant: DateTime<Utc>) -> NaiveTime {
    instant.with_timezone(&Local).time()
}

#[async_trait]
impl SolarTimes for SolarProvider {
    async fn solar_times(&self) -> Option<SolarSnapshot> {
        self.get_solar_times().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state::MemorySettingsStore;
    use crate::traits::SunTimesUtc;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingLocator {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GeoLocator for CountingLocator {
        async fn locate(&self) -> Result<GeoCoordinates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::http("geolocation service unreachable"))
            } else {
                GeoCoordinates::new(40.71, -74.0)
            }
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail: AtomicBool,
        dates: std::sync::Mutex<Vec<NaiveDate>>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                dates: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SunTimesSource for CountingSource {
        async fn fetch(&self, _coords: GeoCoordinates, date: NaiveDate) -> Result<SunTimesUtc> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.dates.lock().unwrap().push(date);
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::http("503"));
            }
            Ok(SunTimesUtc {
                sunrise: Utc.with_ymd_and_hms(2025, 3, 10, 11, 2, 41).unwrap(),
                sunset: Utc.with_ymd_and_hms(2025, 3, 10, 22, 59, 5).unwrap(),
            })
        }
    }

    fn clock_at(day: u32) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2025, 3, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        ))
    }

    fn provider(
        locator: Arc<CountingLocator>,
        source: Arc<CountingSource>,
        settings: MemorySettingsStore,
        clock: Arc<ManualClock>,
    ) -> SolarProvider {
        SolarProvider::new(
            locator,
            source,
            Arc::new(settings),
            clock,
            &SolarConfig::default(),
        )
    }

    fn locator(fail: bool) -> Arc<CountingLocator> {
        Arc::new(CountingLocator {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn fetches_once_per_day() {
        let source = Arc::new(CountingSource::new());
        let clock = clock_at(10);
        let solar = provider(
            locator(false),
            source.clone(),
            MemorySettingsStore::new(GeoCoordinates::new(40.71, -74.0).ok()),
            clock.clone(),
        );

        let first = solar.get_solar_times().await.unwrap();
        let second = solar.get_solar_times().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let expected = Utc
            .with_ymd_and_hms(2025, 3, 10, 22, 59, 5)
            .unwrap()
            .with_timezone(&Local)
            .time();
        assert_eq!(first.sunset_hhmm(), expected.format("%H:%M").to_string());

        clock.advance(chrono::Duration::days(1));
        let next_day = solar.get_solar_times().await.unwrap();
        assert_eq!(next_day.date, NaiveDate::from_ymd_opt(2025, 3, 11).unwrap());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *source.dates.lock().unwrap(),
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
            ]
        );
    }

    #[tokio::test]
    async fn geolocates_once_and_persists() {
        let locator = locator(false);
        let settings = MemorySettingsStore::new(None);
        let solar = provider(
            locator.clone(),
            Arc::new(CountingSource::new()),
            settings.clone(),
            clock_at(10),
        );

        assert!(solar.get_solar_times().await.is_some());
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(settings.save_count(), 1);
        assert_eq!(
            settings.load_coordinates().await.unwrap(),
            GeoCoordinates::new(40.71, -74.0).ok()
        );
    }

    #[tokio::test]
    async fn configured_coordinates_skip_geolocation() {
        let locator = locator(false);
        let config = SolarConfig {
            coordinates: GeoCoordinates::new(51.5, -0.12).ok(),
            ..SolarConfig::default()
        };
        let solar = SolarProvider::new(
            locator.clone(),
            Arc::new(CountingSource::new()),
            Arc::new(MemorySettingsStore::new(None)),
            clock_at(10),
            &config,
        );

        assert!(solar.get_solar_times().await.is_some());
        assert_eq!(locator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(solar.coordinates().await, GeoCoordinates::new(51.5, -0.12).ok());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_backs_off() {
        let source = Arc::new(CountingSource::new());
        source.fail.store(true, Ordering::SeqCst);
        let solar = provider(
            locator(false),
            source.clone(),
            MemorySettingsStore::new(GeoCoordinates::new(40.71, -74.0).ok()),
            clock_at(10),
        );

        assert!(matches!(
            solar.try_solar_times().await,
            Err(Error::SolarUnavailable(_))
        ));
        assert!(solar.get_solar_times().await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        source.fail.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(solar.get_solar_times().await.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn geolocation_failure_means_unavailable() {
        let source = Arc::new(CountingSource::new());
        let solar = provider(
            locator(true),
            source.clone(),
            MemorySettingsStore::new(None),
            clock_at(10),
        );

        assert!(solar.get_solar_times().await.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}

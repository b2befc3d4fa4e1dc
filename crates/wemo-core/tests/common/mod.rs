//! Test doubles and common utilities for contract tests
//!
//! Every double keeps its counters behind `Arc`s so a test can hold one
//! handle while the engine or the discovery coordinator owns another.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wemo_core::config::SchedulerConfig;
use wemo_core::discovery::{ProbeOutcome, Prober};
use wemo_core::error::{Error, Result};
use wemo_core::traits::{
    DeviceDescriptor, DeviceDirectory, DeviceHandle, DeviceProtocol, QuickDiscovery, SetupInfo,
    SolarTimes,
};
use wemo_core::{
    Action, EngineEvent, Job, ManualClock, MemoryScheduleStore, SchedulerEngine, SolarAnchor,
    SolarSnapshot, Trigger,
};

/// 2025-03-10, a Monday
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

pub fn monday_at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    monday().and_hms_opt(hour, minute, second).unwrap()
}

pub fn hhmm(text: &str) -> NaiveTime {
    NaiveTime::parse_from_str(text, "%H:%M").unwrap()
}

pub fn every_day() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
}

pub fn fixed_job(id: &str, device: &str, action: Action, at: &str) -> Job {
    Job {
        id: id.to_string(),
        device: device.to_string(),
        action,
        trigger: Trigger::Fixed(hhmm(at)),
        days: every_day(),
        last_fired_date: None,
    }
}

pub fn solar_job(id: &str, device: &str, anchor: SolarAnchor, offset_minutes: i64) -> Job {
    Job {
        id: id.to_string(),
        device: device.to_string(),
        action: Action::On,
        trigger: Trigger::Solar {
            anchor,
            offset_minutes,
        },
        days: every_day(),
        last_fired_date: None,
    }
}

/// A plug that records every call
#[derive(Clone)]
pub struct MockDevice {
    name: String,
    state: Arc<AtomicBool>,
    on_calls: Arc<AtomicUsize>,
    off_calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    hang: Arc<AtomicBool>,
}

impl MockDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(AtomicBool::new(false)),
            on_calls: Arc::new(AtomicUsize::new(0)),
            off_calls: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
            hang: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn on_calls(&self) -> usize {
        self.on_calls.load(Ordering::SeqCst)
    }

    pub fn off_calls(&self) -> usize {
        self.off_calls.load(Ordering::SeqCst)
    }

    pub fn is_on(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    /// Make every switching call fail until reset
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every switching call hang until reset
    pub fn set_hanging(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    async fn switch(&self, on: bool) -> Result<()> {
        if on {
            self.on_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.off_calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::device_action(&self.name, "connection reset"));
        }
        self.state.store(on, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DeviceHandle for MockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on(&self) -> Result<()> {
        self.switch(true).await
    }

    async fn off(&self) -> Result<()> {
        self.switch(false).await
    }

    async fn get_state(&self) -> Result<bool> {
        Ok(self.is_on())
    }

    async fn get_setup_info(&self) -> Result<SetupInfo> {
        Ok(SetupInfo::default())
    }
}

/// Directory with "visible" devices and devices that only appear after a
/// rediscovery
#[derive(Clone, Default)]
pub struct MockDirectory {
    visible: Arc<Mutex<HashMap<String, MockDevice>>>,
    hidden: Arc<Mutex<HashMap<String, MockDevice>>>,
    rediscover_calls: Arc<AtomicUsize>,
}

impl MockDirectory {
    pub fn with_devices(devices: &[&MockDevice]) -> Self {
        let directory = Self::default();
        for device in devices {
            directory.add(device);
        }
        directory
    }

    pub fn add(&self, device: &MockDevice) {
        self.visible
            .lock()
            .unwrap()
            .insert(device.name.clone(), device.clone());
    }

    /// Device becomes resolvable only after the next rediscovery
    pub fn add_after_rediscovery(&self, device: &MockDevice) {
        self.hidden
            .lock()
            .unwrap()
            .insert(device.name.clone(), device.clone());
    }

    pub fn rediscover_calls(&self) -> usize {
        self.rediscover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDirectory for MockDirectory {
    async fn resolve(&self, name: &str) -> Option<Arc<dyn DeviceHandle>> {
        let device = self.visible.lock().unwrap().get(name).cloned()?;
        Some(Arc::new(device))
    }

    async fn rediscover(&self) -> Result<()> {
        self.rediscover_calls.fetch_add(1, Ordering::SeqCst);
        let found: Vec<MockDevice> = self.hidden.lock().unwrap().drain().map(|(_, d)| d).collect();
        for device in found {
            self.add(&device);
        }
        Ok(())
    }
}

/// Solar source returning a fixed (or no) snapshot
#[derive(Clone, Default)]
pub struct FixedSolar {
    snapshot: Arc<Mutex<Option<SolarSnapshot>>>,
    calls: Arc<AtomicUsize>,
}

impl FixedSolar {
    pub fn new(snapshot: Option<SolarSnapshot>) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn at(date: NaiveDate, sunrise: &str, sunset: &str) -> Self {
        Self::new(Some(SolarSnapshot::new(date, hhmm(sunrise), hhmm(sunset))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolarTimes for FixedSolar {
    async fn solar_times(&self) -> Option<SolarSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.snapshot.lock().unwrap()
    }
}

/// Everything a scheduler test needs to poke at
pub struct Harness {
    pub engine: SchedulerEngine,
    pub events: tokio::sync::mpsc::Receiver<EngineEvent>,
    pub store: MemoryScheduleStore,
    pub directory: MockDirectory,
    pub solar: FixedSolar,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(
        jobs: Vec<Job>,
        directory: MockDirectory,
        solar: FixedSolar,
        now: NaiveDateTime,
    ) -> Self {
        Self::with_config(jobs, directory, solar, now, SchedulerConfig::default())
    }

    pub fn with_config(
        jobs: Vec<Job>,
        directory: MockDirectory,
        solar: FixedSolar,
        now: NaiveDateTime,
        config: SchedulerConfig,
    ) -> Self {
        let store = MemoryScheduleStore::new(jobs);
        let clock = Arc::new(ManualClock::new(now));
        let (engine, events) = SchedulerEngine::new(
            Arc::new(store.clone()),
            Arc::new(directory.clone()),
            Arc::new(solar.clone()),
            clock.clone(),
            &config,
        )
        .expect("engine construction succeeds");

        Self {
            engine,
            events,
            store,
            directory,
            solar,
            clock,
        }
    }

    pub fn set_time(&self, now: NaiveDateTime) {
        self.clock.set(now);
    }

    pub async fn stored_date(&self, job_id: &str) -> Option<NaiveDate> {
        self.store
            .jobs()
            .await
            .into_iter()
            .find(|job| job.id == job_id)
            .and_then(|job| job.last_fired_date)
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Prober that answers "open" for a fixed set of hosts after a delay and
/// tracks how many probes run at once
#[derive(Clone)]
pub struct CountingProber {
    open: Arc<HashSet<Ipv4Addr>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl CountingProber {
    pub fn new(open: &[Ipv4Addr], delay: Duration) -> Self {
        Self {
            open: Arc::new(open.iter().copied().collect()),
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the probe future is dropped
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for CountingProber {
    async fn probe(&self, target: SocketAddrV4) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        tokio::time::sleep(self.delay).await;

        if self.open.contains(target.ip()) {
            ProbeOutcome::Open
        } else {
            ProbeOutcome::Closed
        }
    }
}

/// Prober that never answers
pub struct HangingProber;

#[async_trait]
impl Prober for HangingProber {
    async fn probe(&self, _target: SocketAddrV4) -> ProbeOutcome {
        std::future::pending().await
    }
}

/// Protocol that names a device after its host address
///
/// Hosts in `unknown` fail identification.
pub struct NamingProtocol {
    names: HashMap<Ipv4Addr, String>,
    devices: Mutex<HashMap<String, MockDevice>>,
}

impl NamingProtocol {
    pub fn new(names: &[(Ipv4Addr, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(ip, name)| (*ip, name.to_string()))
                .collect(),
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// The handle `connect` returns for `name`
    pub fn device(&self, name: &str) -> MockDevice {
        self.devices
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| MockDevice::new(name))
            .clone()
    }
}

#[async_trait]
impl DeviceProtocol for NamingProtocol {
    fn protocol_name(&self) -> &'static str {
        "naming"
    }

    async fn describe(&self, address: SocketAddr) -> Result<DeviceDescriptor> {
        let SocketAddr::V4(v4) = address else {
            return Err(Error::identify_failed(address, "IPv6 not supported"));
        };
        match self.names.get(v4.ip()) {
            Some(name) => Ok(DeviceDescriptor::new(name.clone(), address)),
            None => Err(Error::identify_failed(address, "not a plug")),
        }
    }

    fn connect(&self, descriptor: &DeviceDescriptor) -> Result<Arc<dyn DeviceHandle>> {
        Ok(Arc::new(self.device(&descriptor.name)))
    }
}

/// Quick discovery returning a fixed list
pub struct StaticQuick(pub Vec<DeviceDescriptor>);

#[async_trait]
impl QuickDiscovery for StaticQuick {
    async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self.0.clone())
    }
}

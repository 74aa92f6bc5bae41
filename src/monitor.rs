//! Explicit monitoring context and the process-wide handle behind the C ABI.
//!
//! The handle is filled lazily on first use from `HWINFO_BRIDGE_CONFIG`, or
//! explicitly through [`install`]. One mutex guards it, and every boundary
//! call holds that lock from refresh through serialization.

use crate::collectors::{build_source, SensorSource};
use crate::config::{Config, SessionPolicy};
use crate::error::Result;
use crate::filter::{select, TokenSet};
use crate::hardware::HardwareNode;
use crate::logging;
use crate::payload;
use crate::session::{MonitoringSession, ScopedSession};
use crate::snapshot::Snapshot;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error};

pub type SourceFactory = Box<dyn Fn() -> Box<dyn SensorSource> + Send>;

static MONITOR: Mutex<Option<Monitor>> = Mutex::new(None);

pub struct Monitor {
    config: Config,
    factory: SourceFactory,
    persistent: Option<MonitoringSession>,
}

impl Monitor {
    pub fn new(config: Config) -> Self {
        let backend = config.backend.clone();
        Self::with_source_factory(config, Box::new(move || build_source(&backend)))
    }

    /// Uses `factory` instead of the configured backend. It is called once for
    /// a persistent session and once per call for scoped sessions.
    pub fn with_source_factory(config: Config, factory: SourceFactory) -> Self {
        Self {
            config,
            factory,
            persistent: None,
        }
    }

    /// Reads `HWINFO_BRIDGE_CONFIG` and starts logging. A bad config file is
    /// reported and replaced by defaults.
    pub fn from_env() -> Self {
        let config = match Config::load_from_env() {
            Ok(config) => {
                logging::init(&config.log);
                config
            }
            Err(err) => {
                let config = Config::default();
                logging::init(&config.log);
                error!(error = %err, "failed to load config, using defaults");
                config
            }
        };
        Self::new(config)
    }

    pub fn snapshot(&mut self, tokens: &TokenSet) -> Result<Snapshot> {
        if tokens.is_empty() {
            return Ok(Snapshot::default());
        }
        let include_sensor_type = self.config.include_sensor_type;
        self.with_session(|session| {
            let hardware = session.refresh()?;
            let matched = select(hardware, tokens);
            debug!(
                tokens = tokens.iter().count(),
                matched = matched.len(),
                "hardware selected"
            );
            Ok(Snapshot::build(&matched, include_sensor_type))
        })
    }

    pub fn payload(&mut self, tokens: &TokenSet) -> Result<String> {
        let snapshot = self.snapshot(tokens)?;
        Ok(payload::render(&snapshot))
    }

    /// Refreshed copy of the full hardware tree.
    pub fn hardware(&mut self) -> Result<Vec<HardwareNode>> {
        self.with_session(|session| Ok(session.refresh()?.to_vec()))
    }

    pub fn shutdown(&mut self) {
        if let Some(mut session) = self.persistent.take() {
            session.close();
        }
    }

    fn with_session<T>(
        &mut self,
        f: impl FnOnce(&mut MonitoringSession) -> Result<T>,
    ) -> Result<T> {
        match self.config.session {
            SessionPolicy::Persistent => {
                let session = self.persistent.get_or_insert_with(|| {
                    MonitoringSession::new((self.factory)(), self.config.capabilities)
                });
                session.ensure_open()?;
                f(session)
            }
            SessionPolicy::Scoped => {
                let mut session = ScopedSession::new((self.factory)(), self.config.capabilities);
                session.ensure_open()?;
                f(&mut session)
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Replaces the process-wide monitor. The previous one is shut down.
pub fn install(monitor: Monitor) {
    let previous = lock().replace(monitor);
    drop(previous);
}

/// Closes the process-wide monitor. The next call initializes a new one.
pub fn shutdown() {
    let previous = lock().take();
    drop(previous);
}

/// Runs `f` on the process-wide monitor while holding its lock.
pub fn with_monitor<T>(f: impl FnOnce(&mut Monitor) -> T) -> T {
    let mut guard = lock();
    let monitor = guard.get_or_insert_with(Monitor::from_env);
    f(monitor)
}

fn lock() -> std::sync::MutexGuard<'static, Option<Monitor>> {
    MONITOR.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, Capabilities};
    use crate::error::BridgeError;
    use crate::hardware::{HardwareType, Sensor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DriftSource {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        reading: f32,
    }

    impl SensorSource for DriftSource {
        fn name(&self) -> &'static str {
            "drift"
        }

        fn open(&mut self, _: &Capabilities) -> Result<Vec<HardwareNode>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let mut cpu = HardwareNode::new("/cpu/0", "Cpu", HardwareType::Cpu);
            cpu.sensors.push(Sensor::new("CPU Total"));
            cpu.sensors.push(Sensor::new("CPU Package"));
            Ok(vec![cpu])
        }

        fn update(&mut self, node: &mut HardwareNode) {
            self.reading += 1.0;
            node.sensors[0].value = Some(self.reading);
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn drifting(policy: SessionPolicy) -> (Monitor, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let config = Config {
            session: policy,
            ..Config::default()
        };
        let (o, c) = (opens.clone(), closes.clone());
        let monitor = Monitor::with_source_factory(
            config,
            Box::new(move || -> Box<dyn SensorSource> {
                Box::new(DriftSource {
                    opens: o.clone(),
                    closes: c.clone(),
                    reading: 0.0,
                })
            }),
        );
        (monitor, opens, closes)
    }

    #[test]
    fn persistent_session_opens_once_and_refreshes_every_call() {
        let (mut monitor, opens, closes) = drifting(SessionPolicy::Persistent);
        let tokens = TokenSet::decode("Cpu");

        let first = monitor.snapshot(&tokens).unwrap();
        let second = monitor.snapshot(&tokens).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(first.get("/cpu/0").unwrap().sensors[0].value, 1.0);
        assert_eq!(second.get("/cpu/0").unwrap().sensors[0].value, 2.0);

        monitor.shutdown();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scoped_session_reopens_and_closes_per_call() {
        let (mut monitor, opens, closes) = drifting(SessionPolicy::Scoped);
        let tokens = TokenSet::decode("Cpu");

        let first = monitor.snapshot(&tokens).unwrap();
        let second = monitor.snapshot(&tokens).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert_eq!(first.get("/cpu/0").unwrap().sensors[0].value, 1.0);
        assert_eq!(second.get("/cpu/0").unwrap().sensors[0].value, 1.0);
    }

    #[test]
    fn repeated_calls_keep_keys_and_sensor_names() {
        let (mut monitor, _, _) = drifting(SessionPolicy::Persistent);
        let tokens = TokenSet::decode("Cpu,Memory");
        let names = |s: &Snapshot| -> Vec<(String, Vec<String>)> {
            s.iter()
                .map(|(k, e)| (k.clone(), e.sensors.iter().map(|x| x.name.clone()).collect()))
                .collect()
        };

        let first = monitor.snapshot(&tokens).unwrap();
        let second = monitor.snapshot(&tokens).unwrap();
        assert_eq!(names(&first), names(&second));
        assert_ne!(first, second);
    }

    #[test]
    fn empty_tokens_never_touch_the_backend() {
        let (mut monitor, opens, _) = drifting(SessionPolicy::Persistent);
        assert!(monitor.snapshot(&TokenSet::decode("")).unwrap().is_empty());
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fixture_backend_serves_configured_tree() {
        let mut cpu = HardwareNode::new("/cpu/0", "Fixture CPU", HardwareType::Cpu);
        cpu.sensors.push(Sensor::with_value("Core Temp", 55.0));
        let config = Config {
            backend: BackendConfig::Fixture {
                hardware: vec![cpu],
            },
            ..Config::default()
        };
        let mut monitor = Monitor::new(config);

        let payload = monitor.payload(&TokenSet::decode("Cpu")).unwrap();
        assert_eq!(
            payload,
            r#"{"/cpu/0":{"Name":"Fixture CPU","HardwareType":"Cpu","Sensors":[{"Name":"Core Temp","Value":55.0}]}}"#
        );
        assert_eq!(monitor.hardware().unwrap().len(), 1);
    }

    #[test]
    fn unavailable_backend_is_reported() {
        struct Broken;
        impl SensorSource for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn open(&mut self, _: &Capabilities) -> Result<Vec<HardwareNode>> {
                Err(BridgeError::BackendUnavailable("no driver".into()))
            }
            fn update(&mut self, _: &mut HardwareNode) {}
        }

        let mut monitor = Monitor::with_source_factory(
            Config::default(),
            Box::new(|| -> Box<dyn SensorSource> { Box::new(Broken) }),
        );
        assert!(matches!(
            monitor.snapshot(&TokenSet::decode("Cpu")),
            Err(BridgeError::BackendUnavailable(_))
        ));
    }
}

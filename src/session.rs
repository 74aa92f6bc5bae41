//! Lifecycle of the acquisition backend.
//!
//! A [`MonitoringSession`] starts `Unopened`, becomes `Open` on the first
//! successful [`MonitoringSession::ensure_open`] and ends `Closed`. A closed
//! session is never reopened. [`ScopedSession`] closes its session on drop,
//! including when the call fails or panics.

use crate::collectors::SensorSource;
use crate::config::Capabilities;
use crate::error::{BridgeError, Result};
use crate::hardware::HardwareNode;
use crate::walker;
use std::ops::{Deref, DerefMut};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Open,
    Closed,
}

pub struct MonitoringSession {
    source: Box<dyn SensorSource>,
    capabilities: Capabilities,
    state: SessionState,
    hardware: Vec<HardwareNode>,
}

impl MonitoringSession {
    pub fn new(source: Box<dyn SensorSource>, capabilities: Capabilities) -> Self {
        Self {
            source,
            capabilities,
            state: SessionState::Unopened,
            hardware: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ensure_open(&mut self) -> Result<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(BridgeError::SessionClosed),
            SessionState::Unopened => {
                let hardware = match self.source.open(&self.capabilities) {
                    Ok(hardware) => hardware,
                    Err(err) => {
                        warn!(backend = self.source.name(), error = %err, "sensor backend failed to open");
                        return Err(err);
                    }
                };
                info!(
                    backend = self.source.name(),
                    hardware = hardware.len(),
                    "sensor backend opened"
                );
                self.hardware = hardware;
                self.state = SessionState::Open;
                Ok(())
            }
        }
    }

    /// Refreshes the whole tree and returns it. Fails unless the session is open.
    pub fn refresh(&mut self) -> Result<&[HardwareNode]> {
        if self.state != SessionState::Open {
            return Err(BridgeError::SessionNotOpen(self.state));
        }
        walker::refresh(self.source.as_mut(), &mut self.hardware);
        Ok(&self.hardware)
    }

    pub fn close(&mut self) {
        if self.state == SessionState::Open {
            self.source.close();
            debug!(backend = self.source.name(), "sensor backend closed");
        }
        self.hardware.clear();
        self.state = SessionState::Closed;
    }
}

/// A session that lives for exactly one call.
pub struct ScopedSession {
    inner: MonitoringSession,
}

impl ScopedSession {
    pub fn new(source: Box<dyn SensorSource>, capabilities: Capabilities) -> Self {
        Self {
            inner: MonitoringSession::new(source, capabilities),
        }
    }
}

impl Deref for ScopedSession {
    type Target = MonitoringSession;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ScopedSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::HardwareType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        opens: AtomicUsize,
        updates: AtomicUsize,
        closes: AtomicUsize,
    }

    struct TrackedSource {
        counters: Arc<Counters>,
        fail_open: bool,
    }

    impl SensorSource for TrackedSource {
        fn name(&self) -> &'static str {
            "tracked"
        }

        fn open(&mut self, _: &Capabilities) -> Result<Vec<HardwareNode>> {
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(BridgeError::BackendUnavailable("driver missing".into()));
            }
            Ok(vec![HardwareNode::new("/cpu/0", "Cpu", HardwareType::Cpu)])
        }

        fn update(&mut self, _: &mut HardwareNode) {
            self.counters.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(fail_open: bool) -> (Box<dyn SensorSource>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let source = TrackedSource {
            counters: counters.clone(),
            fail_open,
        };
        (Box::new(source), counters)
    }

    #[test]
    fn ensure_open_is_idempotent() {
        let (source, counters) = tracked(false);
        let mut session = MonitoringSession::new(source, Capabilities::default());
        assert_eq!(session.state(), SessionState::Unopened);

        session.ensure_open().unwrap();
        session.ensure_open().unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(counters.opens.load(Ordering::SeqCst), 1);

        assert_eq!(session.refresh().unwrap().len(), 1);
        assert_eq!(counters.updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refresh_requires_open_session() {
        let (source, counters) = tracked(false);
        let mut session = MonitoringSession::new(source, Capabilities::default());
        assert!(matches!(
            session.refresh(),
            Err(BridgeError::SessionNotOpen(SessionState::Unopened))
        ));

        session.ensure_open().unwrap();
        session.close();
        assert!(matches!(
            session.refresh(),
            Err(BridgeError::SessionNotOpen(SessionState::Closed))
        ));
        assert!(matches!(session.ensure_open(), Err(BridgeError::SessionClosed)));
        assert_eq!(counters.updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_open_leaves_session_unopened() {
        let (source, counters) = tracked(true);
        let mut session = MonitoringSession::new(source, Capabilities::default());
        assert!(matches!(
            session.ensure_open(),
            Err(BridgeError::BackendUnavailable(_))
        ));
        assert_eq!(session.state(), SessionState::Unopened);
        assert!(session.ensure_open().is_err());
        assert_eq!(counters.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scoped_session_closes_on_drop() {
        let (source, counters) = tracked(false);
        {
            let mut scoped = ScopedSession::new(source, Capabilities::default());
            scoped.ensure_open().unwrap();
            scoped.refresh().unwrap();
        }
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scoped_session_never_opened_does_not_close_backend() {
        let (source, counters) = tracked(true);
        {
            let mut scoped = ScopedSession::new(source, Capabilities::default());
            assert!(scoped.ensure_open().is_err());
        }
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }
}

//! Mock VPN control for testing.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::rotation::{VpnControl, VpnError};

/// Mock implementation of the VpnControl trait.
///
/// Connects succeed unless failures were scheduled with
/// [`MockVpn::fail_connects`]. Each successful connect changes the reported
/// public IP.
#[derive(Debug)]
pub struct MockVpn {
    available: AtomicBool,
    connected: AtomicBool,
    failures_left: AtomicU32,
    connect_attempts: AtomicU32,
    disconnects: AtomicU32,
    connections: Mutex<Vec<String>>,
}

impl Default for MockVpn {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVpn {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            failures_left: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Fail the next `count` connects. `u32::MAX` fails all of them.
    pub fn fail_connects(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Locations successfully connected to, in order.
    pub fn connections(&self) -> Vec<String> {
        self.connections.lock().unwrap().clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VpnControl for MockVpn {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn is_connected(&self) -> Result<bool, VpnError> {
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn disconnect(&self) -> Result<(), VpnError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn connect_to(&self, location: &str, _limit: Duration) -> Result<(), VpnError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != u32::MAX {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            return Err(VpnError::CommandFailed {
                command: format!("connect {}", location),
                stderr: "mock connect failure".to_string(),
            });
        }
        self.connections.lock().unwrap().push(location.to_string());
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn public_ip(&self) -> Option<String> {
        let n = self.connections.lock().unwrap().len();
        Some(format!("10.0.0.{}", n + 1))
    }
}

//! Directory client boundary.
//!
//! The server only ever tells the overlay "service S lives on port P". How
//! that reaches other peers (DHT put, gossip, registry call) belongs to the
//! [`DirectoryClient`] implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// Client of the overlay directory peers use to find services.
#[async_trait]
pub trait DirectoryClient: Send + Sync + 'static {
    /// Announce that `service` is reachable on `port`.
    async fn announce(&self, service: &str, port: u16) -> Result<()>;
}

/// One recorded announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub service: String,
    pub port: u16,
    pub at: Instant,
}

/// In-process directory that keeps every announcement it receives.
///
/// Useful when all peers live in one process, and in tests.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    announcements: Mutex<Vec<Announcement>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All announcements so far, oldest first.
    pub fn announcements(&self) -> Vec<Announcement> {
        self.announcements.lock().clone()
    }

    pub fn announce_count(&self) -> usize {
        self.announcements.lock().len()
    }

    /// Ports announced for `service`, in first-seen order, without repeats.
    pub fn lookup(&self, service: &str) -> Vec<u16> {
        let mut ports = Vec::new();
        for a in self.announcements.lock().iter() {
            if a.service == service && !ports.contains(&a.port) {
                ports.push(a.port);
            }
        }
        ports
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn announce(&self, service: &str, port: u16) -> Result<()> {
        self.announcements.lock().push(Announcement {
            service: service.to_string(),
            port,
            at: Instant::now(),
        });
        Ok(())
    }
}

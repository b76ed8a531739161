//! Optional host capabilities reachable from the dispatcher.
//!
//! Each capability is a trait object picked once at startup. Hosts that
//! cannot provide one get the `Unsupported` implementation, so dispatch never
//! has to probe for platform support itself.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Produces the `sysinfo` report.
pub trait Inventory: Send + Sync {
    fn report(&self) -> String;
}

/// Writes a screenshot to `path` and returns a confirmation line.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn capture(&self, path: &Path) -> Result<String>;
}

/// Records `duration` of microphone audio into `path`.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn record(&self, path: &Path, duration: Duration) -> Result<String>;
}

/// Inventory built from the host name, the environment and std's build
/// constants.
#[derive(Debug, Default, Clone)]
pub struct BasicInventory;

impl Inventory for BasicInventory {
    fn report(&self) -> String {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        let rows = [
            ("Hostname", host),
            ("User", user),
            ("OS", std::env::consts::OS.to_string()),
            ("Family", std::env::consts::FAMILY.to_string()),
            ("Architecture", std::env::consts::ARCH.to_string()),
            ("Logical CPUs", cpus),
        ];
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        rows.iter()
            .map(|(k, v)| format!("{:<width$}  {}", k, v, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Capture backend for hosts without screen or microphone access.
#[derive(Debug, Default, Clone)]
pub struct Unsupported;

#[async_trait]
impl ScreenCapture for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    async fn capture(&self, _path: &Path) -> Result<String> {
        Ok(not_supported("screenshot"))
    }
}

#[async_trait]
impl AudioCapture for Unsupported {
    fn is_supported(&self) -> bool {
        false
    }

    async fn record(&self, _path: &Path, _duration: Duration) -> Result<String> {
        Ok(not_supported("recordmic"))
    }
}

/// Fixed reply for a capability the host does not have.
pub fn not_supported(name: &str) -> String {
    format!("{} is not supported on this host", name)
}

/// The set of capabilities a dispatcher was started with.
#[derive(Clone)]
pub struct Capabilities {
    pub inventory: Arc<dyn Inventory>,
    pub screen: Arc<dyn ScreenCapture>,
    pub audio: Arc<dyn AudioCapture>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            inventory: Arc::new(BasicInventory),
            screen: Arc::new(Unsupported),
            audio: Arc::new(Unsupported),
        }
    }
}

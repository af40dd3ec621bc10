//! Support for library configuration options

use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The `User-Agent` sent with every request.
/// Feel free to override it when initing this library.
pub static USER_AGENT: Lazy<Arc<Mutex<String>>> = Lazy::new(|| Arc::new(Mutex::new(format!("dav-auth-pipeline/{}", env!("CARGO_PKG_VERSION")))));

/// Settings of a [`Client`](crate::client::Client)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How long a single HTTP exchange may take, in seconds
    pub timeout_secs: u64,
    /// How many redirects the transport follows before giving up
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 90,
            max_redirects: 10,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read settings from a JSON file. Missing keys keep their default values
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
        let config = match std::fs::File::open(path) {
            Err(err) => {
                return Err(format!("Unable to open file {:?}: {}", path, err).into());
            },
            Ok(file) => serde_json::from_reader(file)?,
        };
        Ok(config)
    }
}

/// The current value of [`USER_AGENT`]
pub(crate) fn user_agent() -> String {
    match USER_AGENT.lock() {
        Ok(ua) => ua.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

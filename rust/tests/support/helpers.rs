use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use teamwork_chat_core::{AppReconciler, AppUpdate};

// Each test binary uses a different subset of these helpers.

#[allow(dead_code)]
pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Point a data dir at a local fake backend. Reconnects are fast so loss
/// scenarios finish quickly.
#[allow(dead_code)]
pub fn write_config(data_dir: &str, api_url: &str, socket_url: &str) {
    write_config_json(
        data_dir,
        serde_json::json!({
            "disable_network": false,
            "api_base_url": api_url,
            "socket_url": socket_url,
            "request_timeout_secs": 5,
            "reconnect_base_delay_ms": 50,
            "reconnect_max_delay_ms": 200,
        }),
    );
}

#[allow(dead_code)]
pub fn write_config_json(data_dir: &str, v: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("teamwork_config.json");
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

#[allow(dead_code)]
#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

#[allow(dead_code)]
impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn revs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(|u| u.rev()).collect()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}

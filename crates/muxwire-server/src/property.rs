use muxwire_transport::Network;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// One bound listener, remembered across stop/start.
#[derive(Debug, Clone)]
pub(crate) struct ListenerProperty {
    pub(crate) network: Network,
    /// Resolved local address, so a restart rebinds the same port.
    pub(crate) addr: String,
    /// Cancelled to stop the accept loop.
    pub(crate) stop: CancellationToken,
    /// Cancelled by the accept loop once its socket is released.
    pub(crate) finished: CancellationToken,
}

/// Listener cache, guarded by its own lock so listener lifecycle never
/// contends with the client pool.
#[derive(Debug, Default)]
pub(crate) struct PropertyCache {
    entries: Mutex<Vec<ListenerProperty>>,
}

impl PropertyCache {
    pub(crate) fn record(&self, property: ListenerProperty) {
        self.entries.lock().push(property);
    }

    pub(crate) fn stop_all(&self) {
        for entry in self.entries.lock().iter() {
            entry.stop.cancel();
        }
    }

    pub(crate) fn take_all(&self) -> Vec<ListenerProperty> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Put listeners that could not be restarted back, ahead of any recorded
    /// since they were taken.
    pub(crate) fn restore(&self, properties: impl IntoIterator<Item = ListenerProperty>) {
        let mut entries = self.entries.lock();
        let newer = std::mem::take(&mut *entries);
        entries.extend(properties);
        entries.extend(newer);
    }

    pub(crate) fn addrs(&self) -> Vec<(Network, String)> {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.stop.is_cancelled())
            .map(|e| (e.network, e.addr.clone()))
            .collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

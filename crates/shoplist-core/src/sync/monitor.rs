//! Connectivity signal.
//!
//! `NetworkMonitor` is the reachability source the store consults before a
//! write and subscribes to for reconnect edges. `WatchMonitor` is a
//! watch-channel implementation driven by whoever knows the real state
//! (a platform probe, a CLI flag, a test).
//!
//! A watch channel only keeps the latest value, so an offline -> online
//! blip can reach a slow subscriber as a single "online". Each snapshot
//! therefore carries a reconnect counter and edges are detected on it.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connectivity {
    pub online: bool,
    /// Offline -> online transitions reported so far.
    pub reconnects: u64,
}

pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;

    fn subscribe(&self) -> watch::Receiver<Connectivity>;
}

pub struct WatchMonitor {
    tx: watch::Sender<Connectivity>,
}

impl WatchMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(Connectivity {
            online,
            reconnects: 0,
        });
        Self { tx }
    }

    /// Report reachability. Repeating the current value still notifies
    /// subscribers but does not count as a reconnect.
    pub fn set_online(&self, online: bool) {
        self.tx.send_modify(|state| {
            if online && !state.online {
                state.reconnects += 1;
            }
            state.online = online;
        });
    }
}

impl NetworkMonitor for WatchMonitor {
    fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

/// Edge detector over connectivity snapshots.
#[derive(Debug)]
pub struct ConnectivityEdge {
    seen_reconnects: u64,
}

impl ConnectivityEdge {
    pub fn new(initial: Connectivity) -> Self {
        Self {
            seen_reconnects: initial.reconnects,
        }
    }

    /// True when a reconnect happened since the last observation and the
    /// device is still online.
    pub fn observe(&mut self, state: Connectivity) -> bool {
        let reconnected = state.reconnects > self.seen_reconnects;
        self.seen_reconnects = state.reconnects;
        reconnected && state.online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_only_on_reconnect() {
        let monitor = WatchMonitor::new(true);
        let rx = monitor.subscribe();
        let mut edge = ConnectivityEdge::new(*rx.borrow());
        let mut step = |online: bool| {
            monitor.set_online(online);
            edge.observe(*rx.borrow())
        };

        assert!(!step(true));
        assert!(!step(false));
        assert!(step(true));
        assert!(!step(true));
        assert!(!step(true));
        assert!(!step(false));
        assert!(!step(false));
        assert!(step(true));
    }

    #[test]
    fn test_coalesced_blip_still_counts() {
        let monitor = WatchMonitor::new(true);
        let rx = monitor.subscribe();
        let mut edge = ConnectivityEdge::new(*rx.borrow());

        monitor.set_online(false);
        monitor.set_online(true);

        assert!(edge.observe(*rx.borrow()));
        assert!(!edge.observe(*rx.borrow()));
    }

    #[test]
    fn test_reconnect_then_drop_is_not_an_edge() {
        let monitor = WatchMonitor::new(false);
        let rx = monitor.subscribe();
        let mut edge = ConnectivityEdge::new(*rx.borrow());

        monitor.set_online(true);
        monitor.set_online(false);

        assert!(!edge.observe(*rx.borrow()));
    }

    #[tokio::test]
    async fn test_watch_monitor_notifies() {
        let monitor = WatchMonitor::new(false);
        let mut rx = monitor.subscribe();
        assert!(!monitor.is_online());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        let state = *rx.borrow_and_update();
        assert!(state.online);
        assert_eq!(state.reconnects, 1);
        assert!(monitor.is_online());
    }
}

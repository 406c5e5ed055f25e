//! Network reachability: a current boolean plus edge-triggered events.
//!
//! Platforms that push link-state changes call [`ConnectivityMonitor::set_online`]
//! directly. Otherwise [`ConnectivityMonitor::spawn_polling`] drives the state
//! from a [`ReachabilityProbe`] at a fixed interval.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    BecameOnline,
    BecameOffline,
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish()
    }
}

impl ConnectivityMonitor {
    /// `initial` is the platform's reachability at startup.
    pub fn new(initial: bool) -> Self {
        let (state, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(state),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Record the latest reachability. Emits an event only on a transition.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }
        let event = if online {
            info!("network reachable");
            ConnectivityEvent::BecameOnline
        } else {
            info!("network unreachable");
            ConnectivityEvent::BecameOffline
        };
        // No subscribers is fine; the watch state is still updated.
        let _ = self.events.send(event);
        Some(event)
    }

    /// Poll `probe` every `interval` until the returned task is aborted.
    pub fn spawn_polling(
        &self,
        probe: Arc<dyn ReachabilityProbe>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = probe.is_reachable().await;
                debug!(reachable, "reachability probe");
                monitor.set_online(reachable);
            }
        })
    }
}

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Any HTTP response counts as reachable; transport errors and timeouts do not.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    http: Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(url: Url, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn is_reachable(&self) -> bool {
        match self.http.head(self.url.clone()).send().await {
            Ok(res) => {
                debug!(status = %res.status(), "probe response");
                true
            }
            Err(err) => {
                debug!(?err, "probe failed");
                false
            }
        }
    }
}

//! Tracker actor that keeps one torrent announced.
//!
//! The deputy announces `started` on its first idle pass, then re-announces
//! on a timer whose interval the tracker controls. Owners force extra
//! announces through a [`DeputyHandle`]. Faults never escape the actor: they
//! are recorded in the published [`DeputyStatus`], and connection failures
//! are retried once after a fixed delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::types::{AnnounceEvent, AnnounceRequest, SwarmCoordinator, TrackerClient};
use crate::actor::{self, Actor, ActorError, ActorHandle, Context, TimerHandle};
use crate::config::BitsterConfig;
use crate::torrent::{FaultClass, InfoHash, TorrentError};

/// Messages understood by the deputy.
#[derive(Debug)]
pub enum DeputyMemo {
    /// Announce now to fetch a fresh peer list
    List,
    /// Announce that the download completed
    Done,
    /// Announce `stopped`, then shut down
    Halt,
    /// Timer payload the deputy schedules for itself
    Reannounce(Reannounce),
}

/// Deferred announce. Only the deputy can create one.
#[derive(Debug)]
pub struct Reannounce {
    generation: u64,
    event: Option<AnnounceEvent>,
}

/// Session state of the deputy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeputyState {
    /// Has not contacted the tracker yet
    Init,
    /// Last announce succeeded or is in flight
    Normal,
    /// Last announce failed; see [`DeputyStatus::fault`]
    Error,
}

/// Snapshot published after every announce.
#[derive(Debug, Clone)]
pub struct DeputyStatus {
    pub state: DeputyState,
    /// Fault from the most recent failed announce, cleared on success
    pub fault: Option<Arc<TorrentError>>,
    /// Delay between regular announces
    pub announce_interval: Duration,
}

pub struct Deputy<C, S> {
    client: C,
    coordinator: Arc<S>,
    info_hash: InfoHash,
    listen_port: u16,
    state: DeputyState,
    fault: Option<Arc<TorrentError>>,
    interval: Duration,
    min_interval: Duration,
    retry_delay: Duration,
    pending_timer: Option<TimerHandle>,
    generation: u64,
    status: watch::Sender<DeputyStatus>,
}

impl<C: TrackerClient, S: SwarmCoordinator> Deputy<C, S> {
    /// Creates a deputy in `Init` state together with its status channel.
    pub fn new(
        client: C,
        info_hash: InfoHash,
        coordinator: Arc<S>,
        config: &BitsterConfig,
    ) -> (Self, watch::Receiver<DeputyStatus>) {
        let interval = config.tracker.default_announce_interval;
        let (status, status_rx) = watch::channel(DeputyStatus {
            state: DeputyState::Init,
            fault: None,
            announce_interval: interval,
        });

        let deputy = Self {
            client,
            coordinator,
            info_hash,
            listen_port: config.tracker.listen_port,
            state: DeputyState::Init,
            fault: None,
            interval,
            min_interval: config.tracker.min_announce_interval,
            retry_delay: config.tracker.retry_delay,
            pending_timer: None,
            generation: 0,
            status,
        };
        (deputy, status_rx)
    }

    async fn announce(&mut self, event: Option<AnnounceEvent>, ctx: &Context<DeputyMemo>) {
        // Leaving init even on failure keeps `started` from being re-sent on
        // every idle pass.
        if self.state == DeputyState::Init {
            self.state = DeputyState::Normal;
        }

        let totals = self.coordinator.transfer_totals();
        let request = AnnounceRequest {
            info_hash: self.info_hash,
            peer_id: self.coordinator.peer_id(),
            port: self.listen_port,
            uploaded: totals.uploaded,
            downloaded: totals.downloaded,
            left: totals.left,
            event,
        };

        tracing::info!("Contacting tracker {}", self.client.tracker_url());
        match self.client.announce(request).await {
            Ok(response) => {
                self.interval =
                    Duration::from_secs(u64::from(response.interval)).max(self.min_interval);
                tracing::debug!(
                    "Received {} peers from {}, next announce in {:?}",
                    response.peers.len(),
                    self.client.tracker_url(),
                    self.interval
                );
                self.coordinator.deliver_peers(response.peers);
                self.state = DeputyState::Normal;
                self.fault = None;
            }
            Err(e) => {
                match e.fault_class() {
                    FaultClass::Transport => {
                        tracing::warn!(
                            "Unable to communicate with tracker {}: {e}. Retrying in {:?}",
                            self.client.tracker_url(),
                            self.retry_delay
                        );
                        self.arm_timer(ctx, self.retry_delay, event);
                    }
                    FaultClass::Endpoint => {
                        tracing::error!("Malformed announce URL: {e}");
                    }
                    FaultClass::Decoding => {
                        tracing::error!(
                            "Invalid response from tracker {}: {e}",
                            self.client.tracker_url()
                        );
                    }
                }
                self.state = DeputyState::Error;
                self.fault = Some(Arc::new(e));
            }
        }

        self.publish();
    }

    /// Replaces any pending timer with a new one.
    fn arm_timer(
        &mut self,
        ctx: &Context<DeputyMemo>,
        delay: Duration,
        event: Option<AnnounceEvent>,
    ) {
        self.cancel_timer();
        self.generation += 1;
        let memo = DeputyMemo::Reannounce(Reannounce {
            generation: self.generation,
            event,
        });
        self.pending_timer = ctx.schedule(delay, memo);
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            timer.cancel();
        }
    }

    fn publish(&self) {
        self.status.send_replace(DeputyStatus {
            state: self.state,
            fault: self.fault.clone(),
            announce_interval: self.interval,
        });
    }
}

#[async_trait]
impl<C: TrackerClient, S: SwarmCoordinator> Actor for Deputy<C, S> {
    type Memo = DeputyMemo;

    async fn receive(&mut self, memo: DeputyMemo, ctx: &Context<DeputyMemo>) {
        match memo {
            DeputyMemo::List => self.announce(None, ctx).await,
            DeputyMemo::Reannounce(timer) => {
                if timer.generation != self.generation {
                    tracing::trace!("Ignoring superseded re-announce timer");
                    return;
                }
                self.pending_timer = None;
                self.announce(timer.event, ctx).await;
            }
            DeputyMemo::Done => self.announce(Some(AnnounceEvent::Completed), ctx).await,
            DeputyMemo::Halt => {
                self.announce(Some(AnnounceEvent::Stopped), ctx).await;
                self.cancel_timer();
                ctx.shutdown();
            }
        }
    }

    async fn idle(&mut self, ctx: &Context<DeputyMemo>) {
        if self.state == DeputyState::Init {
            self.announce(Some(AnnounceEvent::Started), ctx).await;
        }

        if self.pending_timer.is_none() && ctx.is_running() {
            self.arm_timer(ctx, self.interval, None);
        }

        ctx.wait_for_memo(ctx.idle_interval()).await;
    }

    fn name(&self) -> &'static str {
        "Deputy"
    }
}

/// Owner-side handle to a running deputy.
#[derive(Clone)]
pub struct DeputyHandle {
    actor: ActorHandle<DeputyMemo>,
    status: watch::Receiver<DeputyStatus>,
}

impl DeputyHandle {
    /// Forces an announce without an event.
    ///
    /// # Errors
    ///
    /// - `ActorError::Stopped` - If the deputy has stopped
    pub fn request_peers(&self) -> Result<(), ActorError> {
        self.actor.post(DeputyMemo::List)
    }

    /// Reports download completion to the tracker.
    ///
    /// # Errors
    ///
    /// - `ActorError::Stopped` - If the deputy has stopped
    pub fn completed(&self) -> Result<(), ActorError> {
        self.actor.post(DeputyMemo::Done)
    }

    /// Announces `stopped` and stops the deputy.
    ///
    /// # Errors
    ///
    /// - `ActorError::Stopped` - If the deputy has already stopped
    pub fn halt(&self) -> Result<(), ActorError> {
        self.actor.post(DeputyMemo::Halt)
    }

    /// Latest published status.
    pub fn status(&self) -> DeputyStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified whenever the status changes.
    pub fn subscribe(&self) -> watch::Receiver<DeputyStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.actor.is_running()
    }

    /// Waits until the deputy's loop has exited.
    pub async fn stopped(&self) {
        self.actor.stopped().await;
    }
}

/// Starts a deputy for `info_hash` on its own task.
pub fn spawn_deputy<C: TrackerClient, S: SwarmCoordinator>(
    client: C,
    info_hash: InfoHash,
    coordinator: Arc<S>,
    config: &BitsterConfig,
) -> DeputyHandle {
    let (deputy, status) = Deputy::new(client, info_hash, coordinator, config);
    let actor = actor::spawn(deputy, &config.actor);
    DeputyHandle { actor, status }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;
    use crate::torrent::PeerId;
    use crate::torrent::tracker::{AnnounceResponse, PeerRecord, TransferTotals};

    #[derive(Clone, Default)]
    struct MockTracker {
        requests: Arc<Mutex<Vec<AnnounceRequest>>>,
        outcomes: Arc<Mutex<VecDeque<Result<AnnounceResponse, TorrentError>>>>,
    }

    impl MockTracker {
        fn push_outcome(&self, outcome: Result<AnnounceResponse, TorrentError>) {
            self.outcomes.lock().push_back(outcome);
        }

        fn events(&self) -> Vec<Option<AnnounceEvent>> {
            self.requests.lock().iter().map(|r| r.event).collect()
        }
    }

    fn response(interval: u32) -> AnnounceResponse {
        AnnounceResponse {
            interval,
            min_interval: None,
            tracker_id: None,
            complete: 1,
            incomplete: 0,
            peers: vec![PeerRecord {
                peer_id: None,
                ip: "10.0.0.7".to_string(),
                port: 6881,
            }],
        }
    }

    #[async_trait]
    impl TrackerClient for MockTracker {
        async fn announce(
            &self,
            request: AnnounceRequest,
        ) -> Result<AnnounceResponse, TorrentError> {
            self.requests.lock().push(request);
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(response(1800)))
        }

        fn tracker_url(&self) -> &str {
            "http://mock.tracker/announce"
        }
    }

    #[derive(Default)]
    struct MockSwarm {
        delivered: Mutex<Vec<Vec<PeerRecord>>>,
    }

    impl SwarmCoordinator for MockSwarm {
        fn peer_id(&self) -> PeerId {
            PeerId::new(*b"-BS0001-000000000000")
        }

        fn transfer_totals(&self) -> TransferTotals {
            TransferTotals {
                uploaded: 1,
                downloaded: 2,
                left: 3,
            }
        }

        fn deliver_peers(&self, peers: Vec<PeerRecord>) {
            self.delivered.lock().push(peers);
        }
    }

    fn start(tracker: &MockTracker) -> (DeputyHandle, Arc<MockSwarm>) {
        let swarm = Arc::new(MockSwarm::default());
        let handle = spawn_deputy(
            tracker.clone(),
            InfoHash::new([9; 20]),
            Arc::clone(&swarm),
            &BitsterConfig::for_testing(),
        );
        (handle, swarm)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_first_idle_announces_started() {
        let tracker = MockTracker::default();
        let (handle, swarm) = start(&tracker);

        wait_until(|| handle.status().state == DeputyState::Normal).await;

        let request = tracker.requests.lock()[0].clone();
        assert_eq!(request.event, Some(AnnounceEvent::Started));
        assert_eq!(request.info_hash, InfoHash::new([9; 20]));
        assert_eq!(request.port, 6881);
        assert_eq!((request.uploaded, request.downloaded, request.left), (1, 2, 3));
        assert_eq!(swarm.delivered.lock().len(), 1);
        assert_eq!(handle.status().announce_interval, Duration::from_secs(1800));

        handle.halt().unwrap();
    }

    #[tokio::test]
    async fn test_forced_announces_carry_their_events() {
        let tracker = MockTracker::default();
        let (handle, _swarm) = start(&tracker);
        wait_until(|| tracker.requests.lock().len() == 1).await;

        handle.request_peers().unwrap();
        handle.completed().unwrap();
        wait_until(|| tracker.requests.lock().len() == 3).await;

        assert_eq!(
            tracker.events(),
            vec![
                Some(AnnounceEvent::Started),
                None,
                Some(AnnounceEvent::Completed)
            ]
        );
        handle.halt().unwrap();
    }

    #[tokio::test]
    async fn test_halt_announces_stopped_then_stops() {
        let tracker = MockTracker::default();
        let (handle, _swarm) = start(&tracker);
        wait_until(|| tracker.requests.lock().len() == 1).await;

        handle.halt().unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle.stopped())
            .await
            .unwrap();

        assert_eq!(
            tracker.events().last().copied().flatten(),
            Some(AnnounceEvent::Stopped)
        );
        assert!(!handle.is_running());
        assert_eq!(handle.request_peers(), Err(ActorError::Stopped));

        let seen = tracker.requests.lock().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.requests.lock().len(), seen);
    }

    #[tokio::test]
    async fn test_transport_fault_is_retried_with_same_event() {
        let tracker = MockTracker::default();
        tracker.push_outcome(Err(TorrentError::TrackerConnectionFailed {
            url: "http://mock.tracker/announce".to_string(),
        }));
        let (handle, _swarm) = start(&tracker);

        wait_until(|| handle.status().state == DeputyState::Error).await;
        let fault = handle.status().fault.unwrap();
        assert_eq!(fault.fault_class(), FaultClass::Transport);

        wait_until(|| handle.status().state == DeputyState::Normal).await;
        assert_eq!(
            tracker.events(),
            vec![Some(AnnounceEvent::Started), Some(AnnounceEvent::Started)]
        );
        assert!(handle.status().fault.is_none());
        handle.halt().unwrap();
    }

    #[tokio::test]
    async fn test_transport_retry_replaces_pending_periodic_timer() {
        let tracker = MockTracker::default();
        // A one second interval arms a periodic timer that would fire during the test.
        tracker.push_outcome(Ok(response(1)));
        tracker.push_outcome(Err(TorrentError::TrackerConnectionFailed {
            url: "http://mock.tracker/announce".to_string(),
        }));
        let (handle, _swarm) = start(&tracker);
        wait_until(|| handle.status().announce_interval == Duration::from_secs(1)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        handle.request_peers().unwrap();
        wait_until(|| handle.status().state == DeputyState::Error).await;
        wait_until(|| handle.status().state == DeputyState::Normal).await;

        // Past the point where the replaced periodic timer would have fired.
        tokio::time::sleep(Duration::from_millis(1300)).await;

        assert_eq!(
            tracker.events(),
            vec![Some(AnnounceEvent::Started), None, None]
        );
        let status = handle.status();
        assert_eq!(status.state, DeputyState::Normal);
        assert!(status.fault.is_none());
        assert_eq!(status.announce_interval, Duration::from_secs(1800));
        handle.halt().unwrap();
    }

    #[tokio::test]
    async fn test_superseded_reannounce_is_ignored() {
        let tracker = MockTracker::default();
        let (handle, _swarm) = start(&tracker);
        wait_until(|| handle.status().state == DeputyState::Normal).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        // The first idle pass armed generation 1, so generation 0 is stale.
        handle
            .actor
            .post(DeputyMemo::Reannounce(Reannounce {
                generation: 0,
                event: Some(AnnounceEvent::Completed),
            }))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(tracker.events(), vec![Some(AnnounceEvent::Started)]);
        assert_eq!(handle.status().state, DeputyState::Normal);

        handle.request_peers().unwrap();
        wait_until(|| tracker.requests.lock().len() == 2).await;
        handle.halt().unwrap();
    }

    #[tokio::test]
    async fn test_decoding_fault_is_recorded_without_retry() {
        let tracker = MockTracker::default();
        tracker.push_outcome(Err(TorrentError::ProtocolError {
            message: "Missing interval in tracker response".to_string(),
        }));
        let (handle, swarm) = start(&tracker);

        wait_until(|| handle.status().state == DeputyState::Error).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = handle.status();
        assert_eq!(status.state, DeputyState::Error);
        assert_eq!(
            status.fault.unwrap().fault_class(),
            FaultClass::Decoding
        );
        assert_eq!(tracker.requests.lock().len(), 1);
        assert!(swarm.delivered.lock().is_empty());
        handle.halt().unwrap();
    }

    #[tokio::test]
    async fn test_tracker_interval_drives_periodic_announce() {
        let tracker = MockTracker::default();
        // Zero is clamped to the configured minimum.
        tracker.push_outcome(Ok(response(0)));
        tracker.push_outcome(Ok(response(0)));
        let (handle, _swarm) = start(&tracker);

        wait_until(|| tracker.requests.lock().len() >= 3).await;
        wait_until(|| handle.status().announce_interval == Duration::from_secs(1800)).await;

        let events = tracker.events();
        assert_eq!(events[0], Some(AnnounceEvent::Started));
        assert_eq!(events[1], None);
        assert_eq!(events[2], None);
        handle.halt().unwrap();
    }
}

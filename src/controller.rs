use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::TrackerConfig,
    host::PlayerHost,
    navigation::{debounce_loop, NavigationTrigger},
    reporter::{CompletionJob, CompletionReporter, NetworkGateway},
    storage::LocalStore,
    tracking::{
        Effect, Notice, RandomSource, ReportRequest, Tracker, TrackerEvent, TrackerSnapshot,
    },
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const PLAYLIST_POLL_INTERVAL: Duration = Duration::from_millis(300);
const PLAYLIST_POLL_ATTEMPTS: u32 = 20;

enum Command {
    Event(TrackerEvent),
    MetadataReady,
    Flush(oneshot::Sender<()>),
}

/// Drives one page's `Tracker`: serialises host notifications, timer ticks
/// and report results into a single event queue and carries out the
/// resulting effects.
#[derive(Clone)]
pub struct TrackerController {
    commands: mpsc::UnboundedSender<Command>,
    navigation: mpsc::UnboundedSender<(NavigationTrigger, String)>,
    tracker: Arc<Mutex<Tracker>>,
    store: LocalStore,
    gateway: Arc<dyn NetworkGateway>,
    host: Arc<dyn PlayerHost>,
    cancel: CancellationToken,
}

impl TrackerController {
    /// Spawns the event and navigation tasks; must be called inside a
    /// tokio runtime. Tracking stays off until `refresh_tracking` reads the
    /// stored sign-in state.
    pub fn start(
        config: TrackerConfig,
        host: Arc<dyn PlayerHost>,
        gateway: Arc<dyn NetworkGateway>,
        store: LocalStore,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let tracker = Arc::new(Mutex::new(Tracker::new((&config).into(), rng)));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (navigation_tx, navigation_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let reporter = Arc::new(CompletionReporter::from_config(
            gateway.clone(),
            store.clone(),
            &config,
        ));

        let forward = commands_tx.clone();
        tokio::spawn(debounce_loop(
            navigation_rx,
            config.navigation_debounce(),
            cancel.clone(),
            move |href| {
                let _ = forward.send(Command::Event(TrackerEvent::UrlChanged(href)));
                async {}
            },
        ));

        let runner = EffectRunner {
            host: host.clone(),
            reporter,
            commands: commands_tx.clone(),
            config: Arc::new(config),
            countdown: None,
            init: None,
            announce: None,
        };
        tokio::spawn(event_loop(
            tracker.clone(),
            commands_rx,
            runner,
            cancel.clone(),
        ));

        Self {
            commands: commands_tx,
            navigation: navigation_tx,
            tracker,
            store,
            gateway,
            host,
            cancel,
        }
    }

    pub fn dispatch(&self, event: TrackerEvent) {
        if self.commands.send(Command::Event(event)).is_err() {
            log_warn!("tracker stopped, dropping event");
        }
    }

    pub fn notify_navigation(&self, trigger: NavigationTrigger, href: &str) {
        if self.navigation.send((trigger, href.to_string())).is_err() {
            log_warn!("navigation monitor stopped, dropping {trigger:?}");
        }
    }

    pub fn time_update(&self, current_time: f64) {
        self.dispatch(TrackerEvent::TimeUpdate { current_time });
    }

    pub fn playback_ended(&self) {
        self.dispatch(TrackerEvent::PlaybackEnded);
    }

    pub fn confirm_attention(&self) {
        self.dispatch(TrackerEvent::ChallengeConfirmed);
    }

    pub fn metadata_ready(&self) {
        let _ = self.commands.send(Command::MetadataReady);
    }

    /// Re-reads sign-in and the tracking toggle from the store and applies
    /// them. Call after any change to either.
    pub async fn refresh_tracking(&self) -> Result<bool> {
        let gate = self
            .store
            .tracking_gate()
            .await
            .context("failed to read tracking state")?;
        let enabled = gate.enabled();
        self.dispatch(TrackerEvent::TrackingChanged { enabled });
        Ok(enabled)
    }

    /// Health check against the backend. Failure only warns; completions
    /// still fall back to the local mirror.
    pub async fn probe_backend(&self) -> bool {
        match self.gateway.check_health().await {
            Ok(()) => {
                log_info!("backend connected");
                true
            }
            Err(err) => {
                log_warn!("backend unreachable: {err}");
                self.host.show_toast(&Notice::warn(
                    "⚠️ Backend connection failed. Check if server is running.",
                    5000,
                ));
                false
            }
        }
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        self.tracker.lock().await.snapshot()
    }

    /// Resolves once every command sent before it has been handled.
    pub async fn flush(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Flush(reply_tx)).is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn event_loop(
    tracker: Arc<Mutex<Tracker>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut runner: EffectRunner,
    cancel: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let event = match command {
            Command::Event(event) => event,
            Command::MetadataReady => {
                let video_id = tracker
                    .lock()
                    .await
                    .current_video()
                    .map(|video| video.video_id.clone());
                if let Some(video_id) = video_id {
                    runner.spawn_init(video_id, Duration::ZERO);
                }
                continue;
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
                continue;
            }
        };

        if runner.config.debug {
            log_debug!("event {event:?}");
        }

        let effects = tracker.lock().await.handle(event);
        for effect in effects {
            runner.execute(effect);
        }
    }

    runner.shutdown();
    log_info!("tracker event loop stopped");
}

struct EffectRunner {
    host: Arc<dyn PlayerHost>,
    reporter: Arc<CompletionReporter>,
    commands: mpsc::UnboundedSender<Command>,
    config: Arc<TrackerConfig>,
    countdown: Option<JoinHandle<()>>,
    init: Option<JoinHandle<()>>,
    announce: Option<JoinHandle<()>>,
}

impl EffectRunner {
    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::AttachPlayback => self.host.attach_playback(),
            Effect::DetachPlayback => self.host.detach_playback(),
            Effect::Pause => self.host.pause(),
            Effect::Play => self.host.play(),
            Effect::SeekToStart => self.host.seek_to_start(),
            Effect::ShowChallenge { seconds } => self.host.show_challenge(seconds),
            Effect::UpdateCountdown { remaining } => self.host.update_countdown(remaining),
            Effect::HideChallenge => self.host.hide_challenge(),
            Effect::StartCountdown => self.start_countdown(),
            Effect::StopCountdown => abort(&mut self.countdown),
            Effect::ShowResult { eligible } => self.host.show_result(eligible),
            Effect::HideResult => self.host.hide_result(),
            Effect::ClearToasts => {
                abort(&mut self.announce);
                self.host.clear_toasts();
            }
            Effect::Toast(notice) => self.host.show_toast(&notice),
            Effect::ScheduleInit { video } => {
                abort(&mut self.announce);
                let delay = self.config.init_settle();
                self.spawn_init(video.video_id, delay);
            }
            Effect::AwaitMetadata { video_id } => self.host.await_metadata(&video_id),
            Effect::AnnouncePlaylist { index } => self.announce_playlist(index),
            Effect::Report(request) => self.spawn_report(request),
        }
    }

    fn start_countdown(&mut self) {
        abort(&mut self.countdown);
        let commands = self.commands.clone();
        self.countdown = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
            loop {
                interval.tick().await;
                if commands
                    .send(Command::Event(TrackerEvent::ChallengeTick))
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    /// Waits `delay` for the page to settle, reads the duration and, when it
    /// is usable, waits a little longer for the player to finish loading.
    fn spawn_init(&mut self, video_id: String, delay: Duration) {
        abort(&mut self.init);
        let host = self.host.clone();
        let commands = self.commands.clone();
        let metadata_settle = self.config.metadata_settle();

        self.init = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let duration = host
                .duration()
                .filter(|d| d.is_finite() && *d > 0.0);
            if duration.is_some() {
                time::sleep(metadata_settle).await;
            }
            let _ = commands.send(Command::Event(TrackerEvent::DurationKnown {
                video_id,
                duration: duration.unwrap_or(f64::NAN),
            }));
        }));
    }

    /// The playlist panel renders late, so poll for its size for a while
    /// before announcing the position.
    fn announce_playlist(&mut self, index: u32) {
        abort(&mut self.announce);
        let host = self.host.clone();

        self.announce = Some(tokio::spawn(async move {
            let mut total = 0;
            for _ in 0..PLAYLIST_POLL_ATTEMPTS {
                if let Some(count) = host.page_details().total_videos.filter(|n| *n > 0) {
                    total = count;
                    break;
                }
                time::sleep(PLAYLIST_POLL_INTERVAL).await;
            }
            host.show_toast(&Notice::info(
                format!("📺 Watching {index}/{total} videos in this playlist"),
                5000,
            ));
        }));
    }

    /// Report tasks are never aborted; a result for a session that has since
    /// been replaced is dropped by the tracker.
    fn spawn_report(&self, request: ReportRequest) {
        let details = self.host.page_details();
        let video = request.video;
        let in_playlist = video.in_playlist();

        let title = if details.title.trim().is_empty() {
            video.video_id.clone()
        } else {
            details.title
        };
        let job = CompletionJob {
            video_id: video.video_id,
            title,
            playlist_title: if in_playlist {
                details.playlist_title
            } else {
                None
            },
            total_videos: if in_playlist {
                details.total_videos
            } else {
                None
            },
            playlist_id: video.playlist_id,
        };

        let reporter = self.reporter.clone();
        let commands = self.commands.clone();
        let token = request.token;
        tokio::spawn(async move {
            let outcome = reporter.report(job).await;
            let _ = commands.send(Command::Event(TrackerEvent::ReportFinished { token, outcome }));
        });
    }

    fn shutdown(&mut self) {
        abort(&mut self.countdown);
        abort(&mut self.init);
        abort(&mut self.announce);
    }
}

fn abort(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::host::PageDetails;
    use crate::models::UserIdentity;
    use crate::reporter::testing::FakeGateway;
    use crate::tracking::{ChallengeState, ScriptedRandom};

    const WATCH: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    const OTHER: &str = "https://www.youtube.com/watch?v=9bZkp7q19f0";

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Attach,
        Detach,
        AwaitMetadata(String),
        Pause,
        Play,
        SeekToStart,
        Toast(String),
        ClearToasts,
        ShowChallenge(u32),
        Countdown(u32),
        HideChallenge,
        ShowResult(bool),
        HideResult,
    }

    #[derive(Default)]
    struct RecordingHost {
        duration: StdMutex<Option<f64>>,
        details: StdMutex<PageDetails>,
        calls: StdMutex<Vec<Call>>,
    }

    impl RecordingHost {
        fn with_duration(duration: f64) -> Arc<Self> {
            let host = Self::default();
            *host.duration.lock().unwrap() = Some(duration);
            host.details.lock().unwrap().title = "Lecture 1".into();
            Arc::new(host)
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().unwrap())
        }

        fn toasts(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Toast(text) => Some(text),
                    _ => None,
                })
                .collect()
        }
    }

    impl PlayerHost for RecordingHost {
        fn duration(&self) -> Option<f64> {
            *self.duration.lock().unwrap()
        }
        fn page_details(&self) -> PageDetails {
            self.details.lock().unwrap().clone()
        }
        fn attach_playback(&self) {
            self.record(Call::Attach)
        }
        fn detach_playback(&self) {
            self.record(Call::Detach)
        }
        fn await_metadata(&self, video_id: &str) {
            self.record(Call::AwaitMetadata(video_id.into()))
        }
        fn pause(&self) {
            self.record(Call::Pause)
        }
        fn play(&self) {
            self.record(Call::Play)
        }
        fn seek_to_start(&self) {
            self.record(Call::SeekToStart)
        }
        fn show_toast(&self, notice: &Notice) {
            self.record(Call::Toast(notice.text.clone()))
        }
        fn clear_toasts(&self) {
            self.record(Call::ClearToasts)
        }
        fn show_challenge(&self, seconds: u32) {
            self.record(Call::ShowChallenge(seconds))
        }
        fn update_countdown(&self, remaining: u32) {
            self.record(Call::Countdown(remaining))
        }
        fn hide_challenge(&self) {
            self.record(Call::HideChallenge)
        }
        fn show_result(&self, eligible: bool) {
            self.record(Call::ShowResult(eligible))
        }
        fn hide_result(&self) {
            self.record(Call::HideResult)
        }
    }

    struct Harness {
        controller: TrackerController,
        host: Arc<RecordingHost>,
        gateway: Arc<FakeGateway>,
        store: LocalStore,
    }

    async fn harness(host: Arc<RecordingHost>) -> Harness {
        let gateway = Arc::new(FakeGateway::default());
        let store = LocalStore::open_in_memory().unwrap();
        store
            .store_identity(&UserIdentity::new("Ada", "ada@example.com"))
            .await
            .unwrap();

        let rng = ScriptedRandom::new(vec![7, 29, 50, 65, 83, 2, 7, 29, 50, 65, 83, 0]);
        let controller = TrackerController::start(
            TrackerConfig::default(),
            host.clone(),
            gateway.clone(),
            store.clone(),
            Box::new(rng),
        );
        assert!(controller.refresh_tracking().await.unwrap());
        controller.flush().await;

        Harness {
            controller,
            host,
            gateway,
            store,
        }
    }

    /// Lets the store thread and spawned tasks catch up. The wait runs on
    /// the blocking pool so the runtime keeps polling and the paused clock
    /// does not jump.
    async fn settle_until(h: &Harness, mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            h.controller.flush().await;
            if done() {
                return;
            }
            tokio::task::spawn_blocking(|| std::thread::sleep(std::time::Duration::from_millis(1)))
                .await
                .unwrap();
        }
        panic!("condition not reached; host calls: {:?}", h.host.calls());
    }

    async fn open(h: &Harness, href: &str) {
        h.controller
            .notify_navigation(NavigationTrigger::HistoryPush, href);
        // debounce 300 ms + settle 400 ms + metadata 800 ms
        time::sleep(Duration::from_millis(1600)).await;
        h.controller.flush().await;
    }

    fn play(h: &Harness, seconds: &[f64]) {
        for &s in seconds {
            h.controller.time_update(s);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn watched_and_confirmed_video_is_reported() {
        let h = harness(RecordingHost::with_duration(100.0)).await;

        open(&h, WATCH).await;
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.checkpoints, vec![12, 34, 55, 70, 88]);
        assert_eq!(snapshot.challenge_offset, Some(55));
        assert!(h.host.calls().contains(&Call::Attach));
        assert!(h
            .host
            .toasts()
            .contains(&"🎬 You are watching a single video".to_string()));

        play(&h, &[12.0, 34.0, 55.0]);
        h.controller.flush().await;
        let calls = h.host.take();
        assert!(calls.contains(&Call::Pause));
        assert!(calls.contains(&Call::ShowChallenge(5)));

        time::sleep(Duration::from_millis(2500)).await;
        h.controller.flush().await;
        assert_eq!(
            h.host.take(),
            vec![Call::Countdown(4), Call::Countdown(3)]
        );

        h.controller.confirm_attention();
        h.controller.flush().await;
        assert!(h.host.take().contains(&Call::Play));
        assert_eq!(h.controller.snapshot().await.challenge, ChallengeState::Passed);

        // no further ticks once the countdown is stopped
        time::sleep(Duration::from_secs(5)).await;
        h.controller.flush().await;
        assert!(!h.host.calls().iter().any(|c| matches!(c, Call::Countdown(_))));

        play(&h, &[70.0, 88.0]);
        h.controller.playback_ended();
        settle_until(&h, || {
            h.host.toasts().contains(&"✅ Progress saved".to_string())
        })
        .await;

        assert!(h.host.calls().contains(&Call::ShowResult(true)));
        assert_eq!(h.gateway.profiles.lock().unwrap().len(), 1);
        let completions = h.gateway.completions.lock().unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].video_id, "dQw4w9WgXcQ");
        assert_eq!(completions[0].title, "Lecture 1");
        assert_eq!(completions[0].playlist_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_challenge_resets_the_video() {
        let h = harness(RecordingHost::with_duration(100.0)).await;
        open(&h, WATCH).await;

        play(&h, &[12.0, 34.0, 55.0]);
        h.controller.flush().await;
        h.host.take();

        time::sleep(Duration::from_millis(5100)).await;
        h.controller.flush().await;
        let calls = h.host.calls();
        assert!(calls.contains(&Call::Countdown(0)));
        assert!(calls.contains(&Call::HideChallenge));
        assert!(calls.contains(&Call::SeekToStart));
        assert!(!calls.contains(&Call::Play));
        assert_eq!(h.controller.snapshot().await.challenge, ChallengeState::Failed);

        play(&h, &[0.0, 12.0, 34.0, 55.0, 70.0, 88.0]);
        h.controller.playback_ended();
        h.controller.flush().await;
        assert!(h.host.calls().contains(&Call::ShowResult(false)));
        assert_eq!(h.controller.snapshot().await.crossed, 5);
        assert!(h.gateway.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn navigating_away_mid_challenge_starts_fresh() {
        let h = harness(RecordingHost::with_duration(100.0)).await;
        open(&h, WATCH).await;
        play(&h, &[12.0, 34.0, 55.0]);
        h.controller.flush().await;
        h.host.take();

        open(&h, OTHER).await;
        let calls = h.host.take();
        assert!(calls.contains(&Call::HideChallenge));
        assert!(calls.contains(&Call::Detach));
        assert!(calls.contains(&Call::Attach));

        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.video.unwrap().video_id, "9bZkp7q19f0");
        assert_eq!(snapshot.crossed, 0);
        assert_eq!(snapshot.challenge, ChallengeState::NotReached);

        // the old countdown is gone
        time::sleep(Duration::from_secs(6)).await;
        h.controller.flush().await;
        assert!(!h.host.calls().iter().any(|c| matches!(
            c,
            Call::Countdown(_) | Call::SeekToStart
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_duration_waits_for_metadata() {
        let host = Arc::new(RecordingHost::default());
        let h = harness(host.clone()).await;

        open(&h, WATCH).await;
        assert!(host
            .calls()
            .contains(&Call::AwaitMetadata("dQw4w9WgXcQ".into())));
        assert!(h.controller.snapshot().await.checkpoints.is_empty());

        *host.duration.lock().unwrap() = Some(100.0);
        h.controller.metadata_ready();
        h.controller.flush().await;
        time::sleep(Duration::from_secs(1)).await;
        h.controller.flush().await;

        assert_eq!(
            h.controller.snapshot().await.checkpoints,
            vec![12, 34, 55, 70, 88]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn playlist_position_is_announced_once_the_panel_renders() {
        let host = RecordingHost::with_duration(100.0);
        let h = harness(host.clone()).await;

        open(
            &h,
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PL1&index=2",
        )
        .await;
        assert!(!host.toasts().iter().any(|t| t.starts_with("📺")));

        host.details.lock().unwrap().total_videos = Some(12);
        time::sleep(Duration::from_millis(400)).await;
        assert!(host
            .toasts()
            .contains(&"📺 Watching 2/12 videos in this playlist".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn signing_out_tears_the_session_down() {
        let h = harness(RecordingHost::with_duration(100.0)).await;
        open(&h, WATCH).await;
        h.host.take();

        h.store.clear_identity().await.unwrap();
        assert!(!h.controller.refresh_tracking().await.unwrap());
        h.controller.flush().await;

        let calls = h.host.calls();
        assert!(calls.contains(&Call::Detach));
        assert!(calls.contains(&Call::ClearToasts));
        assert!(!h.controller.snapshot().await.tracking_enabled);

        play(&h, &[12.0]);
        h.controller.flush().await;
        assert!(h.host.toasts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_backend_warns() {
        let h = harness(RecordingHost::with_duration(100.0)).await;
        assert!(!h.controller.probe_backend().await);
        assert!(h.host.toasts()[0].contains("Backend connection failed"));

        *h.gateway.healthy.lock().unwrap() = true;
        assert!(h.controller.probe_backend().await);
        h.controller.shutdown();
    }
}

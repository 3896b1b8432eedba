use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    api::{FetchError, PlayInfoSource, DEFAULT_QUALITY},
    ffmpeg::{self, Capture, CaptureJob, CaptureOutcome},
    play_info::PlayInfo,
    resolver::{self, ResolveError},
    selector::{self, CodecPolicy, SelectError},
    stats::MonitorStatistics,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    #[error("Could not check room status")]
    Fetch(#[from] FetchError),
    #[error("Could not choose a stream")]
    Select(#[from] SelectError),
    #[error("Could not resolve stream URL")]
    Resolve(#[source] FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Live,
    Capturing,
    Stopped,
}

pub trait RetrySchedule: Send {
    fn next_delay(&mut self) -> Duration;

    // Called once the room is seen live
    fn reset(&mut self) {}
}

pub struct FixedInterval(pub Duration);

impl RetrySchedule for FixedInterval {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub codec_policy: CodecPolicy,
    pub output_dir: PathBuf,
    pub extension: String,
    pub capture_headers: String,
    // Consecutive failed status checks tolerated before giving up
    pub max_fetch_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            codec_policy: CodecPolicy::default(),
            output_dir: PathBuf::from("."),
            extension: "mp4".to_string(),
            capture_headers: String::new(),
            max_fetch_failures: 0,
        }
    }
}

pub struct RoomMonitor<S, C> {
    source: S,
    capture: C,
    config: MonitorConfig,
    schedule: Box<dyn RetrySchedule>,
    sleeper: Box<dyn Sleeper>,
    state: MonitorState,
    play_info: Option<PlayInfo>,
    pending: Option<CaptureJob>,
    fetch_failures: u32,
    stats: MonitorStatistics,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S, C> RoomMonitor<S, C>
where
    S: PlayInfoSource,
    C: Capture,
{
    pub fn new(source: S, capture: C, config: MonitorConfig) -> Self {
        Self {
            schedule: Box::new(FixedInterval(config.poll_interval)),
            sleeper: Box::new(TokioSleeper),
            source,
            capture,
            config,
            state: MonitorState::Idle,
            play_info: None,
            pending: None,
            fetch_failures: 0,
            stats: MonitorStatistics::new(),
            shutdown: None,
        }
    }

    pub fn with_schedule(mut self, schedule: impl RetrySchedule + 'static) -> Self {
        self.schedule = Box::new(schedule);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    // Sending `true` stops the monitor before its next transition and cuts
    // short any wait. A capture in flight is left to the Capture to end.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn play_info(&self) -> Option<&PlayInfo> {
        self.play_info.as_ref()
    }

    pub fn stats(&self) -> &MonitorStatistics {
        &self.stats
    }

    pub async fn run(&mut self) -> Result<(), MonitorError> {
        while self.state != MonitorState::Stopped {
            if self.shutdown_requested() {
                info!("{} - Shutting down", self.source.room_id());
                self.state = MonitorState::Stopped;
                break;
            }
            self.step().await?;
        }

        info!("Monitor stopped: {}", self.stats.summary());
        Ok(())
    }

    pub async fn step(&mut self) -> Result<MonitorState, MonitorError> {
        self.state = match self.state {
            MonitorState::Idle => {
                info!("{} - Watching room", self.source.room_id());
                MonitorState::Polling
            }
            MonitorState::Polling => self.poll().await?,
            MonitorState::Live => self.prepare_capture().await?,
            MonitorState::Capturing => self.run_capture().await,
            MonitorState::Stopped => MonitorState::Stopped,
        };

        Ok(self.state)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map_or(false, |rx| *rx.borrow())
    }

    async fn wait(&mut self) {
        let delay = self.schedule.next_delay();

        let Some(shutdown) = self.shutdown.as_mut() else {
            return self.sleeper.sleep(delay).await;
        };
        if *shutdown.borrow_and_update() {
            return;
        }

        tokio::select! {
            _ = self.sleeper.sleep(delay) => {}
            Ok(()) = shutdown.changed() => {}
        }
    }

    async fn poll(&mut self) -> Result<MonitorState, MonitorError> {
        let room_id = self.source.room_id();

        match self.source.fetch(DEFAULT_QUALITY).await {
            Ok(Some(info)) => {
                info!("{} - Online", room_id);
                self.play_info = Some(info);
                self.fetch_failures = 0;
                self.schedule.reset();
                Ok(MonitorState::Live)
            }
            Ok(None) => {
                self.play_info = None;
                self.fetch_failures = 0;
                self.stats.offline_polls += 1;
                info!("{} - Offline. Waiting...", room_id);
                self.wait().await;
                Ok(MonitorState::Polling)
            }
            Err(e) => {
                self.play_info = None;
                self.fetch_failures += 1;
                if self.fetch_failures > self.config.max_fetch_failures {
                    return Err(e.into());
                }

                warn!(
                    "{} - Status check failed ({}/{}): {}",
                    room_id, self.fetch_failures, self.config.max_fetch_failures, e
                );
                self.wait().await;
                Ok(MonitorState::Polling)
            }
        }
    }

    async fn prepare_capture(&mut self) -> Result<MonitorState, MonitorError> {
        // Taking the play info clears it, so the next cycle re-fetches instead
        // of reusing an expired URL.
        let info = match self.play_info.take() {
            Some(info) => info,
            None => return Ok(MonitorState::Polling),
        };

        let selection = selector::select_with_policy(&info, self.config.codec_policy)?;
        info!(
            "Downloading: stream {}, quality {}",
            selection.codec, selection.quality
        );

        let url = match resolver::resolve(&self.source, selection.codec, selection.quality).await
        {
            Ok(url) => url,
            Err(ResolveError::Fetch(e)) => return Err(MonitorError::Resolve(e)),
            Err(e) => {
                error!("{} - {}", self.source.room_id(), e);
                self.wait().await;
                return Ok(MonitorState::Polling);
            }
        };

        let fname = ffmpeg::capture_filename(
            &chrono::Local::now(),
            self.source.room_id(),
            &self.config.extension,
        );
        self.pending = Some(CaptureJob {
            url,
            output: self.config.output_dir.join(fname),
            headers: self.config.capture_headers.clone(),
        });

        Ok(MonitorState::Capturing)
    }

    async fn run_capture(&mut self) -> MonitorState {
        let job = match self.pending.take() {
            Some(job) => job,
            None => return MonitorState::Polling,
        };

        let status = self.capture.capture(&job).await;
        let bytes = tokio::fs::metadata(&job.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        self.stats.record_capture(bytes);
        info!(
            "Capture of {} ended with status {} ({})",
            job.output.display(),
            status,
            crate::util::format_bytes(bytes)
        );

        match CaptureOutcome::from_status(status) {
            CaptureOutcome::Continue => MonitorState::Polling,
            CaptureOutcome::StopPermanently => MonitorState::Stopped,
        }
    }
}

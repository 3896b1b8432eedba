use std::{
    path::{Path, PathBuf},
    process::ExitStatus,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone};
use tokio::{process::Child, sync::watch};

pub const STOP_STATUS: i32 = -1;

// ffmpeg exits with 255 after it received SIGINT or SIGTERM
const FFMPEG_INTERRUPTED: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureJob {
    pub url: String,
    pub output: PathBuf,
    // CRLF terminated
    pub headers: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Continue,
    StopPermanently,
}

impl CaptureOutcome {
    pub fn from_status(status: i32) -> Self {
        if status == STOP_STATUS {
            CaptureOutcome::StopPermanently
        } else {
            CaptureOutcome::Continue
        }
    }
}

// Blocks until the stream ends
#[async_trait]
pub trait Capture: Send + Sync {
    async fn capture(&self, job: &CaptureJob) -> i32;
}

// e.g. 2023-11-14_221320-744393.mp4
pub fn capture_filename<Tz: TimeZone>(now: &DateTime<Tz>, room_id: u64, extension: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}-{}.{}", now.format("%Y-%m-%d_%H%M%S"), room_id, extension)
}

pub fn status_from_exit(status: ExitStatus) -> i32 {
    match status.code() {
        Some(FFMPEG_INTERRUPTED) | None => STOP_STATUS,
        Some(code) => code,
    }
}

pub struct FfmpegCapture {
    program: PathBuf,
    interrupt: Option<watch::Receiver<bool>>,
}

impl Default for FfmpegCapture {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegCapture {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            interrupt: None,
        }
    }

    // Once `true` is sent, a running ffmpeg gets SIGINT so it can finalize
    // the output file, and the capture reports STOP_STATUS.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    pub fn command(&self, job: &CaptureJob) -> tokio::process::Command {
        let mut child = tokio::process::Command::new(&self.program);

        child
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("warning")
            .arg("-rw_timeout")
            .arg("5000000")
            .arg("-headers")
            .arg(&job.headers)
            .arg("-multiple_requests")
            .arg("1")
            .arg("-reconnect")
            .arg("1")
            .arg("-reconnect_at_eof")
            .arg("1")
            .arg("-reconnect_streamed")
            .arg("1")
            .arg("-reconnect_delay_max")
            .arg("3")
            .arg("-i")
            .arg(&job.url)
            .arg("-c")
            .arg("copy")
            .arg(&job.output)
            .kill_on_drop(true);

        child
    }
}

// Returns the exit status and whether the child was interrupted. A dropped
// sender means no interrupt will ever come.
pub async fn wait_or_interrupt(
    child: &mut Child,
    mut interrupt: watch::Receiver<bool>,
) -> std::io::Result<(ExitStatus, bool)> {
    while !*interrupt.borrow_and_update() {
        tokio::select! {
            status = child.wait() => return status.map(|s| (s, false)),
            changed = interrupt.changed() => {
                if changed.is_err() {
                    return child.wait().await.map(|s| (s, false));
                }
            }
        }
    }

    interrupt_child(child);
    child.wait().await.map(|s| (s, true))
}

#[cfg(unix)]
fn interrupt_child(child: &mut Child) {
    use nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    };

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        warn!("Could not interrupt child {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn interrupt_child(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!("Could not stop child: {}", e);
    }
}

#[async_trait]
impl Capture for FfmpegCapture {
    async fn capture(&self, job: &CaptureJob) -> i32 {
        info!("Recording to {}", job.output.display());

        let mut child = match self.command(job).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("{} not found: {}", self.program.display(), e);
                return STOP_STATUS;
            }
            Err(e) => {
                error!("Could not start {}: {}", self.program.display(), e);
                return 1;
            }
        };

        let waited = match &self.interrupt {
            Some(interrupt) => wait_or_interrupt(&mut child, interrupt.clone()).await,
            None => child.wait().await.map(|s| (s, false)),
        };

        match waited {
            Ok((status, true)) => {
                info!("Recording stopped ({})", status);
                STOP_STATUS
            }
            Ok((status, false)) => {
                debug!("{} exited with {}", self.program.display(), status);
                let code = status_from_exit(status);
                if code == STOP_STATUS {
                    warn!("{} was interrupted from outside", self.program.display());
                }
                code
            }
            Err(e) => {
                error!("Could not wait for {}: {}", self.program.display(), e);
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};

    use super::*;

    fn job() -> CaptureJob {
        CaptureJob {
            url: "https://a.example/live/x?auth=1".into(),
            output: PathBuf::from("out.mp4"),
            headers: "User-Agent: test\r\n".into(),
        }
    }

    #[test]
    fn outcome_from_status() {
        assert_eq!(CaptureOutcome::from_status(-1), CaptureOutcome::StopPermanently);
        assert_eq!(CaptureOutcome::from_status(0), CaptureOutcome::Continue);
        assert_eq!(CaptureOutcome::from_status(1), CaptureOutcome::Continue);
        assert_eq!(CaptureOutcome::from_status(-2), CaptureOutcome::Continue);
    }

    #[test]
    fn filename() {
        let now = Utc.with_ymd_and_hms(2023, 11, 4, 9, 5, 7).unwrap();
        assert_eq!(
            capture_filename(&now, 744393, "mp4"),
            "2023-11-04_090507-744393.mp4"
        );

        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        assert_eq!(
            capture_filename(&now.with_timezone(&tz), 1, "flv"),
            "2023-11-04_170507-1.flv"
        );
    }

    #[test]
    fn ffmpeg_arguments() {
        let cmd = FfmpegCapture::default().command(&job());
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-headers") + 1], "User-Agent: test\r\n");
        assert_eq!(args[pos("-i") + 1], "https://a.example/live/x?auth=1");
        assert_eq!(args[pos("-c") + 1], "copy");
        assert!(pos("-headers") < pos("-i"), "input options must precede -i");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[tokio::test]
    async fn missing_binary_stops() {
        let capture = FfmpegCapture::new("/nonexistent/ffmpeg-binary");
        assert_eq!(capture.capture(&job()).await, STOP_STATUS);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_is_passed_through() {
        // `false` ignores its arguments and exits with 1
        let capture = FfmpegCapture::new("false");
        assert_eq!(capture.capture(&job()).await, 1);

        let capture = FfmpegCapture::new("true");
        assert_eq!(capture.capture(&job()).await, 0);
    }

    #[cfg(unix)]
    #[test]
    fn interrupted_exits_stop() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(status_from_exit(ExitStatus::from_raw(0)), 0);
        assert_eq!(status_from_exit(ExitStatus::from_raw(1 << 8)), 1);
        assert_eq!(status_from_exit(ExitStatus::from_raw(255 << 8)), STOP_STATUS);
        // SIGINT
        assert_eq!(status_from_exit(ExitStatus::from_raw(2)), STOP_STATUS);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn interrupt_is_forwarded_to_child() {
        let (tx, rx) = watch::channel(false);
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        });

        let (status, interrupted) = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            wait_or_interrupt(&mut child, rx),
        )
        .await
        .expect("child outlived the interrupt")
        .unwrap();

        assert!(interrupted);
        assert_eq!(status_from_exit(status), STOP_STATUS);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn no_interrupt_waits_for_exit() {
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let (status, interrupted) = wait_or_interrupt(&mut child, rx).await.unwrap();

        assert!(!interrupted);
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn capture_stops_on_interrupt() {
        let (tx, rx) = watch::channel(false);
        let capture = FfmpegCapture::new("true").with_interrupt(rx);

        // Requested before the spawn, so the child is interrupted at once
        // and its own exit code no longer matters
        tx.send(true).unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(10), capture.capture(&job()))
            .await
            .expect("capture outlived the interrupt");
        assert_eq!(status, STOP_STATUS);
    }
}

//! Timeout guard for frame sources.
//!
//! A capture backend that hangs (compositor stalled, X server wedged) would
//! otherwise freeze the whole rotation loop. [`WatchdogSource`] runs the
//! real source on its own thread and turns an overdue grab into a capture
//! error. Results that arrive after their deadline are dropped by sequence
//! number.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use blackbox_common::error::{BlackboxError, BlackboxResult};
use blackbox_platform::CaptureRegion;

use crate::frame::RawFrame;
use crate::source::FrameSource;

enum Request {
    Capture { seq: u64, region: CaptureRegion },
    Recycle(RawFrame),
}

struct Response {
    seq: u64,
    result: BlackboxResult<RawFrame>,
}

pub struct WatchdogSource {
    name: String,
    timeout: Duration,
    requests: Sender<Request>,
    responses: Receiver<Response>,
    next_seq: u64,
    timeouts: u64,
}

impl WatchdogSource {
    /// Move `inner` onto a dedicated capture thread.
    pub fn new(inner: Box<dyn FrameSource>, timeout: Duration) -> BlackboxResult<Self> {
        let name = inner.name().to_string();
        let (requests, request_rx) = mpsc::channel::<Request>();
        let (response_tx, responses) = mpsc::channel::<Response>();

        std::thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || capture_worker(inner, request_rx, response_tx))
            .map_err(|e| BlackboxError::resource(format!("Failed to spawn capture thread: {e}")))?;

        Ok(Self {
            name,
            timeout,
            requests,
            responses,
            next_seq: 0,
            timeouts: 0,
        })
    }
}

impl Drop for WatchdogSource {
    fn drop(&mut self) {
        if self.timeouts > 0 {
            tracing::warn!(
                source = %self.name,
                timeouts = self.timeouts,
                grabs = self.next_seq,
                "Capture watchdog closed after missed deadlines"
            );
        }
    }
}

fn capture_worker(
    mut inner: Box<dyn FrameSource>,
    requests: Receiver<Request>,
    responses: Sender<Response>,
) {
    while let Ok(request) = requests.recv() {
        match request {
            Request::Capture { seq, region } => {
                let result = inner.capture(&region);
                if responses.send(Response { seq, result }).is_err() {
                    break;
                }
            }
            Request::Recycle(frame) => inner.recycle(frame),
        }
    }
    tracing::debug!(source = inner.name(), "Capture thread exiting");
}

impl FrameSource for WatchdogSource {
    fn capture(&mut self, region: &CaptureRegion) -> BlackboxResult<RawFrame> {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.requests
            .send(Request::Capture {
                seq,
                region: *region,
            })
            .map_err(|_| BlackboxError::capture("Capture thread has exited"))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) if response.seq == seq => return response.result,
                Ok(stale) => {
                    tracing::debug!(seq = stale.seq, "Discarding late frame");
                    if let Ok(frame) = stale.result {
                        self.recycle(frame);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.timeouts += 1;
                    tracing::warn!(
                        source = %self.name,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Frame grab timed out"
                    );
                    return Err(BlackboxError::capture(format!(
                        "Frame grab from {} timed out after {}ms",
                        self.name,
                        self.timeout.as_millis()
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BlackboxError::capture("Capture thread has exited"));
                }
            }
        }
    }

    fn recycle(&mut self, frame: RawFrame) {
        let _ = self.requests.send(Request::Recycle(frame));
    }

    fn name(&self) -> &str {
        &self.name
    }
}

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::mpsc;

use crate::core::{Error, ExtractedFrame, ExtractionSettings, Result};
use crate::render::sheet::{self, SheetRequest};
use crate::video::extractor;
use crate::video::ffmpeg::VideoToolRunner;

/// Work item for the background worker.
#[derive(Debug)]
pub enum WorkerJob {
    Extract {
        video: PathBuf,
        settings: ExtractionSettings,
    },
    ComposeSheet {
        frames: Vec<ExtractedFrame>,
        request: SheetRequest,
    },
}

/// Notification from the background worker.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Advisory integer percentage for the running job.
    Progress(u8),
    ExtractionFinished(Vec<ExtractedFrame>),
    SheetFinished(Vec<PathBuf>),
    JobFailed(String),
}

/// Single background worker for extraction and sheet assembly.
///
/// Jobs run one at a time on a dedicated thread; submitting while a job is
/// active is rejected rather than queued, so extraction and assembly can
/// never run concurrently against the same frame set. There is no mid-run
/// cancellation: a job runs to completion or failure.
pub struct BackgroundWorker {
    job_sender: mpsc::UnboundedSender<WorkerJob>,
    event_receiver: Arc<Mutex<mpsc::UnboundedReceiver<WorkerEvent>>>,
    busy: Arc<AtomicBool>,
}

impl BackgroundWorker {
    pub fn new(runner: Arc<dyn VideoToolRunner>) -> Self {
        let (job_sender, mut job_receiver) = mpsc::unbounded_channel::<WorkerJob>();
        let (event_sender, event_receiver) = mpsc::unbounded_channel::<WorkerEvent>();
        let busy = Arc::new(AtomicBool::new(false));

        let worker_busy = busy.clone();
        thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create async runtime");

            rt.block_on(async move {
                while let Some(job) = job_receiver.recv().await {
                    run_job(runner.as_ref(), job, &event_sender);
                    worker_busy.store(false, Ordering::SeqCst);
                }
            });
        });

        Self {
            job_sender,
            event_receiver: Arc::new(Mutex::new(event_receiver)),
            busy,
        }
    }

    /// Submit a job; fails without queueing if one is already running.
    pub fn submit(&self, job: WorkerJob) -> Result<()> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::OperationInProgress);
        }

        if self.job_sender.send(job).is_err() {
            self.busy.store(false, Ordering::SeqCst);
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "background worker has shut down",
            )));
        }
        Ok(())
    }

    /// Drain completed events without blocking.
    pub fn poll_events(&self) -> Vec<WorkerEvent> {
        let mut events = Vec::new();
        if let Ok(mut receiver) = self.event_receiver.lock() {
            while let Ok(event) = receiver.try_recv() {
                events.push(event);
            }
        }
        events
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

fn run_job(
    runner: &dyn VideoToolRunner,
    job: WorkerJob,
    events: &mpsc::UnboundedSender<WorkerEvent>,
) {
    match job {
        WorkerJob::Extract { video, settings } => {
            let _ = events.send(WorkerEvent::Progress(10));
            match extractor::extract_frames(runner, &video, &settings) {
                Ok(frames) => {
                    let _ = events.send(WorkerEvent::Progress(100));
                    let _ = events.send(WorkerEvent::ExtractionFinished(frames));
                }
                Err(e) => {
                    log::error!("Extraction failed: {e}");
                    let _ = events.send(WorkerEvent::JobFailed(e.to_string()));
                }
            }
        }
        WorkerJob::ComposeSheet { frames, request } => {
            let mut progress = |p: u8| {
                let _ = events.send(WorkerEvent::Progress(p));
            };
            match sheet::compose_sheet(&frames, &request, &mut progress) {
                Ok(paths) => {
                    let _ = events.send(WorkerEvent::SheetFinished(paths));
                }
                Err(e) => {
                    log::error!("Sheet assembly failed: {e}");
                    let _ = events.send(WorkerEvent::JobFailed(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ImageFormat;
    use crate::video::ffmpeg::ExtractRequest;
    use std::path::Path;
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    /// Fake runner whose `sample` blocks until released, so the busy window
    /// is deterministic in tests.
    struct GatedRunner {
        gate: Mutex<std_mpsc::Receiver<()>>,
        duration: f64,
        files_to_write: u32,
    }

    impl GatedRunner {
        fn new(duration: f64, files_to_write: u32) -> (Arc<Self>, std_mpsc::Sender<()>) {
            let (release, gate) = std_mpsc::channel();
            (
                Arc::new(GatedRunner {
                    gate: Mutex::new(gate),
                    duration,
                    files_to_write,
                }),
                release,
            )
        }
    }

    impl VideoToolRunner for GatedRunner {
        fn probe(&self, _video: &Path) -> Result<String> {
            Ok(format!(
                r#"{{"streams": [{{"codec_type": "video", "width": 320, "height": 240, "r_frame_rate": "30/1"}}], "format": {{"duration": "{:.3}"}}}}"#,
                self.duration
            ))
        }

        fn sample(&self, request: &ExtractRequest) -> Result<()> {
            self.gate.lock().unwrap().recv().expect("gate closed");
            let dir = request.output_pattern.parent().unwrap();
            for index in 0..self.files_to_write {
                std::fs::write(dir.join(format!("frame_{index:04}.png")), b"img")?;
            }
            Ok(())
        }
    }

    fn wait_for_events(worker: &BackgroundWorker) -> Vec<WorkerEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(worker.poll_events());
            if events.iter().any(|e| {
                matches!(
                    e,
                    WorkerEvent::ExtractionFinished(_)
                        | WorkerEvent::SheetFinished(_)
                        | WorkerEvent::JobFailed(_)
                )
            }) {
                return events;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("worker did not finish in time; events so far: {events:?}");
    }

    fn extract_job(dir: &Path) -> WorkerJob {
        let video = dir.join("input.mp4");
        std::fs::write(&video, b"container").unwrap();
        WorkerJob::Extract {
            video,
            settings: ExtractionSettings::new(
                1.0,
                dir.join("frames"),
                ImageFormat::Png,
                95,
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_reentrant_submit_rejected_while_busy() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, release) = GatedRunner::new(3.0, 4);
        let worker = BackgroundWorker::new(runner);

        worker.submit(extract_job(tmp.path())).unwrap();
        assert!(worker.is_busy());

        // The first job is parked on the gate; a second submit must fail.
        let second = worker.submit(extract_job(tmp.path()));
        assert!(matches!(second, Err(Error::OperationInProgress)));

        release.send(()).unwrap();
        let events = wait_for_events(&worker);
        let frames = events
            .iter()
            .find_map(|e| match e {
                WorkerEvent::ExtractionFinished(frames) => Some(frames),
                _ => None,
            })
            .expect("extraction should finish");
        assert_eq!(frames.len(), 4);
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_failed_job_reports_and_frees_worker() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, _release) = GatedRunner::new(3.0, 0);
        let worker = BackgroundWorker::new(runner);

        // Missing input video fails before the gated sample call.
        let job = WorkerJob::Extract {
            video: tmp.path().join("missing.mp4"),
            settings: ExtractionSettings::new(
                1.0,
                tmp.path().join("frames"),
                ImageFormat::Png,
                95,
            )
            .unwrap(),
        };
        worker.submit(job).unwrap();

        let events = wait_for_events(&worker);
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::JobFailed(msg) if msg.contains("not found"))));

        // Worker accepts new jobs after a failure.
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.is_busy() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_progress_events_reported_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (runner, release) = GatedRunner::new(2.0, 3);
        let worker = BackgroundWorker::new(runner);

        worker.submit(extract_job(tmp.path())).unwrap();
        release.send(()).unwrap();

        let events = wait_for_events(&worker);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*percents.last().unwrap(), 100);
    }
}

//! Background job execution.
//!
//! The UI thread never blocks on the network. Jobs are handed to a
//! dispatcher thread which runs each page or count job on its own
//! short-lived thread and sends the result back over an mpsc channel.
//! Completion order therefore does not follow request order; every reply
//! carries the query version it was issued under so the receiver can drop
//! stale ones.
//!
//! Image jobs share one long-lived thread. Only the newest queued image
//! request is fetched; older ones still waiting behind a slow download are
//! skipped without a reply.
//!
//! In-flight requests are never aborted. A superseded request still runs
//! to completion and its reply is simply ignored on arrival.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use log::{debug, warn};

use crate::api::{ApiError, Backend, CountRequest, Page, QueryRequest};
use crate::query::QueryVersion;

/// Longest edge of an image sent to the terminal.
const MAX_IMAGE_EDGE: u32 = 2048;

/// Work requested by the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Page {
        version: QueryVersion,
        request: QueryRequest,
    },
    Count {
        version: QueryVersion,
        request: CountRequest,
    },
    /// Download an image and re-encode it as PNG for the terminal.
    Image { object: String, url: String },
}

/// Result of a `Job`, delivered back to the UI thread.
#[derive(Debug)]
pub enum Reply {
    Page {
        version: QueryVersion,
        result: Result<Page, ApiError>,
    },
    Count {
        version: QueryVersion,
        result: Result<u64, ApiError>,
    },
    Image {
        object: String,
        result: Result<Vec<u8>, String>,
    },
}

/// Non-blocking job sink. Controllers only ever talk to this.
pub trait Transport {
    fn dispatch(&self, job: Job);
}

impl Transport for mpsc::Sender<Job> {
    fn dispatch(&self, job: Job) {
        if self.send(job).is_err() {
            warn!("worker: dispatcher gone, job dropped");
        }
    }
}

/// Handle to the dispatcher thread.
///
/// Dropping `jobs` closes the channel; the dispatcher exits once it notices.
/// Job threads that are still running finish on their own and their
/// replies go nowhere.
pub struct Worker {
    pub jobs: mpsc::Sender<Job>,
    pub replies: mpsc::Receiver<Reply>,
}

impl Worker {
    pub fn spawn(backend: Arc<dyn Backend>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (reply_tx, reply_rx) = mpsc::channel::<Reply>();
        let (image_tx, image_rx) = mpsc::channel::<Job>();

        {
            let backend = Arc::clone(&backend);
            let tx = reply_tx.clone();
            thread::spawn(move || {
                while let Ok(mut job) = image_rx.recv() {
                    while let Ok(newer) = image_rx.try_recv() {
                        if let Job::Image { object, .. } = &job {
                            debug!("worker: skipping superseded image {object}");
                        }
                        job = newer;
                    }
                    if tx.send(run_job(backend.as_ref(), job)).is_err() {
                        break;
                    }
                }
                debug!("worker: image thread exiting");
            });
        }

        thread::spawn(move || {
            debug!("worker: dispatcher started");
            while let Ok(job) = job_rx.recv() {
                if matches!(job, Job::Image { .. }) {
                    if image_tx.send(job).is_err() {
                        warn!("worker: image thread gone, job dropped");
                    }
                    continue;
                }
                let backend = Arc::clone(&backend);
                let tx = reply_tx.clone();
                thread::spawn(move || {
                    let reply = run_job(backend.as_ref(), job);
                    let _ = tx.send(reply);
                });
            }
            debug!("worker: channel closed, exiting");
        });

        Self {
            jobs: job_tx,
            replies: reply_rx,
        }
    }
}

/// Execute one job synchronously. Used by the dispatcher and by
/// non-interactive commands that want blocking semantics.
pub fn run_job(backend: &dyn Backend, job: Job) -> Reply {
    let start = Instant::now();
    match job {
        Job::Page { version, request } => {
            let result = backend.query(&request);
            debug!(
                "worker: page {version} cursor={:?} done in {:.1}ms (ok={})",
                request.cursor.as_ref().map(|c| c.0.as_str()),
                start.elapsed().as_secs_f64() * 1000.0,
                result.is_ok()
            );
            Reply::Page { version, result }
        }
        Job::Count { version, request } => {
            let result = backend.count(&request);
            debug!(
                "worker: count {version} done in {:.1}ms (ok={})",
                start.elapsed().as_secs_f64() * 1000.0,
                result.is_ok()
            );
            Reply::Count { version, result }
        }
        Job::Image { object, url } => {
            let result = backend
                .fetch_image(&url)
                .map_err(|e| e.user_message())
                .and_then(|bytes| transcode_png(&bytes));
            debug!(
                "worker: image {object} done in {:.1}ms (ok={})",
                start.elapsed().as_secs_f64() * 1000.0,
                result.is_ok()
            );
            Reply::Image { object, result }
        }
    }
}

/// Decode any supported format and re-encode as PNG (Kitty `f=100`).
fn transcode_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory(bytes).map_err(|e| format!("decode failed: {e}"))?;
    let img = if img.width() > MAX_IMAGE_EDGE || img.height() > MAX_IMAGE_EDGE {
        img.thumbnail(MAX_IMAGE_EDGE, MAX_IMAGE_EDGE)
    } else {
        img
    };
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| format!("encode failed: {e}"))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryKey, QueryMode};

    struct Fixed;

    impl Backend for Fixed {
        fn query(&self, _req: &QueryRequest) -> Result<Page, ApiError> {
            Ok(Page::default())
        }
        fn count(&self, _req: &CountRequest) -> Result<u64, ApiError> {
            Err(ApiError::Transport("down".into()))
        }
        fn fetch_image(&self, _url: &str) -> Result<Vec<u8>, ApiError> {
            Ok(b"not an image".to_vec())
        }
    }

    #[test]
    fn run_job_tags_version() {
        let key = QueryKey::new("gs://b/x", QueryMode::Percent);
        let reply = run_job(
            &Fixed,
            Job::Page {
                version: QueryVersion(7),
                request: QueryRequest::new(&key, 10, None),
            },
        );
        assert!(matches!(reply, Reply::Page { version: QueryVersion(7), result: Ok(_) }));
    }

    #[test]
    fn count_error_is_forwarded() {
        let key = QueryKey::new("gs://b/x", QueryMode::Percent);
        let reply = run_job(
            &Fixed,
            Job::Count {
                version: QueryVersion(1),
                request: CountRequest::new(&key, 10),
            },
        );
        assert!(matches!(reply, Reply::Count { result: Err(_), .. }));
    }

    #[test]
    fn undecodable_image_reports_error() {
        let reply = run_job(
            &Fixed,
            Job::Image {
                object: "a".into(),
                url: "https://x/a".into(),
            },
        );
        match reply {
            Reply::Image { object, result } => {
                assert_eq!(object, "a");
                assert!(result.unwrap_err().starts_with("decode failed"));
            }
            _ => panic!("expected image reply"),
        }
    }

    #[test]
    fn png_roundtrip_through_transcode() {
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        let png = transcode_png(buf.get_ref()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn spawned_worker_delivers_replies() {
        let worker = Worker::spawn(Arc::new(Fixed));
        let key = QueryKey::new("gs://b/x", QueryMode::Percent);
        worker.jobs.dispatch(Job::Page {
            version: QueryVersion(3),
            request: QueryRequest::new(&key, 10, None),
        });
        let reply = worker
            .replies
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert!(matches!(reply, Reply::Page { version: QueryVersion(3), .. }));
    }

    /// Fetching "a" is slow; anything queued behind it is superseded by the
    /// latest request.
    struct SlowFirst;

    impl Backend for SlowFirst {
        fn query(&self, _req: &QueryRequest) -> Result<Page, ApiError> {
            Ok(Page::default())
        }
        fn count(&self, _req: &CountRequest) -> Result<u64, ApiError> {
            Ok(0)
        }
        fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            if url.ends_with("/a") {
                thread::sleep(std::time::Duration::from_millis(300));
            }
            Ok(Vec::new())
        }
    }

    #[test]
    fn queued_images_collapse_to_newest() {
        let worker = Worker::spawn(Arc::new(SlowFirst));
        for name in ["a", "b", "c"] {
            worker.jobs.dispatch(Job::Image {
                object: name.into(),
                url: format!("https://x/{name}"),
            });
            thread::sleep(std::time::Duration::from_millis(20));
        }
        let timeout = std::time::Duration::from_secs(5);
        let mut objects = Vec::new();
        for _ in 0..2 {
            match worker.replies.recv_timeout(timeout).unwrap() {
                Reply::Image { object, .. } => objects.push(object),
                _ => panic!("expected image reply"),
            }
        }
        assert_eq!(objects, ["a", "c"]);
        assert!(worker
            .replies
            .recv_timeout(std::time::Duration::from_millis(400))
            .is_err());
    }

    #[test]
    fn page_jobs_do_not_wait_behind_images() {
        let worker = Worker::spawn(Arc::new(SlowFirst));
        worker.jobs.dispatch(Job::Image {
            object: "a".into(),
            url: "https://x/a".into(),
        });
        let key = QueryKey::new("gs://b/x", QueryMode::Percent);
        worker.jobs.dispatch(Job::Page {
            version: QueryVersion(1),
            request: QueryRequest::new(&key, 10, None),
        });
        let first = worker
            .replies
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert!(matches!(first, Reply::Page { version: QueryVersion(1), .. }));
    }
}

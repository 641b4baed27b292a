//! # Batch Generation Start Service
//!
//! Provides the `POST /api/batch/start` endpoint, which kicks off a
//! background job that renders one identity card per person record and
//! bundles everything into a downloadable archive.
//!
//! ## Workflow:
//!
//! 1.  **HTTP Request**: `process` takes no body. It resolves the currently
//!     active template and the full record set from storage and hands both
//!     to `submit` explicitly — the orchestrator never reaches back into
//!     ambient state.
//!
//! 2.  **Validation**: no active template, an undecodable background or an
//!     empty record set reject the call synchronously with a
//!     `ValidationError`; no job is created.
//!
//! 3.  **Job Scheduling**: `submit` registers a `Pending` job in the shared
//!     `JobsState`, returns `{job_id, total}` immediately, and spawns a
//!     Tokio task that runs `run_batch` on the blocking thread pool — the
//!     per-record rendering is CPU/file-IO bound and must stay off the
//!     async runtime.
//!
//! 4.  **Per-record loop**: for each record, compose the card and package
//!     it. A failing record is logged, recorded on the job, and skipped;
//!     one bad photo never aborts the batch. `processed` advances after
//!     every attempt, and a cooperative cancellation flag is checked
//!     between records.
//!
//! 5.  **Archive**: after the loop the artifacts are zipped, the archive is
//!     promoted to its durable location and the job completes. Any fatal
//!     step fails the job instead. Every terminal path removes the per-job
//!     working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use actix_web::{HttpResponse, Responder, web};
use common::jobs::BatchJob;
use common::model::record::PersonRecord;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::archive;
use crate::config;
use crate::job_controller::state::{JobPatch, JobUpdate, JobsState};
use crate::render::card::{self, RenderTemplate};
use crate::render::pdf;
use crate::storage;

/// Failure taxonomy of the batch pipeline. Only `Record` errors are
/// tolerated mid-run; everything else is terminal for its scope.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Rejected before a job exists; surfaced to the start caller as 400.
    #[error("{0}")]
    Validation(String),
    /// One record failed; the batch continues without it.
    #[error("record {record}: {message}")]
    Record { record: String, message: String },
    /// The job as a whole cannot continue.
    #[error("{0}")]
    Fatal(String),
    /// The cooperative cancellation flag was set between records.
    #[error("cancelled by operator")]
    Cancelled,
}

/// Everything the blocking worker needs, captured up front so the loop
/// never consults process-wide configuration.
pub struct BatchSettings {
    pub work_root: PathBuf,
    pub archive_root: PathBuf,
    pub fonts_dir: PathBuf,
    pub dpi: f64,
    pub pause_every: usize,
    pub pause: Duration,
}

impl BatchSettings {
    pub fn from_config() -> Self {
        BatchSettings {
            work_root: config::work_root(),
            archive_root: config::archive_root(),
            fonts_dir: config::fonts_dir(),
            dpi: config::RENDER_DPI,
            pause_every: config::pause_every(),
            pause: config::pause_duration(),
        }
    }
}

/// The Actix web handler for `POST /api/batch/start`.
pub(crate) async fn process(state: web::Data<JobsState>) -> impl Responder {
    let inputs = match prepare_inputs() {
        Ok(inputs) => inputs,
        Err(message) => return HttpResponse::BadRequest().body(message),
    };
    let (template, records) = inputs;
    match submit(&state, template, records, BatchSettings::from_config()).await {
        Ok((job_id, total)) => {
            HttpResponse::Ok().json(serde_json::json!({ "job_id": job_id, "total": total }))
        }
        Err(BatchError::Validation(message)) => HttpResponse::BadRequest().body(message),
        Err(other) => HttpResponse::InternalServerError().body(other.to_string()),
    }
}

/// Resolves the active template and the record set for this run.
fn prepare_inputs() -> Result<(RenderTemplate, Vec<PersonRecord>), String> {
    let conn = storage::open()?;
    let template = storage::templates::get_active(&conn)?
        .ok_or("no active template configured")?;
    let render_template = RenderTemplate::from_config(&template)?;
    let records = storage::records::load_all(&conn)?;
    Ok((render_template, records))
}

/// Validates the inputs, registers the job and schedules the worker.
///
/// Returns `(job_id, total)` as soon as the job exists; the caller polls
/// `/api/batch/status/{job_id}` for everything after that.
pub async fn submit(
    state: &JobsState,
    template: RenderTemplate,
    records: Vec<PersonRecord>,
    settings: BatchSettings,
) -> Result<(String, usize), BatchError> {
    if template.fields.is_empty() {
        return Err(BatchError::Validation(
            "the active template defines no fields".to_string(),
        ));
    }
    if records.is_empty() {
        return Err(BatchError::Validation(
            "no records available to process".to_string(),
        ));
    }

    let job_id = Uuid::new_v4().to_string();
    let total = records.len();
    let cancel = state.register(BatchJob::new(job_id.clone(), total)).await;
    info!("batch {job_id} accepted with {total} records");

    let tx = state.tx.clone();
    let worker_tx = tx.clone();
    let worker_job_id = job_id.clone();
    let result_job_id = job_id.clone();

    tokio::spawn(async move {
        let handle = tokio::task::spawn_blocking(move || {
            run_batch(worker_tx, &worker_job_id, template, records, cancel, settings)
        });
        let patch = match handle.await {
            Ok(Ok(archive_path)) => JobPatch::Completed { archive_path },
            Ok(Err(e)) => JobPatch::Failed {
                error: e.to_string(),
            },
            Err(e) => JobPatch::Failed {
                error: format!("task join error: {e}"),
            },
        };
        let _ = tx
            .send(JobUpdate {
                job_id: result_job_id,
                patch,
            })
            .await;
    });

    Ok((job_id, total))
}

fn send(tx: &mpsc::Sender<JobUpdate>, job_id: &str, patch: JobPatch) {
    let _ = tx.blocking_send(JobUpdate {
        job_id: job_id.to_string(),
        patch,
    });
}

/// The synchronous batch body, run via `spawn_blocking`. Creates the
/// per-job working directory, processes every record, builds the archive
/// and always cleans the working directory up, whatever the outcome.
pub fn run_batch(
    tx: mpsc::Sender<JobUpdate>,
    job_id: &str,
    template: RenderTemplate,
    records: Vec<PersonRecord>,
    cancel: Arc<AtomicBool>,
    settings: BatchSettings,
) -> Result<String, BatchError> {
    let work_dir = settings.work_root.join(job_id);
    fs::create_dir_all(&work_dir)
        .map_err(|e| BatchError::Fatal(format!("cannot create working directory: {e}")))?;

    let result = generate_and_archive(&tx, job_id, &template, &records, &cancel, &settings, &work_dir);

    // No partial temp directories are left behind on any terminal path.
    if let Err(e) = fs::remove_dir_all(&work_dir) {
        warn!("could not remove working directory for {job_id}: {e}");
    }
    result
}

fn generate_and_archive(
    tx: &mpsc::Sender<JobUpdate>,
    job_id: &str,
    template: &RenderTemplate,
    records: &[PersonRecord],
    cancel: &AtomicBool,
    settings: &BatchSettings,
    work_dir: &Path,
) -> Result<String, BatchError> {
    send(tx, job_id, JobPatch::Started);
    let total = records.len();

    for (index, record) in records.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(BatchError::Cancelled);
        }

        match render_record(template, record, work_dir, settings) {
            Ok(path) => debug!("record {} -> {}", record.uuid, path.display()),
            Err(e) => {
                let message = e.to_string();
                warn!("batch {job_id}: {message}");
                send(tx, job_id, JobPatch::RecordFailed { message });
            }
        }
        send(
            tx,
            job_id,
            JobPatch::RecordProcessed {
                processed: index + 1,
            },
        );

        // Light backpressure; a tunable, not a correctness requirement.
        if settings.pause_every > 0 && (index + 1) % settings.pause_every == 0 && index + 1 < total
        {
            thread::sleep(settings.pause);
        }
    }

    let archive_name = format!("{job_id}.zip");
    let staged = work_dir.join(&archive_name);
    let entries = archive::build_archive(work_dir, &staged)
        .map_err(|e| BatchError::Fatal(format!("archive creation failed: {e}")))?;
    send(
        tx,
        job_id,
        JobPatch::Event {
            message: format!("archive built with {entries} files"),
        },
    );

    fs::create_dir_all(&settings.archive_root)
        .map_err(|e| BatchError::Fatal(format!("cannot create archive directory: {e}")))?;
    let final_path = settings.archive_root.join(&archive_name);
    promote(&staged, &final_path)
        .map_err(|e| BatchError::Fatal(format!("cannot promote archive: {e}")))?;

    Ok(final_path.to_string_lossy().into_owned())
}

/// Renders and packages one record. Exactly one artifact lands in
/// `work_dir` on success.
fn render_record(
    template: &RenderTemplate,
    record: &PersonRecord,
    work_dir: &Path,
    settings: &BatchSettings,
) -> Result<PathBuf, BatchError> {
    let as_record_error = |message: String| BatchError::Record {
        record: record.uuid.clone(),
        message,
    };
    let card = card::compose_card(template, record, &settings.fonts_dir).map_err(as_record_error)?;
    pdf::package_card(&card, work_dir, &settings.fonts_dir, settings.dpi).map_err(as_record_error)
}

/// Moves the staged archive to its durable location; falls back to
/// copy+remove when the two live on different filesystems.
fn promote(staged: &Path, dest: &Path) -> Result<(), String> {
    if fs::rename(staged, dest).is_ok() {
        return Ok(());
    }
    fs::copy(staged, dest).map_err(|e| e.to_string())?;
    fs::remove_file(staged).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_controller::state::apply_patch;
    use common::jobs::BatchState;
    use common::model::template::{FieldConfig, FieldMap};
    use image::{Rgba, RgbaImage};
    use std::fs::File;
    use tempfile::TempDir;
    use zip::ZipArchive;

    struct Fixture {
        _dirs: Vec<TempDir>,
        settings: BatchSettings,
        template: RenderTemplate,
    }

    fn fixture() -> Fixture {
        let work = TempDir::new().unwrap();
        let archives = TempDir::new().unwrap();
        let fonts = TempDir::new().unwrap();
        let settings = BatchSettings {
            work_root: work.path().to_path_buf(),
            archive_root: archives.path().to_path_buf(),
            fonts_dir: fonts.path().to_path_buf(),
            dpi: 300.0,
            pause_every: 5,
            pause: Duration::from_millis(1),
        };

        let mut fields = FieldMap::new();
        fields.insert(
            "nombre",
            FieldConfig {
                x: Some(4),
                y: Some(4),
                font_size: Some(10.0),
                ..FieldConfig::default()
            },
        );
        fields.insert(
            "foto",
            FieldConfig {
                x: Some(30),
                y: Some(4),
                size: Some(16),
                ..FieldConfig::default()
            },
        );
        let template = RenderTemplate {
            background: RgbaImage::from_pixel(60, 40, Rgba([230, 230, 230, 255])),
            fields,
        };
        Fixture {
            _dirs: vec![work, archives, fonts],
            settings,
            template,
        }
    }

    fn records_with_one_bad_photo(photo_dir: &Path) -> Vec<PersonRecord> {
        let good = photo_dir.join("good.png");
        RgbaImage::from_pixel(8, 8, Rgba([50, 90, 130, 255]))
            .save(&good)
            .unwrap();
        let bad = photo_dir.join("bad.jpg");
        fs::write(&bad, b"this is not a jpeg").unwrap();

        (1..=10)
            .map(|i| {
                let photo = if i == 7 { &bad } else { &good };
                PersonRecord {
                    uuid: format!("00000000-0000-0000-0000-0000000000{i:02}"),
                    values: [
                        ("nombre".to_string(), format!("Persona {i}")),
                        ("cedula".to_string(), format!("10{i:06}")),
                        ("foto".to_string(), photo.to_string_lossy().into_owned()),
                    ]
                    .into_iter()
                    .collect(),
                }
            })
            .collect()
    }

    /// Drains every patch the worker sent and applies it to a fresh job,
    /// exactly as the updater task would.
    fn replay(rx: &mut mpsc::Receiver<JobUpdate>, job: &mut common::jobs::BatchJob) {
        while let Ok(update) = rx.try_recv() {
            apply_patch(job, update.patch);
        }
    }

    #[test]
    fn one_bad_record_does_not_abort_the_batch() {
        let fixture = fixture();
        let photos = TempDir::new().unwrap();
        let records = records_with_one_bad_photo(photos.path());
        let work_root = fixture.settings.work_root.clone();
        let (tx, mut rx) = mpsc::channel(100);
        let cancel = Arc::new(AtomicBool::new(false));

        let archive_path = run_batch(
            tx,
            "job-test",
            fixture.template,
            records,
            cancel,
            fixture.settings,
        )
        .expect("batch completes despite the bad record");

        let mut job = common::jobs::BatchJob::new("job-test", 10);
        replay(&mut rx, &mut job);
        apply_patch(
            &mut job,
            JobPatch::Completed {
                archive_path: archive_path.clone(),
            },
        );

        assert_eq!(job.state, BatchState::Completed);
        assert_eq!(job.processed, 10);
        assert_eq!(job.errors.len(), 1);
        assert!(job.errors[0].contains("0000000007"));

        // Nine artifacts in the archive; the working directory is gone.
        let archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 9);
        assert!(!work_root.join("job-test").exists());
    }

    #[test]
    fn cancellation_stops_between_records() {
        let fixture = fixture();
        let photos = TempDir::new().unwrap();
        let records = records_with_one_bad_photo(photos.path());
        let work_root = fixture.settings.work_root.clone();
        let (tx, _rx) = mpsc::channel(100);
        let cancel = Arc::new(AtomicBool::new(true));

        let result = run_batch(tx, "job-cancel", fixture.template, records, cancel, fixture.settings);
        assert!(matches!(result, Err(BatchError::Cancelled)));
        assert!(!work_root.join("job-cancel").exists());
    }

    #[tokio::test]
    async fn zero_records_reject_synchronously_and_create_no_job() {
        let fixture = fixture();
        let (state, _rx) = JobsState::new();
        let result = submit(&state, fixture.template, Vec::new(), fixture.settings).await;
        assert!(matches!(result, Err(BatchError::Validation(_))));
        assert!(state.jobs.read().await.is_empty());
    }

    #[tokio::test]
    async fn template_without_fields_rejects_synchronously() {
        let fixture = fixture();
        let (state, _rx) = JobsState::new();
        let template = RenderTemplate {
            background: RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])),
            fields: FieldMap::new(),
        };
        let records = vec![PersonRecord {
            uuid: "r".to_string(),
            values: Default::default(),
        }];
        let result = submit(&state, template, records, fixture.settings).await;
        assert!(matches!(result, Err(BatchError::Validation(_))));
        assert!(state.jobs.read().await.is_empty());
    }
}

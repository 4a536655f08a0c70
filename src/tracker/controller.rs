use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::broadcast::Broadcaster;
use crate::config::DetectionConfig;
use crate::db::Database;
use crate::detection::CabinInspector;
use crate::models::{DetectionResult, DetectionSubmission};

use super::state_machine::{self, DurationAdvance};

struct TrackerWorker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Drives periodic inspection of all monitored cabins and applies each
/// result through the state machine.
#[derive(Clone)]
pub struct TrackerController {
    db: Database,
    config: DetectionConfig,
    inspector: Arc<CabinInspector>,
    broadcaster: Arc<Broadcaster>,
    worker: Arc<tokio::sync::Mutex<Option<TrackerWorker>>>,
}

impl TrackerController {
    pub fn new(db: Database, broadcaster: Arc<Broadcaster>, config: DetectionConfig) -> Self {
        Self {
            inspector: Arc::new(CabinInspector::new(config.clone())),
            db,
            config,
            broadcaster,
            worker: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut guard = self.worker.lock().await;
        if guard.is_some() {
            bail!("tracker already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tracking_loop(
            self.db.clone(),
            Arc::clone(&self.inspector),
            Arc::clone(&self.broadcaster),
            self.config.clone(),
            cancel_token.clone(),
        ));

        *guard = Some(TrackerWorker {
            handle,
            cancel_token,
        });
        info!(
            "Tracker started (poll interval {}s)",
            self.config.poll_interval_secs
        );
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.cancel_token.cancel();
            worker
                .handle
                .await
                .context("tracking loop task failed to join")?;
        }
        Ok(())
    }

    /// Feed an externally computed detection through the same state-machine
    /// apply path as scheduler results, bypassing the camera pipeline.
    pub async fn process_detection(
        &self,
        cabin_no: i64,
        submission: DetectionSubmission,
    ) -> Result<()> {
        let detection = submission.into_result(Utc::now());
        apply_detection(
            &self.db,
            &self.broadcaster,
            &self.config,
            cabin_no,
            detection,
            DurationAdvance::SinceSessionStart,
        )
        .await
    }
}

async fn tracking_loop(
    db: Database,
    inspector: Arc<CabinInspector>,
    broadcaster: Arc<Broadcaster>,
    config: DetectionConfig,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    result = run_cycle(&db, &inspector, &broadcaster, &config) => {
                        if let Err(err) = result {
                            error!("Tracking cycle failed: {err:#}");
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        info!("Tracking loop shutting down mid-cycle");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Tracking loop shutting down");
                break;
            }
        }
    }
}

/// One polling cycle: inspect every monitored cabin concurrently, apply each
/// result as it lands. A failure in one cabin never aborts the others.
async fn run_cycle(
    db: &Database,
    inspector: &Arc<CabinInspector>,
    broadcaster: &Arc<Broadcaster>,
    config: &DetectionConfig,
) -> Result<()> {
    let cabins = db.list_monitored_cabins().await?;

    let monitored: HashSet<i64> = cabins.iter().map(|cabin| cabin.cabin_no).collect();
    inspector.retain_cabins(&monitored);

    let mut inspections = JoinSet::new();
    for cabin in cabins {
        let inspector = Arc::clone(inspector);
        inspections.spawn(async move {
            let result = inspector.inspect(cabin.cabin_no, &cabin.camera_url).await;
            (cabin.cabin_no, result)
        });
    }

    while let Some(joined) = inspections.join_next().await {
        let (cabin_no, inspection) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                error!("Inspection task panicked: {err}");
                continue;
            }
        };

        match inspection {
            Ok(detection) => {
                let advance = DurationAdvance::ByInterval(config.poll_interval_secs as i64);
                if let Err(err) =
                    apply_detection(db, broadcaster, config, cabin_no, detection, advance).await
                {
                    error!("Failed to apply detection for cabin {cabin_no}: {err:#}");
                }
            }
            Err(err) => {
                warn!("Inspection failed for cabin {cabin_no}, keeping previous status: {err:#}");
            }
        }
    }

    Ok(())
}

async fn apply_detection(
    db: &Database,
    broadcaster: &Arc<Broadcaster>,
    config: &DetectionConfig,
    cabin_no: i64,
    detection: DetectionResult,
    advance: DurationAdvance,
) -> Result<()> {
    let now = Utc::now();
    let config_snapshot = config.clone();
    let applied = db
        .apply_cabin_update(cabin_no, move |cabin| {
            state_machine::evaluate(cabin, &detection, now, advance, &config_snapshot)
        })
        .await?;

    match applied {
        Some(applied) => {
            if let Some(record) = &applied.closed_session {
                info!(
                    "Recorded session {} for cabin {cabin_no} ({}s)",
                    record.id, record.duration
                );
            }
            broadcaster.publish(&applied.cabin);
            Ok(())
        }
        None => {
            warn!("Cabin {cabin_no} not found, dropping detection");
            Ok(())
        }
    }
}

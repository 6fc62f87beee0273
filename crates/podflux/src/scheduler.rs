use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use podflux_core::clock::{last_interval_at, next_boundary};
use podflux_core::config::AppConfig;
use podflux_core::{pipeline, IntervalSpec};
use tracing::{error, info, warn};

/// Fires one run per wall-clock interval boundary until `shutdown` resolves. Runs execute
/// on the blocking pool one at a time; a boundary reached while a run is still going, or
/// noticed later than the misfire grace, is skipped.
pub async fn serve<F>(config: Arc<AppConfig>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let grace = Duration::seconds(config.schedule.misfire_grace_secs.min(86_400) as i64);

    info!(
        interval_minutes = config.interval.minutes,
        timezone = %config.interval.timezone,
        "scheduler started"
    );

    loop {
        let now = Utc::now();
        let fire_at = next_boundary(&now, &config.interval);
        let wait = (fire_at - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                info!("Exiting");
                return;
            }
        }

        let Some(date) = plan_run(fire_at, Utc::now(), grace, &config.interval) else {
            continue;
        };
        let job_config = Arc::clone(&config);
        let job = tokio::task::spawn_blocking(move || pipeline::run_once(&job_config, date));

        match job.await {
            Ok(Ok(report)) => info!(
                interval = %report.interval,
                delivered = report.delivered(),
                failed = report.failed(),
                "scheduled run complete"
            ),
            Ok(Err(err)) if err.is_fatal() => {
                error!(error = %err, "scheduled run aborted by a configuration error")
            }
            Ok(Err(err)) => error!(error = %err, "scheduled run failed"),
            Err(err) => error!(error = %err, "scheduled run panicked"),
        }

        let overrun = Utc::now() - fire_at;
        if overrun > config.interval.width() {
            warn!(
                overrun_secs = overrun.num_seconds(),
                "run took longer than one interval; skipped boundaries will not be replayed"
            );
        }
    }
}

/// Interval a trigger scheduled for `fire_at` reports on, or `None` when it is noticed more
/// than `grace` late and must be skipped. Boundaries passed while a run was still going land
/// here late and are skipped too, so runs never overlap or pile up.
pub fn plan_run(
    fire_at: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
    interval: &IntervalSpec,
) -> Option<DateTime<Tz>> {
    let lateness = now - fire_at;
    if lateness > grace {
        warn!(
            scheduled = %fire_at,
            late_secs = lateness.num_seconds(),
            "run missed its trigger by more than the grace period, skipping"
        );
        return None;
    }
    Some(last_interval_at(&fire_at, interval))
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

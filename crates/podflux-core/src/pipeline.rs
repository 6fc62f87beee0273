// crates/podflux-core/src/pipeline.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{error, info, info_span, warn};

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::feed::{FeedContext, FeedKind, FetchedFile};
use crate::replacement::replacement_data;
use crate::schema::validate_and_serialize;
use crate::series::{DataValidity, TimeSeries};
use crate::transport::{Connector, RemoteSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// Built from files found for the POD.
    Parsed,
    /// Full-day fallback because no usable file was available.
    Replacement,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::Parsed => f.write_str("parsed"),
            DataOrigin::Replacement => f.write_str("replacement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodOutcome {
    Delivered { file_name: String },
    ValidationFailed { error: String },
    DeliveryFailed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PodReport {
    pub pod: String,
    pub destination: String,
    pub origin: DataOrigin,
    pub rows: usize,
    pub verified_rows: usize,
    pub outcome: PodOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub interval: DateTime<Tz>,
    pub pods: Vec<PodReport>,
}

impl RunReport {
    pub fn delivered(&self) -> usize {
        self.pods
            .iter()
            .filter(|pod| matches!(pod.outcome, PodOutcome::Delivered { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.pods.len() - self.delivered()
    }

    pub fn pod(&self, id: &str) -> Option<&PodReport> {
        self.pods.iter().find(|pod| pod.pod == id)
    }
}

/// One POD's series for the run, ready for publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct PodProduction {
    pub pod: String,
    pub destination: String,
    pub origin: DataOrigin,
    pub series: TimeSeries,
}

/// Output filename for a POD: `<pod>-<YYYY-MM-DD>.json`, dated by the local run date.
pub fn document_name(pod: &str, date: &DateTime<Tz>) -> String {
    format!("{pod}-{}.json", date.date_naive().format("%Y-%m-%d"))
}

/// Runs one interval end to end: collect every POD from the source remote, then publish.
pub struct Pipeline<'a, C: Connector> {
    config: &'a AppConfig,
    connector: &'a C,
}

impl<'a, C: Connector> Pipeline<'a, C> {
    pub fn new(config: &'a AppConfig, connector: &'a C) -> Self {
        Self { config, connector }
    }

    pub fn run_once(&self, date: DateTime<Tz>) -> Result<RunReport> {
        let span = info_span!("run", interval = %date.to_rfc3339());
        let _enter = span.enter();

        info!("starting run");
        let collected = self.collect_production(&date)?;
        let pods = self.publish(&date, &collected);
        let report = RunReport {
            interval: date,
            pods,
        };
        info!(
            delivered = report.delivered(),
            failed = report.failed(),
            "run finished"
        );
        Ok(report)
    }

    /// Reads every POD directory on the source remote. The source session lives for this
    /// call only. No directories at all is fatal; anything going wrong inside one POD falls
    /// back to replacement data for that POD.
    pub fn collect_production(&self, date: &DateTime<Tz>) -> Result<Vec<PodProduction>> {
        let remote = self.config.source.remote.as_str();
        let source = self.connector.open_source(remote)?;
        let dirs = source.list_dirs()?;
        if dirs.is_empty() {
            error!(remote, "no POD directories on source remote");
            return Err(PipelineError::NoSources {
                remote: remote.to_string(),
            });
        }
        info!(remote, pods = dirs.len(), "POD directories found");

        let mut collected = Vec::with_capacity(dirs.len());
        for pod in &dirs {
            let span = info_span!("pod", pod = %pod);
            let _enter = span.enter();

            let (feed_kind, destination) = self.config.route(pod);
            let (series, origin) = match self.collect_pod(source.as_ref(), pod, feed_kind, date) {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "failed to read POD data, using replacement data");
                    let series = replacement_data(date, &self.config.interval);
                    (series, DataOrigin::Replacement)
                }
            };
            collected.push(PodProduction {
                pod: pod.clone(),
                destination: destination.to_string(),
                origin,
                series,
            });
        }

        for entry in &self.config.pods {
            if dirs.iter().any(|dir| *dir == entry.id) {
                continue;
            }
            warn!(
                pod = %entry.id,
                "registered POD has no directory on the source, using replacement data"
            );
            let (_, destination) = self.config.route(&entry.id);
            collected.push(PodProduction {
                pod: entry.id.clone(),
                destination: destination.to_string(),
                origin: DataOrigin::Replacement,
                series: replacement_data(date, &self.config.interval),
            });
        }

        Ok(collected)
    }

    fn collect_pod(
        &self,
        source: &dyn RemoteSource,
        pod: &str,
        feed_kind: &FeedKind,
        date: &DateTime<Tz>,
    ) -> Result<(TimeSeries, DataOrigin)> {
        let interval = &self.config.interval;
        let files = source.list_files(pod)?;
        if files.is_empty() {
            warn!("No files for POD, using replacement data");
            return Ok((replacement_data(date, interval), DataOrigin::Replacement));
        }

        let feed = feed_kind.feed(&self.config.formats, *interval);
        let ctx = FeedContext {
            date,
            interval,
            filename_patterns: &self.config.source.filename_patterns,
        };

        let chosen = feed.select(&files, &ctx);
        if chosen.is_empty() {
            warn!(
                feed = feed.name(),
                listed = files.len(),
                "No matching files for POD, using replacement data"
            );
            return Ok((replacement_data(date, interval), DataOrigin::Replacement));
        }

        let mut fetched = Vec::with_capacity(chosen.len());
        for entry in chosen {
            let bytes = source.read(pod, &entry.name)?;
            let text = String::from_utf8(bytes).map_err(|_| PipelineError::Encoding {
                name: entry.name.clone(),
            })?;
            fetched.push(FetchedFile { entry, text });
        }

        let (series, origin) = feed.build(&fetched, &ctx)?;
        info!(
            feed = feed.name(),
            origin = %origin,
            files = fetched.len(),
            rows = series.len(),
            verified = series.count(DataValidity::Verified),
            "POD series built"
        );
        Ok((series, origin))
    }

    /// Validates and delivers every collected series. Documents are grouped per destination
    /// so each destination gets a single session.
    pub fn publish(&self, date: &DateTime<Tz>, collected: &[PodProduction]) -> Vec<PodReport> {
        let mut reports = Vec::with_capacity(collected.len());
        let mut by_destination: BTreeMap<&str, Vec<(&PodProduction, Vec<u8>)>> = BTreeMap::new();

        for production in collected {
            match validate_and_serialize(&production.series, self.config.interval.minutes) {
                Ok(bytes) => by_destination
                    .entry(production.destination.as_str())
                    .or_default()
                    .push((production, bytes)),
                Err(err) => {
                    warn!(pod = %production.pod, error = %err, "document failed validation");
                    let outcome = PodOutcome::ValidationFailed {
                        error: err.to_string(),
                    };
                    reports.push(report(production, outcome));
                }
            }
        }

        for (destination, documents) in by_destination {
            let mut session = match self.connector.open_destination(destination) {
                Ok(session) => session,
                Err(err) => {
                    warn!(destination, error = %err, "cannot open destination");
                    for (production, _) in documents {
                        let outcome = PodOutcome::DeliveryFailed {
                            error: err.to_string(),
                        };
                        reports.push(report(production, outcome));
                    }
                    continue;
                }
            };

            for (production, bytes) in documents {
                let file_name = document_name(&production.pod, date);
                let outcome = match session.write(&file_name, &bytes) {
                    Ok(()) => {
                        info!(
                            pod = %production.pod,
                            destination,
                            file = %file_name,
                            "document delivered"
                        );
                        PodOutcome::Delivered { file_name }
                    }
                    Err(err) => {
                        warn!(
                            pod = %production.pod,
                            destination,
                            error = %err,
                            "document delivery failed"
                        );
                        PodOutcome::DeliveryFailed {
                            error: err.to_string(),
                        }
                    }
                };
                reports.push(report(production, outcome));
            }
        }

        reports.sort_by(|a, b| a.pod.cmp(&b.pod));
        reports
    }
}

fn report(production: &PodProduction, outcome: PodOutcome) -> PodReport {
    PodReport {
        pod: production.pod.clone(),
        destination: production.destination.clone(),
        origin: production.origin,
        rows: production.series.len(),
        verified_rows: production.series.count(DataValidity::Verified),
        outcome,
    }
}

/// Builds the configured connector and runs one interval.
pub fn run_once(config: &AppConfig, date: DateTime<Tz>) -> Result<RunReport> {
    let connector = crate::transport::ConfiguredConnector::new(config);
    Pipeline::new(config, &connector).run_once(date)
}

use std::collections::BTreeSet;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use podflux_parser::{
    DataloggerFormat, DataloggerParser, HubFormat, HubParser, HubSnapshot, IntervalSpec,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::aggregate::aggregate_hub_files;
use crate::config::FormatsConfig;
use crate::error::Result;
use crate::gap_filler::handle_missing_intervals;
use crate::pipeline::DataOrigin;
use crate::replacement::replacement_data;
use crate::series::TimeSeries;
use crate::transport::RemoteEntry;

const HUB_TOKEN_FORMATS: [(usize, &str); 2] = [(12, "%Y%m%d%H%M"), (14, "%Y%m%d%H%M%S")];

/// Input modality of a POD. A per-POD `format` replaces the shared `[formats.*]` record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedKind {
    Datalogger {
        #[serde(default)]
        format: Option<DataloggerFormat>,
    },
    Hub {
        #[serde(default)]
        format: Option<HubFormat>,
    },
}

impl Default for FeedKind {
    fn default() -> Self {
        FeedKind::Datalogger { format: None }
    }
}

/// Everything a feed needs to know about the run it serves.
pub struct FeedContext<'a> {
    pub date: &'a DateTime<Tz>,
    pub interval: &'a IntervalSpec,
    pub filename_patterns: &'a [String],
}

impl FeedContext<'_> {
    fn matches_date_patterns(&self, name: &str, days: &BTreeSet<NaiveDate>) -> bool {
        days.iter().any(|day| {
            self.filename_patterns.iter().any(|pattern| {
                render_pattern(pattern, *day)
                    .and_then(|rendered| glob::Pattern::new(&rendered).ok())
                    .is_some_and(|glob| glob.matches(name))
            })
        })
    }
}

/// A source file downloaded for parsing.
pub struct FetchedFile {
    pub entry: RemoteEntry,
    pub text: String,
}

/// Turns the raw files of one POD directory into a gap-free series.
pub trait Feed {
    fn name(&self) -> &'static str;

    /// Picks the files to download from a POD directory listing.
    fn select(&self, files: &[RemoteEntry], ctx: &FeedContext<'_>) -> Vec<RemoteEntry>;

    /// Builds the series and reports whether it carries parsed readings or only fallback.
    fn build(
        &self,
        files: &[FetchedFile],
        ctx: &FeedContext<'_>,
    ) -> Result<(TimeSeries, DataOrigin)>;
}

impl FeedKind {
    pub fn name(&self) -> &'static str {
        match self {
            FeedKind::Datalogger { .. } => DataloggerParser::NAME,
            FeedKind::Hub { .. } => HubParser::NAME,
        }
    }

    pub fn feed(&self, formats: &FormatsConfig, interval: IntervalSpec) -> Box<dyn Feed> {
        match self {
            FeedKind::Datalogger { format } => Box::new(DataloggerFeed {
                parser: DataloggerParser::new(
                    format.clone().unwrap_or_else(|| formats.datalogger.clone()),
                    interval,
                ),
            }),
            FeedKind::Hub { format } => Box::new(HubFeed {
                parser: HubParser::new(format.clone().unwrap_or_else(|| formats.hub.clone())),
            }),
        }
    }
}

/// Renders the date tokens of a filename pattern. `None` when the pattern holds an invalid
/// strftime directive.
pub fn render_pattern(pattern: &str, day: NaiveDate) -> Option<String> {
    let mut rendered = String::new();
    write!(rendered, "{}", day.format(pattern)).ok()?;
    Some(rendered)
}

/// One datalogger export per day; the newest wins when several match.
pub struct DataloggerFeed {
    parser: DataloggerParser,
}

impl Feed for DataloggerFeed {
    fn name(&self) -> &'static str {
        DataloggerParser::NAME
    }

    fn select(&self, files: &[RemoteEntry], ctx: &FeedContext<'_>) -> Vec<RemoteEntry> {
        let days = BTreeSet::from([ctx.interval.local_date(ctx.date)]);
        let matching: Vec<&RemoteEntry> = files
            .iter()
            .filter(|entry| ctx.matches_date_patterns(&entry.name, &days))
            .collect();

        match matching.as_slice() {
            [] => Vec::new(),
            [single] => {
                info!(file = %single.name, "found datalogger file for the run date");
                vec![(*single).clone()]
            }
            many => {
                warn!(
                    candidates = many.len(),
                    "Multiple matching files, using the one modified last"
                );
                many.iter()
                    .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
                    .map(|latest| vec![(*latest).clone()])
                    .unwrap_or_default()
            }
        }
    }

    fn build(
        &self,
        files: &[FetchedFile],
        ctx: &FeedContext<'_>,
    ) -> Result<(TimeSeries, DataOrigin)> {
        let Some(file) = files.first() else {
            return Ok((
                replacement_data(ctx.date, ctx.interval),
                DataOrigin::Replacement,
            ));
        };
        let deltas = self.parser.parse(&file.text, ctx.date)?;
        let origin = if deltas.is_placeholder() {
            DataOrigin::Replacement
        } else {
            DataOrigin::Parsed
        };
        Ok((handle_missing_intervals(&deltas, ctx.date, ctx.interval), origin))
    }
}

/// Many short hub snapshots per day, each stamped with its window end.
pub struct HubFeed {
    parser: HubParser,
}

impl HubFeed {
    /// Window-end timestamp embedded in a snapshot filename, if any.
    pub fn filename_timestamp(name: &str) -> Option<DateTime<Utc>> {
        name.split(|c: char| !c.is_ascii_digit())
            .filter_map(|run| {
                HUB_TOKEN_FORMATS
                    .iter()
                    .find(|(len, _)| *len == run.len())
                    .and_then(|(_, fmt)| NaiveDateTime::parse_from_str(run, fmt).ok())
            })
            .map(|naive| naive.and_utc())
            .next()
    }
}

impl Feed for HubFeed {
    fn name(&self) -> &'static str {
        HubParser::NAME
    }

    fn select(&self, files: &[RemoteEntry], ctx: &FeedContext<'_>) -> Vec<RemoteEntry> {
        let window_start = ctx.interval.local_midnight(ctx.date);
        let window_end = ctx.date.with_timezone(&Utc) + ctx.interval.width();
        let days = BTreeSet::from([
            ctx.interval.local_date(ctx.date),
            window_start.date_naive(),
            window_end.date_naive(),
        ]);

        let selected: Vec<RemoteEntry> = files
            .iter()
            .filter(|entry| ctx.matches_date_patterns(&entry.name, &days))
            .filter(|entry| {
                Self::filename_timestamp(&entry.name)
                    .is_some_and(|ts| ts > window_start && ts <= window_end)
            })
            .cloned()
            .collect();

        info!(
            listed = files.len(),
            selected = selected.len(),
            "hub snapshots selected for the reporting day"
        );
        selected
    }

    fn build(
        &self,
        files: &[FetchedFile],
        ctx: &FeedContext<'_>,
    ) -> Result<(TimeSeries, DataOrigin)> {
        let snapshots: Vec<HubSnapshot> = files
            .iter()
            .map(|file| match self.parser.parse(&file.text) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(file = %file.entry.name, error = %err, "invalid hub snapshot ignored");
                    HubSnapshot::default()
                }
            })
            .collect();

        let origin = if snapshots.iter().all(HubSnapshot::is_empty) {
            DataOrigin::Replacement
        } else {
            DataOrigin::Parsed
        };
        let series = aggregate_hub_files(&self.parser, &snapshots, ctx.date, ctx.interval)?;
        Ok((series, origin))
    }
}

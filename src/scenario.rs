//! TOML scenario files: a small block network, the trains already running on
//! it and the request to insert.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Timelike};
use log::info;
use serde::{Deserialize, Deserializer};
use stdcm_core::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid scenario: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid occupancy file: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid time '{0}', expected HH:MM:SS or seconds")]
    InvalidTime(String),
    #[error("Unknown block '{0}'")]
    UnknownBlock(String),
    #[error(transparent)]
    Stdcm(#[from] stdcm_core::Error),
}

/// Seconds since midnight, written `HH:MM:SS`, `HH:MM` or as a number
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTime(pub Time);

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Seconds(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Self(seconds)),
            Raw::Text(text) => parse_clock_time(&text)
                .map(Self)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Parse time string in HH:MM:SS or HH:MM format to seconds since midnight
pub fn parse_clock_time(text: &str) -> Result<Time, ScenarioError> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map(|time| f64::from(time.num_seconds_from_midnight()))
        .map_err(|_| ScenarioError::InvalidTime(text.to_string()))
}

/// `HH:MM:SS`, with a `+Nd` suffix past midnight
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_clock_time(time: Time) -> String {
    let seconds = time.max(0.0).round() as u32;
    let days = seconds / 86_400;
    let clock = NaiveTime::from_num_seconds_from_midnight_opt(seconds % 86_400, 0)
        .map(|clock| clock.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    if days == 0 {
        clock
    } else {
        format!("{clock}+{days}d")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockSpec {
    pub name: String,
    /// Entry detector name
    pub entry: String,
    /// Exit detector name
    pub exit: String,
    pub length: Distance,
    #[serde(default)]
    pub speed_limits: Vec<SpeedSection>,
    #[serde(default)]
    pub tagged_speed_limits: Vec<TaggedSpeedLimits>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggedSpeedLimits {
    pub tag: String,
    pub speed_limits: Vec<SpeedSection>,
}

/// One row of the occupancy CSV file, or one inline entry
#[derive(Debug, Clone, Deserialize)]
pub struct OccupancyRecord {
    pub block: String,
    pub start: ClockTime,
    pub end: ClockTime,
    #[serde(default)]
    pub train: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OccupancySpec {
    /// CSV file with `block,start,end,train` columns, relative to the scenario
    pub file: Option<PathBuf>,
    pub margin_before: Time,
    pub margin_after: Time,
    pub entries: Vec<OccupancyRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationSpec {
    pub block: String,
    #[serde(default)]
    pub offset: Distance,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WindowSpec {
    pub start: ClockTime,
    pub end: ClockTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    pub locations: Vec<LocationSpec>,
    #[serde(default)]
    pub stop_duration: Option<Time>,
    #[serde(default)]
    pub time_window: Option<WindowSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestSpec {
    pub rolling_stock: RollingStock,
    #[serde(default)]
    pub comfort: Comfort,
    #[serde(default)]
    pub time_step: Option<Time>,
    pub start_time: ClockTime,
    pub max_run_time: Time,
    #[serde(default)]
    pub max_departure_delay: Option<Time>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub standard_allowance: Option<AllowanceValue>,
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub occupancy: OccupancySpec,
    pub request: RequestSpec,
    #[serde(default)]
    pub config: StdcmConfig,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

/// Everything needed to run one search
pub struct Problem {
    pub name: String,
    pub infra: InMemoryInfra,
    pub occupancies: OccupancyTable,
    pub request: StdcmRequest,
    pub config: StdcmConfig,
}

impl Problem {
    /// # Errors
    ///
    /// Forwards the errors of [`find_stdcm_path`].
    pub fn solve(&self) -> Result<Option<StdcmPath>, stdcm_core::Error> {
        find_stdcm_path(
            &self.infra,
            &self.occupancies,
            &MaxEffortSimulator,
            &self.request,
            &self.config,
        )
    }
}

/// Reads a scenario file
///
/// # Errors
///
/// Fails when the file cannot be read or is not a valid scenario.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let text = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut scenario: Scenario = toml::from_str(&text)?;
    scenario.base_dir = path.parent().map(Path::to_path_buf);
    if scenario.name.is_none() {
        scenario.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }
    Ok(scenario)
}

/// Reads occupancies from a CSV file with a header row
///
/// # Errors
///
/// Fails on I/O errors and malformed rows.
pub fn read_occupancy_csv(path: &Path) -> Result<Vec<OccupancyRecord>, ScenarioError> {
    let file = File::open(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    csv::Reader::from_reader(file)
        .deserialize()
        .collect::<Result<Vec<OccupancyRecord>, csv::Error>>()
        .map_err(ScenarioError::from)
}

impl Scenario {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("scenario")
    }

    /// Resolves names and builds the network, the timetable and the request
    ///
    /// # Errors
    ///
    /// Fails on unknown block names and unreadable occupancy files.
    pub fn build(&self) -> Result<Problem, ScenarioError> {
        let infra = self.build_infra();
        let block = |name: &str| {
            infra
                .find_block(name)
                .ok_or_else(|| ScenarioError::UnknownBlock(name.to_string()))
        };

        let mut records = self.occupancy.entries.clone();
        if let Some(file) = &self.occupancy.file {
            let path = match &self.base_dir {
                Some(base_dir) => base_dir.join(file),
                None => file.clone(),
            };
            records.extend(read_occupancy_csv(&path)?);
        }
        let mut occupancies = OccupancyTable::new()
            .with_margins(self.occupancy.margin_before, self.occupancy.margin_after);
        for record in records {
            occupancies.add(
                block(&record.block)?,
                record.start.0,
                record.end.0,
                record.train,
            );
        }

        let spec = &self.request;
        let steps = spec
            .steps
            .iter()
            .map(|step| {
                let locations = step
                    .locations
                    .iter()
                    .map(|location| {
                        Ok(StepLocation {
                            block: block(&location.block)?,
                            offset: location.offset,
                        })
                    })
                    .collect::<Result<Vec<_>, ScenarioError>>()?;
                Ok(StdcmStep {
                    locations,
                    stop_duration: step.stop_duration,
                    time_window: step.time_window.map(|window| TimeWindow {
                        start: window.start.0,
                        end: window.end.0,
                    }),
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        let mut request = StdcmRequest::new(
            spec.rolling_stock.clone(),
            steps,
            spec.start_time.0,
            spec.max_run_time,
        );
        request.comfort = spec.comfort;
        if let Some(time_step) = spec.time_step {
            request.time_step = time_step;
        }
        request.max_departure_delay = spec.max_departure_delay;
        request.tag.clone_from(&spec.tag);
        request.standard_allowance = spec.standard_allowance;

        info!(
            "Scenario '{}': {} blocks, {} occupancies, {} steps",
            self.name(),
            infra.block_count(),
            occupancies.len(),
            request.steps.len()
        );

        Ok(Problem {
            name: self.name().to_string(),
            infra,
            occupancies,
            request,
            config: self.config.clone(),
        })
    }

    fn build_infra(&self) -> InMemoryInfra {
        let mut builder = InfraBuilder::new();
        for spec in &self.blocks {
            let entry = builder.add_detector(&spec.entry);
            let exit = builder.add_detector(&spec.exit);
            let block = builder.add_block(
                &spec.name,
                entry,
                exit,
                spec.length,
                spec.speed_limits.clone(),
            );
            for tagged in &spec.tagged_speed_limits {
                builder.add_tagged_speed_limits(block, &tagged.tag, tagged.speed_limits.clone());
            }
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name = "two blocks"

[[blocks]]
name = "b0"
entry = "d0"
exit = "d1"
length = 2000.0
speed_limits = [{ start = 0.0, end = 2000.0, speed = 40.0 }]

[[blocks]]
name = "b1"
entry = "d1"
exit = "d2"
length = 2000.0
speed_limits = [{ start = 0.0, end = 2000.0, speed = 40.0 }]
tagged_speed_limits = [
    { tag = "freight", speed_limits = [{ start = 0.0, end = 2000.0, speed = 20.0 }] },
]

[occupancy]
margin_before = 5.0
entries = [{ block = "b1", start = "08:01:40", end = "08:02:40", train = "IC 12" }]

[request]
start_time = "08:00:00"
max_run_time = 3600.0
standard_allowance = { kind = "percentage", value = 5.0 }

[request.rolling_stock]
name = "regional"
max_speed = 40.0
acceleration = 0.5
deceleration = 0.5

[[request.steps]]
locations = [{ block = "b0" }]

[[request.steps]]
locations = [{ block = "b1", offset = 2000.0 }]
time_window = { start = "08:00", end = "09:00" }

[config]
max_backtracking_depth = 4
"#;

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("08:01:40").expect("valid"), 28_900.0);
        assert_eq!(parse_clock_time(" 00:10 ").expect("valid"), 600.0);
        assert!(matches!(
            parse_clock_time("8h10"),
            Err(ScenarioError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_format_clock_time() {
        assert_eq!(format_clock_time(28_900.0), "08:01:40");
        assert_eq!(format_clock_time(86_400.0 + 61.0), "00:01:01+1d");
    }

    #[test]
    fn test_build_scenario() {
        let scenario: Scenario = toml::from_str(SCENARIO).expect("valid scenario");
        let problem = scenario.build().expect("valid names");

        assert_eq!(problem.name, "two blocks");
        assert_eq!(problem.infra.block_count(), 2);
        assert_eq!(problem.infra.detector_count(), 3);
        assert_eq!(problem.occupancies.len(), 1);
        assert_eq!(problem.occupancies.occupancies(1)[0].start, 28_900.0);
        assert_eq!(problem.request.min_schedule_time_start, 28_800.0);
        assert_eq!(problem.request.steps[0].locations[0].offset, 0.0);
        assert_eq!(
            problem.request.steps[1].time_window,
            Some(TimeWindow {
                start: 28_800.0,
                end: 32_400.0
            })
        );
        assert_eq!(problem.config.max_backtracking_depth, 4);
        assert_eq!(problem.config.max_delay_openings, 8);
        assert_eq!(
            problem.infra.speed_limits(1, Some("freight"))[0].speed,
            20.0
        );
    }

    #[test]
    fn test_solve_scenario() {
        let scenario: Scenario = toml::from_str(SCENARIO).expect("valid scenario");
        let path = scenario
            .build()
            .expect("valid names")
            .solve()
            .expect("valid request")
            .expect("a path exists");

        // The second block is busy until 08:02:40 plus the margin
        assert!(path.sections[1].begin_time >= 28_965.0 - 1e-6);
        assert!(path.departure_time > 28_800.0);
    }

    #[test]
    fn test_unknown_block() {
        let text = SCENARIO.replace(r#"block = "b1", offset"#, r#"block = "b9", offset"#);
        let scenario: Scenario = toml::from_str(&text).expect("valid scenario");
        assert!(matches!(
            scenario.build(),
            Err(ScenarioError::UnknownBlock(name)) if name == "b9"
        ));
    }

    #[test]
    fn test_occupancy_csv() {
        let csv = "block,start,end,train\nb0,08:00:00,08:05:00,RE 1\nb1,29000,29060,\n";
        let records: Vec<OccupancyRecord> = csv::Reader::from_reader(csv.as_bytes())
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("valid csv");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].start, ClockTime(28_800.0));
        assert_eq!(records[0].train.as_deref(), Some("RE 1"));
        assert_eq!(records[1].end, ClockTime(29_060.0));
        assert_eq!(records[1].train, None);
    }
}

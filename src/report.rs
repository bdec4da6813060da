use std::fmt::Display;
use std::path::Path;

use serde::Serialize;
use stdcm_core::POSITION_EPSILON;
use stdcm_core::prelude::*;

use crate::scenario::{ScenarioError, format_clock_time, load_scenario};

/// Outcome of one scenario, printed as JSON
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Report {
    Found {
        scenario: String,
        departure: String,
        arrival: String,
        /// Names of the blocks used, in travel order
        blocks: Vec<String>,
        /// Names of the detectors passed, from the origin block entry on
        route: Vec<String>,
        path: StdcmPath,
    },
    NoPath {
        scenario: String,
    },
    Error {
        scenario: String,
        message: String,
    },
}

impl Report {
    /// Reports a found path, with names looked up in `infra`
    pub fn found(scenario: String, infra: &InMemoryInfra, path: StdcmPath) -> Self {
        let name =
            |name: Option<&str>, id: usize| name.map_or_else(|| id.to_string(), str::to_string);
        let blocks = path
            .blocks()
            .map(|block| name(infra.block_name(block), block))
            .collect();

        let mut route = Vec::new();
        if let Some(first) = path.sections.first() {
            let entry = infra.block_entry(first.block);
            route.push(name(infra.detector_name(entry), entry));
        }
        for section in &path.sections {
            if section.end_offset >= infra.block_length(section.block) - POSITION_EPSILON {
                let exit = infra.block_exit(section.block);
                route.push(name(infra.detector_name(exit), exit));
            }
        }

        Self::Found {
            scenario,
            departure: format_clock_time(path.departure_time),
            arrival: format_clock_time(path.arrival_time),
            blocks,
            route,
            path,
        }
    }

    pub fn failed(scenario: String, error: &dyn Display) -> Self {
        Self::Error {
            scenario,
            message: error.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// # Errors
    ///
    /// Only fails if the report cannot be serialized.
    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Loads, builds and solves one scenario file
pub fn run_scenario(path: &Path) -> Report {
    let scenario = match load_scenario(path) {
        Ok(scenario) => scenario,
        Err(error) => return Report::failed(path.display().to_string(), &error),
    };
    let name = scenario.name().to_string();
    let problem = match scenario.build() {
        Ok(problem) => problem,
        Err(error) => return Report::failed(name, &error),
    };

    match problem.solve() {
        Ok(Some(path)) => Report::found(name, &problem.infra, path),
        Ok(None) => Report::NoPath { scenario: name },
        Err(error) => Report::failed(name, &ScenarioError::from(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json() {
        let report = Report::NoPath {
            scenario: "empty".to_string(),
        };
        let json = report.to_json(false).expect("serializable");
        assert_eq!(json, r#"{"status":"no_path","scenario":"empty"}"#);

        let report = Report::failed(
            "broken".to_string(),
            &ScenarioError::UnknownBlock("b9".to_string()),
        );
        assert!(report.is_error());
        let value: serde_json::Value =
            serde_json::from_str(&report.to_json(true).expect("serializable")).expect("json");
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "Unknown block 'b9'");
    }

    #[test]
    fn test_demo_scenario() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/junction.toml");
        match run_scenario(&path) {
            Report::Found {
                scenario,
                blocks,
                route,
                path,
                ..
            } => {
                assert_eq!(scenario, "junction");
                assert_eq!(blocks.first().map(String::as_str), Some("a"));
                assert_eq!(route.first().map(String::as_str), Some("d0"));
                assert_eq!(route.last().map(String::as_str), Some("d3"));
                assert_eq!(route.len(), blocks.len() + 1);
                assert!(path.departure_time >= 27_000.0 - 1e-6);
                assert_eq!(path.sections.first().map(|s| s.block), Some(0));
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let report = run_scenario(Path::new("does/not/exist.toml"));
        assert!(report.is_error());
    }
}

use std::io::{self, Write};

use serde::Serialize;

use crate::index::Resolution;
use crate::pipeline::{PipelineConfig, PipelineOutput, RunMetrics};

/// Matrix statistics at one resolution
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSummary {
    pub resolution: Resolution,
    pub bins: u64,
    pub nnz: usize,
    pub contacts: u64,
}

/// Everything known about a finished run, written as `metrics.json`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub version: String,
    pub created_at: String,
    pub input: String,
    pub config: PipelineConfig,
    pub metrics: RunMetrics,
    pub valid_fraction: f64,
    pub resolutions: Vec<ResolutionSummary>,
}

impl MetricsReport {
    pub fn new(input: &str, config: &PipelineConfig, output: &PipelineOutput) -> Self {
        let resolutions = output
            .matrices
            .iter()
            .map(|m| ResolutionSummary {
                resolution: m.resolution(),
                bins: m.size(),
                nnz: m.nnz(),
                contacts: m.total(),
            })
            .collect();

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            input: input.to_string(),
            config: config.clone(),
            metrics: output.metrics.clone(),
            valid_fraction: output.metrics.valid_fraction(),
            resolutions,
        }
    }

    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        writeln!(out, "{json}")?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventType;
    use crate::pipeline::ContactMatrix;

    #[test]
    fn test_report_json() {
        let mut metrics = RunMetrics::new();
        metrics.record_valid(true);
        metrics.record(EventType::DanglingEnd);
        let mut matrix = ContactMatrix::new(Resolution::Width(1000), 10);
        matrix.increment(3, 1);
        let output = PipelineOutput {
            metrics,
            matrices: vec![matrix],
        };

        let report = MetricsReport::new("in.pairs", &PipelineConfig::default(), &output);
        let mut out = Vec::new();
        report.write_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["input"], "in.pairs");
        assert_eq!(value["metrics"]["total"], 2);
        assert_eq!(value["metrics"]["events"]["DANGLING_END"], 1);
        assert_eq!(value["valid_fraction"], 0.5);
        assert_eq!(value["resolutions"][0]["resolution"], "1kb");
        assert_eq!(value["resolutions"][0]["nnz"], 1);
        assert_eq!(value["config"]["classifier"]["min_mapq"], 30);
    }
}

//! Typed completion payloads. Every entry list is validated as a whole before
//! it replaces the stored rows.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::WorkflowKind;
use crate::error::{CoreError, CoreResult};

/// One gas/test result row recorded on a calibration certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub parameter: String,
    pub reference_value: String,
    pub reading: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLine {
    pub part_name: String,
    pub quantity: i32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub summary: String,
    #[serde(default)]
    pub parts: Vec<PartLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub findings: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub parts: Vec<PartLine>,
}

/// Inputs required by a COMPLETED transition, tagged by workflow kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CompletionInput {
    Calibration {
        calibration_date: Option<NaiveDate>,
        valid_until: Option<NaiveDate>,
        #[serde(default)]
        results: Vec<Measurement>,
    },
    Rental {
        #[serde(default)]
        return_date: Option<NaiveDateTime>,
    },
    Maintenance {
        #[serde(default)]
        service_report: Option<ServiceReport>,
        #[serde(default)]
        technical_report: Option<TechnicalReport>,
    },
}

impl CompletionInput {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            CompletionInput::Calibration { .. } => WorkflowKind::Calibration,
            CompletionInput::Rental { .. } => WorkflowKind::Rental,
            CompletionInput::Maintenance { .. } => WorkflowKind::Maintenance,
        }
    }
}

pub fn validate_measurements(rows: &[Measurement]) -> CoreResult<()> {
    for (index, row) in rows.iter().enumerate() {
        if row.parameter.trim().is_empty() {
            return Err(CoreError::validation(format!(
                "result row {} has an empty parameter",
                index + 1
            )));
        }
        if row.reading.trim().is_empty() {
            return Err(CoreError::validation(format!(
                "result row {} has an empty reading",
                index + 1
            )));
        }
    }
    Ok(())
}

pub fn validate_parts(rows: &[PartLine]) -> CoreResult<()> {
    for (index, row) in rows.iter().enumerate() {
        if row.part_name.trim().is_empty() {
            return Err(CoreError::validation(format!(
                "part line {} has an empty name",
                index + 1
            )));
        }
        if row.quantity <= 0 {
            return Err(CoreError::validation(format!(
                "part line {} must have a positive quantity",
                index + 1
            )));
        }
    }
    Ok(())
}

impl ServiceReport {
    pub fn validate(&self) -> CoreResult<()> {
        if self.summary.trim().is_empty() {
            return Err(CoreError::validation("service report summary is required"));
        }
        validate_parts(&self.parts)
    }
}

impl TechnicalReport {
    pub fn validate(&self) -> CoreResult<()> {
        if self.findings.trim().is_empty() {
            return Err(CoreError::validation("technical report findings are required"));
        }
        validate_parts(&self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, quantity: i32) -> PartLine {
        PartLine {
            part_name: name.to_string(),
            quantity,
            notes: None,
        }
    }

    #[test]
    fn rejects_non_positive_part_quantities() {
        let err = validate_parts(&[part("sensor", 1), part("filter", 0)]).unwrap_err();
        assert_eq!(
            err,
            CoreError::validation("part line 2 must have a positive quantity")
        );
    }

    #[test]
    fn rejects_blank_measurement_readings() {
        let rows = vec![Measurement {
            parameter: "CO".to_string(),
            reference_value: "50 ppm".to_string(),
            reading: "  ".to_string(),
            unit: None,
            passed: None,
        }];
        assert!(validate_measurements(&rows).is_err());
    }

    #[test]
    fn completion_input_is_tagged_by_kind() {
        let input: CompletionInput = serde_json::from_value(serde_json::json!({
            "kind": "calibration",
            "calibration_date": "2025-01-10",
            "valid_until": "2025-07-10"
        }))
        .unwrap();
        assert_eq!(input.kind(), WorkflowKind::Calibration);
        match input {
            CompletionInput::Calibration { results, .. } => assert!(results.is_empty()),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}

//! Contents of certificates and reports. Numbers are minted by
//! [`crate::numbering`]; this module only shapes what goes inside them.

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::domain::{
    DocumentType, IssuedDocument, Measurement, ServiceReport, ServiceRequest, TechnicalReport,
    WorkflowKind,
};
use crate::error::{CoreError, CoreResult};
use crate::store::Tx;

pub fn certificate(request: &ServiceRequest, results: &[Measurement]) -> Value {
    json!({
        "request_id": request.id,
        "item_serial": request.item_serial,
        "calibration_date": request.calibration_date,
        "valid_until": request.valid_until,
        "results": results,
    })
}

pub fn service_report(request: &ServiceRequest, report: &ServiceReport) -> Value {
    json!({
        "request_id": request.id,
        "item_serial": request.item_serial,
        "summary": report.summary,
        "parts": report.parts,
    })
}

pub fn technical_report(request: &ServiceRequest, report: &TechnicalReport) -> Value {
    json!({
        "request_id": request.id,
        "item_serial": request.item_serial,
        "findings": report.findings,
        "recommendation": report.recommendation,
        "parts": report.parts,
    })
}

pub fn belongs_to(doc_type: DocumentType, kind: WorkflowKind) -> bool {
    matches!(
        (doc_type, kind),
        (DocumentType::Certificate, WorkflowKind::Calibration)
            | (DocumentType::ServiceReport, WorkflowKind::Maintenance)
            | (DocumentType::TechnicalReport, WorkflowKind::Maintenance)
    )
}

fn text_field(content: &Value, field: &str) -> Option<String> {
    content.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Rebuilds the content of `existing` from the rows currently stored for the
/// request. Report prose lives only in the document, so it is carried over.
pub fn rebuild(
    tx: &mut dyn Tx,
    request: &ServiceRequest,
    existing: &IssuedDocument,
) -> CoreResult<Value> {
    match existing.doc_type {
        DocumentType::Certificate => {
            let results = tx.measurements(request.id)?;
            Ok(certificate(request, &results))
        }
        DocumentType::ServiceReport => {
            let report = ServiceReport {
                summary: text_field(&existing.content, "summary").unwrap_or_default(),
                parts: tx.parts(request.id, DocumentType::ServiceReport)?,
            };
            Ok(service_report(request, &report))
        }
        DocumentType::TechnicalReport => {
            let report = TechnicalReport {
                findings: text_field(&existing.content, "findings").unwrap_or_default(),
                recommendation: text_field(&existing.content, "recommendation"),
                parts: tx.parts(request.id, DocumentType::TechnicalReport)?,
            };
            Ok(technical_report(request, &report))
        }
    }
}

/// Date whose period a (re)minted number belongs to.
pub fn reference_date(request: &ServiceRequest, existing: &IssuedDocument) -> CoreResult<NaiveDate> {
    match existing.doc_type {
        DocumentType::Certificate => request.calibration_date.ok_or_else(|| {
            CoreError::validation("calibration request has no calibration date")
        }),
        DocumentType::ServiceReport | DocumentType::TechnicalReport => {
            Ok(existing.issued_at.date())
        }
    }
}

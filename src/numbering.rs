//! Sequential document numbers of the form `{n}/{TYPE-CODE}/{ROMAN MONTH}/{YEAR}`.
//!
//! Numbers come from a per-(type, period) counter that the store increments
//! atomically, so two completions in the same period can never be handed the
//! same value. Once issued, a number is never changed by regeneration.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::domain::{DocumentType, IssuedDocument};
use crate::error::{CoreError, CoreResult};
use crate::store::Tx;

const ROMAN_MONTHS: [&str; 12] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceScope {
    Yearly,
    Monthly,
}

impl DocumentType {
    pub fn scope(&self) -> SequenceScope {
        match self {
            DocumentType::Certificate => SequenceScope::Yearly,
            DocumentType::ServiceReport | DocumentType::TechnicalReport => SequenceScope::Monthly,
        }
    }
}

pub fn roman_month(month: u32) -> CoreResult<&'static str> {
    month
        .checked_sub(1)
        .and_then(|index| ROMAN_MONTHS.get(index as usize))
        .copied()
        .ok_or_else(|| CoreError::validation(format!("month {month} out of range")))
}

/// Counter key for the period containing `reference`.
pub fn period_key(scope: SequenceScope, reference: NaiveDate) -> String {
    match scope {
        SequenceScope::Yearly => format!("{:04}", reference.year()),
        SequenceScope::Monthly => format!("{:04}-{:02}", reference.year(), reference.month()),
    }
}

/// Half-open `[start, end)` range of the period containing `reference`. Used
/// by the tests that replay count-then-format numbering against the counter.
#[cfg(test)]
fn period_bounds(
    scope: SequenceScope,
    reference: NaiveDate,
) -> CoreResult<(NaiveDateTime, NaiveDateTime)> {
    let invalid = || CoreError::validation(format!("no period for {reference}"));
    let (start, end) = match scope {
        SequenceScope::Yearly => (
            NaiveDate::from_ymd_opt(reference.year(), 1, 1),
            NaiveDate::from_ymd_opt(reference.year() + 1, 1, 1),
        ),
        SequenceScope::Monthly => {
            let (next_year, next_month) = if reference.month() == 12 {
                (reference.year() + 1, 1)
            } else {
                (reference.year(), reference.month() + 1)
            };
            (
                NaiveDate::from_ymd_opt(reference.year(), reference.month(), 1),
                NaiveDate::from_ymd_opt(next_year, next_month, 1),
            )
        }
    };
    let start = start.and_then(|d| d.and_hms_opt(0, 0, 0)).ok_or_else(invalid)?;
    let end = end.and_then(|d| d.and_hms_opt(0, 0, 0)).ok_or_else(invalid)?;
    Ok((start, end))
}

pub fn format_number(
    sequence: i64,
    doc_type: DocumentType,
    reference: NaiveDate,
) -> CoreResult<String> {
    Ok(format!(
        "{sequence}/{}/{}/{}",
        doc_type.as_str(),
        roman_month(reference.month())?,
        reference.year()
    ))
}

/// Mints the next number for `doc_type` in the period of `reference`.
pub fn next_number(
    tx: &mut dyn Tx,
    doc_type: DocumentType,
    reference: NaiveDate,
) -> CoreResult<String> {
    let period = period_key(doc_type.scope(), reference);
    let sequence = tx.next_sequence(doc_type, &period)?;
    format_number(sequence, doc_type, reference)
}

/// Issues the document for `request_id` unless one exists already, in which
/// case only its content is refreshed and the original number kept.
pub fn issue_document(
    tx: &mut dyn Tx,
    request_id: Uuid,
    doc_type: DocumentType,
    reference: NaiveDate,
    content: Value,
    now: NaiveDateTime,
) -> CoreResult<IssuedDocument> {
    if let Some(mut existing) = tx.find_document(request_id, doc_type)? {
        tx.update_document_content(existing.id, &content, now)?;
        existing.content = content;
        existing.regenerated_at = Some(now);
        return Ok(existing);
    }

    let document = IssuedDocument {
        id: Uuid::new_v4(),
        request_id,
        doc_type,
        number: next_number(tx, doc_type, reference)?,
        content,
        issued_at: now,
        regenerated_at: None,
    };
    tx.insert_document(&document)?;
    info!(
        request_id = %request_id,
        doc_type = %doc_type,
        number = %document.number,
        "issued document number"
    );
    Ok(document)
}

/// Regenerates an issued document. With `recreate` the old number is retired
/// and a fresh one minted; otherwise the number is preserved.
pub fn regenerate_document(
    tx: &mut dyn Tx,
    request_id: Uuid,
    doc_type: DocumentType,
    reference: NaiveDate,
    content: Value,
    recreate: bool,
    now: NaiveDateTime,
) -> CoreResult<IssuedDocument> {
    let existing = tx.find_document(request_id, doc_type)?.ok_or_else(|| {
        CoreError::not_found(format!("{doc_type} document for request {request_id}"))
    })?;
    if recreate {
        tx.delete_document(existing.id)?;
    }
    issue_document(tx, request_id, doc_type, reference, content, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{run_in_transaction, MemoryStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn noon(day: NaiveDate) -> NaiveDateTime {
        day.and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn converts_months_to_roman_numerals() {
        assert_eq!(roman_month(1).unwrap(), "I");
        assert_eq!(roman_month(4).unwrap(), "IV");
        assert_eq!(roman_month(9).unwrap(), "IX");
        assert_eq!(roman_month(12).unwrap(), "XII");
        assert!(roman_month(0).is_err());
        assert!(roman_month(13).is_err());
    }

    #[test]
    fn first_certificate_of_january_2025() {
        let store = MemoryStore::new();
        let number = run_in_transaction(&store, |tx| {
            next_number(tx, DocumentType::Certificate, date(2025, 1, 10))
        })
        .unwrap();
        assert_eq!(number, "1/CAL-PBI/I/2025");
    }

    #[test]
    fn sequential_numbers_increase_without_duplicates() {
        let store = MemoryStore::new();
        let mut numbers = Vec::new();
        for day in 1..=5 {
            let number = run_in_transaction(&store, |tx| {
                next_number(tx, DocumentType::Certificate, date(2025, 3, day))
            })
            .unwrap();
            numbers.push(number);
        }
        assert_eq!(
            numbers,
            vec![
                "1/CAL-PBI/III/2025",
                "2/CAL-PBI/III/2025",
                "3/CAL-PBI/III/2025",
                "4/CAL-PBI/III/2025",
                "5/CAL-PBI/III/2025",
            ]
        );
    }

    #[test]
    fn yearly_scope_continues_across_months_and_resets_per_year() {
        let store = MemoryStore::new();
        let mint = |reference| {
            run_in_transaction(&store, |tx| {
                next_number(tx, DocumentType::Certificate, reference)
            })
            .unwrap()
        };
        assert_eq!(mint(date(2025, 1, 31)), "1/CAL-PBI/I/2025");
        assert_eq!(mint(date(2025, 2, 1)), "2/CAL-PBI/II/2025");
        assert_eq!(mint(date(2026, 1, 2)), "1/CAL-PBI/I/2026");
    }

    #[test]
    fn monthly_scope_resets_each_month() {
        let store = MemoryStore::new();
        let mint = |reference| {
            run_in_transaction(&store, |tx| {
                next_number(tx, DocumentType::ServiceReport, reference)
            })
            .unwrap()
        };
        assert_eq!(mint(date(2025, 5, 2)), "1/CSR-PBI/V/2025");
        assert_eq!(mint(date(2025, 5, 20)), "2/CSR-PBI/V/2025");
        assert_eq!(mint(date(2025, 6, 1)), "1/CSR-PBI/VI/2025");
        assert_eq!(
            run_in_transaction(&store, |tx| {
                next_number(tx, DocumentType::TechnicalReport, date(2025, 6, 1))
            })
            .unwrap(),
            "1/TCR-PBI/VI/2025"
        );
    }

    #[test]
    fn period_bounds_cover_december_rollover() {
        let (start, end) = period_bounds(SequenceScope::Monthly, date(2025, 12, 15)).unwrap();
        assert_eq!(start, noon(date(2025, 12, 1)) - chrono::Duration::hours(12));
        assert_eq!(end, noon(date(2026, 1, 1)) - chrono::Duration::hours(12));
    }

    /// Count-then-format reads the committed count before inserting. Two
    /// completions that both read before either commits get the same number;
    /// the counter hands out distinct values for the same interleaving.
    #[test]
    fn count_then_format_collides_where_counter_does_not() {
        let store = MemoryStore::new();
        let reference = date(2025, 1, 10);
        let (from, until) = period_bounds(SequenceScope::Yearly, reference).unwrap();

        let count_based = || {
            run_in_transaction(&store, |tx| {
                let count = tx.count_documents(DocumentType::Certificate, from, until)?;
                format_number(count + 1, DocumentType::Certificate, reference)
            })
            .unwrap()
        };
        let first_read = count_based();
        let second_read = count_based();
        assert_eq!(first_read, second_read, "both completions saw an empty period");

        let first_insert = run_in_transaction(&store, |tx| {
            issue_document(
                tx,
                Uuid::new_v4(),
                DocumentType::Certificate,
                reference,
                Value::Null,
                noon(reference),
            )
        })
        .unwrap();
        let second_insert = run_in_transaction(&store, |tx| {
            issue_document(
                tx,
                Uuid::new_v4(),
                DocumentType::Certificate,
                reference,
                Value::Null,
                noon(reference),
            )
        })
        .unwrap();
        assert_eq!(first_insert.number, "1/CAL-PBI/I/2025");
        assert_eq!(second_insert.number, "2/CAL-PBI/I/2025");
    }

    #[test]
    fn concurrent_minting_yields_unique_numbers() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    run_in_transaction(store.as_ref(), |tx| {
                        next_number(tx, DocumentType::Certificate, date(2025, 1, 10))
                    })
                    .unwrap()
                })
            })
            .collect();
        let numbers: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(numbers.len(), 8);
    }

    #[test]
    fn regeneration_keeps_number_unless_recreated() {
        let store = MemoryStore::new();
        let request_id = Uuid::new_v4();
        let reference = date(2025, 1, 10);
        let issued = run_in_transaction(&store, |tx| {
            issue_document(
                tx,
                request_id,
                DocumentType::Certificate,
                reference,
                serde_json::json!({ "rev": 1 }),
                noon(reference),
            )
        })
        .unwrap();

        let refreshed = run_in_transaction(&store, |tx| {
            regenerate_document(
                tx,
                request_id,
                DocumentType::Certificate,
                reference,
                serde_json::json!({ "rev": 2 }),
                false,
                noon(reference),
            )
        })
        .unwrap();
        assert_eq!(refreshed.number, issued.number);
        assert_eq!(refreshed.content, serde_json::json!({ "rev": 2 }));
        assert!(refreshed.regenerated_at.is_some());

        let recreated = run_in_transaction(&store, |tx| {
            regenerate_document(
                tx,
                request_id,
                DocumentType::Certificate,
                reference,
                serde_json::json!({ "rev": 3 }),
                true,
                noon(reference),
            )
        })
        .unwrap();
        assert_eq!(recreated.number, "2/CAL-PBI/I/2025");
    }
}

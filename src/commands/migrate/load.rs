use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, Transaction};
use tracing::{debug, warn};

use crate::config::BusinessUnitSeed;
use crate::model::{RejectReason, decimal_to_cents};
use crate::store::{self, NewPurchaseOrder};

use super::types::Candidate;

pub(crate) const INITIAL_HISTORY_NOTE: &str = "initial load";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadOutcome {
    Inserted {
        purchase_order_id: i64,
        client_created: bool,
    },
    Rejected(RejectReason),
}

/// Loads one candidate in its own transaction: business-unit lookup, client
/// get-or-create, purchase order and initial history row commit together or
/// not at all. Constraint violations reject the row; other store errors are
/// returned to abort the run.
pub(crate) fn load_candidate(
    connection: &mut Connection,
    candidate: &Candidate,
    loaded_at: &str,
) -> Result<LoadOutcome> {
    let tx = connection
        .transaction()
        .context("failed to begin row transaction")?;

    let business_unit_id = store::business_unit_id(&tx, &candidate.business_unit_code)
        .with_context(|| format!("failed to resolve business unit {}", candidate.business_unit_code))?;
    let Some(business_unit_id) = business_unit_id else {
        warn!(
            source = %candidate.source,
            line = candidate.line,
            business_unit = %candidate.business_unit_code,
            "unknown business unit; row rejected"
        );
        return Ok(LoadOutcome::Rejected(RejectReason::UnknownBusinessUnit));
    };

    let Some(value_cents) = decimal_to_cents(candidate.value) else {
        return Ok(LoadOutcome::Rejected(RejectReason::ConstraintViolation));
    };

    match insert_rows(&tx, business_unit_id, value_cents, candidate, loaded_at) {
        Ok(outcome) => {
            tx.commit().with_context(|| {
                format!("failed to commit purchase order {}", candidate.po_number)
            })?;
            Ok(outcome)
        }
        Err(err) if is_constraint_violation(&err) => {
            debug!(
                source = %candidate.source,
                line = candidate.line,
                po_number = %candidate.po_number,
                error = %err,
                "constraint violation; row rejected"
            );
            Ok(LoadOutcome::Rejected(RejectReason::ConstraintViolation))
        }
        Err(err) => Err(err).with_context(|| {
            format!("failed to insert purchase order {}", candidate.po_number)
        }),
    }
}

fn insert_rows(
    tx: &Transaction<'_>,
    business_unit_id: i64,
    value_cents: i64,
    candidate: &Candidate,
    loaded_at: &str,
) -> rusqlite::Result<LoadOutcome> {
    let (client_id, client_created) =
        store::get_or_create_client(tx, &candidate.client_name, loaded_at)?;

    let purchase_order_id = store::insert_purchase_order(
        tx,
        &NewPurchaseOrder {
            po_number: &candidate.po_number,
            business_unit_id,
            client_id,
            value_cents,
            currency: &candidate.currency,
            issue_date: candidate.issue_date,
            expiry_date: candidate.expiry_date,
            status: candidate.status,
            description: candidate.description.as_deref(),
            source_file: &candidate.source,
            created_at: loaded_at,
        },
    )?;

    store::append_status_history(
        tx,
        purchase_order_id,
        None,
        candidate.status,
        loaded_at,
        Some(INITIAL_HISTORY_NOTE),
    )?;

    Ok(LoadOutcome::Inserted {
        purchase_order_id,
        client_created,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// Seeds reference business units in one transaction; existing codes are kept.
pub(crate) fn seed_business_units(
    connection: &mut Connection,
    seeds: &[BusinessUnitSeed],
    created_at: &str,
) -> Result<usize> {
    let tx = connection.transaction()?;
    let mut inserted = 0;
    for seed in seeds {
        if store::seed_business_unit(&tx, seed, created_at)
            .with_context(|| format!("failed to seed business unit {}", seed.code))?
        {
            inserted += 1;
        }
    }
    tx.commit().context("failed to commit business units")?;
    Ok(inserted)
}

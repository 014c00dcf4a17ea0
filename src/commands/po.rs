use std::io::{self, Write};

use anyhow::{Result, bail};
use tracing::info;

use crate::cli::{HistoryArgs, ListArgs, PoCommand, SetStatusArgs};
use crate::commands::{backup_manager, load_config};
use crate::model::PurchaseOrderFilter;
use crate::store::{
    StatusUpdate, list_purchase_orders, open_existing_store, open_store_read_only,
    status_history, update_status,
};

pub fn run(command: PoCommand) -> Result<()> {
    match command {
        PoCommand::SetStatus(args) => set_status(args),
        PoCommand::History(args) => history(args),
        PoCommand::List(args) => list(args),
    }
}

fn set_status(args: SetStatusArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    backup_manager(&args.store, &config)?.startup()?;

    let mut connection = open_existing_store(&args.store.db_path)?;
    match update_status(
        &mut connection,
        &args.po_number,
        args.status,
        args.note.as_deref(),
    )? {
        StatusUpdate::NotFound => bail!("purchase order not found: {}", args.po_number),
        StatusUpdate::Unchanged(status) => info!(
            po_number = %args.po_number,
            status = %status,
            "status unchanged; no history recorded"
        ),
        StatusUpdate::Changed(change) => info!(
            po_number = %change.po_number,
            old_status = %change.old_status,
            new_status = %change.new_status,
            "status updated"
        ),
    }

    Ok(())
}

fn history(args: HistoryArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    backup_manager(&args.store, &config)?.startup()?;

    let connection = open_store_read_only(&args.store.db_path)?;
    let Some(entries) = status_history(&connection, &args.po_number)? else {
        bail!("purchase order not found: {}", args.po_number);
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "History for {} ({} entries)", args.po_number, entries.len())?;
    for entry in &entries {
        let old_status = entry
            .old_status
            .map(|status| status.to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            output,
            "  {}  {:<9} -> {:<9}  {}",
            entry.changed_at,
            old_status,
            entry.new_status.as_str(),
            entry.note.as_deref().unwrap_or("")
        )?;
    }
    output.flush()?;

    Ok(())
}

fn list(args: ListArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    backup_manager(&args.store, &config)?.startup()?;

    if let (Some(from), Some(to)) = (args.issued_from, args.issued_to) {
        if from > to {
            bail!("--issued-from {from} is after --issued-to {to}");
        }
    }

    let filter = PurchaseOrderFilter {
        business_unit: args
            .business_unit
            .as_deref()
            .map(|label| config.canonical_business_unit(label).to_ascii_uppercase()),
        status: args.status,
        issued_from: args.issued_from,
        issued_to: args.issued_to,
    };

    let connection = open_store_read_only(&args.store.db_path)?;
    let orders = list_purchase_orders(&connection, &filter)?;
    info!(
        count = orders.len(),
        business_unit = filter.business_unit.as_deref().unwrap_or("*"),
        "purchase orders listed"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    for order in &orders {
        writeln!(
            output,
            "{:<16} {:<6} {:<10} {} -> {}  {} {:>14}  {}",
            order.po_number,
            order.business_unit,
            order.status.as_str(),
            order.issue_date,
            order.expiry_date,
            order.currency,
            order.value,
            order.client
        )?;
    }
    output.flush()?;

    Ok(())
}

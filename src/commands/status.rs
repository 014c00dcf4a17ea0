use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{backup_manager, load_config};
use crate::store::{
    business_unit_totals, expiring_purchase_orders, open_store_read_only, store_totals,
};

pub fn run(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.store)?;
    backup_manager(&args.store, &config)?.startup()?;

    let connection = open_store_read_only(&args.store.db_path)?;
    let currency = config.currency.primary.as_str();

    info!(db_path = %args.store.db_path.display(), "status requested");

    let totals = store_totals(&connection)?;
    info!(
        po_count = totals.po_count,
        total_value = %totals.total_value,
        currency,
        active = totals.active,
        completed = totals.completed,
        cancelled = totals.cancelled,
        clients = totals.client_count,
        "store totals"
    );

    for unit in business_unit_totals(&connection)? {
        info!(
            code = %unit.code,
            name = %unit.name,
            po_count = unit.po_count,
            total_value = %unit.total_value,
            currency,
            "business unit"
        );
    }

    let today = Utc::now().date_naive();
    let expiring = expiring_purchase_orders(&connection, today, args.expiring_within)?;
    if expiring.is_empty() {
        info!(
            within_days = args.expiring_within,
            "no active purchase orders nearing expiry"
        );
    }
    for order in &expiring {
        warn!(
            po_number = %order.po_number,
            business_unit = %order.business_unit,
            client = %order.client,
            value = %order.value,
            expiry_date = %order.expiry_date,
            days_remaining = order.days_remaining,
            "purchase order nearing expiry"
        );
    }

    Ok(())
}

use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};
use split_payment_engine::{
    db_types::{LedgerRow, Order},
    traits::CapabilityUpdate,
    DisbursementReport,
    SweepReport,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_style(table: &mut Table) {
    table.set_format(markdown_format());
}

fn ids(ids: &[i64]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

pub fn format_ledger(order: &Order, rows: &[LedgerRow]) -> String {
    let header = format!(
        "Order {number} (#{id}) owned by {owner}\nStatus: {status} / {payment}. Total {total} {currency}\n",
        number = order.order_number,
        id = order.id,
        owner = order.owner_id,
        status = order.status,
        payment = order.payment_status,
        total = order.total_price,
        currency = order.currency,
    );
    if rows.is_empty() {
        return format!("{header}No ledger rows. The order has not been disbursed.\n");
    }
    let mut table = Table::new();
    table.set_titles(row![
        "ID",
        "Item",
        "Maker",
        "Destination",
        "Gross",
        "Fee",
        "Immediate",
        "Reserve",
        "Release at",
        "Released",
        "Status",
        "Transfer",
        "Reserve transfer",
        "Attempts",
        "Error"
    ]);
    for r in rows {
        table.add_row(row![
            r.id,
            r.line_item_id,
            r.maker_id,
            r.destination.as_deref().unwrap_or_default(),
            r.gross.to_string(),
            r.platform_fee.to_string(),
            r.immediate.to_string(),
            r.reserve.to_string(),
            r.reserve_release_at.format("%Y-%m-%d %H:%M").to_string(),
            if r.reserve_released { "yes" } else { "no" },
            r.status.to_string(),
            r.immediate_transfer_id.as_deref().unwrap_or_default(),
            r.release_transfer_id.as_deref().unwrap_or_default(),
            r.attempts,
            r.error.as_deref().unwrap_or_default()
        ]);
    }
    markdown_style(&mut table);
    format!("{header}{table}\n")
}

pub fn format_disbursement(report: &DisbursementReport) -> String {
    if report.payouts.is_empty() {
        return format!("Order #{}: no open payouts\n", report.order_id);
    }
    let mut table = Table::new();
    table.set_titles(row!["Maker", "Destination", "Amount", "Status", "Transfer", "Rows", "Error"]);
    for p in &report.payouts {
        table.add_row(row![
            p.maker_id,
            p.destination.as_deref().unwrap_or_default(),
            p.amount.to_string(),
            p.status.to_string(),
            p.transfer_id.as_deref().unwrap_or_default(),
            ids(&p.ledger_row_ids),
            p.error.as_deref().unwrap_or_default()
        ]);
    }
    markdown_style(&mut table);
    let unresolved = match report.unresolved_count() {
        0 => String::new(),
        n => format!(", {n} awaiting resume"),
    };
    format!(
        "Order #{}: {} payouts sent, {} failed{unresolved}. Total sent: {}\n{table}\n",
        report.order_id,
        report.succeeded_count(),
        report.failed_count(),
        report.total_sent()
    )
}

pub fn format_sweep_report(report: &SweepReport) -> String {
    let mut f = format!(
        "{} eligible ledger rows. {} reserve transfers sent, {} failed, {} skipped. Total released: {}\n",
        report.eligible_rows,
        report.released.len(),
        report.failed.len(),
        report.skipped_groups,
        report.total_released()
    );
    if !report.released.is_empty() {
        let mut table = Table::new();
        table.set_titles(row!["Maker", "Destination", "Currency", "Amount", "Transfer", "Rows"]);
        for r in &report.released {
            table.add_row(row![
                r.group.maker_id,
                r.group.destination,
                r.group.currency,
                r.amount.to_string(),
                r.transfer_id,
                ids(&r.ledger_row_ids)
            ]);
        }
        markdown_style(&mut table);
        f.push_str(&format!("## Released\n{table}\n"));
    }
    if !report.failed.is_empty() {
        let mut table = Table::new();
        table.set_titles(row!["Maker", "Destination", "Currency", "Amount", "Rows", "Error"]);
        for r in &report.failed {
            table.add_row(row![
                r.group.maker_id,
                r.group.destination,
                r.group.currency,
                r.amount.to_string(),
                ids(&r.ledger_row_ids),
                r.error
            ]);
        }
        markdown_style(&mut table);
        f.push_str(&format!("## Failed\n{table}\n"));
    }
    f
}

pub fn format_capability_update(maker_id: i64, update: &CapabilityUpdate) -> String {
    let (label, account) = match update {
        CapabilityUpdate::Changed(a) => ("updated", a),
        CapabilityUpdate::Unchanged(a) => ("unchanged", a),
        CapabilityUpdate::NotFound => return format!("Maker {maker_id} has no payout account\n"),
    };
    let mut table = Table::new();
    table.set_titles(row!["Account", "Status", "Charges", "Payouts", "Details submitted", "Updated at"]);
    table.add_row(row![
        account.account_id,
        account.status.to_string(),
        account.charges_enabled,
        account.payouts_enabled,
        account.details_submitted,
        account.updated_at.to_string()
    ]);
    markdown_style(&mut table);
    format!("Payout account of maker {maker_id} {label}\n{table}\n")
}

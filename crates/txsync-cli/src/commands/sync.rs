//! `txsync sync [--dry-run] [--date D]`

use anyhow::{bail, Result};
use chrono::NaiveDate;
use txsync_config::{PrimaryBackend, SyncConfig};
use txsync_core::{PlannedUpdate, RunMode};
use txsync_runtime::{synchronize_transactions, InvocationOptions, LiveConnector};

pub async fn run(dry_run: bool, date: Option<NaiveDate>) -> Result<()> {
    let config = txsync_config::resolve_from_env();
    // Kept for rendering the dry-run preview; the invocation takes ownership.
    let preview_config = config.as_ref().ok().cloned();

    let options = InvocationOptions {
        mode: if dry_run { RunMode::DryRun } else { RunMode::Apply },
        today: date,
    };
    let inv = synchronize_transactions(config, &LiveConnector, options).await;
    let resp = inv.response();

    let summary = match inv.result {
        Ok(summary) => summary,
        Err(_) => bail!("{}", resp.body),
    };

    if dry_run {
        if let Some(cfg) = preview_config {
            for planned in &summary.planned {
                println!("{}", preview_statement(&cfg, planned));
            }
        }
        println!(
            "Dry run complete. Planned: {}, Skipped (no line items): {}",
            summary.planned.len(),
            summary.skipped_empty_count
        );
    } else {
        println!("{}", resp.body);
    }
    Ok(())
}

/// Human-readable statement for a planned update. Display only: the real
/// update binds its values as parameters.
fn preview_statement(cfg: &SyncConfig, planned: &PlannedUpdate) -> String {
    let c = &cfg.coordinates;
    let table = match cfg.backend {
        PrimaryBackend::BigQuery => format!("`{}.{}.{}`", c.project, c.dataset, c.table),
        PrimaryBackend::Postgres => format!("\"{}\".\"{}\"", c.dataset, c.table),
    };
    format!(
        "UPDATE {table} SET {} = {} WHERE {} = {};",
        cfg.schema.total_column,
        planned.total.normalize(),
        cfg.schema.id_column,
        planned.id.sql_literal()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsync_core::RecordId;

    fn cfg() -> SyncConfig {
        txsync_config::resolve_with(|name| match name {
            "BQ_PROJECT" => Some("acme".to_string()),
            "BQ_DATASET" => Some("sales".to_string()),
            "BQ_TABLE" => Some("transactions".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn preview_quotes_text_ids() {
        let p = PlannedUpdate {
            id: RecordId::from("O'Neil"),
            total: "11.00".parse().unwrap(),
        };
        assert_eq!(
            preview_statement(&cfg(), &p),
            r"UPDATE `acme.sales.transactions` SET total_sale_price = 11 WHERE transaction_id = 'O\'Neil';"
        );
    }

    #[test]
    fn preview_leaves_integer_ids_bare() {
        let p = PlannedUpdate {
            id: RecordId::Int(42),
            total: "2.5".parse().unwrap(),
        };
        assert!(preview_statement(&cfg(), &p).ends_with("WHERE transaction_id = 42;"));
    }
}

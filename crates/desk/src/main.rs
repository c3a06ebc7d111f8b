use std::io::{self, BufRead, Write};

use anyhow::Context;
use chrono::Utc;

use depot_desk::ShipmentDesk;
use depot_desk::app::services::{build_services, spawn_document_handoff};
use depot_infra::DepotConfig;
use depot_infra::seed::seed;

/// Reads one JSON request per stdin line and answers with one JSON response per
/// stdout line. Logs go to stderr.
fn main() -> anyhow::Result<()> {
    let config = DepotConfig::load().context("loading configuration")?;
    depot_observability::init_with_filter(&config.log_filter);

    let services = build_services(&config).context("opening stores")?;
    if config.seed_opening_quantity > 0 {
        let summary = seed(
            services.ledger.as_ref(),
            services.directory.as_ref(),
            config.seed_opening_quantity,
            Utc::now(),
        )
        .context("seeding demo data")?;
        tracing::info!(
            counterparties = summary.counterparties,
            items = summary.items,
            lots = summary.lots,
            "demo data seeded"
        );
    }

    let handoff = spawn_document_handoff(&services.bus);
    tracing::info!(policy = %config.cost_policy, "desk ready");

    let desk = ShipmentDesk::new(services);
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = desk.handle_line(&line, Utc::now());
        serde_json::to_writer(&mut stdout, &response).context("writing response")?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    // Dropping the desk drops the last bus handle, which ends the hand-off thread.
    drop(desk);
    match handoff.join() {
        Ok(count) => tracing::info!(deals = count, "document hand-off finished"),
        Err(_) => tracing::error!("document hand-off thread panicked"),
    }
    Ok(())
}

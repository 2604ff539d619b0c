//! Results reporting and formatting.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

use crate::runner::BenchResults;

/// Format results as a console table.
pub fn format_table(results: &BenchResults) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![format!("Waterfall Bench: {}", results.name)]);

    table.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
    table.add_row(vec!["Steps:", &results.steps.to_string()]);
    table.add_row(vec!["Generators:", &results.max_generators.to_string()]);

    table.add_row(vec!["", ""]);
    table.add_row(vec!["Tiles created:", &results.tiles_created.to_string()]);
    table.add_row(vec!["Tiles ready:", &results.tiles_ready.to_string()]);
    table.add_row(vec!["Tiles rendered:", &results.tiles_rendered.to_string()]);
    table.add_row(vec!["Cache hits:", &results.cache_hits.to_string()]);
    table.add_row(vec!["Cancellations:", &results.cancellations.to_string()]);
    table.add_row(vec!["Config failures:", &results.config_failures.to_string()]);
    table.add_row(vec![
        "Barrier stalls / applied:",
        &format!("{} / {}", results.barrier_stalls, results.states_applied),
    ]);

    table.add_row(vec!["", ""]);
    table.add_row(vec!["Latency (ms)", "p50 / p90 / p99 / max"]);
    table.add_row(vec![
        "",
        &format!(
            "{:.1} / {:.1} / {:.1} / {:.1}",
            results.latency_p50_ms,
            results.latency_p90_ms,
            results.latency_p99_ms,
            results.latency_max_ms
        ),
    ]);
    table.add_row(vec![
        "Throughput:",
        &format!("{:.1} tiles/s", results.tiles_per_second),
    ]);
    table.add_row(vec![
        "Store:",
        &format!(
            "{} entries, {:.1}% hit rate",
            results.store_entries, results.store_hit_rate
        ),
    ]);
    if !results.drained {
        table.add_row(vec!["Warning:", "queue did not drain"]);
    }

    table.to_string()
}

/// Format results as pretty JSON.
pub fn format_json(results: &BenchResults) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

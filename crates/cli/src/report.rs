use blocklist::List;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

/// Block counts of one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantSummary {
    pub tenant: String,
    pub blocks: usize,
    pub compacted_blocks: usize,
}

/// Summarize every known tenant, sorted by name
pub fn summarize(list: &List) -> Vec<TenantSummary> {
    let mut tenants = list.tenants();
    tenants.sort();

    tenants
        .into_iter()
        .map(|tenant| TenantSummary {
            blocks: list.metas(&tenant).len(),
            compacted_blocks: list.compacted_metas(&tenant).len(),
            tenant,
        })
        .collect()
}

pub fn render_table(summaries: &[TenantSummary]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("tenant"),
        Cell::new("blocks"),
        Cell::new("compacted blocks"),
    ]);

    for summary in summaries {
        table.add_row(vec![
            Cell::new(&summary.tenant),
            Cell::new(summary.blocks),
            Cell::new(summary.compacted_blocks),
        ]);
    }

    format!("{}\n{} tenant(s)", table, summaries.len())
}

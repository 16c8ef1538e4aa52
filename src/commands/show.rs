use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use crate::application::{ShowGroup, ShowReport};

/// Render the show report: one table per group, each followed by its summary.
pub fn render_show(report: &ShowReport) -> String {
    let mut out = String::new();
    for group in &report.groups {
        let title = group.group.to_string();
        out.push('\n');
        out.push_str(&capitalize(&title));
        out.push('\n');
        out.push_str(&group_table(group).to_string());
        out.push('\n');
        out.push_str(&group.summary());
        out.push('\n');
    }
    out
}

fn group_table(group: &ShowGroup) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Number",
            "Package",
            "Installed",
            "Available",
            "Status",
            "Description",
        ]);

    for row in &group.rows {
        table.add_row(vec![
            row.number.to_string(),
            row.package.clone(),
            row.installed
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "--".to_string()),
            row.available
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "--".to_string()),
            row.status.to_string(),
            row.description.clone(),
        ]);
    }
    table
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

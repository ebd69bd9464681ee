use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn applied_cell(applied: bool) -> Cell {
    if applied {
        Cell::new("yes").fg(TableColor::Green)
    } else {
        Cell::new("no").fg(TableColor::Yellow)
    }
}

pub fn size_cell(bytes: u64) -> Cell {
    #[allow(clippy::cast_precision_loss)]
    let text = if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    };
    Cell::new(text)
}

/// Short form of a commit id or blob sha.
pub fn revision_cell(revision: &str) -> Cell {
    Cell::new(revision.chars().take(10).collect::<String>()).fg(TableColor::DarkGrey)
}

pub fn more_rows_cell(hidden: usize) -> Cell {
    Cell::new(format!("... and {hidden} more")).fg(TableColor::DarkGrey)
}

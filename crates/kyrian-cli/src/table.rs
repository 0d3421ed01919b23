use std::io::IsTerminal;

use comfy_table::{presets::NOTHING, Attribute, Cell, Color, Table};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CliTableTheme {
    pub use_unicode: bool,
    pub use_color: bool,
}

impl CliTableTheme {
    pub(crate) fn detect() -> Self {
        let is_tty = std::io::stdout().is_terminal();
        let no_color = std::env::var_os("NO_COLOR").is_some();
        resolve_table_theme(is_tty, no_color)
    }

    pub(crate) fn new_data_table(self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        let header_cells: Vec<Cell> = headers.iter().map(|h| self.header_cell(h)).collect();
        table.set_header(header_cells);
        table
    }

    fn header_cell(self, text: &str) -> Cell {
        let mut cell = Cell::new(text);
        if self.use_color {
            cell = cell.add_attribute(Attribute::Bold);
        }
        cell
    }

    /// Cell for an entry that differs from the live source.
    pub(crate) fn changed_cell(self, text: &str) -> Cell {
        let mut cell = Cell::new(text);
        if self.use_color {
            cell = cell.fg(Color::Yellow).add_attribute(Attribute::Bold);
        }
        cell
    }

    /// Prefix drawn before a tree entry at `depth`.
    pub(crate) fn indent(self, depth: usize) -> String {
        if depth == 0 {
            return String::new();
        }
        let branch = if self.use_unicode { "└─ " } else { "+- " };
        format!("{}{branch}", "   ".repeat(depth - 1))
    }
}

fn resolve_table_theme(is_tty: bool, no_color: bool) -> CliTableTheme {
    CliTableTheme {
        use_unicode: is_tty,
        use_color: is_tty && !no_color,
    }
}

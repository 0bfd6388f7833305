use std::fmt::Write as _;

use client_core::{Notification, SessionView};
use shared::domain::Position;

const MIN_WIDTH: usize = 3;

/// Plain-text table of the grid. The local selection is wrapped in `[ ]`,
/// cells other users selected are prefixed with `@`.
pub fn render_view(view: &SessionView) -> String {
    let grid = &view.grid;
    let dimensions = grid.dimensions();

    let mut widths = vec![MIN_WIDTH; dimensions.columns];
    for (position, cell) in grid.filled() {
        let width = cell.value.chars().count() + 2;
        widths[position.column] = widths[position.column].max(width);
    }
    let label_width = dimensions.rows.saturating_sub(1).to_string().len();

    let mut out = String::new();
    let selection = view
        .selection
        .map(|position| position.to_string())
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(
        out,
        "{} grid, connection {:?}, selection {selection}",
        dimensions, view.connection
    );

    let _ = write!(out, "{:>label_width$} ", "");
    for (column, width) in widths.iter().enumerate() {
        let _ = write!(out, "| {:<width$} ", column);
    }
    out.push('\n');

    for (row, cells) in grid.rows().enumerate() {
        let _ = write!(out, "{row:>label_width$} ");
        for (column, cell) in cells.iter().enumerate() {
            let position = Position::new(row, column);
            let text = if view.selection == Some(position) {
                format!("[{}]", cell.value)
            } else if view.remote_selections.contains_key(&position) {
                format!("@{}", cell.value)
            } else {
                cell.value.clone()
            };
            let _ = write!(out, "| {:<width$} ", text, width = widths[column]);
        }
        out.push('\n');
    }

    for (position, who) in view.remote_selections.iter() {
        let _ = writeln!(out, "@ {who} is on {position}");
    }
    out
}

pub fn format_notification(notification: &Notification) -> String {
    let marker = if notification.persistent { "!!" } else { "!" };
    format!("{marker} {:?}: {}", notification.kind, notification.message)
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use client_core::{ConnectionState, GridStore, NotificationKind};
    use shared::protocol::SnapshotEntry;

    use super::*;

    fn view_with(entries: Vec<SnapshotEntry>) -> SessionView {
        let mut store = GridStore::initialize(2, 2);
        store.apply_snapshot(entries);
        SessionView {
            grid: store.read(),
            connection: ConnectionState::Open,
            selection: None,
            remote_selections: Arc::new(BTreeMap::new()),
        }
    }

    #[test]
    fn renders_every_row_with_values_in_place() {
        let view = view_with(vec![SnapshotEntry::new(Position::new(0, 1), "X")]);

        let rendered = render_view(&view);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("2x2"));
        assert!(lines[0].contains("Open"));
        assert_eq!(lines[2], "0 |     | X   ");
        assert_eq!(lines[3], "1 |     |     ");
    }

    #[test]
    fn marks_local_and_remote_selections() {
        let mut view = view_with(vec![SnapshotEntry::new(Position::new(1, 1), "v")]);
        view.selection = Some(Position::new(1, 1));
        view.remote_selections = Arc::new(BTreeMap::from([(Position::new(0, 0), "bob".to_string())]));

        let rendered = render_view(&view);

        assert!(rendered.contains("selection (1, 1)"));
        assert!(rendered.contains("[v]"));
        assert!(rendered.contains("| @   "));
        assert!(rendered.contains("@ bob is on (0, 0)"));
    }

    #[test]
    fn persistent_notices_stand_out() {
        let transient = Notification::transient(NotificationKind::OutOfBounds, "off grid");
        let persistent = Notification::persistent(NotificationKind::ConnectionLost, "reload");

        assert_eq!(format_notification(&transient), "! OutOfBounds: off grid");
        assert_eq!(format_notification(&persistent), "!! ConnectionLost: reload");
    }
}

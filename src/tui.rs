//! Draws a [`TableView`] to the terminal.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::QueueableCommand;

use crate::format::NO_LINKS;
use crate::notice::{Notice, NoticeLevel};
use crate::render::{
    ReservationCell, RowView, TableView, UiCell, CLASS_HEALTH_DOWN, CLASS_HEALTH_UP,
    CLASS_STATUS_FREE, CLASS_STATUS_RESERVED,
};

const HEADERS: [&str; 9] = [
    "DEVICE", "MODEL", "HW", "UI", "MGMT", "CONSOLE", "HEALTH", "STATUS", "RESERVATION",
];

fn class_color(class: &str) -> Color {
    match class {
        CLASS_HEALTH_UP | CLASS_STATUS_FREE => Color::Green,
        CLASS_HEALTH_DOWN => Color::Red,
        CLASS_STATUS_RESERVED => Color::Yellow,
        _ => Color::Grey,
    }
}

fn ui_text(cell: &UiCell) -> String {
    match cell {
        UiCell::Links(links) => links
            .iter()
            .map(|l| format!("{}:{}", l.label, l.port))
            .collect::<Vec<_>>()
            .join(" "),
        UiCell::Placeholder => NO_LINKS.to_string(),
    }
}

fn reservation_text(row: &RowView) -> String {
    let region = match &row.reservation {
        ReservationCell::Details(d) => format!(
            "{} {} left {} ({} -> {})",
            d.owner, d.duration, d.remaining, d.start, d.end
        ),
        ReservationCell::Form(draft) => format!(
            "[owner: {}] [{}h {}m]",
            if draft.owner.is_empty() { "_" } else { draft.owner.as_str() },
            draft.hours,
            draft.minutes
        ),
        ReservationCell::Empty => String::new(),
    };
    format!("{} {}", region, row.action.label()).trim().to_string()
}

/// One text cell per header, uncoloured.
pub fn row_cells(row: &RowView) -> [String; 9] {
    [
        row.device_id.clone(),
        row.model.clone(),
        row.hardware.clone(),
        ui_text(&row.ui),
        row.mgmt.text.clone(),
        row.console.text.clone(),
        row.health.text.clone(),
        row.status.text.clone(),
        reservation_text(row),
    ]
}

fn column_widths(rows: &[[String; 9]]) -> [usize; 9] {
    let mut widths = HEADERS.map(str::len);
    for cells in rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

/// Redraws the whole screen: table, notices, then the prompt.
pub fn draw<W: Write>(out: &mut W, view: &TableView, notices: &[&Notice], prompt: &str) -> io::Result<()> {
    let cells: Vec<[String; 9]> = view.rows.iter().map(row_cells).collect();
    let widths = column_widths(&cells);

    out.queue(MoveTo(0, 0))?.queue(Clear(ClearType::All))?;
    out.queue(SetForegroundColor(Color::White))?;
    for (header, width) in HEADERS.iter().zip(widths) {
        out.queue(Print(format!("{:<width$}  ", header, width = width)))?;
    }
    out.queue(Print("\r\n"))?;

    for (row, cells) in view.rows.iter().zip(&cells) {
        for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
            let color = match i {
                6 => class_color(row.health.class),
                7 => class_color(row.status.class),
                _ => Color::Reset,
            };
            out.queue(SetForegroundColor(color))?
                .queue(Print(format!("{:<width$}  ", cell, width = width)))?;
        }
        out.queue(ResetColor)?.queue(Print("\r\n"))?;
    }

    out.queue(Print("\r\n"))?;
    for notice in notices {
        let color = match notice.level {
            NoticeLevel::Info => Color::Cyan,
            NoticeLevel::Error => Color::Red,
        };
        out.queue(SetForegroundColor(color))?
            .queue(Print(&notice.text))?
            .queue(ResetColor)?
            .queue(Print("\r\n"))?;
    }
    out.queue(Print(prompt))?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::InputDraft;
    use crate::render::{ActionCell, CopyCell, HealthCell, StatusCell};
    use std::time::Instant;

    fn row() -> RowView {
        RowView {
            device_id: "sw1".into(),
            model: "S5248".into(),
            hardware: "hw".into(),
            ui: UiCell::Placeholder,
            mgmt: CopyCell { text: "-".into(), copy: None },
            console: CopyCell { text: "-".into(), copy: None },
            health: HealthCell { text: "up".into(), class: CLASS_HEALTH_UP },
            status: StatusCell { text: "Free".into(), class: CLASS_STATUS_FREE },
            reservation: ReservationCell::Form(InputDraft::default()),
            action: ActionCell::Reserve,
        }
    }

    #[test]
    fn form_cell_shows_defaults_and_action() {
        let cells = row_cells(&row());
        assert_eq!(cells[3], NO_LINKS);
        assert_eq!(cells[8], "[owner: _] [1h 0m] RESERVE");
    }

    #[test]
    fn draw_writes_rows_and_notices() {
        let view = TableView { rows: vec![row()] };
        let notice = Notice {
            level: NoticeLevel::Error,
            text: "reserve sw1 failed: in use".into(),
            expires_at: Instant::now(),
        };
        let mut out = Vec::new();
        draw(&mut out, &view, &[&notice], "> ").unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("sw1"));
        assert!(text.contains("reserve sw1 failed: in use"));
        assert!(text.ends_with("> "));
    }
}

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table as TableWidget, TableState, Wrap},
};

use crate::domain::{FilterMode, HELP_TEXT, PbConfig};
use crate::model::Model;

pub const TITLE_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const DETAILS_HEIGHT: usize = 7;
pub const STATUS_HEIGHT: usize = 1;

const COLUMN_WIDTH_MIN: usize = 6;
const COLUMN_WIDTH_SAMPLE_ROWS: usize = 80;

pub struct TableUI {
    max_column_width: usize,
    table_state: TableState,
}

impl TableUI {
    pub fn new(config: &PbConfig) -> Self {
        Self {
            max_column_width: config.max_column_width,
            table_state: TableState::default(),
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let chunks = Layout::vertical([
            Constraint::Length(TITLE_HEIGHT as u16),
            Constraint::Min(1),
            Constraint::Length(DETAILS_HEIGHT as u16),
            Constraint::Length(STATUS_HEIGHT as u16),
        ])
        .split(frame.area());

        self.draw_title(model, frame, chunks[0]);
        self.draw_table(model, frame, chunks[1]);
        self.draw_details(model, frame, chunks[2]);
        self.draw_statusline(model, frame, chunks[3]);

        if model.show_help() {
            self.draw_help(frame);
        }
    }

    fn draw_title(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::from(" pbook ").bold().reversed(),
            Span::from(" "),
            Span::from(model.file_label()).yellow(),
        ];
        if let Some(column) = model.phone_column() {
            spans.push(Span::from(format!("  phone: {column}")).dim());
        }
        if !model.query().trim().is_empty() {
            spans.push(Span::from(format!("  filter: \"{}\"", model.query().trim())).dim());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_table(&mut self, model: &Model, frame: &mut Frame, area: Rect) {
        let table = model.table();
        if table.columns.is_empty() {
            let hint = Paragraph::new("No file loaded. Press ? for help.").dim();
            frame.render_widget(hint, area);
            return;
        }

        let (curser_row, curser_column) = model.curser();
        let widths = self.column_widths(model);

        let header = Row::new(table.columns.iter().enumerate().map(|(idx, name)| {
            let mut text = name.clone();
            if let Some(sort) = model.sort_state()
                && sort.column == *name
            {
                text.push(if sort.descending { '▼' } else { '▲' });
            }
            let mut cell = Cell::from(text);
            if idx == curser_column {
                cell = cell.style(Style::new().bold().underlined());
            }
            cell
        }))
        .style(Style::new().bold());

        let rows = model.view_rows().iter().map(|&ridx| {
            let record = &table.records[ridx];
            Row::new(
                table
                    .columns
                    .iter()
                    .map(|c| Cell::from(record.get(c).cloned().unwrap_or_default())),
            )
        });

        let widget = TableWidget::new(rows, widths)
            .header(header)
            .row_highlight_style(Style::new().reversed());

        self.table_state.select(if model.view_rows().is_empty() {
            None
        } else {
            Some(curser_row)
        });
        frame.render_stateful_widget(widget, area, &mut self.table_state);
    }

    /// Size each column to its content, sampling only the first rows of the
    /// current view so huge files do not slow down rendering.
    fn column_widths(&self, model: &Model) -> Vec<Constraint> {
        let table = model.table();
        table
            .columns
            .iter()
            .map(|name| {
                let mut width = name.chars().count() + 1;
                for &ridx in model.view_rows().iter().take(COLUMN_WIDTH_SAMPLE_ROWS) {
                    if let Some(value) = table.records[ridx].get(name) {
                        width = width.max(value.chars().count());
                    }
                }
                let width = width.clamp(COLUMN_WIDTH_MIN, self.max_column_width);
                Constraint::Length(width as u16)
            })
            .collect()
    }

    fn draw_details(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let block = Block::bordered().title(" Selected record ");
        let lines: Vec<Line> = match model.selected_record() {
            Some(record) => model
                .table()
                .columns
                .iter()
                .filter_map(|col| {
                    let value = record.get(col)?;
                    if value.is_empty() {
                        return None;
                    }
                    Some(Line::from(vec![
                        Span::from(format!("{col}: ")).bold(),
                        Span::from(value.clone()),
                    ]))
                })
                .collect(),
            None => vec![Line::from("Select a record from the table to see details.").dim()],
        };
        frame.render_widget(
            Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
            area,
        );
    }

    fn draw_statusline(&self, model: &Model, frame: &mut Frame, area: Rect) {
        if let Some((mode, input)) = model.input_state() {
            let prefix = match mode {
                FilterMode::AllColumns => "/".to_string(),
                FilterMode::CurrentColumn => format!("{}/", model.current_column_name()),
            };
            frame.render_widget(
                Paragraph::new(format!("{prefix}{}", input.input)),
                area,
            );
            let x = area.x + (prefix.chars().count() + input.curser_pos) as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let counts = format!(
            "{} / {} records ",
            model.view_rows().len(),
            model.table().records.len()
        );
        let chunks =
            Layout::horizontal([Constraint::Min(0), Constraint::Length(counts.len() as u16)])
                .split(area);
        frame.render_widget(Paragraph::new(model.status_message()).dim(), chunks[0]);
        frame.render_widget(Paragraph::new(counts), chunks[1]);
    }

    fn draw_help(&self, frame: &mut Frame) {
        let area = centered_rect(frame.area(), 64, 20);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(HELP_TEXT).block(Block::bordered().title(" Help ")),
            area,
        );
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

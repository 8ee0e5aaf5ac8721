//! Rendering of the popup with ratatui.

use super::state::{split_paragraphs, KeyEntry, PopupState, View};
use crate::summary::{DetailLevel, ScoreBand, SummaryResult};
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Gauge, Paragraph, Tabs, Wrap};
use ratatui::Frame;

/// Page identity shown above every state
pub struct Header {
    pub title: Option<String>,
    pub url: String,
}

pub fn band_color(band: ScoreBand) -> Color {
    match band {
        ScoreBand::Green => Color::Rgb(0x22, 0xc5, 0x5e),
        ScoreBand::Amber => Color::Rgb(0xf5, 0x9e, 0x0b),
        ScoreBand::Red => Color::Rgb(0xef, 0x44, 0x44),
    }
}

pub fn render(frame: &mut Frame, state: &PopupState, header: &Header) {
    let outer = Block::bordered().title(" précis ");
    let area = outer.inner(frame.area());
    frame.render_widget(outer, frame.area());

    let settings_height = if state.settings().is_some() { 3 } else { 0 };
    let [head, settings, body, footer] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Length(settings_height),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, head, header);
    if let Some(entry) = state.settings() {
        render_key_entry(frame, settings, entry);
    }

    match state.view() {
        View::Loading => {
            let loading = Paragraph::new("Analyzing article…")
                .style(Style::new().fg(Color::Gray))
                .alignment(Alignment::Center);
            frame.render_widget(loading, centered_line(body));
        }
        View::Error { message } => {
            let error = Paragraph::new(message.as_str())
                .style(Style::new().fg(Color::Red))
                .wrap(Wrap { trim: true });
            frame.render_widget(error, body);
        }
        View::Summary {
            data,
            level,
            scroll,
        } => render_summary(frame, body, data, *level, *scroll),
    }

    render_footer(frame, footer, state);
}

fn render_header(frame: &mut Frame, area: Rect, header: &Header) {
    let title = header.title.as_deref().unwrap_or("Untitled page");
    let lines = vec![
        Line::from(Span::styled(
            title.to_string(),
            Style::new().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            header.url.clone(),
            Style::new().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_key_entry(frame: &mut Frame, area: Rect, entry: &KeyEntry) {
    let content = if entry.input.is_empty() {
        Span::styled(
            entry
                .placeholder
                .clone()
                .unwrap_or_else(|| "sk-ant-…".to_string()),
            Style::new().fg(Color::DarkGray),
        )
    } else {
        // never echo the key itself
        Span::raw("•".repeat(entry.input.chars().count()))
    };
    let input = Paragraph::new(Line::from(content))
        .block(Block::bordered().title(" API key (Enter to save, Esc to close) "));
    frame.render_widget(input, area);
}

fn render_summary(
    frame: &mut Frame,
    area: Rect,
    data: &SummaryResult,
    level: DetailLevel,
    scroll: u16,
) {
    let [tabs, fluff, novelty, _gap, text] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    frame.render_widget(level_tabs(level), tabs);
    frame.render_widget(
        score_gauge("Fluff", data.fluff_percentage, data.fluff_band()),
        fluff,
    );
    frame.render_widget(
        score_gauge("Novelty", data.novelty_score, data.novelty_band()),
        novelty,
    );

    let mut lines = Vec::new();
    for paragraph in split_paragraphs(data.text(level)) {
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        lines.extend(paragraph.lines().map(|l| Line::from(l.to_string())));
    }
    let summary = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: true })
        .scroll((scroll, 0));
    frame.render_widget(summary, text);
}

fn level_tabs(level: DetailLevel) -> Tabs<'static> {
    let titles: Vec<Line> = DetailLevel::ALL
        .iter()
        .map(|l| {
            if *l < level {
                Line::from(Span::styled(
                    format!("✓ {}", l.label()),
                    Style::new().fg(Color::Gray),
                ))
            } else {
                Line::from(l.label())
            }
        })
        .collect();
    Tabs::new(titles)
        .select(level.index())
        .highlight_style(
            Style::new()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        )
        .divider(" │ ")
}

fn score_gauge(label: &str, value: u8, band: ScoreBand) -> Gauge<'static> {
    Gauge::default()
        .gauge_style(Style::new().fg(band_color(band)).bg(Color::Black))
        .percent(u16::from(value.min(100)))
        .label(format!("{label} {value}%"))
}

fn render_footer(frame: &mut Frame, area: Rect, state: &PopupState) {
    let mut spans = Vec::new();
    if let Some(label) = state.more_detail_label() {
        spans.push(Span::styled(
            format!("[Enter] {label}  "),
            Style::new().fg(Color::Cyan),
        ));
    }
    let hint = match state.view() {
        View::Loading => "s settings · q quit",
        View::Error { .. } => "r retry · R re-analyze · s settings · q quit",
        View::Summary { .. } => "1-4 level · ↑↓ scroll · r retry · R re-analyze · s settings · q quit",
    };
    spans.push(Span::styled(hint, Style::new().fg(Color::DarkGray)));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// One line in the vertical middle of `area`
fn centered_line(area: Rect) -> Rect {
    let [_, line, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .areas(area);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AnalysisOutcome;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn screen(state: &PopupState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 24)).unwrap();
        let header = Header {
            title: Some("A Story".into()),
            url: "https://news.example/story".into(),
        };
        terminal.draw(|frame| render(frame, state, &header)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn band_colors_match_traffic_lights() {
        assert_eq!(band_color(ScoreBand::Red), Color::Rgb(0xef, 0x44, 0x44));
        assert_eq!(band_color(ScoreBand::Green), Color::Rgb(0x22, 0xc5, 0x5e));
    }

    #[test]
    fn summary_screen_shows_level_text_and_scores() {
        let mut state = PopupState::default();
        state.apply_outcome(AnalysisOutcome::Success {
            data: SummaryResult {
                ultra_short: "The gist of it.".into(),
                short: "More.".into(),
                medium: "Even more.".into(),
                detailed: "All of it.".into(),
                fluff_percentage: 12,
                novelty_score: 81,
            },
        });

        let text = screen(&state);
        assert!(text.contains("A Story"));
        assert!(text.contains("The gist of it."));
        assert!(text.contains("Fluff 12%"));
        assert!(text.contains("Novelty 81%"));
        assert!(text.contains("Short →"));
    }

    #[test]
    fn error_screen_shows_message() {
        let mut state = PopupState::default();
        state.apply_outcome(AnalysisOutcome::failure("No active tab found."));
        assert!(screen(&state).contains("No active tab found."));
    }
}

//! Terminal depth viewer.
//!
//! Maps an instrument's snapshot region read-only and renders bid/ask
//! ladders with depth bars, refreshing as the seqlock sequence advances.
//!
//! Usage: `book_viewer <instrument-token> [shm-prefix]`

use std::time::Duration;

use anyhow::Context;
use chrono::{Local, TimeZone};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

use simex::snapshot::{region_name, DepthSnapshot, SnapshotReader};
use simex::types::InstrumentToken;

const POLL_INTERVAL: Duration = Duration::from_millis(60);
const DISPLAY_LEVELS: usize = 14;
const BAR_WIDTH: usize = 20;

fn render_ladder(levels: &[(f64, f64)]) -> String {
    let max_qty = levels
        .iter()
        .take(DISPLAY_LEVELS)
        .map(|&(_, qty)| qty)
        .fold(1.0f64, f64::max);

    let mut out = String::new();
    for &(price, qty) in levels.iter().take(DISPLAY_LEVELS) {
        let bar_len = ((qty / max_qty) * BAR_WIDTH as f64) as usize;
        let bar = "█".repeat(bar_len);
        out.push_str(&format!("{price:>10.2} {bar} {qty:<7.0}\n"));
    }
    out
}

fn format_timestamp(ns: u64) -> String {
    match Local.timestamp_opt((ns / 1_000_000_000) as i64, (ns % 1_000_000_000) as u32) {
        chrono::LocalResult::Single(ts) => ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
        _ => "-".to_string(),
    }
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let token: InstrumentToken = args
        .next()
        .context("usage: book_viewer <instrument-token> [shm-prefix]")?
        .parse()
        .context("invalid instrument token")?;
    let prefix = args.next().unwrap_or_else(|| "/simex_book".to_string());

    let mut reader = SnapshotReader::open(&prefix, token)
        .with_context(|| format!("map snapshot region {}", region_name(&prefix, token)))?;
    let source = format!("shm {}", region_name(&prefix, token));

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut snapshot: Option<DepthSnapshot> = None;
    let mut status = format!("Waiting for {source}");

    let result = (|| -> anyhow::Result<()> {
        loop {
            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
                        return Ok(());
                    }
                }
            }

            if let Some(fresh) = reader.read() {
                status = format!("Updated {}", format_timestamp(fresh.timestamp_ns));
                snapshot = Some(fresh);
            }

            terminal.draw(|frame| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .margin(1)
                    .constraints([
                        Constraint::Length(3),
                        Constraint::Min(10),
                        Constraint::Length(4),
                    ])
                    .split(frame.size());

                let title = Paragraph::new(format!("Token {token} | {status} | press 'q' to quit"))
                    .block(Block::default().borders(Borders::ALL).title("SIMEX ORDER BOOK"))
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(Color::Cyan));
                frame.render_widget(title, chunks[0]);

                let ladders = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                    .split(chunks[1]);

                let (bids_text, asks_text, footer) = match &snapshot {
                    Some(snap) => (
                        render_ladder(&snap.bids),
                        render_ladder(&snap.asks),
                        format!(
                            "LTP {:.2}   LTQ {:.0}\nseq {}   source {source}",
                            snap.ltp, snap.ltq, snap.sequence
                        ),
                    ),
                    None => (String::new(), String::new(), format!("source {source}")),
                };

                frame.render_widget(
                    Paragraph::new(bids_text).block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title("BIDS")
                            .style(Style::default().fg(Color::Green)),
                    ),
                    ladders[0],
                );
                frame.render_widget(
                    Paragraph::new(asks_text).block(
                        Block::default()
                            .borders(Borders::ALL)
                            .title("ASKS")
                            .style(Style::default().fg(Color::Red)),
                    ),
                    ladders[1],
                );

                frame.render_widget(
                    Paragraph::new(footer)
                        .block(Block::default().borders(Borders::ALL))
                        .alignment(Alignment::Center)
                        .style(Style::default().fg(Color::Yellow)),
                    chunks[2],
                );
            })?;
        }
    })();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    result
}

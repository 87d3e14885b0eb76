use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pianobar_remote::{
    Command, ConnectionState, Coordinator, CoordinatorConfig, Playback, PlayerState, Rating,
    StateReceiver, StateUpdate, DEFAULT_PORT,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Mutex;

const VOLUME_STEP: u8 = 5;

struct App {
    coordinator: Coordinator,
    updates: StateReceiver,
    selected_station_index: usize,
    status_message: String,
}

impl App {
    fn new(config: CoordinatorConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let coordinator = Coordinator::new(config)?;
        let updates = coordinator.subscribe();

        Ok(Self {
            coordinator,
            updates,
            selected_station_index: 0,
            status_message: "Connecting...".to_string(),
        })
    }

    fn select_next(&mut self) {
        let station_count = self.coordinator.snapshot().stations.len();
        if station_count > 0 {
            self.selected_station_index = (self.selected_station_index + 1) % station_count;
        }
    }

    fn select_previous(&mut self) {
        let station_count = self.coordinator.snapshot().stations.len();
        if station_count > 0 {
            if self.selected_station_index == 0 {
                self.selected_station_index = station_count - 1;
            } else {
                self.selected_station_index -= 1;
            }
        }
    }

    async fn play_selected_station(&mut self) {
        let state = self.coordinator.snapshot();
        let Some(station) = state.stations.iter().nth(self.selected_station_index) else {
            self.status_message = "No stations to play".to_string();
            return;
        };

        match self.coordinator.select_station(station.id.clone()).await {
            Ok(()) => self.status_message = format!("Switching to {}", station.name),
            Err(e) => self.status_message = format!("Failed to change station: {}", e),
        }
    }

    async fn adjust_volume(&mut self, up: bool) {
        let current = self.coordinator.volume_percent();
        let target = if up {
            current.saturating_add(VOLUME_STEP).min(100)
        } else {
            current.saturating_sub(VOLUME_STEP)
        };

        match self.coordinator.set_volume_percent(target).await {
            Ok(()) => self.status_message = format!("Volume: {}%", target),
            Err(e) => self.status_message = format!("Failed to set volume: {}", e),
        }
    }

    async fn run_command(&mut self, command: Command, done: &str) {
        let name = command.name();
        match self.coordinator.send(command).await {
            Ok(()) => self.status_message = done.to_string(),
            Err(e) => self.status_message = format!("{} failed: {}", name, e),
        }
    }

    fn handle_state_update(&mut self) {
        loop {
            match self.updates.try_recv() {
                Ok(Some(StateUpdate::Connection(state))) => {
                    self.status_message = match state {
                        ConnectionState::Connected => "Connected".to_string(),
                        ConnectionState::Reconnecting => format!(
                            "Connection lost, retrying (attempt {})",
                            self.coordinator.reconnect_attempt() + 1
                        ),
                        other => format!("{:?}", other),
                    };
                }
                Ok(Some(StateUpdate::State(delta))) => {
                    if delta.stations {
                        let count = self.coordinator.snapshot().stations.len();
                        if self.selected_station_index >= count {
                            self.selected_station_index = count.saturating_sub(1);
                        }
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let state = app.coordinator.snapshot();

    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    let inner_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(outer_chunks[0]);

    render_now_playing(f, app, &state, inner_chunks[0]);
    render_stations(f, app, &state, inner_chunks[1]);
    render_status(f, app, outer_chunks[1]);
}

fn render_now_playing(f: &mut Frame, app: &App, state: &PlayerState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let block = Block::default()
        .title(" Now Playing (space play/pause, n next, +/- vol, l love, b ban, t tired, q quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let playback = match state.playback {
        Playback::Playing => Span::styled("Playing", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
        Playback::Paused => Span::styled("Paused", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Playback::Stopped => Span::styled("Stopped", Style::default().fg(Color::Red)),
        Playback::Idle => Span::styled("Idle", Style::default().fg(Color::Gray)),
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Connection: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{:?}", app.coordinator.connection_state())),
        ]),
        Line::from(vec![Span::styled("State: ", Style::default().fg(Color::Yellow)), playback]),
        Line::from(vec![
            Span::styled("Station: ", Style::default().fg(Color::Yellow)),
            Span::raw(state.source().unwrap_or("-").to_string()),
        ]),
        Line::from(""),
    ];

    if let Some(song) = &state.current_song {
        lines.push(Line::from(vec![
            Span::styled("Title: ", Style::default().fg(Color::Yellow)),
            Span::styled(song.title.clone(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Artist: ", Style::default().fg(Color::Yellow)),
            Span::raw(song.artist.clone()),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Album: ", Style::default().fg(Color::Yellow)),
            Span::raw(song.album.clone()),
        ]));
        if song.rating == Rating::Loved {
            lines.push(Line::from(Span::styled("  ♥ Loved", Style::default().fg(Color::Red))));
        }

        let position = state.media_position().unwrap_or(song.position_seconds);
        let duration = song
            .duration_seconds
            .map(format_time)
            .unwrap_or_else(|| "--:--".to_string());
        lines.push(Line::from(vec![
            Span::styled("Position: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{} / {}", format_time(position), duration)),
        ]));
    } else {
        lines.push(Line::from(Span::styled("Nothing playing", Style::default().fg(Color::Gray))));
    }

    if let Some(error) = &state.last_error {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Last error: ", Style::default().fg(Color::Red)),
            Span::raw(error.message.clone()),
        ]));
    }

    let text = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(text, chunks[0]);

    let percent = app.coordinator.volume_percent();
    let gauge = Gauge::default()
        .block(Block::default().title(" Volume ").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(u16::from(percent))
        .label(format!("{}% ({:.1} dB)", percent, state.volume_db));
    f.render_widget(gauge, chunks[1]);
}

fn render_stations(f: &mut Frame, app: &App, state: &PlayerState, area: Rect) {
    let block = Block::default()
        .title(" Stations (j/k select, Enter play) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    if state.stations.is_empty() {
        let text = Paragraph::new("Waiting for the station list...")
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(text, area);
        return;
    }

    let items: Vec<ListItem> = state
        .stations
        .iter()
        .map(|station| {
            let is_active = state.current_station_id.as_deref() == Some(station.id.as_str());
            let prefix = if is_active { "▶ " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::raw(prefix),
                Span::styled(
                    station.name.clone(),
                    if is_active {
                        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    },
                ),
            ]))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(app.selected_station_index));

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol(">> ");

    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Status ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let text = Paragraph::new(app.status_message.clone())
        .block(block)
        .wrap(Wrap { trim: true });

    f.render_widget(text, area);
}

fn format_time(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Usage: now_playing [host] [port] [log file]
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    // Logs would corrupt the terminal, so they only go to a file when asked for
    if let Some(path) = args.next() {
        let file = std::fs::File::create(path)?;
        tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let mut app = App::new(CoordinatorConfig::new(host, port))?;
    app.coordinator.start();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    app.coordinator.stop().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {}", err);
    }

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        app.handle_state_update();

        // Handle input events (non-blocking)
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                        KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                        KeyCode::Enter => app.play_selected_station().await,
                        KeyCode::Char(' ') => {
                            app.run_command(Command::TogglePlayback, "Toggled playback").await
                        }
                        KeyCode::Char('n') => app.run_command(Command::Next, "Skipped").await,
                        KeyCode::Char('l') => app.run_command(Command::LoveSong, "Loved song").await,
                        KeyCode::Char('b') => app.run_command(Command::BanSong, "Banned song").await,
                        KeyCode::Char('t') => {
                            app.run_command(Command::TiredOfSong, "Song shelved for a month").await
                        }
                        KeyCode::Char('r') => app.run_command(Command::Reconnect, "Reconnecting").await,
                        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_volume(true).await,
                        KeyCode::Char('-') | KeyCode::Char('_') => app.adjust_volume(false).await,
                        _ => {}
                    }
                }
            }
        }
    }
}

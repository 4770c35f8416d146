use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use roku_remote::{
    DiscoveryState, EngineEvent, ErrorCause, EventReceiver, FileStore, MemoryStore, RokuClient,
};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const LOG_LINES: usize = 12;

/// Keys shown in the help panel, in display order
const KEYMAP: &[(&str, &str)] = &[
    ("arrows", "navigate"),
    ("Enter", "ok"),
    ("Backspace", "back"),
    ("h", "home"),
    ("p", "play / pause"),
    ("r / f", "rewind / forward"),
    ("R", "instant replay"),
    ("+ / -", "volume"),
    ("m", "mute"),
    ("i", "options"),
    ("s", "search"),
    ("P", "power"),
    ("n d a t", "netflix disney appletv paramount"),
    ("F", "forget device"),
    ("q", "quit"),
];

#[derive(PartialEq)]
enum AppState {
    Discovering,
    ManualEntry,
    Remote,
}

struct App {
    state: AppState,
    client: Arc<RokuClient>,
    events: EventReceiver,
    discovery_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    address_input: String,
    status_message: String,
    log: VecDeque<String>,
}

impl App {
    fn new(client: RokuClient) -> Self {
        let events = client.subscribe_events();
        Self {
            state: AppState::Discovering,
            client: Arc::new(client),
            events,
            discovery_task: None,
            cancel: CancellationToken::new(),
            address_input: String::new(),
            status_message: "Looking for a Roku device...".to_string(),
            log: VecDeque::new(),
        }
    }

    fn start_discovery(&mut self) {
        self.state = AppState::Discovering;
        self.cancel = CancellationToken::new();

        let client = self.client.clone();
        let cancel = self.cancel.clone();
        // Outcome arrives through the event stream
        self.discovery_task = Some(tokio::spawn(async move {
            let _ = client.discover_with_cancel(cancel).await;
        }));
    }

    fn cancel_discovery(&mut self) {
        self.cancel.cancel();
        self.state = AppState::ManualEntry;
        self.status_message = "Discovery cancelled. Type an address and press Enter.".to_string();
    }

    async fn connect_manual(&mut self) {
        let address = self.address_input.trim().to_string();
        self.status_message = format!("Testing connection to {}...", address);
        match self.client.connect(&address).await {
            Ok(device) => {
                self.address_input.clear();
                self.state = AppState::Remote;
                self.status_message = format!("Connected to {}", device.label());
            }
            Err(e) => self.status_message = e.to_string(),
        }
    }

    fn send(&mut self, command: &str) {
        // Outcome arrives through the event stream
        let _ticket = self.client.enqueue(command);
    }

    fn forget(&mut self) {
        self.client.forget();
        self.push_log("Forgot device".to_string());
        self.start_discovery();
    }

    fn push_log(&mut self, line: String) {
        if self.log.len() == LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    fn handle_events(&mut self) {
        while let Some(event) = self.events.try_recv() {
            match event {
                EngineEvent::DiscoveryStateChanged(state) => self.on_discovery_state(state),
                EngineEvent::DeviceFound(device) => {
                    self.push_log(format!("Device {}", device.label()));
                }
                EngineEvent::DeviceInvalidated(address) => {
                    self.push_log(format!("Lost {}", address));
                    if self.state == AppState::Remote {
                        self.state = AppState::ManualEntry;
                        self.status_message =
                            "Device unreachable. Enter its address or press Tab to rescan.".to_string();
                    }
                }
                EngineEvent::PairingRequested(address) => {
                    self.status_message =
                        format!("Accept the connection request on the TV at {}, then retry", address);
                }
                EngineEvent::CommandSent { command } => self.push_log(format!("sent {}", command)),
                EngineEvent::CommandFailed { command, cause } => {
                    self.push_log(format!("{} failed: {}", command, cause));
                    if cause == ErrorCause::AuthorizationRequired {
                        self.status_message = "The device refused the command".to_string();
                    }
                }
            }
        }
    }

    fn on_discovery_state(&mut self, state: DiscoveryState) {
        match state {
            DiscoveryState::Idle | DiscoveryState::Cancelled => {}
            DiscoveryState::TryingCached(address) => {
                self.status_message = format!("Trying last known device {}...", address);
            }
            DiscoveryState::Scanning { prefix } => {
                self.status_message = format!("Scanning {}.1-254 (Esc to stop)", prefix);
            }
            DiscoveryState::Found(address) => {
                self.state = AppState::Remote;
                self.status_message = format!("Connected to {}", address);
            }
            DiscoveryState::Exhausted => {
                self.state = AppState::ManualEntry;
                self.status_message =
                    "No device answered. Type its address (Settings > Network > About).".to_string();
            }
        }
    }
}

fn key_command(code: KeyCode) -> Option<&'static str> {
    let command = match code {
        KeyCode::Up => "up",
        KeyCode::Down => "down",
        KeyCode::Left => "left",
        KeyCode::Right => "right",
        KeyCode::Enter => "ok",
        KeyCode::Backspace => "back",
        KeyCode::Char('h') => "home",
        KeyCode::Char('p') | KeyCode::Char(' ') => "play",
        KeyCode::Char('r') => "rewind",
        KeyCode::Char('f') => "forward",
        KeyCode::Char('R') => "replay",
        KeyCode::Char('+') | KeyCode::Char('=') => "volume_up",
        KeyCode::Char('-') | KeyCode::Char('_') => "volume_down",
        KeyCode::Char('m') => "volume_mute",
        KeyCode::Char('i') => "options",
        KeyCode::Char('s') => "search",
        KeyCode::Char('P') => "power",
        KeyCode::Char('n') => "netflix",
        KeyCode::Char('d') => "disney",
        KeyCode::Char('a') => "appletv",
        KeyCode::Char('t') => "paramount",
        _ => return None,
    };
    Some(command)
}

fn ui(f: &mut Frame, app: &App) {
    let outer_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    let inner_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(outer_chunks[0]);

    match app.state {
        AppState::Discovering => render_discovering(f, app, inner_chunks[0]),
        AppState::ManualEntry => render_manual_entry(f, app, inner_chunks[0]),
        AppState::Remote => render_remote(f, app, inner_chunks[0]),
    }
    render_log(f, app, inner_chunks[1]);
    render_status(f, app, outer_chunks[1]);
}

fn render_discovering(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Discovery (Esc to stop, q to quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let state = app.client.discovery_state();
    let text = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("State: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{:?}", state)),
        ]),
        Line::from(""),
        Line::from("Probing the local network for a device on port 8060."),
    ])
    .block(block)
    .wrap(Wrap { trim: true });
    f.render_widget(text, area);
}

fn render_manual_entry(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Manual Address (Enter to connect, Tab to rescan, Esc to quit) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));

    let text = Paragraph::new(vec![
        Line::from("Find the address under Settings > Network > About."),
        Line::from(""),
        Line::from(vec![
            Span::styled("Address: ", Style::default().fg(Color::Yellow)),
            Span::styled(
                format!("{}_", app.address_input),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
        ]),
    ])
    .block(block)
    .wrap(Wrap { trim: true });
    f.render_widget(text, area);
}

fn render_remote(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Remote ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let mut lines = Vec::new();
    if let Some(device) = app.client.current_device() {
        let caps = &device.capabilities;
        lines.push(Line::from(vec![
            Span::styled("Device: ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            Span::raw(device.label()),
        ]));
        lines.push(Line::from(vec![
            Span::styled("Model: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!(
                "{} {}",
                caps.model_name.as_deref().unwrap_or("Unknown"),
                caps.model_number.as_deref().unwrap_or("")
            )),
        ]));
        if caps.requires_pairing {
            lines.push(Line::from(Span::styled(
                "Pairing required",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
        }
        lines.push(Line::from(""));
    }

    for (key, action) in KEYMAP {
        lines.push(Line::from(vec![
            Span::styled(format!("{:>10}  ", key), Style::default().fg(Color::Cyan)),
            Span::raw(*action),
        ]));
    }

    let text = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(text, area);
}

fn render_log(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Events ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));

    let items: Vec<ListItem> = app.log.iter().map(|line| ListItem::new(line.as_str())).collect();
    f.render_widget(List::new(items).block(block), area);
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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = match FileStore::default_path() {
        Some(path) => RokuClient::builder().store(FileStore::new(path)).build(),
        None => RokuClient::builder().store(MemoryStore::new()).build(),
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client);
    app.start_discovery();

    let res = run_app(&mut terminal, &mut app).await;

    app.cancel.cancel();
    if let Some(task) = app.discovery_task.take() {
        let _ = task.await;
    }

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
        app.handle_events();
        terminal.draw(|f| ui(f, app))?;

        // Keep the engine's tasks running between key presses
        if !tokio::task::block_in_place(|| event::poll(std::time::Duration::from_millis(100)))? {
            tokio::task::yield_now().await;
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match app.state {
            AppState::Discovering => match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Esc => app.cancel_discovery(),
                _ => {}
            },
            AppState::ManualEntry => match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.start_discovery(),
                KeyCode::Enter => app.connect_manual().await,
                KeyCode::Backspace => {
                    app.address_input.pop();
                }
                KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => app.address_input.push(c),
                _ => {}
            },
            AppState::Remote => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('F') => app.forget(),
                code => {
                    if let Some(command) = key_command(code) {
                        app.send(command);
                    }
                }
            },
        }
    }
}

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveTime};
use tokio::runtime::Handle;
use tracing::info;
use ulid::Ulid;

use crate::config::Settings;
use crate::engine::{EngineError, ReservationManager};
use crate::model::*;
use crate::registry::{OfficeConfig, RegistryError};
use crate::sensor::{ClimateControl, LightingSystem, OccupancySensor};

/// When a booking starts, as typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    /// `HH:MM` today, local time.
    Clock(NaiveTime),
    /// `+N` minutes from now.
    InMinutes(i64),
}

/// Parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Configure { rooms: u32, capacity: u32 },
    SetCapacity { room: ResourceId, capacity: u32 },
    Resize { rooms: u32 },
    Rooms,
    Book {
        room: ResourceId,
        owner: String,
        name: String,
        start: StartAt,
        minutes: i64,
    },
    Cancel { id: Ulid },
    Occupy { room: ResourceId, count: i64 },
    Show { room: ResourceId },
    All,
    Occupancy { room: ResourceId },
    Export,
    History,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    Parse(String),
    UnknownCommand(String),
    WrongArity(&'static str, &'static str),
    AlreadyConfigured,
    Registry(RegistryError),
    Engine(EngineError),
    Export(String),
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShellError::Parse(s) => write!(f, "parse error: {s}"),
            ShellError::UnknownCommand(c) => write!(f, "unknown command: {c} (try 'help')"),
            ShellError::WrongArity(cmd, usage) => write!(f, "{cmd}: usage: {usage}"),
            ShellError::AlreadyConfigured => write!(f, "office is already configured"),
            ShellError::Registry(e) => write!(f, "{e}"),
            ShellError::Engine(e) => write!(f, "{e}"),
            ShellError::Export(e) => write!(f, "export failed: {e}"),
        }
    }
}

impl std::error::Error for ShellError {}

impl From<EngineError> for ShellError {
    fn from(e: EngineError) -> Self {
        ShellError::Engine(e)
    }
}

impl From<RegistryError> for ShellError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotConfigured => ShellError::Engine(EngineError::NotConfigured),
            other => ShellError::Registry(other),
        }
    }
}

const USAGE_CONFIGURE: &str = "configure <rooms> <default-capacity>";
const USAGE_CAPACITY: &str = "capacity <room> <capacity>";
const USAGE_RESIZE: &str = "resize <rooms>";
const USAGE_BOOK: &str = "book <room> <owner> <name...> <HH:MM|+minutes> <minutes>";
const USAGE_CANCEL: &str = "cancel <reservation-id>";
const USAGE_OCCUPY: &str = "occupy <room> <count>";
const USAGE_SHOW: &str = "show <room>";
const USAGE_OCCUPANCY: &str = "occupancy <room>";

const HELP: &str = "\
commands:
  configure <rooms> <default-capacity>   set up the office (once)
  capacity <room> <capacity>             change a room's capacity
  resize <rooms>                         grow or shrink the office
  rooms                                  list rooms and capacities
  book <room> <owner> <name...> <HH:MM|+minutes> <minutes>
  cancel <reservation-id>
  occupy <room> <count>                  report a sensor reading
  show <room>                            reservations for one room
  all                                    reservations for every room
  occupancy <room>                       latest occupant count
  export                                 all reservations as JSON
  history                                executed commands
  help
  exit | quit";

pub fn parse_command(line: &str) -> Result<Command, ShellError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&head, args)) = tokens.split_first() else {
        return Err(ShellError::Parse("empty command".into()));
    };

    match head.to_lowercase().as_str() {
        "configure" => match args {
            [rooms, capacity] => Ok(Command::Configure {
                rooms: parse_num(rooms)?,
                capacity: parse_num(capacity)?,
            }),
            _ => Err(ShellError::WrongArity("configure", USAGE_CONFIGURE)),
        },
        "capacity" => match args {
            [room, capacity] => Ok(Command::SetCapacity {
                room: parse_num(room)?,
                capacity: parse_num(capacity)?,
            }),
            _ => Err(ShellError::WrongArity("capacity", USAGE_CAPACITY)),
        },
        "resize" => match args {
            [rooms] => Ok(Command::Resize { rooms: parse_num(rooms)? }),
            _ => Err(ShellError::WrongArity("resize", USAGE_RESIZE)),
        },
        "rooms" => Ok(Command::Rooms),
        "book" => {
            let [room, owner, name @ .., start, minutes] = args else {
                return Err(ShellError::WrongArity("book", USAGE_BOOK));
            };
            if name.is_empty() {
                return Err(ShellError::WrongArity("book", USAGE_BOOK));
            }
            Ok(Command::Book {
                room: parse_num(room)?,
                owner: owner.to_string(),
                name: name.join(" "),
                start: parse_start(start)?,
                minutes: parse_num(minutes)?,
            })
        }
        "cancel" => match args {
            [id] => Ok(Command::Cancel {
                id: Ulid::from_string(id).map_err(|e| ShellError::Parse(format!("bad id {id}: {e}")))?,
            }),
            _ => Err(ShellError::WrongArity("cancel", USAGE_CANCEL)),
        },
        "occupy" => match args {
            [room, count] => Ok(Command::Occupy {
                room: parse_num(room)?,
                count: parse_num(count)?,
            }),
            _ => Err(ShellError::WrongArity("occupy", USAGE_OCCUPY)),
        },
        "show" => match args {
            [room] => Ok(Command::Show { room: parse_num(room)? }),
            _ => Err(ShellError::WrongArity("show", USAGE_SHOW)),
        },
        "all" => Ok(Command::All),
        "occupancy" => match args {
            [room] => Ok(Command::Occupancy { room: parse_num(room)? }),
            _ => Err(ShellError::WrongArity("occupancy", USAGE_OCCUPANCY)),
        },
        "export" => Ok(Command::Export),
        "history" => Ok(Command::History),
        "help" => Ok(Command::Help),
        "exit" | "quit" => Ok(Command::Exit),
        other => Err(ShellError::UnknownCommand(other.to_string())),
    }
}

fn parse_num<T: std::str::FromStr>(s: &str) -> Result<T, ShellError> {
    s.parse()
        .map_err(|_| ShellError::Parse(format!("not a valid number: {s}")))
}

fn parse_start(s: &str) -> Result<StartAt, ShellError> {
    if let Some(minutes) = s.strip_prefix('+') {
        return Ok(StartAt::InMinutes(parse_num(minutes)?));
    }
    NaiveTime::parse_from_str(s, "%H:%M")
        .map(StartAt::Clock)
        .map_err(|_| ShellError::Parse(format!("bad start time {s}, expected HH:MM or +minutes")))
}

fn resolve_start(start: StartAt) -> Result<Ms, ShellError> {
    match start {
        StartAt::InMinutes(m) => m
            .checked_mul(MINUTE_MS)
            .and_then(|offset| Local::now().timestamp_millis().checked_add(offset))
            .ok_or_else(|| ShellError::Parse("start offset out of range".into())),
        StartAt::Clock(t) => Local::now()
            .date_naive()
            .and_time(t)
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| ShellError::Parse(format!("{t} does not exist today"))),
    }
}

fn format_ms(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn format_reservation(r: &Reservation) -> String {
    format!(
        "{} | owner: {} | start: {} | duration: {} min",
        r.id,
        r.owner.display_name,
        format_ms(r.start),
        r.duration_ms / MINUTE_MS
    )
}

/// One successfully executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub label: &'static str,
    pub line: String,
}

struct Session {
    office: Arc<OfficeConfig>,
    manager: Arc<ReservationManager>,
    sensor: OccupancySensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Line-oriented front end. Turns input into manager calls and prints results.
pub struct Shell {
    settings: Settings,
    runtime: Handle,
    session: Option<Session>,
    history: Vec<HistoryEntry>,
}

impl Shell {
    /// Configures the office right away when the settings carry a room count.
    pub fn new(settings: Settings, runtime: Handle) -> Result<Self, ShellError> {
        let mut shell = Self {
            settings,
            runtime,
            session: None,
            history: Vec::new(),
        };
        if let Some((rooms, capacity)) = shell.settings.office {
            shell.configure(rooms, capacity)?;
        }
        Ok(shell)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn manager(&self) -> Option<Arc<ReservationManager>> {
        self.session.as_ref().map(|s| s.manager.clone())
    }

    /// Read commands until `exit` or end of input. Errors are printed, not returned.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        writeln!(out, "roomkeeper ready. Type 'help' for commands.")?;
        write!(out, "> ")?;
        out.flush()?;
        for line in input.lines() {
            let line = line?;
            if !line.trim().is_empty() && self.handle_line(&line, out)? == Flow::Exit {
                return Ok(());
            }
            write!(out, "> ")?;
            out.flush()?;
        }
        writeln!(out)?;
        self.shutdown();
        Ok(())
    }

    /// Parse and run one line, printing the result or the error.
    pub fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Flow> {
        let cmd = match parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                writeln!(out, "error: {e}")?;
                return Ok(Flow::Continue);
            }
        };
        let label = crate::observability::command_label(&cmd);
        match self.execute(&cmd, out) {
            Ok(flow) => {
                metrics::counter!(crate::observability::COMMANDS_TOTAL, "command" => label, "status" => "ok")
                    .increment(1);
                if !matches!(cmd, Command::History | Command::Help) {
                    self.history.push(HistoryEntry {
                        label,
                        line: line.trim().to_string(),
                    });
                }
                Ok(flow)
            }
            Err(ShellIoError::Io(e)) => Err(e),
            Err(ShellIoError::Shell(e)) => {
                metrics::counter!(crate::observability::COMMANDS_TOTAL, "command" => label, "status" => "error")
                    .increment(1);
                writeln!(out, "error: {e}")?;
                Ok(Flow::Continue)
            }
        }
    }

    pub fn execute<W: Write>(&mut self, cmd: &Command, out: &mut W) -> Result<Flow, ShellIoError> {
        match cmd {
            Command::Configure { rooms, capacity } => {
                self.configure(*rooms, *capacity)?;
                writeln!(out, "office configured: {rooms} rooms, default capacity {capacity}")?;
            }
            Command::SetCapacity { room, capacity } => {
                self.session()?.office.set_room_capacity(*room, *capacity)?;
                writeln!(out, "room {room} capacity set to {capacity}")?;
            }
            Command::Resize { rooms } => {
                self.session()?.office.set_total_rooms(*rooms)?;
                writeln!(out, "office resized to {rooms} rooms")?;
            }
            Command::Rooms => {
                let session = self.session()?;
                writeln!(out, "{} rooms", session.manager.total_resources()?)?;
                for room in session.office.rooms() {
                    writeln!(out, "room {}: capacity {}", room.id, room.capacity)?;
                }
            }
            Command::Book { room, owner, name, start, minutes } => {
                let session = self.session()?;
                let start = resolve_start(*start)?;
                let duration = minutes.saturating_mul(MINUTE_MS);
                let reservation = Reservation::new(*room, Owner::new(owner.as_str(), name.as_str()), start, duration);
                let booked = session.manager.book(reservation)?;
                writeln!(out, "booked {}", booked.id)?;
            }
            Command::Cancel { id } => {
                if self.session()?.manager.cancel(*id) {
                    writeln!(out, "cancelled {id}")?;
                } else {
                    writeln!(out, "no reservation {id}")?;
                }
            }
            Command::Occupy { room, count } => {
                self.session()?.sensor.set_occupancy(*room, *count)?;
                writeln!(out, "room {room} occupancy: {count}")?;
            }
            Command::Show { room } => {
                let list = self.session()?.manager.reservations_for(*room)?;
                if list.is_empty() {
                    writeln!(out, "no reservations for room {room}")?;
                }
                for r in &list {
                    writeln!(out, "{}", format_reservation(r))?;
                }
            }
            Command::All => {
                let all = self.session()?.manager.all_reservations();
                if all.is_empty() {
                    writeln!(out, "no reservations")?;
                }
                for (room, list) in &all {
                    writeln!(out, "room {room}:")?;
                    for r in list {
                        writeln!(out, "  {}", format_reservation(r))?;
                    }
                }
            }
            Command::Occupancy { room } => {
                let count = self.session()?.manager.occupancy(*room)?;
                writeln!(out, "room {room} occupancy: {count}")?;
            }
            Command::Export => {
                let all = self.session()?.manager.all_reservations();
                let json = serde_json::to_string_pretty(&all)
                    .map_err(|e| ShellError::Export(e.to_string()))?;
                writeln!(out, "{json}")?;
            }
            Command::History => {
                for (i, entry) in self.history.iter().enumerate() {
                    writeln!(out, "{:>3}  {}", i + 1, entry.line)?;
                }
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Exit => {
                self.shutdown();
                writeln!(out, "goodbye")?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    pub fn shutdown(&self) {
        if let Some(session) = &self.session {
            session.manager.shutdown();
        }
    }

    fn session(&self) -> Result<&Session, ShellError> {
        self.session
            .as_ref()
            .ok_or(ShellError::Engine(EngineError::NotConfigured))
    }

    fn configure(&mut self, rooms: u32, capacity: u32) -> Result<(), ShellError> {
        if self.session.is_some() {
            return Err(ShellError::AlreadyConfigured);
        }
        let office = Arc::new(OfficeConfig::new(rooms, capacity)?);
        let manager = ReservationManager::new(office.clone(), &self.settings, self.runtime.clone());
        let sensor = OccupancySensor::new(manager.clone());
        let threshold = self.settings.occupancy_threshold;
        sensor.register(Arc::new(LightingSystem::new(threshold)));
        sensor.register(Arc::new(ClimateControl::new(threshold)));
        info!("shell session configured with {rooms} rooms");
        self.session = Some(Session { office, manager, sensor });
        Ok(())
    }
}

/// Command failure or failure to write its output.
#[derive(Debug)]
pub enum ShellIoError {
    Shell(ShellError),
    Io(io::Error),
}

impl From<io::Error> for ShellIoError {
    fn from(e: io::Error) -> Self {
        ShellIoError::Io(e)
    }
}

impl From<ShellError> for ShellIoError {
    fn from(e: ShellError) -> Self {
        ShellIoError::Shell(e)
    }
}

impl From<EngineError> for ShellIoError {
    fn from(e: EngineError) -> Self {
        ShellIoError::Shell(e.into())
    }
}

impl From<RegistryError> for ShellIoError {
    fn from(e: RegistryError) -> Self {
        ShellIoError::Shell(e.into())
    }
}

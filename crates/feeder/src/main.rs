//! Host-side driver for the coil bed.
//!
//! Owns everything the core crates deliberately don't: the serial port, the
//! timed tick loop, key input, and the choice of pattern strategy. Each
//! subcommand drives the same `GridState` → encode → send pipeline; only the
//! controller that mutates the grid differs.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use clap::{Parser, Subcommand, ValueEnum};
use coilbed_grid::{DecayModel, GridState, Polarity};
use coilbed_planner::{HerdConfig, HerdFormationEngine, Phase, TargetMask};
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::StreamExt;

use crate::connection::{MockLink, SerialLink, Transport};

mod connection;
mod pattern;

// State refresh cadence; transport writes run on their own slower deadline.
const TICK: Duration = Duration::from_millis(33);

#[derive(Parser)]
#[command(name = "coilbed-feeder", about = "Drive the 4x8 electromagnet bed over serial")]
struct Args {
    /// Serial ports to try, in order. With none given, frames go to the log.
    #[arg(long = "port")]
    ports: Vec<String>,
    #[arg(long, default_value_t = 115200)]
    baud: u32,
    #[arg(long, default_value_t = 4)]
    rows: usize,
    #[arg(long, default_value_t = 8)]
    cols: usize,
    /// Full drive level for an activated coil.
    #[arg(long, default_value_t = 10.0)]
    max_intensity: f32,
    /// Seconds between transport writes.
    #[arg(long, default_value_t = 0.5)]
    send_secs: f64,
    /// Skip the serial port and log frames instead.
    #[arg(long)]
    mock: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Impulse-activate single coils from the keyboard; they decay to rest.
    Manual {
        /// Seconds for an impulse to decay back to zero.
        #[arg(long, default_value_t = 0.1)]
        decay_secs: f64,
    },
    /// Cycle the whole bed through negative / off / positive / off.
    Cycle {
        #[arg(long, default_value_t = 0.5)]
        on_secs: f64,
        #[arg(long, default_value_t = 0.5)]
        off_secs: f64,
    },
    /// Ramp the whole bed's intensity 0 -> 100 -> 0 percent and repeat.
    Ramp {
        /// Percentage change per update.
        #[arg(long, default_value_t = 10.0)]
        step_pct: f64,
        #[arg(long, default_value_t = 0.5)]
        update_secs: f64,
        #[arg(long, value_enum, default_value_t = Direction::Positive)]
        direction: Direction,
    },
    /// Hold a static shape.
    Shape {
        /// Pattern file (1-based "row,col" lines); default is the lab's M.
        #[arg(long)]
        pattern: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Direction::Positive)]
        direction: Direction,
    },
    /// Herd the swarm into a shape via contracting distance bands.
    Herd {
        #[arg(long)]
        pattern: Option<PathBuf>,
        #[arg(long, default_value_t = 1.0)]
        pulse_secs: f64,
        /// How long each band pulse also holds the next band inward.
        #[arg(long, default_value_t = 10.0)]
        overlap_secs: f64,
        #[arg(long)]
        no_overlap: bool,
        #[arg(long, value_enum, default_value_t = Direction::Positive)]
        direction: Direction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Direction {
    Positive,
    Negative,
}

impl From<Direction> for Polarity {
    fn from(d: Direction) -> Polarity {
        match d {
            Direction::Positive => Polarity::Positive,
            Direction::Negative => Polarity::Negative,
        }
    }
}

/// Encodes and writes frames on the send cadence. Transport faults are
/// logged and dropped; they never touch grid state.
struct Sender {
    transport: Box<dyn Transport>,
    interval: Duration,
    last_send: Option<Instant>,
}

impl Sender {
    fn send_now(&mut self, grid: &GridState, now: Instant) {
        let line = coilbed_protocol::serialize(&coilbed_protocol::encode(grid));
        if let Err(e) = self.transport.send(&line) {
            log::warn!("dropping frame: {e}");
        }
        self.last_send = Some(now);
    }

    fn maybe_send(&mut self, grid: &GridState, now: Instant) {
        let due = self
            .last_send
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.send_now(grid, now);
        }
    }

    fn poll_echo(&mut self) {
        match self.transport.poll_echo() {
            Ok(Some(line)) => log::info!("device: {line}"),
            Ok(None) => {}
            Err(e) => log::warn!("echo read failed: {e}"),
        }
    }
}

fn secs(value: f64, what: &str) -> anyhow::Result<Duration> {
    if value <= 0.0 {
        anyhow::bail!("{what} must be positive");
    }
    Ok(Duration::from_secs_f64(value))
}

fn open_transport(args: &Args) -> Box<dyn Transport> {
    if args.mock || args.ports.is_empty() {
        if !args.mock {
            log::info!("no serial port configured; frames go to the log");
        }
        return Box::new(MockLink);
    }
    match SerialLink::open(&args.ports, args.baud) {
        Ok(link) => Box::new(link),
        Err(e) => {
            log::warn!("{e}; running without serial output");
            Box::new(MockLink)
        }
    }
}

fn load_mask(rows: usize, cols: usize, path: &Option<PathBuf>) -> anyhow::Result<TargetMask> {
    let cells = match path {
        Some(path) => pattern::load(path)?,
        None => pattern::DEFAULT_PATTERN.to_vec(),
    };
    Ok(TargetMask::new(rows, cols, cells)?)
}

fn all_cells(rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..rows).flat_map(move |row| (0..cols).map(move |col| (row, col)))
}

// Raw-mode-safe status line.
fn say(msg: &str) {
    eprint!("{msg}\r\n");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let send_interval = secs(args.send_secs, "send interval")?;
    let mut sender = Sender {
        transport: open_transport(&args),
        interval: send_interval,
        last_send: None,
    };
    let mut grid = GridState::new(args.rows, args.cols)?;

    let result = match &args.command {
        Command::Manual { decay_secs } => {
            let model = DecayModel::new(args.max_intensity, secs(*decay_secs, "decay duration")?)?;
            run_manual(&mut sender, &mut grid, model).await
        }
        Command::Cycle { on_secs, off_secs } => {
            let on = secs(*on_secs, "on duration")?;
            let off = secs(*off_secs, "off duration")?;
            run_cycle(&mut sender, &mut grid, args.max_intensity, on, off).await
        }
        Command::Ramp {
            step_pct,
            update_secs,
            direction,
        } => {
            if !(*step_pct > 0.0 && *step_pct <= 100.0) {
                anyhow::bail!("step percentage must be in (0, 100]");
            }
            let update = secs(*update_secs, "update interval")?;
            run_ramp(
                &mut sender,
                &mut grid,
                args.max_intensity,
                *step_pct,
                update,
                (*direction).into(),
            )
            .await
        }
        Command::Shape { pattern, direction } => {
            let mask = load_mask(args.rows, args.cols, pattern)?;
            run_shape(&mut sender, &mut grid, mask, (*direction).into(), args.max_intensity).await
        }
        Command::Herd {
            pattern,
            pulse_secs,
            overlap_secs,
            no_overlap,
            direction,
        } => {
            let mask = load_mask(args.rows, args.cols, pattern)?;
            let overlap_hold = if *no_overlap {
                None
            } else {
                Some(secs(*overlap_secs, "overlap hold")?)
            };
            let config = HerdConfig {
                direction: (*direction).into(),
                max_intensity: args.max_intensity,
                pulse_interval: secs(*pulse_secs, "pulse interval")?,
                overlap_hold,
            };
            let engine = HerdFormationEngine::new(mask, config)?;
            run_herd(&mut sender, &mut grid, engine).await
        }
    };

    // Leave the magnets off no matter how the session ended.
    grid.clear_all();
    sender.send_now(&grid, Instant::now());
    result
}

async fn run_manual(
    sender: &mut Sender,
    grid: &mut GridState,
    model: DecayModel,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let result = manual_loop(sender, grid, model).await;
    disable_raw_mode()?;
    result
}

async fn manual_loop(
    sender: &mut Sender,
    grid: &mut GridState,
    model: DecayModel,
) -> anyhow::Result<()> {
    say("arrows: move  p: positive impulse  n: negative impulse  c: clear  q: quit");
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    let (mut row, mut col) = (0usize, 0usize);

    loop {
        tokio::select! {
            maybe_ev = events.next() => {
                let ev = match maybe_ev {
                    Some(Ok(ev)) => ev,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(anyhow!("event stream ended")),
                };
                let Event::Key(ev) = ev else { continue };
                if ev.kind != KeyEventKind::Press {
                    continue;
                }
                match ev.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Up => row = row.saturating_sub(1),
                    KeyCode::Down => row = (row + 1).min(grid.rows() - 1),
                    KeyCode::Left => col = col.saturating_sub(1),
                    KeyCode::Right => col = (col + 1).min(grid.cols() - 1),
                    KeyCode::Char('p') => {
                        model.activate(grid, row, col, Polarity::Positive, Instant::now())?;
                        say(&format!("({row}, {col}) positive"));
                    }
                    KeyCode::Char('n') => {
                        model.activate(grid, row, col, Polarity::Negative, Instant::now())?;
                        say(&format!("({row}, {col}) negative"));
                    }
                    KeyCode::Char('c') => {
                        grid.clear_all();
                        say("cleared");
                    }
                    _ => {}
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                model.tick(grid, now);
                sender.maybe_send(grid, now);
                sender.poll_echo();
            }
        }
    }
}

async fn run_cycle(
    sender: &mut Sender,
    grid: &mut GridState,
    amplitude: f32,
    on: Duration,
    off: Duration,
) -> anyhow::Result<()> {
    let steps = [
        (Polarity::Negative, on),
        (Polarity::Off, off),
        (Polarity::Positive, on),
        (Polarity::Off, off),
    ];
    let mut idx = 0;
    apply_step(grid, steps[idx].0, amplitude)?;
    let now = Instant::now();
    sender.send_now(grid, now);
    let mut next_switch = now + steps[idx].1;

    let mut tick = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tick.tick() => {
                let now = Instant::now();
                if now >= next_switch {
                    idx = (idx + 1) % steps.len();
                    apply_step(grid, steps[idx].0, amplitude)?;
                    // Send on switch, not just on the periodic cadence.
                    sender.send_now(grid, now);
                    next_switch = now + steps[idx].1;
                } else {
                    sender.maybe_send(grid, now);
                }
                sender.poll_echo();
            }
        }
    }
}

fn apply_step(grid: &mut GridState, polarity: Polarity, amplitude: f32) -> anyhow::Result<()> {
    let (rows, cols) = (grid.rows(), grid.cols());
    match polarity {
        Polarity::Off => grid.clear_all(),
        _ => grid.overwrite(all_cells(rows, cols), polarity, amplitude)?,
    }
    Ok(())
}

/// Triangle ramp over the drive percentage: up to 100, back down to 0,
/// repeat. Clamped at both ends, one update per step.
struct Ramp {
    pct: f64,
    step: f64,
    step_pct: f64,
}

impl Ramp {
    fn new(step_pct: f64) -> Self {
        Ramp {
            pct: 0.0,
            step: step_pct,
            step_pct,
        }
    }

    fn level(&self) -> f64 {
        self.pct / 100.0
    }

    fn advance(&mut self) {
        self.pct += self.step;
        if self.pct >= 100.0 {
            self.pct = 100.0;
            self.step = -self.step_pct;
        } else if self.pct <= 0.0 {
            self.pct = 0.0;
            self.step = self.step_pct;
        }
    }
}

async fn run_ramp(
    sender: &mut Sender,
    grid: &mut GridState,
    max_intensity: f32,
    step_pct: f64,
    update: Duration,
    direction: Polarity,
) -> anyhow::Result<()> {
    let mut ramp = Ramp::new(step_pct);

    apply_step(grid, direction, max_intensity * ramp.level() as f32)?;
    let now = Instant::now();
    sender.send_now(grid, now);
    // Deadlines accumulate so the ramp period doesn't drift with tick jitter.
    let mut next_update = now + update;

    let mut tick = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tick.tick() => {
                let now = Instant::now();
                if now >= next_update {
                    ramp.advance();
                    apply_step(grid, direction, max_intensity * ramp.level() as f32)?;
                    // Every update goes out; there is no slower send cadence
                    // for the ramp.
                    sender.send_now(grid, now);
                    next_update += update;
                }
                sender.poll_echo();
            }
        }
    }
}

async fn run_shape(
    sender: &mut Sender,
    grid: &mut GridState,
    mask: TargetMask,
    direction: Polarity,
    amplitude: f32,
) -> anyhow::Result<()> {
    grid.overwrite(mask.iter(), direction, amplitude)?;
    sender.send_now(grid, Instant::now());
    log::info!("holding shape ({} cells); ctrl-c to stop", mask.iter().count());

    let mut tick = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tick.tick() => {
                sender.maybe_send(grid, Instant::now());
                sender.poll_echo();
            }
        }
    }
}

async fn run_herd(
    sender: &mut Sender,
    grid: &mut GridState,
    mut engine: HerdFormationEngine,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let result = herd_loop(sender, grid, &mut engine).await;
    disable_raw_mode()?;
    engine.stop(grid);
    result
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Herd => "herd",
        Phase::Form => "form",
    }
}

async fn herd_loop(
    sender: &mut Sender,
    grid: &mut GridState,
    engine: &mut HerdFormationEngine,
) -> anyhow::Result<()> {
    say(&format!(
        "bands: {} (max distance)  space: start  s: stop  q: quit",
        engine.field().max_distance()
    ));
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    let mut last_phase = engine.phase();

    loop {
        tokio::select! {
            maybe_ev = events.next() => {
                let ev = match maybe_ev {
                    Some(Ok(ev)) => ev,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(anyhow!("event stream ended")),
                };
                let Event::Key(ev) = ev else { continue };
                if ev.kind != KeyEventKind::Press {
                    continue;
                }
                match ev.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char(' ') | KeyCode::Enter => {
                        let now = Instant::now();
                        engine.start(grid, now)?;
                        sender.send_now(grid, now);
                    }
                    KeyCode::Char('s') => {
                        engine.stop(grid);
                        sender.send_now(grid, Instant::now());
                    }
                    _ => {}
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                engine.advance(grid, now)?;
                if engine.phase() != Phase::Idle {
                    sender.maybe_send(grid, now);
                }
                sender.poll_echo();
            }
        }
        if engine.phase() != last_phase {
            say(&format!("state: {}", phase_name(engine.phase())));
            last_phase = engine.phase();
        }
    }
}

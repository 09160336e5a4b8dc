// SPDX-License-Identifier: MIT
//
// n-monitor — headless monitor cluster simulator.
//
// Builds a wall of monitor blocks, lets them merge, attaches a device,
// writes to the shared terminal and mirrors everything to a replica the
// way a remote observer would see it:
//
//   place blocks → membership engine merges them into one cluster
//   write text   → origin's terminal (created on first use)
//   tick         → resize events to devices, terminal queued for sync
//   flush        → geometry, then snapshots/patches → replica
//
// Then it touches the screen, knocks a block out of the middle and shows
// how the cluster split.
//
// Usage:
//
//   n-monitor [--config <file.toml>] [--width N] [--height N] [--rotation R]
//
// Logging goes to stderr and follows RUST_LOG (default: info).

use std::env;
use std::path::PathBuf;
use std::process;

use n_cluster::device::{DeviceEvent, DeviceId};
use n_cluster::geometry::{BlockPos, ChunkPos, Rotation};
use n_cluster::monitor::{Kind, Monitors};
use n_cluster::sync::{ObserverId, Watcher};
use n_cluster::world::{GridWorld, MonitorWorld};
use n_cluster::{MonitorConfig, ReplicaWorld};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const OBSERVER: ObserverId = ObserverId(0);
const DEVICE: DeviceId = DeviceId(0);

// ─── Command line ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Options {
    config: Option<PathBuf>,
    width: i32,
    height: i32,
    rotation: u8,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: None,
            width: 4,
            height: 3,
            rotation: 2,
        }
    }
}

fn usage() -> &'static str {
    "usage: n-monitor [--config <file.toml>] [--width N] [--height N] [--rotation R]"
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{name} needs a value\n{}", usage()))
        };
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--width" => options.width = parse_number("--width", &value("--width")?)?,
            "--height" => options.height = parse_number("--height", &value("--height")?)?,
            "--rotation" => options.rotation = parse_number("--rotation", &value("--rotation")?)?,
            "-h" | "--help" => return Err(usage().to_string()),
            other => return Err(format!("unknown argument `{other}`\n{}", usage())),
        }
    }
    if options.width < 1 || options.height < 1 {
        return Err("--width and --height must be at least 1".to_string());
    }
    Ok(options)
}

fn parse_number<T: std::str::FromStr>(name: &str, text: &str) -> Result<T, String> {
    text.parse()
        .map_err(|_| format!("{name} expects a number, got `{text}`"))
}

// ─── Simulation ─────────────────────────────────────────────────────────────

struct Simulation {
    config: MonitorConfig,
    rotation: Rotation,
    world: GridWorld,
    watcher: Watcher,
    replica: ReplicaWorld,
    events: Vec<(DeviceId, DeviceEvent)>,
}

impl Simulation {
    fn new(config: MonitorConfig, rotation: Rotation) -> Self {
        Self {
            config,
            rotation,
            world: GridWorld::new(),
            watcher: Watcher::new(),
            replica: ReplicaWorld::new(),
            events: Vec::new(),
        }
    }

    fn cell(&self, x: i32, y: i32) -> BlockPos {
        self.rotation.step(BlockPos::ORIGIN, x, y)
    }

    fn monitors(&mut self) -> Monitors<'_, GridWorld> {
        Monitors::new(&mut self.world, &self.config)
    }

    fn build_wall(&mut self, width: i32, height: i32) {
        for y in 0..height {
            for x in 0..width {
                let pos = self.cell(x, y);
                let rotation = self.rotation;
                self.monitors().place(pos, Kind::Advanced, rotation);
            }
        }
        let chunks: Vec<ChunkPos> = {
            let mut chunks: Vec<ChunkPos> = self
                .world
                .loaded_monitors()
                .into_iter()
                .map(BlockPos::chunk)
                .collect();
            chunks.sort_unstable();
            chunks.dedup();
            chunks
        };
        for chunk in chunks {
            self.watcher.watch_chunk(OBSERVER, chunk, &self.world);
        }
    }

    /// Run one authoritative tick and deliver its output to the replica.
    fn step(&mut self) {
        let mut events: Vec<(DeviceId, DeviceEvent)> = Vec::new();
        Monitors::new(&mut self.world, &self.config).tick_all(&mut events, &mut self.watcher);
        for (device, event) in &events {
            info!(%device, ?event, "device event");
        }
        self.events.extend(events);

        let outgoing = self.watcher.flush(&mut self.world);
        info!(messages = outgoing.len(), "flushed to observer");
        for message in outgoing {
            self.replica.apply(message.message);
        }
        for pos in self.replica.take_full_requests() {
            warn!(%pos, "replica asked for a full snapshot");
            self.watcher.request_full(OBSERVER, pos);
        }
    }

    fn print_replica_screen(&mut self, pos: BlockPos) {
        let Some(terminal) = self.replica.terminal(pos) else {
            println!("(no terminal at {pos})");
            return;
        };
        let (cols, rows) = terminal.size();
        let frame = "-".repeat(usize::from(cols));
        println!("+{frame}+");
        for y in 0..rows {
            let line = terminal.row_text(y).unwrap_or_default();
            println!("|{line}|");
        }
        println!("+{frame}+");
    }

    fn print_clusters(&mut self) {
        let positions = self.world.loaded_monitors();
        let monitors = self.monitors();
        for pos in positions {
            let Some(state) = monitors.state(pos) else {
                continue;
            };
            if !state.is_origin() {
                continue;
            }
            let size = monitors
                .terminal(pos)
                .map_or_else(|| "no terminal".to_string(), |t| format!("{}x{} chars", t.width(), t.height()));
            println!(
                "cluster at {pos}: {}x{} blocks, {size}",
                state.width, state.height
            );
        }
    }
}

fn run(options: &Options) -> Result<(), String> {
    let config = match &options.config {
        Some(path) => MonitorConfig::load(path).map_err(|e| format!("{}: {e}", path.display()))?,
        None => MonitorConfig::default(),
    };
    let rotation = Rotation::try_from(options.rotation).map_err(|e| e.to_string())?;
    info!(%rotation, width = options.width, height = options.height, "building wall");

    let mut sim = Simulation::new(config, rotation);
    sim.build_wall(options.width, options.height);
    sim.print_clusters();

    let origin = sim.cell(0, 0);
    let far_corner = sim.cell(options.width - 1, options.height - 1);
    {
        let mut monitors = sim.monitors();
        monitors.attach_device(origin, DEVICE);
        let terminal = monitors
            .terminal_mut(far_corner)
            .ok_or("the cluster origin is not loaded")?;
        let (cols, rows) = terminal.size();
        terminal.write("n-monitor");
        terminal.set_cursor(0, 1);
        terminal.write(&format!("{}x{} blocks", options.width, options.height));
        terminal.set_cursor(0, 2);
        terminal.write(&format!("{cols}x{rows} chars"));
    }
    sim.step();
    sim.print_replica_screen(far_corner);

    let centre = [0.5, 0.5, 0.5];
    let front = rotation.front();
    let mut touches: Vec<(DeviceId, DeviceEvent)> = Vec::new();
    match sim.monitors().touch(origin, front, centre, &mut touches) {
        Some((col, row)) => println!("touch at block {origin} -> character ({col}, {row})"),
        None => println!("touch at block {origin} missed the screen"),
    }
    sim.events.extend(touches);

    if options.width >= 3 {
        let middle = sim.cell(options.width / 2, 0);
        info!(%middle, "removing block");
        sim.monitors().remove(middle);
        sim.step();
        sim.print_clusters();
    }

    println!("devices received {} events", sim.events.len());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args(env::args().skip(1)).unwrap_or_else(|e| {
        eprintln!("n-monitor: {e}");
        process::exit(2);
    });

    if let Err(e) = run(&options) {
        eprintln!("n-monitor: {e}");
        process::exit(1);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn defaults_without_arguments() {
        let options = parse_args(args(&[])).unwrap();
        assert_eq!((options.width, options.height, options.rotation), (4, 3, 2));
        assert!(options.config.is_none());
    }

    #[test]
    fn all_flags_parse() {
        let options = parse_args(args(&[
            "--width", "2", "--height", "5", "--rotation", "9", "--config", "m.toml",
        ]))
        .unwrap();
        assert_eq!((options.width, options.height, options.rotation), (2, 5, 9));
        assert_eq!(options.config, Some(PathBuf::from("m.toml")));
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert!(parse_args(args(&["--width"])).unwrap_err().contains("needs a value"));
        assert!(parse_args(args(&["--width", "x"])).unwrap_err().contains("expects a number"));
        assert!(parse_args(args(&["--width", "0"])).is_err());
        assert!(parse_args(args(&["--bogus"])).unwrap_err().contains("unknown argument"));
    }

    #[test]
    fn simulation_merges_and_mirrors() {
        let mut sim = Simulation::new(MonitorConfig::default(), Rotation::NORTH);
        sim.build_wall(3, 2);
        let origin = sim.cell(0, 0);
        sim.monitors().attach_device(origin, DEVICE);
        sim.monitors().terminal_mut(origin).unwrap().write("ok");
        sim.step();

        let corner = sim.cell(2, 1);
        assert_eq!(sim.replica.state(corner).unwrap().width, 3);
        let terminal = sim.replica.terminal(corner).unwrap();
        assert_eq!(terminal.row_text(0).unwrap().trim_end(), "ok");
        assert!(matches!(sim.events.first(), Some((DEVICE, DeviceEvent::Resize { .. }))));
    }
}

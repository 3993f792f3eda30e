use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;

use dotmatrix_core::cartridge::{Cartridge, CartridgeError};
use dotmatrix_core::gameboy::{GameBoy, CYCLES_PER_FRAME};
use dotmatrix_core::host::{Frame, HostAudio, HostError, HostVideo, NullAudio, StereoSample};

mod opcodes;

const EXIT_OK: i32 = 0;
const EXIT_USAGE: i32 = 1;
const EXIT_LOAD: i32 = 2;
const EXIT_UNSUPPORTED: i32 = 3;

// Shade characters per palette index, darkest last.
const PALETTES: [[char; 4]; 4] = [
    [' ', '░', '▒', '█'],
    [' ', '.', 'o', '@'],
    ['█', '▒', '░', ' '],
    [' ', '-', '=', '#'],
];

#[derive(Parser)]
#[command(name = "dotmatrix", about = "Headless Game Boy (DMG) emulator")]
struct Args {
    /// ROM file location
    #[arg(short = 'f', long = "file")]
    rom: PathBuf,

    /// Debug mode: periodic CPU state and serial output dumps
    #[arg(short = 'd', long)]
    debug: bool,

    /// Step mode: single-step instructions from the start (implies -d)
    #[arg(short = 's', long)]
    step: bool,

    /// Output mode; "silent" discards audio samples
    #[arg(short = 'm', long)]
    mode: Option<String>,

    /// Breakpoints, ';'-separated: PC=XXXX, OPC=YY or OPN=name
    #[arg(short = 'b', long)]
    breakpoints: Option<String>,

    /// Palette index for the final frame dump (0..=3)
    #[arg(short = 'c', long)]
    palette: Option<usize>,

    /// Delay between frames in milliseconds, to stretch pacing
    #[arg(short = 't', long)]
    tick_millis: Option<u64>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many seconds of host time
    #[arg(long)]
    seconds: Option<u64>,
}

enum Breakpoint {
    Pc(u16),
    Opcode(u8),
    Name(String),
}

fn parse_breakpoints(spec: &str) -> Result<Vec<Breakpoint>, String> {
    let mut out = Vec::new();
    for part in spec.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("malformed breakpoint {part:?}"))?;
        match key.trim().to_ascii_uppercase().as_str() {
            "PC" => {
                let pc = u16::from_str_radix(value.trim(), 16)
                    .map_err(|_| format!("bad PC value {value:?}"))?;
                out.push(Breakpoint::Pc(pc));
            }
            "OPC" => {
                let op = u8::from_str_radix(value.trim(), 16)
                    .map_err(|_| format!("bad opcode value {value:?}"))?;
                out.push(Breakpoint::Opcode(op));
            }
            "OPN" => out.push(Breakpoint::Name(value.trim().to_ascii_lowercase())),
            other => return Err(format!("unknown breakpoint key {other:?}")),
        }
    }
    Ok(out)
}

/// Keeps the most recent frame and counts presentations.
struct FrameSink {
    last: Box<Frame>,
    frames: u64,
}

impl FrameSink {
    fn new() -> Self {
        Self {
            last: Box::new([[0; 160]; 144]),
            frames: 0,
        }
    }

    fn dump(&self, palette: usize) {
        let shades = PALETTES[palette.min(PALETTES.len() - 1)];
        let mut out = String::with_capacity(145 * 161);
        for row in self.last.iter() {
            for &px in row.iter() {
                out.push(shades[px as usize & 3]);
            }
            out.push('\n');
        }
        print!("{out}");
    }
}

impl HostVideo for FrameSink {
    fn present(&mut self, frame: &Frame) -> Result<(), HostError> {
        *self.last = *frame;
        self.frames += 1;
        Ok(())
    }
}

/// Discards samples but keeps a running count for diagnostics.
struct CountingAudio {
    samples: u64,
}

impl HostAudio for CountingAudio {
    fn enqueue(&mut self, samples: &[StereoSample], _sample_rate: u32) -> Result<(), HostError> {
        self.samples += samples.len() as u64;
        Ok(())
    }
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return EXIT_USAGE;
        }
    };
    let breakpoints = match args.breakpoints.as_deref().map(parse_breakpoints) {
        Some(Ok(bps)) => bps,
        Some(Err(e)) => {
            eprintln!("invalid breakpoint spec: {e}");
            return EXIT_USAGE;
        }
        None => Vec::new(),
    };
    if let Some(idx) = args.palette {
        if idx >= PALETTES.len() {
            eprintln!("palette index {idx} out of range (0..={})", PALETTES.len() - 1);
            return EXIT_USAGE;
        }
    }

    let cart = match Cartridge::from_file(&args.rom) {
        Ok(cart) => cart,
        Err(CartridgeError::UnsupportedCartridge(kind)) => {
            eprintln!("unsupported cartridge type {kind:#04X}");
            return EXIT_UNSUPPORTED;
        }
        Err(e) => {
            eprintln!("failed to load ROM: {e}");
            return EXIT_LOAD;
        }
    };

    let mut gb = GameBoy::new();
    gb.load_cart(cart);

    let debug = args.debug || args.step;
    let silent = args.mode.as_deref() == Some("silent");
    let mut video = FrameSink::new();
    let mut null_audio = NullAudio;
    let mut counting_audio = CountingAudio { samples: 0 };

    let mut stepping = args.step;
    let start = Instant::now();
    info!("starting emulation");

    'outer: while !gb.stopped() {
        if stepping || !breakpoints.is_empty() {
            // Debug path: advance one m-cycle at a time so breakpoints and
            // stepping land on instruction boundaries.
            let mut t = 0;
            while t < CYCLES_PER_FRAME {
                if gb.cpu.at_instruction_boundary() {
                    let pc = gb.cpu.pc;
                    let opcode = gb.mem.read(pc);
                    if !stepping && breakpoint_hit(&breakpoints, pc, opcode) {
                        println!(
                            "breakpoint at PC={pc:04X} ({:02X} {})",
                            opcode,
                            opcodes::name(opcode)
                        );
                        stepping = true;
                    }
                    if stepping {
                        match prompt_step(&gb, pc, opcode) {
                            StepCommand::Step => {}
                            StepCommand::Continue => stepping = false,
                            StepCommand::Quit => break 'outer,
                        }
                    }
                }
                let audio: &mut dyn HostAudio = if silent {
                    &mut null_audio
                } else {
                    &mut counting_audio
                };
                gb.step_cycles(4, &mut video, audio);
                t += 4;
                if gb.stopped() {
                    break 'outer;
                }
            }
        } else if silent {
            gb.step_cycles(CYCLES_PER_FRAME, &mut video, &mut null_audio);
        } else {
            gb.step_cycles(CYCLES_PER_FRAME, &mut video, &mut counting_audio);
        }

        if debug && video.frames % 60 == 0 {
            dump_serial(&mut gb);
            println!("{}", gb.cpu.debug_state());
        }

        if let Some(limit) = args.frames {
            if video.frames >= limit {
                break;
            }
        }
        if let Some(limit) = args.seconds {
            if start.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }
        if let Some(millis) = args.tick_millis {
            std::thread::sleep(Duration::from_millis(millis));
        }
    }

    gb.save_cart_ram();
    dump_serial(&mut gb);
    if let Some(palette) = args.palette {
        video.dump(palette);
    }
    info!(
        "ran {} frames, {} audio samples",
        video.frames, counting_audio.samples
    );
    EXIT_OK
}

fn breakpoint_hit(breakpoints: &[Breakpoint], pc: u16, opcode: u8) -> bool {
    breakpoints.iter().any(|bp| match bp {
        Breakpoint::Pc(addr) => *addr == pc,
        Breakpoint::Opcode(op) => *op == opcode,
        Breakpoint::Name(name) => opcodes::name(opcode) == name,
    })
}

enum StepCommand {
    Step,
    Continue,
    Quit,
}

/// Show the next instruction and wait for a command: Enter steps, `c`
/// resumes free running, `q` quits.
fn prompt_step(gb: &GameBoy, pc: u16, opcode: u8) -> StepCommand {
    println!("{}", gb.cpu.debug_state());
    print!("{pc:04X}: {opcode:02X} {} > ", opcodes::name(opcode));
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return StepCommand::Quit;
    }
    match line.trim() {
        "q" | "quit" => StepCommand::Quit,
        "c" | "continue" => StepCommand::Continue,
        _ => StepCommand::Step,
    }
}

fn dump_serial(gb: &mut GameBoy) {
    let serial = gb.take_serial();
    if serial.is_empty() {
        return;
    }
    print!("[serial] ");
    for b in &serial {
        if b.is_ascii_graphic() || *b == b' ' {
            print!("{}", *b as char);
        } else {
            print!("\\x{b:02X}");
        }
    }
    println!();
}

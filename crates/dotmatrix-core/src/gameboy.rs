use log::warn;

use crate::{
    apu::Apu,
    cartridge::Cartridge,
    cpu::Cpu,
    host::{HostAudio, HostInput, HostVideo},
    memory::Memory,
    ppu::Ppu,
    serial::Serial,
    timer::Timer,
};

/// 4,194,304 Hz master clock over a 59.7 Hz frame.
pub const CYCLES_PER_FRAME: u32 = 70_224;

const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

// DMG post-boot I/O register bytes (gbdev.io/pandocs/Power_Up_State.html).
// Stored raw; read masks reproduce the documented values.
const BOOT_IO: &[(u16, u8)] = &[
    (0xFF00, 0x00), // P1: both matrix rows selected
    (0xFF04, 0xAB), // DIV
    (0xFF0F, 0x01), // IF: vblank already pending
    (0xFF10, 0x80),
    (0xFF11, 0xBF),
    (0xFF12, 0xF3),
    (0xFF13, 0xFF),
    (0xFF14, 0xBF),
    (0xFF16, 0x3F),
    (0xFF18, 0xFF),
    (0xFF19, 0xBF),
    (0xFF1A, 0x7F),
    (0xFF1B, 0xFF),
    (0xFF1C, 0x9F),
    (0xFF1D, 0xFF),
    (0xFF1E, 0xBF),
    (0xFF20, 0xFF),
    (0xFF23, 0xBF),
    (0xFF24, 0x77),
    (0xFF25, 0xF3),
    (0xFF26, 0xF1), // NR52: APU on, channel 1 playing the boot chime
    (0xFF40, 0x91), // LCDC
    (0xFF41, 0x85), // STAT
    (0xFF46, 0xFF), // DMA
    (0xFF47, 0xFC), // BGP
];

/// The assembled machine. Peripherals are peers: each step borrows the bus
/// for its duration, and cross-component effects travel through
/// memory-mapped registers and the IF/IE bits.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mem: Memory,
    pub timer: Timer,
    pub ppu: Ppu,
    pub apu: Apu,
    pub serial: Serial,
    /// t-cycle phase within the current m-cycle.
    phase: u32,
    rtc_counter: u32,
}

impl GameBoy {
    /// Machine in the DMG post-boot-ROM state; no cartridge loaded.
    pub fn new() -> Self {
        let mut mem = Memory::new();
        for &(addr, val) in BOOT_IO {
            mem.set_reg(addr, val);
        }
        Self {
            cpu: Cpu::new(),
            mem,
            timer: Timer::new(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            serial: Serial::new(),
            phase: 0,
            rtc_counter: 0,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.mem.load_cart(cart);
    }

    /// Latch input and run one frame (70,224 t-cycles).
    pub fn run_frame(
        &mut self,
        video: &mut dyn HostVideo,
        audio: &mut dyn HostAudio,
        input: &mut dyn HostInput,
    ) {
        self.mem.set_buttons(input.buttons());
        self.step_cycles(CYCLES_PER_FRAME, video, audio);
    }

    /// Advance the master clock. Per t-cycle the order is fixed: Timer,
    /// APU, serial; on every fourth tick the CPU executes, the OAM DMA
    /// engine moves one byte and the PPU observes the result. A raised
    /// stop latch ends the run at the end of the current tick.
    pub fn step_cycles(
        &mut self,
        t_cycles: u32,
        video: &mut dyn HostVideo,
        audio: &mut dyn HostAudio,
    ) {
        for _ in 0..t_cycles {
            self.timer.step(&mut self.mem);
            self.apu.step(&mut self.mem, audio);
            self.serial.step(&mut self.mem);
            if self.phase == 0 {
                self.cpu.step(&mut self.mem);
                self.mem.dma_step();
                self.ppu.step(&mut self.mem);
                if self.ppu.take_frame_ready() {
                    if let Err(e) = video.present(self.ppu.framebuffer()) {
                        warn!("video sink fault, dropping frame: {e}");
                    }
                }
            }
            self.phase = (self.phase + 1) & 3;

            self.rtc_counter += 1;
            if self.rtc_counter == RTC_CYCLES_PER_SECOND {
                self.rtc_counter = 0;
                if let Some(cart) = self.mem.cart.as_mut() {
                    cart.tick_rtc();
                }
            }

            if self.cpu.stopped {
                break;
            }
        }
    }

    pub fn stopped(&self) -> bool {
        self.cpu.stopped
    }

    /// Bytes written out of the serial port since the last call.
    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    pub fn save_cart_ram(&self) {
        if let Some(cart) = self.mem.cart.as_ref() {
            if let Err(e) = cart.save_ram() {
                warn!("failed to save cartridge RAM: {e}");
            }
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}

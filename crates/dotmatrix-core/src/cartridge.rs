use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::info;
use thiserror::Error;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Error)]
pub enum CartridgeError {
    /// Header byte 0x0147 names a mapper this build does not implement.
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedCartridge(u8),
    /// File size disagrees with the ROM-size code in the header.
    #[error("ROM is {actual} bytes but the header declares {declared}")]
    MalformedRom { actual: usize, declared: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        /// 5-bit ROM bank register; 0 is promoted to 1.
        rom_bank: u8,
        /// 2-bit RAM bank / upper ROM bits register.
        ram_bank: u8,
        /// 0 = the 2-bit register extends the ROM bank, 1 = it selects RAM.
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        /// 4-bit ROM bank register.
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        /// 7-bit ROM bank register; 0 is promoted to 1.
        rom_bank: u8,
        /// 0..=3 select RAM banks, 0x08..=0x0C select RTC registers.
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_pending: bool,
    },
    Mbc5 {
        /// 9-bit ROM bank register; bank 0 is addressable.
        rom_bank: u16,
        /// 4-bit RAM bank register.
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    /// 9-bit day counter.
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 real-time clock. Ticked once per emulated second by the
/// orchestrator; reads go through the latched snapshot.
#[derive(Debug, Default)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
}

impl Rtc {
    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => self.regs.seconds = value & 0x3F,
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    /// Advance the live registers by one second, cascading S -> M -> H -> day.
    /// DH bit 6 halts the clock; day overflow past 511 sets the carry flag.
    fn tick_second(&mut self) {
        if self.regs.halt {
            return;
        }
        self.regs.seconds = (self.regs.seconds + 1) & 0x3F;
        if self.regs.seconds != 60 {
            return;
        }
        self.regs.seconds = 0;
        self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        if self.regs.minutes != 60 {
            return;
        }
        self.regs.minutes = 0;
        self.regs.hours = (self.regs.hours + 1) & 0x1F;
        if self.regs.hours != 24 {
            return;
        }
        self.regs.hours = 0;
        if self.regs.days == 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    cart_type: u8,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Parse a ROM image, validating the header and selecting the mapper.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data);

        let declared = header.rom_size();
        if data.len() != declared {
            return Err(CartridgeError::MalformedRom {
                actual: data.len(),
                declared,
            });
        }

        let cart_type = header.cart_type();
        let mbc = header
            .mbc_type()
            .ok_or(CartridgeError::UnsupportedCartridge(cart_type))?;
        let title = header.title();
        let ram_size = header.ram_size();

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: header.has_rtc().then(Rtc::default),
                latch_pending: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            cart_type,
            save_path: None,
            mbc_state,
        })
    }

    /// Load a ROM file, picking up a `.sav` sidecar for battery carts.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data)?;

        if cart.has_battery() {
            let mut save = PathBuf::from(path.as_ref());
            save.set_extension("sav");
            if let Ok(bytes) = fs::read(&save) {
                for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                    *d = *s;
                }
            }
            cart.save_path = Some(save);
        }

        info!(
            "loaded ROM: {} ({:?}, {} KiB, {} KiB RAM)",
            cart.title,
            cart.mbc,
            cart.rom.len() / 1024,
            cart.ram.len() / 1024
        );
        Ok(cart)
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = (self.rom.len() / ROM_BANK_SIZE).max(1);
        match (&self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // In mode 1 large carts map bank N<<5 over the fixed area.
                let bank = if *mode == 1 {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                } else {
                    0
                };
                let offset = bank * ROM_BANK_SIZE + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let mut bank = (((*ram_bank as usize) & 0x03) << 5) | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank %= rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF)
            | (MbcState::Mbc5 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize & 0x0F).max(1) % rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize).max(1) % rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (*rom_bank as usize) % rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                let idx = self.ram_index(addr);
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                // 512 half-bytes mirrored across the window; the upper
                // nibble is open bus and reads as ones.
                let idx = (addr as usize - 0xA000) & 0x01FF;
                0xF0 | (self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F)
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    return 0xFF;
                }
                match *ram_bank {
                    0x00..=0x03 => {
                        let idx = self.ram_index(addr);
                        self.ram.get(idx).copied().unwrap_or(0xFF)
                    }
                    0x08..=0x0C => rtc
                        .as_ref()
                        .map(|r| r.read_latched(*ram_bank))
                        .unwrap_or(0xFF),
                    _ => 0xFF,
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    return 0xFF;
                }
                let idx = self.ram_index(addr);
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 splits the shared register range: clear
                // selects RAM enable, set selects the ROM bank.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (
                MbcState::Mbc3 {
                    latch_pending, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                // Writing 0x00 then 0x01 copies the live clock into the
                // latched registers.
                if val == 0x00 {
                    *latch_pending = true;
                } else {
                    if val == 0x01 && *latch_pending {
                        if let Some(rtc) = rtc {
                            rtc.latch();
                        }
                    }
                    *latch_pending = false;
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    return;
                }
                match *ram_bank {
                    0x00..=0x03 => {
                        let idx = (*ram_bank as usize) * RAM_BANK_SIZE + addr as usize - 0xA000;
                        if let Some(b) = self.ram.get_mut(idx) {
                            *b = val;
                        }
                    }
                    0x08..=0x0C => {
                        let bank = *ram_bank;
                        if let Some(rtc) = rtc.as_mut() {
                            rtc.write_register(bank, val);
                        }
                    }
                    _ => {}
                }
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let offset = addr as usize - 0xA000;
        match &self.mbc_state {
            MbcState::Mbc1 { ram_bank, mode, .. } => {
                if *mode == 1 {
                    (*ram_bank as usize) * RAM_BANK_SIZE % self.ram.len().max(1) + offset
                } else {
                    offset
                }
            }
            MbcState::Mbc3 { ram_bank, .. } => {
                ((*ram_bank as usize) & 0x03) * RAM_BANK_SIZE + offset
            }
            MbcState::Mbc5 { ram_bank, .. } => (*ram_bank as usize) * RAM_BANK_SIZE + offset,
            _ => offset,
        }
    }

    /// Advance the MBC3 RTC by one emulated second. No-op for other mappers.
    pub fn tick_rtc(&mut self) {
        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &mut self.mbc_state {
            rtc.tick_second();
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    /// Write battery-backed RAM to the `.sav` sidecar, if any.
    pub fn save_ram(&self) -> io::Result<()> {
        if let (true, Some(path)) = (self.has_battery(), &self.save_path) {
            if !self.ram.is_empty() {
                fs::write(path, &self.ram)?;
            }
        }
        Ok(())
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let end = 0x0143.min(self.data.len());
        let mut slice = &self.data[0x0134.min(self.data.len())..end];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cart_type(&self) -> u8 {
        self.data.get(0x0147).copied().unwrap_or(0)
    }

    fn mbc_type(&self) -> Option<MbcType> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Some(MbcType::NoMbc),
            0x01..=0x03 => Some(MbcType::Mbc1),
            0x05 | 0x06 => Some(MbcType::Mbc2),
            0x0F..=0x13 => Some(MbcType::Mbc3),
            0x19..=0x1E => Some(MbcType::Mbc5),
            _ => None,
        }
    }

    fn has_rtc(&self) -> bool {
        matches!(self.cart_type(), 0x0F | 0x10 | 0x13)
    }

    fn rom_size(&self) -> usize {
        // Code N means 2^(N+1) banks of 16 KiB.
        let code = self.data.get(0x0148).copied().unwrap_or(0).min(8) as u32;
        (2 * ROM_BANK_SIZE) << code
    }

    fn ram_size(&self) -> usize {
        // MBC2 carries 512x4-bit internal RAM regardless of the header.
        if matches!(self.cart_type(), 0x05 | 0x06) {
            return 0x200;
        }
        match self.data.get(0x0149).copied().unwrap_or(0) {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => RAM_BANK_SIZE,
            0x03 => 4 * RAM_BANK_SIZE,
            0x04 => 16 * RAM_BANK_SIZE,
            0x05 => 8 * RAM_BANK_SIZE,
            _ => RAM_BANK_SIZE,
        }
    }
}

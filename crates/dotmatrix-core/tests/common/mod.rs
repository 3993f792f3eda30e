use dotmatrix_core::cartridge::Cartridge;
use dotmatrix_core::gameboy::GameBoy;
use dotmatrix_core::host::{NullAudio, NullVideo};

/// 32 KiB no-MBC ROM image with `program` placed at the entry point 0x0100.
#[allow(dead_code)]
pub fn rom_with_program(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    rom
}

pub fn gb_with_program(program: &[u8]) -> GameBoy {
    let mut gb = GameBoy::new();
    let cart = Cartridge::load(rom_with_program(program)).expect("synthetic ROM should load");
    gb.load_cart(cart);
    gb
}

/// Run the machine for `n` CPU m-cycles with null hosts.
#[allow(dead_code)]
pub fn step_m_cycles(gb: &mut GameBoy, n: u32) {
    gb.step_cycles(n * 4, &mut NullVideo, &mut NullAudio);
}

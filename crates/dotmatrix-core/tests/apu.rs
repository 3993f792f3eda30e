use dotmatrix_core::apu::Apu;
use dotmatrix_core::host::{HostAudio, HostError, NullAudio, StereoSample};
use dotmatrix_core::memory::Memory;

/// Memory and APU with a clean power cycle applied (the post-boot state
/// leaves channel 1 playing, which most tests don't want).
fn setup() -> (Memory, Apu) {
    let mut mem = Memory::new();
    let mut apu = Apu::new();
    mem.write(0xFF26, 0x00);
    apu.step(&mut mem, &mut NullAudio);
    mem.write(0xFF26, 0x80);
    apu.step(&mut mem, &mut NullAudio);
    (mem, apu)
}

/// Produce one frame-sequencer edge: DIV bit 4 high then low.
fn sequencer_edge(mem: &mut Memory, apu: &mut Apu) {
    mem.set_reg(0xFF04, 0x10);
    apu.step(mem, &mut NullAudio);
    mem.set_reg(0xFF04, 0x00);
    apu.step(mem, &mut NullAudio);
}

#[test]
fn length_counter_expiry_disables_channel() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF12, 0xF0); // DAC on, full volume
    mem.write(0xFF11, 0x3F); // length counter = 1
    mem.write(0xFF14, 0xC0); // trigger + length enable
    apu.step(&mut mem, &mut NullAudio);
    assert!(apu.channel_enabled(0));
    assert_eq!(mem.read(0xFF26) & 0x01, 0x01);

    // The first sequencer step is 0, a length step.
    sequencer_edge(&mut mem, &mut apu);
    assert!(!apu.channel_enabled(0));
    assert_eq!(mem.read(0xFF26) & 0x01, 0x00);
}

#[test]
fn trigger_with_zero_length_reloads_to_max() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF12, 0xF0);
    mem.write(0xFF14, 0x80); // trigger, length counter still 0
    apu.step(&mut mem, &mut NullAudio);
    mem.write(0xFF14, 0x40); // now enable length counting
    apu.step(&mut mem, &mut NullAudio);

    // 64 length clocks, one per two sequencer edges.
    for _ in 0..126 {
        sequencer_edge(&mut mem, &mut apu);
    }
    assert!(apu.channel_enabled(0), "one length tick should remain");
    sequencer_edge(&mut mem, &mut apu);
    sequencer_edge(&mut mem, &mut apu);
    assert!(!apu.channel_enabled(0));
}

#[test]
fn wave_length_runs_to_256() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF1A, 0x80); // wave DAC on
    mem.write(0xFF1B, 0xFE); // length counter = 2
    mem.write(0xFF1E, 0xC0); // trigger + length enable
    apu.step(&mut mem, &mut NullAudio);
    assert!(apu.channel_enabled(2));

    sequencer_edge(&mut mem, &mut apu);
    assert!(apu.channel_enabled(2));
    sequencer_edge(&mut mem, &mut apu);
    sequencer_edge(&mut mem, &mut apu);
    assert!(!apu.channel_enabled(2));
}

#[test]
fn silent_dac_forces_channel_off_within_a_cycle() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF17, 0xF0);
    mem.write(0xFF19, 0x80);
    apu.step(&mut mem, &mut NullAudio);
    assert!(apu.channel_enabled(1));

    // Upper five bits of NR22 cleared: DAC off, channel dies on the next
    // t-cycle.
    mem.write(0xFF17, 0x00);
    apu.step(&mut mem, &mut NullAudio);
    assert!(!apu.channel_enabled(1));
    assert_eq!(mem.read(0xFF26) & 0x02, 0);
}

#[test]
fn power_off_clears_and_locks_registers() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF10, 0x55);
    mem.write(0xFF24, 0x77);
    mem.write(0xFF25, 0xF3);
    mem.write(0xFF26, 0x00);
    apu.step(&mut mem, &mut NullAudio);

    // NR10..NR51 read back as mask-only values.
    assert_eq!(mem.read(0xFF10), 0x80);
    assert_eq!(mem.read(0xFF24), 0x00);
    assert_eq!(mem.read(0xFF25), 0x00);
    assert_eq!(mem.read(0xFF26) & 0x8F, 0x00);

    // Writes are ignored while powered down, except wave RAM.
    mem.write(0xFF12, 0xF0);
    assert_eq!(mem.read(0xFF12), 0x00);
    mem.write(0xFF3A, 0xAB);
    assert_eq!(mem.read(0xFF3A), 0xAB);

    // Power back on: registers accept writes again.
    mem.write(0xFF26, 0x80);
    apu.step(&mut mem, &mut NullAudio);
    mem.write(0xFF12, 0xF0);
    assert_eq!(mem.read(0xFF12), 0xF0);
}

#[test]
fn sweep_overflow_at_trigger_disables_channel() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF10, 0x01); // shift 1
    mem.write(0xFF12, 0xF0);
    mem.write(0xFF13, 0x00);
    mem.write(0xFF14, 0x87); // trigger with frequency 0x700
    apu.step(&mut mem, &mut NullAudio);
    // 1792 + 896 > 2047: the trigger-time overflow check kills it.
    assert!(!apu.channel_enabled(0));
}

#[test]
fn sweep_clock_updates_frequency_registers() {
    let (mut mem, mut apu) = setup();

    mem.write(0xFF10, 0x11); // period 1, add, shift 1
    mem.write(0xFF12, 0xF0);
    mem.write(0xFF13, 0x00);
    mem.write(0xFF14, 0x81); // trigger with frequency 0x100
    apu.step(&mut mem, &mut NullAudio);
    assert!(apu.channel_enabled(0));

    // Steps 0 and 1 don't clock the sweep; step 2 does: 256 + 128 = 384.
    sequencer_edge(&mut mem, &mut apu);
    sequencer_edge(&mut mem, &mut apu);
    sequencer_edge(&mut mem, &mut apu);
    assert_eq!(mem.reg(0xFF13), 0x80);
    assert_eq!(mem.reg(0xFF14) & 0x07, 0x01);
}

#[test]
fn sampler_produces_one_pair_per_95_cycles() {
    let (mut mem, mut apu) = setup();
    for _ in 0..95 {
        apu.step(&mut mem, &mut NullAudio);
    }
    assert_eq!(apu.buffered_samples(), 1);
    for _ in 0..95 {
        apu.step(&mut mem, &mut NullAudio);
    }
    assert_eq!(apu.buffered_samples(), 2);
}

#[test]
fn full_buffer_is_flushed_to_the_host() {
    struct Collecting {
        flushes: Vec<usize>,
        rate: u32,
    }
    impl HostAudio for Collecting {
        fn enqueue(&mut self, samples: &[StereoSample], rate: u32) -> Result<(), HostError> {
            self.flushes.push(samples.len());
            self.rate = rate;
            Ok(())
        }
    }

    let (mut mem, mut apu) = setup();
    let mut host = Collecting {
        flushes: Vec::new(),
        rate: 0,
    };
    for _ in 0..95 * 4096 {
        apu.step(&mut mem, &mut host);
    }
    assert_eq!(host.flushes, vec![4096]);
    assert_eq!(host.rate, 44_100);
    assert_eq!(apu.buffered_samples(), 0);
}

#[test]
fn audio_sink_fault_drops_buffer_and_continues() {
    struct Failing;
    impl HostAudio for Failing {
        fn enqueue(&mut self, _: &[StereoSample], _: u32) -> Result<(), HostError> {
            Err(HostError("backpressure".into()))
        }
    }

    let (mut mem, mut apu) = setup();
    let mut host = Failing;
    for _ in 0..95 * 4200 {
        apu.step(&mut mem, &mut host);
    }
    // The failed flush was dropped rather than accumulated.
    assert!(apu.buffered_samples() < 4096);
}

#[test]
fn nr52_reports_power_and_channel_bits() {
    let (mut mem, mut apu) = setup();
    // Bits 4-6 always read high; power bit reflects NR52 bit 7.
    assert_eq!(mem.read(0xFF26) & 0xF0, 0xF0);

    mem.write(0xFF12, 0xF0);
    mem.write(0xFF14, 0x80);
    mem.write(0xFF21, 0xF0);
    mem.write(0xFF23, 0x80);
    apu.step(&mut mem, &mut NullAudio);
    assert_eq!(mem.read(0xFF26) & 0x0F, 0x09); // channels 1 and 4
}

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gbcart_core::{ManualClock, CPU_CLOCK_HZ};
use gbcart_gb::mappers::{Mapper, Mbc1, Mbc3, Mbc5};

const ROM_BANKS: usize = 64;

fn bench_rom() -> Vec<u8> {
    (0..ROM_BANKS * 0x4000).map(|i| (i >> 14) as u8).collect()
}

fn mappers() -> Vec<Mapper> {
    vec![
        Mapper::Mbc1(Mbc1::new(bench_rom(), vec![0; 0x2000], None)),
        Mapper::Mbc3(Mbc3::new(
            bench_rom(),
            vec![0; 0x8000],
            true,
            Box::new(ManualClock::new(0)),
        )),
        Mapper::Mbc5(Mbc5::new(bench_rom(), vec![0; 0x8000], None, false)),
    ]
}

fn bench_switchable_rom_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapper_rom_read");

    for mut mapper in mappers() {
        mapper.write(0x2000, 0x05);
        group.bench_function(mapper.name(), |b| {
            b.iter(|| {
                let mut sum = 0u32;
                for addr in (0x4000..0x8000u16).step_by(64) {
                    sum = sum.wrapping_add(mapper.read(black_box(addr)) as u32);
                }
                black_box(sum);
            });
        });
    }

    group.finish();
}

fn bench_bank_switching(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapper_bank_switch");

    for mut mapper in mappers() {
        let name = mapper.name();
        group.bench_function(name, |b| {
            b.iter(|| {
                for bank in 1..ROM_BANKS as u8 {
                    mapper.write(0x2000, black_box(bank));
                    black_box(mapper.read(0x4000));
                }
            });
        });
    }

    group.finish();
}

fn bench_ram_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapper_ram");

    for mut mapper in mappers() {
        mapper.write(0x0000, 0x0A);
        group.bench_function(mapper.name(), |b| {
            b.iter(|| {
                for addr in (0xA000..0xC000u16).step_by(32) {
                    mapper.write(addr, addr as u8);
                    black_box(mapper.read(addr));
                }
            });
        });
    }

    group.finish();
}

fn bench_rtc_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("mbc3_rtc_tick");

    for batch in [456u32, 70_224, CPU_CLOCK_HZ].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &cycles| {
            let mut mapper = Mapper::Mbc3(Mbc3::new(
                bench_rom(),
                vec![],
                true,
                Box::new(ManualClock::new(0)),
            ));
            b.iter(|| {
                mapper.tick(black_box(cycles));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_switchable_rom_reads,
    bench_bank_switching,
    bench_ram_access,
    bench_rtc_tick
);
criterion_main!(benches);

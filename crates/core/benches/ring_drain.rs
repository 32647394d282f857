// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use labwired_cpm::peripherals::cpm::pram::{self, SccParams};
use labwired_cpm::{Cpm, LinearMemory, SystemMemory, Unwired, VirtualClock, Window};

const RING: u64 = 0x40;
const DESCRIPTORS: u64 = 8;

fn ready_cpm() -> Cpm {
    let mut cpm = Cpm::new(
        Box::new(LinearMemory::new(0x1_0000, 0)),
        Box::new(Unwired),
        Box::new(VirtualClock::new()),
    );
    let page = SccParams::page(0).base();
    cpm.write_dpram(page + pram::RBASE, 2, RING as u32).unwrap();
    cpm.write_dpram(page + pram::MRBLR, 2, 16).unwrap();
    cpm.write_window(Window::Command, 0, 4, 0x0081_0000);
    cpm
}

fn arm_ring(cpm: &mut Cpm) {
    for i in 0..DESCRIPTORS {
        let bd = RING + i * 8;
        let status = if i == DESCRIPTORS - 1 { 0xb000 } else { 0x9000 };
        cpm.write_dpram(bd, 2, status).unwrap();
        cpm.write_dpram(bd + 4, 4, 0x1000 + (i as u32) * 0x100).unwrap();
    }
}

fn bench_receive(c: &mut Criterion) {
    let mut cpm = ready_cpm();
    let payload: Vec<u8> = (0..32u8).collect();

    c.bench_function("rx_drain_32_bytes", |b| {
        b.iter(|| {
            arm_ring(&mut cpm);
            cpm.receive(black_box(&payload));
            cpm.poll_rx();
            cpm.poll_rx();
        })
    });
}

fn bench_register_access(c: &mut Criterion) {
    let mut cpm = ready_cpm();
    c.bench_function("scce_byte_clear", |b| {
        b.iter(|| {
            cpm.write_window(Window::Channels, 0x11, 1, black_box(0x02));
            black_box(cpm.read_window(Window::Channels, 0x10, 2))
        })
    });
}

fn bench_memory(c: &mut Criterion) {
    let mut mem = LinearMemory::new(0x1000, 0);
    c.bench_function("be_u32_store", |b| {
        b.iter(|| SystemMemory::write_u32(&mut mem, black_box(0x100), 0x1234_5678))
    });
}

criterion_group!(benches, bench_receive, bench_register_access, bench_memory);
criterion_main!(benches);

//! Steady-state rendering must never touch the heap.
//!
//! Kept in its own binary so the counting allocator sees only this test.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use polyscene::audio::AudioBlock;
use polyscene::synth::ParamField;
use polyscene::voices::SineBlip;
use polyscene::{PolySynth, TimeMasterMode};

struct CountingAllocator;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[test]
fn steady_state_render_does_not_allocate() {
    let mut synth = PolySynth::new(TimeMasterMode::Audio);
    synth.register_voice("SineBlip", SineBlip::new);
    for _ in 0..8 {
        let mut slot = synth.get_voice("SineBlip").unwrap();
        // Long enough that no voice finishes during the measured window.
        slot.set_trigger_params(&[
            ParamField::Float(440.0),
            ParamField::Float(0.1),
            ParamField::Float(3600.0),
        ])
        .unwrap();
        synth.trigger_on(slot, 0, None);
    }

    let mut io = AudioBlock::new(2, 256, 48_000.0);
    // First block migrates the pending voices into the active list.
    synth.render_audio(&mut io);

    let before = ALLOCATIONS.load(Ordering::SeqCst);
    for _ in 0..4 {
        io.clear();
        synth.render_audio(&mut io);
    }
    let after = ALLOCATIONS.load(Ordering::SeqCst);
    assert_eq!(after - before, 0, "render path allocated on the heap");
}

//! The polyphonic voice scheduler.
//!
//! `PolySynth` owns the active voice list and is driven by exactly one
//! time-master thread through [`PolySynth::render_audio`],
//! [`PolySynth::render_graphics`] or [`PolySynth::update`]. Control threads
//! get a cloneable [`SynthHandle`] for triggering and pool management.
//!
//! Handoff discipline: trigger-ons go through a mutex-guarded pending queue
//! that the render side swaps in at block start; trigger-offs go through a
//! lock-free ring so the render thread never waits on a control thread. The
//! free pool has its own mutex, held only for single-slot moves and the
//! end-of-block reclaim.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::audio::{AudioBlock, AudioProcessor};
use crate::graphics::GraphicsContext;
use crate::synth::pool::VoicePool;
use crate::synth::voice::{SynthVoice, VoiceId, VoiceSlot};
use crate::synth::lock_unpoisoned;
use crate::time::TimeMasterMode;

/// Capacity of the turn-off ring. A full ring drops further turn-offs for
/// the block; a dropped turn-off is preferable to blocking the render
/// thread.
const TURN_OFF_QUEUE_CAPACITY: usize = 1024;

/// Invoked synchronously on the calling thread when a voice is triggered on.
/// Arguments are the assigned id and the sub-block offset in frames.
pub type TriggerOnCallback = Box<dyn Fn(VoiceId, i64) + Send>;
/// Invoked synchronously on the calling thread when a turn-off is requested.
pub type TriggerOffCallback = Box<dyn Fn(VoiceId) + Send>;

#[derive(Default)]
struct CallbackList {
    trigger_on: Vec<TriggerOnCallback>,
    trigger_off: Vec<TriggerOffCallback>,
}

/// State shared between the render side and all control handles.
struct SynthShared {
    pending: Mutex<Vec<VoiceSlot>>,
    pool: Mutex<VoicePool>,
    off_tx: Mutex<Producer<(VoiceId, i64)>>,
    callbacks: Mutex<CallbackList>,
    id_counter: AtomicU64,
    all_off: AtomicBool,
}

impl SynthShared {
    fn next_id(&self) -> VoiceId {
        self.id_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn trigger_on(&self, mut slot: VoiceSlot, offset_frames: i64, id: Option<VoiceId>) -> VoiceId {
        let id = id.unwrap_or_else(|| {
            if slot.id() > 0 {
                slot.id()
            } else {
                self.next_id()
            }
        });
        slot.set_id(id);
        slot.trigger_on(offset_frames);
        lock_unpoisoned(&self.pending).push(slot);
        for cb in &lock_unpoisoned(&self.callbacks).trigger_on {
            cb(id, offset_frames);
        }
        id
    }

    fn trigger_off(&self, id: VoiceId, offset_frames: i64) {
        // Dropped silently when the ring is full; accepted backpressure.
        let _ = lock_unpoisoned(&self.off_tx).push((id, offset_frames));
        for cb in &lock_unpoisoned(&self.callbacks).trigger_off {
            cb(id);
        }
    }

    fn get_voice(&self, name: &str) -> Option<VoiceSlot> {
        match lock_unpoisoned(&self.pool).acquire(name) {
            Ok(slot) => Some(slot),
            Err(err) => {
                log::warn!("could not get voice `{name}`: {err}");
                None
            }
        }
    }
}

/// Cloneable control-side interface to a [`PolySynth`].
///
/// All methods are safe to call from any thread and never block the render
/// thread beyond the scheduler's short critical sections.
#[derive(Clone)]
pub struct SynthHandle {
    shared: Arc<SynthShared>,
}

impl SynthHandle {
    /// Queue a voice for insertion at the next master block, starting
    /// `offset_frames` into it. Returns the assigned id: the caller's if
    /// given, else the slot's embedded id if set, else a fresh one.
    pub fn trigger_on(&self, slot: VoiceSlot, offset_frames: i64, id: Option<VoiceId>) -> VoiceId {
        self.shared.trigger_on(slot, offset_frames, id)
    }

    /// Request that the voice with `id` be turned off at the next master
    /// block. A request for an unknown id has no effect beyond the
    /// registered callbacks.
    pub fn trigger_off(&self, id: VoiceId) {
        self.shared.trigger_off(id, 0);
    }

    /// Like [`SynthHandle::trigger_off`], but with the off landing
    /// `offset_frames` ahead so release can start mid-block.
    pub fn trigger_off_at(&self, id: VoiceId, offset_frames: i64) {
        self.shared.trigger_off(id, offset_frames);
    }

    /// Turn off every active voice at the next master block.
    pub fn all_notes_off(&self) {
        self.shared.all_off.store(true, Ordering::Release);
    }

    /// Take a voice of the named type from the pool, or construct one if
    /// allowed. Returns `None` (logged) when the pool cannot satisfy the
    /// request.
    pub fn get_voice(&self, name: &str) -> Option<VoiceSlot> {
        self.shared.get_voice(name)
    }

    /// Return a voice to the free pool.
    pub fn insert_free_voice(&self, slot: VoiceSlot) {
        lock_unpoisoned(&self.shared.pool).release(slot);
    }

    /// Register a voice factory under a type name.
    pub fn register_voice<V, F>(&self, name: impl Into<String>, factory: F)
    where
        V: SynthVoice + 'static,
        F: Fn() -> V + Send + 'static,
    {
        lock_unpoisoned(&self.shared.pool).register(name, factory);
    }

    /// Pre-allocate `count` voices of a registered type.
    pub fn allocate_polyphony(&self, name: &str, count: usize) -> Result<(), crate::SceneError> {
        lock_unpoisoned(&self.shared.pool).allocate_polyphony(name, count)
    }

    /// Disable automatic construction for a type.
    pub fn disable_allocation(&self, name: impl Into<String>) {
        lock_unpoisoned(&self.shared.pool).disable_allocation(name);
    }

    pub fn register_trigger_on_callback<F: Fn(VoiceId, i64) + Send + 'static>(&self, cb: F) {
        lock_unpoisoned(&self.shared.callbacks)
            .trigger_on
            .push(Box::new(cb));
    }

    pub fn register_trigger_off_callback<F: Fn(VoiceId) + Send + 'static>(&self, cb: F) {
        lock_unpoisoned(&self.shared.callbacks)
            .trigger_off
            .push(Box::new(cb));
    }

    /// Number of free voices matching a type name.
    pub fn free_count_for(&self, name: &str) -> usize {
        lock_unpoisoned(&self.shared.pool).free_count_for(name)
    }
}

/// Real-time-safe polyphonic voice scheduler.
pub struct PolySynth {
    shared: Arc<SynthShared>,
    active: Vec<VoiceSlot>,
    off_rx: Consumer<(VoiceId, i64)>,
    post: Vec<Box<dyn AudioProcessor>>,
    gain: f32,
    master_mode: TimeMasterMode,
}

impl PolySynth {
    pub fn new(master_mode: TimeMasterMode) -> Self {
        let (off_tx, off_rx) = RingBuffer::new(TURN_OFF_QUEUE_CAPACITY);
        Self {
            shared: Arc::new(SynthShared {
                pending: Mutex::new(Vec::new()),
                pool: Mutex::new(VoicePool::new()),
                off_tx: Mutex::new(off_tx),
                callbacks: Mutex::new(CallbackList::default()),
                id_counter: AtomicU64::new(1),
                all_off: AtomicBool::new(false),
            }),
            active: Vec::with_capacity(64),
            off_rx,
            post: Vec::new(),
            gain: 1.0,
            master_mode,
        }
    }

    /// A cloneable control-side handle for other threads.
    pub fn handle(&self) -> SynthHandle {
        SynthHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn time_master(&self) -> TimeMasterMode {
        self.master_mode
    }

    pub fn set_time_master(&mut self, mode: TimeMasterMode) {
        self.master_mode = mode;
    }

    /// Output gain applied after voice rendering, before post-processing.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Number of voices currently in the active list.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|s| s.is_active()).count()
    }

    // Control-side conveniences, mirrored from SynthHandle for
    // single-threaded use.

    pub fn trigger_on(&self, slot: VoiceSlot, offset_frames: i64, id: Option<VoiceId>) -> VoiceId {
        self.shared.trigger_on(slot, offset_frames, id)
    }

    pub fn trigger_off(&self, id: VoiceId) {
        self.shared.trigger_off(id, 0);
    }

    pub fn trigger_off_at(&self, id: VoiceId, offset_frames: i64) {
        self.shared.trigger_off(id, offset_frames);
    }

    pub fn all_notes_off(&self) {
        self.shared.all_off.store(true, Ordering::Release);
    }

    pub fn get_voice(&self, name: &str) -> Option<VoiceSlot> {
        self.shared.get_voice(name)
    }

    pub fn register_voice<V, F>(&self, name: impl Into<String>, factory: F)
    where
        V: SynthVoice + 'static,
        F: Fn() -> V + Send + 'static,
    {
        self.handle().register_voice(name, factory);
    }

    // Post-processing chain. Processors run in order on the full block
    // after all voices have rendered.

    pub fn append_processor(&mut self, processor: Box<dyn AudioProcessor>) -> &mut Self {
        self.post.push(processor);
        self
    }

    pub fn prepend_processor(&mut self, processor: Box<dyn AudioProcessor>) -> &mut Self {
        self.post.insert(0, processor);
        self
    }

    /// Insert ahead of the named processor, or first if the name is unknown.
    pub fn insert_processor_before(
        &mut self,
        processor: Box<dyn AudioProcessor>,
        before: &str,
    ) -> &mut Self {
        let index = self
            .post
            .iter()
            .position(|p| p.name() == before)
            .unwrap_or(0);
        self.post.insert(index, processor);
        self
    }

    /// Insert after the named processor, or last if the name is unknown.
    pub fn insert_processor_after(
        &mut self,
        processor: Box<dyn AudioProcessor>,
        after: &str,
    ) -> &mut Self {
        match self.post.iter().position(|p| p.name() == after) {
            Some(index) => self.post.insert(index + 1, processor),
            None => self.post.push(processor),
        }
        self
    }

    pub fn remove_processor(&mut self, name: &str) -> &mut Self {
        self.post.retain(|p| p.name() != name);
        self
    }

    /// Audio-driver entry point. When audio is the time master this also
    /// migrates pending voices, drains turn-off requests and reclaims
    /// finished voices; otherwise it only renders.
    pub fn render_audio(&mut self, io: &mut AudioBlock) {
        if self.master_mode == TimeMasterMode::Audio {
            self.migrate_pending();
            self.drain_turn_offs();
        }

        let fpb = io.frames_per_buffer() as i64;
        for slot in &mut self.active {
            if !slot.is_active() {
                continue;
            }
            let start = slot.take_start_offset(fpb);
            if start >= fpb {
                // Scheduled for a later block.
                continue;
            }
            let end = slot.take_end_offset(fpb);
            if end > 0 && end <= fpb {
                // The off lands inside this block: deliver it before the
                // voice renders so release starts mid-block.
                slot.deliver_trigger_off();
            }
            let mut view = io.view_from(start.max(0) as usize);
            slot.voice_mut().on_process(&mut view);
        }

        io.scale(self.gain);
        for processor in &mut self.post {
            processor.process(io);
        }

        if self.master_mode == TimeMasterMode::Audio {
            self.reclaim_finished();
        }
    }

    /// Graphics-driver entry point. Sub-block offsets apply only to the
    /// audio path; every active voice draws each frame.
    pub fn render_graphics(&mut self, g: &mut GraphicsContext) {
        if self.master_mode == TimeMasterMode::Graphics {
            self.migrate_pending();
            self.drain_turn_offs();
        }
        for slot in &mut self.active {
            if slot.is_active() {
                slot.voice_mut().on_process_graphics(g);
            }
        }
        if self.master_mode == TimeMasterMode::Graphics {
            self.reclaim_finished();
        }
    }

    /// Simulation-driver entry point for the independent-clock mode.
    pub fn update(&mut self, dt: f64) {
        if self.master_mode == TimeMasterMode::Cpu {
            self.migrate_pending();
            self.drain_turn_offs();
        }
        for slot in &mut self.active {
            if slot.is_active() {
                slot.voice_mut().update(dt);
            }
        }
        if self.master_mode == TimeMasterMode::Cpu {
            self.reclaim_finished();
        }
    }

    /// Swap queued voices into the active list. The pending lock is held
    /// only for the move.
    fn migrate_pending(&mut self) {
        let mut pending = lock_unpoisoned(&self.shared.pending);
        self.active.append(&mut pending);
    }

    /// Drain the turn-off ring and the all-notes-off flag. Wait-free.
    fn drain_turn_offs(&mut self) {
        if self.shared.all_off.swap(false, Ordering::AcqRel) {
            for slot in &mut self.active {
                slot.deliver_trigger_off();
            }
        }
        while let Ok((id, offset)) = self.off_rx.pop() {
            for slot in &mut self.active {
                if slot.id() == id {
                    // A positive offset arms the end counter; the render
                    // loop delivers it when it lands inside a block.
                    slot.trigger_off(offset);
                }
            }
        }
    }

    /// Move finished voices back to the free pool. Preserves active-list
    /// order for the remaining voices and allocates nothing.
    fn reclaim_finished(&mut self) {
        if !self.active.iter().any(|s| s.finished()) {
            return;
        }
        let mut pool = lock_unpoisoned(&self.shared.pool);
        let mut index = 0;
        while index < self.active.len() {
            if self.active[index].finished() {
                pool.release(self.active.remove(index));
            } else {
                index += 1;
            }
        }
    }
}

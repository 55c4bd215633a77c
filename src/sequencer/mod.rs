//! Event sequencer driving a [`PolySynth`] from a shared timeline.
//!
//! The sequencer and its scheduler must agree on the time master: whichever
//! driver is the master advances the clock once per block/frame/tick and
//! then processes due events. Event processing takes the timeline lock with
//! a try-lock and skips the block entirely on contention, so the render
//! path never stalls.

pub mod event;
pub mod parser;

pub use event::{EventKind, SynthSequencerEvent};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::AudioBlock;
use crate::graphics::GraphicsContext;
use crate::synth::{lock_unpoisoned, PolySynth, SynthHandle};
use crate::time::{MasterClock, TimeMasterMode};

/// Granularity of the independent-clock polling thread.
const CPU_GRANULARITY_NS: u64 = 1000;

/// Rate-limited notification of sequence playback time, in seconds since
/// playback start.
pub type TimeChangeCallback = Box<dyn FnMut(f64) + Send>;

/// Timeline state shared with the independent-clock thread.
struct SequencerState {
    events: Vec<SynthSequencerEvent>,
    next_event: usize,
    playback_start: f64,
    time_change: Option<TimeChangeCallback>,
    time_change_min_delta: f64,
    time_change_accum: f64,
}

impl SequencerState {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            next_event: 0,
            playback_start: 0.0,
            time_change: None,
            time_change_min_delta: 0.05,
            time_change_accum: 0.0,
        }
    }

    /// All events dispatched and every triggered voice turned off.
    fn exhausted(&self) -> bool {
        self.next_event >= self.events.len() && self.events.iter().all(|e| !e.is_playing())
    }
}

/// Plays timed-event scripts through a [`PolySynth`].
pub struct SynthSequencer {
    synth: PolySynth,
    handle: SynthHandle,
    state: Arc<Mutex<SequencerState>>,
    clock: Arc<MasterClock>,
    master_mode: TimeMasterMode,
    directory: PathBuf,
    graphics_fps: f64,
    normalized_tempo: f64,
    cpu_thread: Option<thread::JoinHandle<()>>,
    cpu_stop: Arc<AtomicBool>,
}

impl SynthSequencer {
    /// Wrap a scheduler, adopting its time-master mode. Sequences are
    /// loaded from `directory`.
    pub fn new(synth: PolySynth, directory: impl Into<PathBuf>) -> Self {
        let handle = synth.handle();
        let master_mode = synth.time_master();
        Self {
            synth,
            handle,
            state: Arc::new(Mutex::new(SequencerState::new())),
            clock: Arc::new(MasterClock::new()),
            master_mode,
            directory: directory.into(),
            graphics_fps: 30.0,
            normalized_tempo: 1.0,
            cpu_thread: None,
            cpu_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn synth(&self) -> &PolySynth {
        &self.synth
    }

    pub fn synth_mut(&mut self) -> &mut PolySynth {
        &mut self.synth
    }

    /// Control-side handle of the underlying scheduler.
    pub fn handle(&self) -> SynthHandle {
        self.handle.clone()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
    }

    pub fn time_master(&self) -> TimeMasterMode {
        self.master_mode
    }

    /// Set the time master for both the sequencer and its scheduler.
    pub fn set_time_master(&mut self, mode: TimeMasterMode) {
        self.master_mode = mode;
        self.synth.set_time_master(mode);
    }

    /// Tempo in beats per minute. Scales the virtual-time increment of the
    /// audio driver.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.normalized_tempo = bpm / 60.0;
    }

    pub fn set_graphics_fps(&mut self, fps: f64) {
        self.graphics_fps = fps;
    }

    /// Current master time in seconds.
    pub fn master_time(&self) -> f64 {
        self.clock.get()
    }

    /// Audio-driver entry point. Advances the master clock by one block and
    /// processes due events when audio is the time master, then renders the
    /// scheduler.
    pub fn render_audio(&mut self, io: &mut AudioBlock) {
        if self.master_mode == TimeMasterMode::Audio {
            let fps = io.frames_per_second() as f64;
            let increment =
                self.normalized_tempo * io.frames_per_buffer() as f64 / fps;
            let block_start = self.clock.advance(increment);
            process_events_at(
                &self.handle,
                &self.state,
                self.clock.get(),
                block_start,
                self.normalized_tempo * fps,
            );
        }
        self.synth.render_audio(io);
    }

    /// Graphics-driver entry point.
    pub fn render_graphics(&mut self, g: &mut GraphicsContext) {
        if self.master_mode == TimeMasterMode::Graphics {
            let block_start = self.clock.advance(1.0 / self.graphics_fps);
            process_events_at(
                &self.handle,
                &self.state,
                self.clock.get(),
                block_start,
                self.normalized_tempo * self.graphics_fps,
            );
        }
        self.synth.render_graphics(g);
    }

    /// Simulation step, forwarded to the scheduler.
    pub fn update(&mut self, dt: f64) {
        self.synth.update(dt);
    }

    /// External-driver entry point: advance the clock by `dt` seconds and
    /// process due events, with sub-block offsets computed against
    /// `frames_per_second`.
    pub fn advance_time(&mut self, dt: f64, frames_per_second: f64) {
        let block_start = self.clock.advance(dt);
        process_events_at(
            &self.handle,
            &self.state,
            self.clock.get(),
            block_start,
            self.normalized_tempo * frames_per_second,
        );
    }

    /// Load a sequence and replace the current timeline wholesale.
    ///
    /// Voices still owned by pending events of the previous timeline are
    /// returned to the pool first. `start_time` positions the playhead
    /// within the new sequence. In independent-clock mode this spawns the
    /// polling thread that advances time and processes events.
    pub fn play_sequence(&mut self, sequence_name: &str, start_time: f64) {
        self.stop_sequence();

        let now = self.clock.get();
        // Small lead-in so events at the playhead are not skipped by the
        // block already in flight.
        const START_PAD: f64 = 0.1;
        let events = self.load_sequence(sequence_name, now - start_time + START_PAD, 1.0);

        {
            let mut state = lock_unpoisoned(&self.state);
            state.events = events;
            state.next_event = 0;
            state.playback_start = now;
            state.time_change_accum = 0.0;
        }

        if self.master_mode == TimeMasterMode::Cpu {
            self.spawn_cpu_thread();
        }
    }

    /// Return all event-owned voices to the pool and clear the timeline.
    /// Does not stop the audio/graphics driver.
    pub fn stop_sequence(&mut self) {
        self.cpu_stop.store(true, Ordering::Release);
        if let Some(handle) = self.cpu_thread.take() {
            let _ = handle.join();
        }

        let mut state = lock_unpoisoned(&self.state);
        for event in state.events.drain(..) {
            if let EventKind::Voice(Some(slot)) = event.kind {
                self.handle.insert_free_voice(slot);
            }
        }
        state.next_event = 0;
    }

    /// True while the timeline still has events to dispatch or voices to
    /// turn off.
    pub fn playing(&self) -> bool {
        !lock_unpoisoned(&self.state).exhausted()
    }

    /// Register the rate-limited playback-time callback. Fails (logged)
    /// when the sequencer is mid-block, rather than blocking.
    pub fn register_time_change_callback<F>(&self, callback: F, min_time_delta: f64)
    where
        F: FnMut(f64) + Send + 'static,
    {
        match self.state.try_lock() {
            Ok(mut state) => {
                state.time_change = Some(Box::new(callback));
                state.time_change_min_delta = min_time_delta;
            }
            Err(_) => log::error!("failed to set time change callback: sequencer running"),
        }
    }

    fn spawn_cpu_thread(&mut self) {
        self.cpu_stop.store(false, Ordering::Release);
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let stop = Arc::clone(&self.cpu_stop);
        let handle = self.handle.clone();

        self.cpu_thread = Some(thread::spawn(move || {
            // Seconds of virtual time per polling tick.
            let tick = CPU_GRANULARITY_NS as f64 * 1.0e-9;
            let epoch = Instant::now();
            let time_zero = clock.get();
            loop {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                if lock_unpoisoned(&state).exhausted() {
                    log::debug!("sequencer clock thread done");
                    break;
                }
                let block_start = clock.advance(tick);
                process_events_at(&handle, &state, clock.get(), block_start, 1.0e9 / CPU_GRANULARITY_NS as f64);

                let target = epoch + Duration::from_secs_f64(clock.get() - time_zero);
                if let Some(wait) = target.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
        }));
    }
}

impl Drop for SynthSequencer {
    fn drop(&mut self) {
        self.cpu_stop.store(true, Ordering::Release);
        if let Some(handle) = self.cpu_thread.take() {
            let _ = handle.join();
        }
    }
}

/// One event-processing step: dispatch every event whose start time has
/// elapsed, then issue turn-offs for events whose duration has elapsed.
///
/// Guarded by a try-lock: on contention the whole step is skipped for this
/// block, never queued.
fn process_events_at(
    handle: &SynthHandle,
    state: &Mutex<SequencerState>,
    master_time: f64,
    block_start: f64,
    fps_adjusted: f64,
) {
    let Ok(mut guard) = state.try_lock() else {
        return;
    };
    let state = &mut *guard;

    if state.next_event < state.events.len() {
        // Rate-limited playback-time notification.
        state.time_change_accum += master_time - block_start;
        if state.time_change_accum > state.time_change_min_delta {
            let elapsed = block_start - state.playback_start;
            if let Some(callback) = state.time_change.as_mut() {
                callback(elapsed);
            }
            state.time_change_accum -= state.time_change_min_delta;
        }

        while state.next_event < state.events.len() {
            let event = &mut state.events[state.next_event];
            if event.start_time > master_time {
                break;
            }
            let offset = (((event.start_time - block_start) * fps_adjusted) as i64).max(0);
            event.offset_counter = offset;
            match &mut event.kind {
                EventKind::Voice(slot) => {
                    if let Some(slot) = slot.take() {
                        let id = handle.trigger_on(slot, offset, None);
                        event.triggered = Some(id);
                    }
                }
                EventKind::PFields { name, fields } => match handle.get_voice(name) {
                    Some(mut slot) => {
                        if let Err(err) = slot.set_trigger_params(fields) {
                            log::error!("could not set trigger params for `{name}`: {err}");
                            handle.insert_free_voice(slot);
                        } else {
                            let id = handle.trigger_on(slot, offset, None);
                            event.triggered = Some(id);
                        }
                    }
                    None => log::error!("no free voice for sequencer event `{name}`"),
                },
                EventKind::Tempo(_) => {
                    // Tempo is applied at parse time; nothing to do here.
                }
            }
            state.next_event += 1;
        }
    }

    // Turn off voices whose event duration has elapsed. One-shot per event.
    for event in &mut state.events {
        let (Some(id), Some(duration)) = (event.triggered, event.duration) else {
            continue;
        };
        if event.start_time + duration <= master_time {
            handle.trigger_off(id);
            event.triggered = None;
        }
    }
}

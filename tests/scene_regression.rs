//! End-to-end scene playback through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use polyscene::audio::AudioBlock;
use polyscene::preset::{ParameterValue, PresetHandler};
use polyscene::voices::{PositionedBlip, SineBlip};
use polyscene::{PolySynth, SynthSequencer, TimeMasterMode};

const SAMPLE_RATE: f32 = 48_000.0;
const BLOCK: usize = 480; // 10 ms

fn scene(dir: &std::path::Path) -> SynthSequencer {
    let synth = PolySynth::new(TimeMasterMode::Audio);
    synth.register_voice("SineBlip", SineBlip::new);
    synth.register_voice("PositionedBlip", PositionedBlip::new);
    SynthSequencer::new(synth, dir)
}

fn render_seconds(seq: &mut SynthSequencer, io: &mut AudioBlock, seconds: f64) -> f32 {
    let blocks = (seconds / (BLOCK as f64 / SAMPLE_RATE as f64)).ceil() as usize;
    let mut peak = 0.0f32;
    for _ in 0..blocks {
        io.clear();
        seq.render_audio(io);
        for &s in io.channel(0) {
            peak = peak.max(s.abs());
        }
    }
    peak
}

#[test]
fn sequence_plays_and_voices_return_to_pool() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("song.synthSequence"),
        "@ 0.0 0.2 SineBlip 440.0 0.5 0.2\n@ 0.3 0.2 SineBlip 660.0 0.5 0.2\n",
    )
    .unwrap();

    let mut seq = scene(dir.path());
    let triggered = Arc::new(AtomicUsize::new(0));
    {
        let triggered = Arc::clone(&triggered);
        seq.handle().register_trigger_on_callback(move |_, _| {
            triggered.fetch_add(1, Ordering::Relaxed);
        });
    }

    assert_eq!(seq.sequence_duration("song"), 0.5);
    seq.play_sequence("song", 0.0);
    assert!(seq.playing());

    let mut io = AudioBlock::new(2, BLOCK, SAMPLE_RATE);
    let peak = render_seconds(&mut seq, &mut io, 1.0);

    assert!(peak > 0.0);
    assert!(peak <= 1.0);
    assert_eq!(triggered.load(Ordering::Relaxed), 2);
    assert!(!seq.playing());
    // Both voices were reclaimed after their durations elapsed.
    assert_eq!(seq.handle().free_count_for("SineBlip"), 2);
    assert_eq!(seq.synth().active_count(), 0);
}

#[test]
fn open_ended_events_hold_until_their_close_line() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("held.synthSequence"),
        "+ 0.0 1 SineBlip 220.0 0.5 10.0\n- 0.3 1\n",
    )
    .unwrap();

    let mut seq = scene(dir.path());
    seq.play_sequence("held", 0.0);

    let mut io = AudioBlock::new(1, BLOCK, SAMPLE_RATE);
    // Past the lead-in and trigger, before the close.
    let peak = render_seconds(&mut seq, &mut io, 0.25);
    assert!(peak > 0.0);
    assert_eq!(seq.synth().active_count(), 1);

    render_seconds(&mut seq, &mut io, 0.5);
    assert!(!seq.playing());
    assert_eq!(seq.synth().active_count(), 0);
    assert_eq!(seq.handle().free_count_for("SineBlip"), 1);
}

#[test]
fn positioned_voices_take_placement_from_the_script() {
    let dir = tempfile::tempdir().unwrap();
    // Three base fields plus eight placement fields.
    std::fs::write(
        dir.path().join("placed.synthSequence"),
        "@ 0.0 0.2 PositionedBlip 330.0 0.5 0.2 1.0 0.0 0.0 1.0 0.0 0.0 0.0 0.5\n",
    )
    .unwrap();

    let mut seq = scene(dir.path());
    seq.play_sequence("placed", 0.0);
    let mut io = AudioBlock::new(1, BLOCK, SAMPLE_RATE);
    let peak = render_seconds(&mut seq, &mut io, 1.0);

    // Unit distance from the origin halves the amplitude.
    assert!(peak > 0.0);
    assert!(peak <= 0.26);
    assert_eq!(seq.handle().free_count_for("PositionedBlip"), 1);
}

#[test]
fn stop_mid_sequence_leaves_a_clean_pool() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("long.synthSequence"),
        "@ 0.0 5.0 SineBlip 440.0 0.5 5.0\n+ 10.0 2 SineBlip 220.0 0.5 1.0\n",
    )
    .unwrap();

    let mut seq = scene(dir.path());
    seq.play_sequence("long", 0.0);
    let mut io = AudioBlock::new(1, BLOCK, SAMPLE_RATE);
    render_seconds(&mut seq, &mut io, 0.3);
    assert_eq!(seq.synth().active_count(), 1);

    seq.stop_sequence();
    // The undispatched `+` voice went straight back to the pool; the
    // sounding one keeps rendering until turned off.
    assert_eq!(seq.handle().free_count_for("SineBlip"), 1);
    seq.handle().all_notes_off();
    render_seconds(&mut seq, &mut io, 0.05);
    assert_eq!(seq.synth().active_count(), 0);
    assert_eq!(seq.handle().free_count_for("SineBlip"), 2);
}

#[test]
fn presets_restore_parameter_state_across_handlers() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut presets = PresetHandler::new(dir.path());
        presets.register_parameter("/scene/gain", ParameterValue::Floats(vec![0.8]));
        presets.register_parameter("/scene/name", ParameterValue::Str("sunrise".into()));
        presets.store_preset("morning").unwrap();
    }

    let mut presets = PresetHandler::new(dir.path());
    presets.register_parameter("/scene/gain", ParameterValue::Floats(vec![0.0]));
    presets.register_parameter("/scene/name", ParameterValue::Str("".into()));
    presets.set_current_preset_map("default", false).unwrap();
    presets.recall_preset_by_index(0).unwrap();

    assert_eq!(
        presets.parameter("/scene/gain"),
        Some(&ParameterValue::Floats(vec![0.8]))
    );
    assert_eq!(
        presets.parameter("/scene/name"),
        Some(&ParameterValue::Str("sunrise".into()))
    );
}

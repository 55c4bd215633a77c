//! The `.synthSequence` script parser.
//!
//! Line-oriented, whitespace-delimited, one directive per line:
//!
//! ```text
//! @ <start> <duration> <voiceType> <field>*   timed voice with pfields
//! + <start> <id> <voiceType> <field>*        open-ended voice
//! - <time> <id>                              close the matching open voice
//! = <time> <sequenceName> <timeScale>        splice another sequence
//! > <time>                                   shift the running time offset
//! t <bpm>                                    tempo factor for later lines
//! ::                                         end of sequence
//! ```
//!
//! Unrecognized lines are ignored. Fields on `@` lines are floats unless
//! quoted; a token is numeric if and only if the entire token parses as a
//! float. Quoted strings keep embedded whitespace.

use std::fs;
use std::path::PathBuf;

use crate::sequencer::event::{EventKind, SynthSequencerEvent};
use crate::sequencer::SynthSequencer;
use crate::synth::ParamField;
use crate::SEQUENCE_EXTENSION;

/// Take the next whitespace-delimited token, advancing the cursor.
fn next_token<'a>(cursor: &mut &'a str) -> Option<&'a str> {
    let s = cursor.trim_start();
    if s.is_empty() {
        *cursor = s;
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (token, rest) = s.split_at(end);
    *cursor = rest;
    Some(token)
}

fn next_f64(cursor: &mut &str) -> Option<f64> {
    next_token(cursor)?.parse().ok()
}

fn next_u64(cursor: &mut &str) -> Option<u64> {
    next_token(cursor)?.parse().ok()
}

/// A token is a float field only when it parses in full; anything else is a
/// string field. Quoted tokens are always strings.
fn classify(token: String) -> ParamField {
    match token.parse::<f32>() {
        Ok(value) => ParamField::Float(value),
        Err(_) => ParamField::Str(token),
    }
}

/// Split the tail of an `@` line into typed fields, honoring quotes.
pub(crate) fn parse_fields(input: &str) -> Vec<ParamField> {
    let mut fields = Vec::new();
    let mut accum = String::new();
    let mut in_string = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                if in_string {
                    fields.push(ParamField::Str(std::mem::take(&mut accum)));
                    in_string = false;
                } else {
                    in_string = true;
                }
            }
            c if c.is_whitespace() && !in_string => {
                if !accum.is_empty() {
                    fields.push(classify(std::mem::take(&mut accum)));
                }
            }
            c => accum.push(c),
        }
    }
    if !accum.is_empty() {
        fields.push(classify(accum));
    }
    fields
}

/// Insert keeping the list sorted by start time. Events with equal start
/// times keep their insertion order.
fn insert_sorted(events: &mut Vec<SynthSequencerEvent>, event: SynthSequencerEvent) {
    let position = events.partition_point(|e| e.start_time < event.start_time);
    events.insert(position, event);
}

impl SynthSequencer {
    /// Full path for a sequence name, appending the `.synthSequence`
    /// extension unless already present.
    pub fn build_full_path(&self, sequence_name: &str) -> PathBuf {
        let file = if sequence_name.ends_with(SEQUENCE_EXTENSION) {
            sequence_name.to_owned()
        } else {
            format!("{sequence_name}{SEQUENCE_EXTENSION}")
        };
        self.directory().join(file)
    }

    /// Parse a sequence file into a start-time-sorted event list.
    ///
    /// A missing file yields an empty list (logged), not an error: playback
    /// of a bad name degrades to silence.
    pub fn load_sequence(
        &self,
        sequence_name: &str,
        time_offset: f64,
        time_scale: f64,
    ) -> Vec<SynthSequencerEvent> {
        let path = self.build_full_path(sequence_name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                log::warn!("could not open sequence file: {}", path.display());
                return Vec::new();
            }
        };
        self.parse_sequence(&text, time_offset, time_scale)
    }

    fn parse_sequence(
        &self,
        text: &str,
        mut time_offset: f64,
        time_scale: f64,
    ) -> Vec<SynthSequencerEvent> {
        let mut events: Vec<SynthSequencerEvent> = Vec::new();
        let mut tempo_factor = 1.0f64;

        for line in text.lines() {
            if line.starts_with("::") {
                break;
            }
            // A directive is a single command character followed by a space.
            let bytes = line.as_bytes();
            if bytes.len() < 2 || bytes[1] != b' ' || !bytes[0].is_ascii() {
                if !line.trim().is_empty() {
                    log::debug!("sequence line ignored: {line}");
                }
                continue;
            }
            let command = bytes[0] as char;
            let mut cursor = &line[2..];

            match command {
                '@' => {
                    let (Some(start), Some(duration), Some(name)) = (
                        next_f64(&mut cursor),
                        next_f64(&mut cursor),
                        next_token(&mut cursor),
                    ) else {
                        log::warn!("malformed @ line skipped: {line}");
                        continue;
                    };
                    let fields = parse_fields(cursor);
                    let start_time = time_offset + start * time_scale * tempo_factor;
                    let duration = duration * time_scale * tempo_factor;
                    insert_sorted(
                        &mut events,
                        SynthSequencerEvent::new(
                            start_time,
                            Some(duration),
                            EventKind::PFields {
                                name: name.to_owned(),
                                fields,
                            },
                        ),
                    );
                }
                '+' => {
                    let (Some(start), Some(id), Some(name)) = (
                        next_f64(&mut cursor),
                        next_u64(&mut cursor),
                        next_token(&mut cursor),
                    ) else {
                        log::warn!("malformed + line skipped: {line}");
                        continue;
                    };
                    let mut fields = Vec::new();
                    let mut ok = true;
                    for token in cursor.split_whitespace() {
                        match token.parse::<f32>() {
                            Ok(value) => fields.push(ParamField::Float(value)),
                            Err(_) => {
                                log::warn!("non-numeric field on + line skipped: {line}");
                                ok = false;
                                break;
                            }
                        }
                    }
                    if !ok {
                        continue;
                    }
                    let Some(mut slot) = self.handle().get_voice(name) else {
                        log::warn!("unable to get free voice `{name}` for + line");
                        continue;
                    };
                    slot.set_id(id);
                    if let Err(err) = slot.set_trigger_params(&fields) {
                        log::error!("could not set trigger params for `{name}`: {err}");
                        self.handle().insert_free_voice(slot);
                        continue;
                    }
                    let start_time = time_offset + start * time_scale * tempo_factor;
                    // Open duration until a matching `-` closes it.
                    insert_sorted(
                        &mut events,
                        SynthSequencerEvent::new(start_time, None, EventKind::Voice(Some(slot))),
                    );
                }
                '-' => {
                    let (Some(time), Some(id)) = (next_f64(&mut cursor), next_u64(&mut cursor))
                    else {
                        log::warn!("malformed - line skipped: {line}");
                        continue;
                    };
                    let close_time = time_offset + time * time_scale * tempo_factor;
                    if let Some(event) = events
                        .iter_mut()
                        .find(|e| e.duration.is_none() && e.voice_id() == Some(id))
                    {
                        event.duration = Some((close_time - event.start_time).max(0.0));
                    } else {
                        log::debug!("- line matched no open event for id {id}");
                    }
                }
                '=' => {
                    let (Some(time), Some(name), Some(scale)) = (
                        next_f64(&mut cursor),
                        next_token(&mut cursor),
                        next_f64(&mut cursor),
                    ) else {
                        log::warn!("malformed = line skipped: {line}");
                        continue;
                    };
                    let name = name.trim_matches('"');
                    let spliced =
                        self.load_sequence(name, time_offset + time, scale * tempo_factor);
                    events.extend(spliced);
                    // The merge is only correct when both sides carry
                    // absolute start times; that precondition is the
                    // caller's responsibility.
                    events.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
                }
                '>' => {
                    if let Some(shift) = next_f64(&mut cursor) {
                        time_offset += shift;
                    }
                }
                't' => {
                    if let Some(bpm) = next_f64(&mut cursor) {
                        if bpm > 0.0 {
                            tempo_factor = 60.0 / bpm;
                        }
                    }
                }
                _ => log::debug!("sequence line ignored: {line}"),
            }
        }
        events
    }

    /// Names of all sequences in the sequence directory, sorted
    /// case-insensitively, without extensions.
    pub fn sequence_list(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(self.directory()) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    name.strip_suffix(SEQUENCE_EXTENSION).map(str::to_owned)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort_by_key(|name| name.to_lowercase());
        names
    }

    /// Total length of a sequence in seconds: the latest event end time.
    pub fn sequence_duration(&self, sequence_name: &str) -> f64 {
        let events = self.load_sequence(sequence_name, 0.0, 1.0);
        let mut duration = 0.0f64;
        for event in &events {
            let end = event.start_time + event.duration.unwrap_or(0.0);
            if end > duration {
                duration = end;
            }
        }
        // Probing must not leak voices held by `+` events.
        for event in events {
            if let EventKind::Voice(Some(slot)) = event.kind {
                self.handle().insert_free_voice(slot);
            }
        }
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_classify_float_iff_whole_token_parses() {
        let fields = parse_fields("440.0 12 4.5e2 12x \"tag\"");
        assert_eq!(
            fields,
            vec![
                ParamField::Float(440.0),
                ParamField::Float(12.0),
                ParamField::Float(450.0),
                ParamField::Str("12x".into()),
                ParamField::Str("tag".into()),
            ]
        );
    }

    #[test]
    fn quoted_fields_keep_spaces_and_numbers_stay_strings() {
        let fields = parse_fields("\"two words\" \"42\"");
        assert_eq!(
            fields,
            vec![
                ParamField::Str("two words".into()),
                ParamField::Str("42".into()),
            ]
        );
    }

    #[test]
    fn empty_input_yields_no_fields() {
        assert!(parse_fields("   ").is_empty());
    }
}

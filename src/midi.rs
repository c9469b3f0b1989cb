use crate::event::{EventSender, SynthEvent};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{select, Receiver};
use log::{debug, info, trace};
use midly::{EventKind, MidiMessage, Smf, Timing};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use time_calc::{Bpm, Ppqn, Ticks};

pub const DEFAULT_BPM: Bpm = 120.0;

pub fn list_midi_input_ports() -> Result<Vec<String>> {
    let midi_in = midir::MidiInput::new("vesper_midi_temporary")
        .map_err(|e| anyhow!("Failed to load MIDI input: {}", e))?;

    midi_in
        .ports()
        .iter()
        .map(|port| {
            midi_in
                .port_name(port)
                .map_err(|e| anyhow!("Failed to get MIDI port name: {}", e))
        })
        .collect()
}

/// Live MIDI input. The midir callback thread decodes each message and pushes it straight into
/// the synthesizer's event queue.
pub struct MidiInputDeviceStream {
    connection: midir::MidiInputConnection<EventSender>,
    port_name: String,
}

impl MidiInputDeviceStream {
    pub fn connect(port: usize, sender: EventSender) -> Result<Self> {
        let mut midi_in = midir::MidiInput::new(&format!("vesper_midi_{}", port))
            .map_err(|e| anyhow!("Failed to create MIDI input: {}", e))?;
        midi_in.ignore(midir::Ignore::None);

        let ports = midi_in.ports();
        let input_port = ports.get(port).ok_or_else(|| {
            anyhow!(
                "No MIDI input port {} ({} available)",
                port,
                ports.len()
            )
        })?;
        let port_name = midi_in
            .port_name(input_port)
            .unwrap_or_else(|_| format!("port {}", port));

        let connection = midi_in
            .connect(
                input_port,
                "vesper_input_connection",
                move |timestamp, message, sender| {
                    trace!("MIDI message at {} = {:?}", timestamp, message);
                    if let Some(event) = SynthEvent::from_midi_bytes(message) {
                        log_event(&event);
                        sender.send(event);
                    }
                },
                sender,
            )
            .map_err(|e| anyhow!("Failed to open MIDI input connection: {}", e))?;
        info!("Listening for MIDI input on {}", port_name);

        Ok(MidiInputDeviceStream {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Disconnect and hand back the event sender.
    pub fn close(self) -> EventSender {
        let (_, sender) = self.connection.close();
        debug!("Closed MIDI input {}", self.port_name);

        sender
    }
}

fn log_event(event: &SynthEvent) {
    match event {
        SynthEvent::NoteOn { note, velocity } => info!("NoteOn key = {} vel = {}", note, velocity),
        SynthEvent::NoteOff { note } => info!("NoteOff key = {}", note),
        SynthEvent::ControlChange { controller, value } => info!(
            "ControlChange controller = {} value = {:.2}",
            controller,
            f32::from(*value) / 127.0
        ),
        other => debug!("{:?}", other),
    }
}

/// An event scheduled at an absolute offset from the start of playback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub seconds: f64,
    pub event: SynthEvent,
}

/// A standard MIDI file held in memory.
#[derive(Clone)]
pub struct MidiFile {
    bytes: Vec<u8>,
}

impl MidiFile {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read MIDI file {}", path.display()))?;

        Ok(MidiFile { bytes })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MidiFile { bytes }
    }

    /// Every playable event from every track, merged into one timeline sorted by time. Events at
    /// the same tick keep their track order.
    pub fn timeline(&self, bpm: Bpm) -> Result<Vec<TimedEvent>> {
        if !(bpm.is_finite() && bpm > 0.0) {
            bail!("Tempo must be a positive number of beats per minute, got {}", bpm);
        }
        let smf = Smf::parse(&self.bytes).map_err(|e| anyhow!("Failed to parse MIDI file: {:?}", e))?;
        let ppqn = match smf.header.timing {
            Timing::Metrical(m) => m.as_int() as Ppqn,
            Timing::Timecode(_, _) => bail!("Timecode-timed MIDI files are not supported"),
        };

        let mut ticked_events = Vec::new();
        for track in smf.tracks.iter() {
            let mut abs_t: i64 = 0;
            for event in track.iter() {
                abs_t += i64::from(event.delta.as_int());
                if let Some(synth_event) = convert_event_kind(&event.kind) {
                    ticked_events.push((abs_t, synth_event));
                }
            }
        }
        ticked_events.sort_by_key(|(t, _)| *t);

        Ok(ticked_events
            .into_iter()
            .map(|(t, event)| TimedEvent {
                seconds: ticks_to_seconds(bpm, ppqn, t),
                event,
            })
            .collect())
    }
}

pub fn ticks_to_seconds(bpm: Bpm, ppqn: Ppqn, ticks: i64) -> f64 {
    Ticks(ticks).ms(bpm, ppqn) / 1000.0
}

fn convert_event_kind(kind: &EventKind<'_>) -> Option<SynthEvent> {
    let message = match kind {
        EventKind::Midi { message, .. } => message,
        other => {
            trace!("Ignoring {:?}", other);
            return None;
        }
    };

    match *message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => Some(SynthEvent::NoteOn {
            note: key.as_int(),
            velocity: vel.as_int(),
        }),
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            Some(SynthEvent::NoteOff { note: key.as_int() })
        }
        MidiMessage::Controller { controller, value } => Some(SynthEvent::ControlChange {
            controller: controller.as_int(),
            value: value.as_int(),
        }),
        _ => None,
    }
}

/// Send each event when its time comes, in real time. Returns false if cancelled first.
pub fn play_timeline(
    timeline: &[TimedEvent],
    sender: &mut EventSender,
    canceller: &Receiver<()>,
) -> bool {
    let start = Instant::now();
    for timed in timeline {
        let offset = if timed.seconds.is_finite() {
            timed.seconds.max(0.0)
        } else {
            0.0
        };
        let due = start + Duration::from_secs_f64(offset);
        let now = Instant::now();
        if due > now {
            select! {
                recv(canceller) -> _ => {
                    debug!("Interrupted MIDI file playback");
                    return false;
                },
                default(due - now) => (),
            }
        }
        log_event(&timed.event);
        sender.send(timed.event);
    }
    while !sender.flush() {
        select! {
            recv(canceller) -> _ => return false,
            default(Duration::from_millis(1)) => (),
        }
    }
    info!("Finished sending {} MIDI file events", timeline.len());

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, Synthesizer};
    use crossbeam_channel as channel;

    /// Format 0, 96 ticks per quarter: C4 on, CC 16, C4 off a quarter later, then a zero-velocity
    /// note-on for E4.
    fn tiny_smf() -> Vec<u8> {
        let track: Vec<u8> = vec![
            0x00, 0x90, 60, 100, // note on
            0x00, 0xB0, 16, 64, // control change
            0x60, 0x80, 60, 0, // note off after 96 ticks
            0x00, 0x90, 64, 0, // note on, velocity 0
            0x00, 0xFF, 0x2F, 0x00, // end of track
        ];
        let mut bytes = vec![
            b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1, 0, 96, b'M', b'T', b'r', b'k', 0, 0, 0,
        ];
        bytes.push(track.len() as u8);
        bytes.extend(track);
        bytes
    }

    #[test]
    fn ticks_convert_at_tempo() {
        assert!((ticks_to_seconds(120.0, 96, 96) - 0.5).abs() < 1e-9);
        assert!((ticks_to_seconds(60.0, 480, 960) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn flattens_file_into_timeline() {
        let timeline = MidiFile::from_bytes(tiny_smf())
            .timeline(DEFAULT_BPM)
            .expect("valid file");
        let events: Vec<SynthEvent> = timeline.iter().map(|t| t.event).collect();
        assert_eq!(
            events,
            vec![
                SynthEvent::NoteOn {
                    note: 60,
                    velocity: 100
                },
                SynthEvent::ControlChange {
                    controller: 16,
                    value: 64
                },
                SynthEvent::NoteOff { note: 60 },
                SynthEvent::NoteOff { note: 64 },
            ]
        );
        assert_eq!(timeline[0].seconds, 0.0);
        assert!((timeline[2].seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_unusable_tempo() {
        let file = MidiFile::from_bytes(tiny_smf());
        for &bpm in &[0.0, -90.0, f64::NAN, f64::INFINITY] {
            assert!(file.timeline(bpm).is_err(), "accepted {} bpm", bpm);
        }
        assert!(file.timeline(1.0).is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(MidiFile::from_bytes(b"not a midi file".to_vec())
            .timeline(DEFAULT_BPM)
            .is_err());
    }

    #[test]
    fn cancelled_playback_stops_early() {
        let (_synth, mut sender) = Synthesizer::new(EngineConfig::default()).expect("valid config");
        let (cancel_tx, cancel_rx) = channel::bounded(1);
        cancel_tx.send(()).expect("send cancel");
        let timeline = vec![
            TimedEvent {
                seconds: 0.0,
                event: SynthEvent::NoteOn {
                    note: 60,
                    velocity: 100,
                },
            },
            TimedEvent {
                seconds: 30.0,
                event: SynthEvent::NoteOff { note: 60 },
            },
        ];
        assert!(!play_timeline(&timeline, &mut sender, &cancel_rx));
    }

    #[test]
    fn playback_delivers_everything() {
        let (mut synth, mut sender) =
            Synthesizer::new(EngineConfig::default()).expect("valid config");
        let (_cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let timeline = vec![
            TimedEvent {
                seconds: 0.0,
                event: SynthEvent::NoteOn {
                    note: 60,
                    velocity: 100,
                },
            },
            TimedEvent {
                seconds: 0.01,
                event: SynthEvent::NoteOn {
                    note: 64,
                    velocity: 100,
                },
            },
        ];
        assert!(play_timeline(&timeline, &mut sender, &cancel_rx));
        synth.drain_events();
        assert_eq!(synth.voices().num_active(), 2);
    }
}

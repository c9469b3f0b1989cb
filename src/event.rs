use log::{debug, trace, warn};
use rtrb::{Consumer, Producer, RingBuffer};
use std::collections::VecDeque;
use std::convert::TryFrom;
use wmidi::MidiMessage;

/// Events that can be pending between two render passes before new ones are dropped.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SynthEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    /// Play sounding voices at full level instead of through their envelopes.
    SetEnvelopeBypass(bool),
    /// Silence every voice at once, without release tails.
    AllSoundOff,
}

impl SynthEvent {
    /// Decode a raw MIDI message. Messages the synthesizer has no use for yield `None`.
    pub fn from_midi_bytes(bytes: &[u8]) -> Option<SynthEvent> {
        let message = match MidiMessage::try_from(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring malformed MIDI message {:?}: {:?}", bytes, e);
                return None;
            }
        };

        match message {
            MidiMessage::NoteOn(_, key, velocity) => {
                let velocity = u8::from(velocity);
                if velocity == 0 {
                    Some(SynthEvent::NoteOff { note: u8::from(key) })
                } else {
                    Some(SynthEvent::NoteOn {
                        note: u8::from(key),
                        velocity,
                    })
                }
            }
            MidiMessage::NoteOff(_, key, _) => Some(SynthEvent::NoteOff { note: u8::from(key) }),
            MidiMessage::ControlChange(_, function, value) => Some(SynthEvent::ControlChange {
                controller: u8::from(function),
                value: u8::from(value),
            }),
            MidiMessage::TimingClock => None,
            other => {
                trace!("unsupported MIDI message = {:?}", other);
                None
            }
        }
    }

    /// Events that stop sound. Losing one would leave a voice sustaining forever.
    fn stops_sound(&self) -> bool {
        matches!(self, SynthEvent::NoteOff { .. } | SynthEvent::AllSoundOff)
    }
}

/// Create the lock-free hand-off between an event source and the renderer.
pub(crate) fn event_queue() -> (EventSender, Consumer<SynthEvent>) {
    let (producer, consumer) = RingBuffer::new(EVENT_QUEUE_CAPACITY);
    let sender = EventSender {
        producer,
        deferred: VecDeque::new(),
    };
    (sender, consumer)
}

/// The producing half of the event queue. Owned by exactly one event source.
pub struct EventSender {
    producer: Producer<SynthEvent>,
    /// Sound-stopping events that found the queue full, oldest first.
    deferred: VecDeque<SynthEvent>,
}

impl EventSender {
    /// Queue an event for the next render pass. Never blocks.
    ///
    /// If the renderer has fallen behind and the queue is full, a NoteOff or AllSoundOff is held
    /// back and retried ahead of later events; anything else is dropped and false is returned.
    pub fn send(&mut self, event: SynthEvent) -> bool {
        if self.flush() && self.producer.push(event).is_ok() {
            return true;
        }

        if event.stops_sound() {
            debug!("Event queue full, deferring {:?}", event);
            self.deferred.push_back(event);
            true
        } else {
            warn!("Event queue full, dropping {:?}", event);
            false
        }
    }

    /// Push deferred events into the queue. Returns true once none are left.
    pub fn flush(&mut self) -> bool {
        while let Some(&event) = self.deferred.front() {
            if self.producer.push(event).is_err() {
                return false;
            }
            self.deferred.pop_front();
        }

        true
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) -> bool {
        self.send(SynthEvent::NoteOn { note, velocity })
    }

    pub fn note_off(&mut self, note: u8) -> bool {
        self.send(SynthEvent::NoteOff { note })
    }

    pub fn control_change(&mut self, controller: u8, value: u8) -> bool {
        self.send(SynthEvent::ControlChange { controller, value })
    }
}

//! Live MIDI recording.
//!
//! Each armed track owns a [`MidiRecorder`] bound to one input device.
//! Device callbacks timestamp incoming bytes against the recorder's clock
//! on the device thread. When a recording stops, the captured stream is
//! sent as a [`RecordingStopped`] message over a channel; the composition
//! drains that channel and turns the capture into segment content.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use sf_ir::{time_to_tick, EventKind, MidiEvent, MidiMessage, TempoTrack};
use uuid::Uuid;

use crate::error::CompositionError;

/// Callback a device invokes for every raw message it receives.
pub type MidiInputCallback = Box<dyn FnMut(&[u8]) + Send>;

/// A MIDI input a recorder can listen to.
pub trait MidiInputDevice: Send {
    fn name(&self) -> &str;
    /// Begin delivering messages to `callback`.
    fn start(&mut self, callback: MidiInputCallback) -> Result<(), CompositionError>;
    /// Stop delivering messages. Safe to call when not started.
    fn stop(&mut self);
}

type CallbackSlot = Arc<Mutex<Option<MidiInputCallback>>>;

/// Software MIDI input driven through a [`VirtualMidiHandle`].
pub struct VirtualMidiInput {
    name: String,
    slot: CallbackSlot,
}

/// Sender side of a [`VirtualMidiInput`].
#[derive(Clone)]
pub struct VirtualMidiHandle {
    slot: CallbackSlot,
}

impl VirtualMidiInput {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), slot: Arc::new(Mutex::new(None)) }
    }

    pub fn handle(&self) -> VirtualMidiHandle {
        VirtualMidiHandle { slot: self.slot.clone() }
    }
}

impl VirtualMidiHandle {
    /// Deliver raw bytes as if they arrived from hardware. Returns false if
    /// the input is not started.
    pub fn send(&self, bytes: &[u8]) -> bool {
        let Ok(mut slot) = self.slot.lock() else { return false };
        match slot.as_mut() {
            Some(callback) => {
                callback(bytes);
                true
            }
            None => false,
        }
    }

    pub fn send_message(&self, message: &MidiMessage) -> bool {
        self.send(&message.to_bytes())
    }
}

impl MidiInputDevice for VirtualMidiInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, callback: MidiInputCallback) -> Result<(), CompositionError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CompositionError::Device(format!("{}: input lock poisoned", self.name)))?;
        *slot = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

/// A raw message with its recording-relative timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimedMessage {
    pub at: Duration,
    pub bytes: Vec<u8>,
}

/// How a finished recording is applied to its track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordingMode {
    /// New segment per take
    #[default]
    Normal,
    /// Merge into an existing segment
    Overdub,
}

/// Recorder-wide state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecorderState {
    #[default]
    Idle,
    WaitingForPunchIn,
    Recording,
}

/// A finished take, sent once per recorder per stop.
#[derive(Clone, Debug)]
pub struct RecordingStopped {
    pub track_id: Uuid,
    pub recorder_id: Uuid,
    /// Timeline position the take started at
    pub start_time: Duration,
    pub mode: RecordingMode,
    pub target_segment: Option<Uuid>,
    pub messages: Vec<TimedMessage>,
}

#[derive(Debug, Default)]
struct Capture {
    recording: bool,
    /// Clock origin; moved to the wrap point on every transport loop
    anchor: Option<Instant>,
    /// Recording time accumulated before the anchor
    offset: Duration,
    messages: Vec<TimedMessage>,
}

impl Capture {
    fn push_at(&mut self, elapsed: Duration, bytes: &[u8]) {
        if self.recording && !bytes.is_empty() {
            let at = self.offset + elapsed;
            self.messages.push(TimedMessage { at, bytes: bytes.to_vec() });
        }
    }

    /// Fold `elapsed` into the offset and restart the clock.
    fn wrap_at(&mut self, elapsed: Duration) {
        if self.recording {
            self.offset += elapsed;
            self.anchor = Some(Instant::now());
        }
    }
}

fn lock_capture(capture: &Mutex<Capture>) -> std::sync::MutexGuard<'_, Capture> {
    match capture.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Captures one device's input for one track.
pub struct MidiRecorder {
    id: Uuid,
    track_id: Uuid,
    device: Box<dyn MidiInputDevice>,
    capture: Arc<Mutex<Capture>>,
    start_time: Duration,
    disposed: bool,
}

impl MidiRecorder {
    /// Bind `device` to a track and start listening. Messages are kept only
    /// while recording.
    pub fn new(track_id: Uuid, mut device: Box<dyn MidiInputDevice>) -> Result<Self, CompositionError> {
        let capture = Arc::new(Mutex::new(Capture::default()));
        let sink = capture.clone();
        device.start(Box::new(move |bytes| {
            let mut capture = lock_capture(&sink);
            let elapsed = capture.anchor.map(|a| a.elapsed()).unwrap_or_default();
            capture.push_at(elapsed, bytes);
        }))?;
        debug!("Recorder bound to '{}' for track {}", device.name(), track_id);
        Ok(Self { id: Uuid::new_v4(), track_id, device, capture, start_time: Duration::ZERO, disposed: false })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn track_id(&self) -> Uuid {
        self.track_id
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn is_recording(&self) -> bool {
        lock_capture(&self.capture).recording
    }

    /// Start a fresh take at timeline position `start_time`.
    pub fn start(&mut self, start_time: Duration) {
        let mut capture = lock_capture(&self.capture);
        capture.messages.clear();
        capture.offset = Duration::ZERO;
        capture.anchor = Some(Instant::now());
        capture.recording = true;
        self.start_time = start_time;
    }

    /// Stop and hand back the take, or `None` if not recording.
    fn finish(&mut self) -> Option<(Duration, Vec<TimedMessage>)> {
        let mut capture = lock_capture(&self.capture);
        if !capture.recording {
            return None;
        }
        capture.recording = false;
        capture.anchor = None;
        Some((self.start_time, std::mem::take(&mut capture.messages)))
    }

    /// Record `bytes` at an explicit clock reading instead of now.
    pub fn record_message_at(&self, elapsed: Duration, bytes: &[u8]) {
        lock_capture(&self.capture).push_at(elapsed, bytes);
    }

    /// The transport wrapped from loop end to loop start. Time recorded
    /// since the last anchor is carried forward and the clock re-anchors at
    /// the wrap, so a take started mid-loop keeps its true timing.
    pub fn on_transport_loop(&self) {
        let mut capture = lock_capture(&self.capture);
        let elapsed = capture.anchor.map(|a| a.elapsed()).unwrap_or_default();
        capture.wrap_at(elapsed);
    }

    /// A loop wrap that happened `elapsed` after the current anchor.
    pub fn on_transport_loop_at(&self, elapsed: Duration) {
        lock_capture(&self.capture).wrap_at(elapsed);
    }

    /// Messages captured so far in this take.
    pub fn captured(&self) -> Vec<TimedMessage> {
        lock_capture(&self.capture).messages.clone()
    }

    /// Stop the device. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.device.stop();
        lock_capture(&self.capture).recording = false;
    }
}

impl Drop for MidiRecorder {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Arms tracks, schedules punch-in/out and reports finished takes.
pub struct CompositionRecorder {
    recorders: HashMap<Uuid, MidiRecorder>,
    state: RecorderState,
    punch_in: Option<Duration>,
    punch_out: Option<Duration>,
    mode: RecordingMode,
    target_segment: Option<Uuid>,
    stopped_tx: Sender<RecordingStopped>,
    stopped_rx: Receiver<RecordingStopped>,
    disposed: bool,
}

impl Default for CompositionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionRecorder {
    pub fn new() -> Self {
        let (stopped_tx, stopped_rx) = unbounded();
        Self {
            recorders: HashMap::new(),
            state: RecorderState::Idle,
            punch_in: None,
            punch_out: None,
            mode: RecordingMode::Normal,
            target_segment: None,
            stopped_tx,
            stopped_rx,
            disposed: false,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn mode(&self) -> RecordingMode {
        self.mode
    }

    /// Bind `device` to `track_id`, replacing and disposing any previous
    /// recorder for that track.
    pub fn arm_track(&mut self, track_id: Uuid, device: Box<dyn MidiInputDevice>) -> Result<Uuid, CompositionError> {
        let recorder = MidiRecorder::new(track_id, device)?;
        let id = recorder.id();
        if let Some(mut previous) = self.recorders.insert(track_id, recorder) {
            previous.dispose();
        }
        info!("Armed track {} for recording", track_id);
        Ok(id)
    }

    pub fn disarm_track(&mut self, track_id: Uuid) -> bool {
        match self.recorders.remove(&track_id) {
            Some(mut recorder) => {
                recorder.dispose();
                info!("Disarmed track {}", track_id);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, track_id: Uuid) -> bool {
        self.recorders.contains_key(&track_id)
    }

    pub fn recorder(&self, track_id: Uuid) -> Option<&MidiRecorder> {
        self.recorders.get(&track_id)
    }

    pub fn armed_tracks(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.recorders.keys().copied()
    }

    pub fn set_punch_in(&mut self, time: Option<Duration>) {
        self.punch_in = time;
    }

    pub fn set_punch_out(&mut self, time: Option<Duration>) {
        self.punch_out = time;
    }

    pub fn punch_in(&self) -> Option<Duration> {
        self.punch_in
    }

    pub fn punch_out(&self) -> Option<Duration> {
        self.punch_out
    }

    /// Receiver for finished takes.
    pub fn stopped(&self) -> Receiver<RecordingStopped> {
        self.stopped_rx.clone()
    }

    /// Start recording at `start_time`, or wait if punch-in lies later.
    pub fn start_recording(&mut self, start_time: Duration, mode: RecordingMode, target_segment: Option<Uuid>) {
        self.mode = mode;
        self.target_segment = target_segment;
        match self.punch_in {
            Some(punch_in) if punch_in > start_time => {
                self.state = RecorderState::WaitingForPunchIn;
                info!("Waiting for punch-in at {:?}", punch_in);
            }
            _ => self.begin(start_time),
        }
    }

    fn begin(&mut self, start_time: Duration) {
        for recorder in self.recorders.values_mut() {
            recorder.start(start_time);
        }
        self.state = RecorderState::Recording;
        info!("Recording {} track(s) from {:?}", self.recorders.len(), start_time);
    }

    /// Stop all recorders and publish their takes. Returns how many were sent.
    pub fn stop_recording(&mut self) -> usize {
        let was = self.state;
        self.state = RecorderState::Idle;
        if was != RecorderState::Recording {
            return 0;
        }
        let mut sent = 0;
        for recorder in self.recorders.values_mut() {
            let Some((start_time, messages)) = recorder.finish() else { continue };
            let stopped = RecordingStopped {
                track_id: recorder.track_id(),
                recorder_id: recorder.id(),
                start_time,
                mode: self.mode,
                target_segment: self.target_segment,
                messages,
            };
            if self.stopped_tx.send(stopped).is_ok() {
                sent += 1;
            } else {
                warn!("Dropped take for track {}", recorder.track_id());
            }
        }
        info!("Recording stopped ({} take(s))", sent);
        sent
    }

    /// Fire punch-in or punch-out if `position` has reached them.
    pub fn check_punch(&mut self, position: Duration) {
        match self.state {
            RecorderState::WaitingForPunchIn => {
                if let Some(punch_in) = self.punch_in.filter(|&p| position >= p) {
                    self.begin(punch_in);
                }
            }
            RecorderState::Recording => {
                if self.punch_out.is_some_and(|p| position >= p) {
                    self.stop_recording();
                }
            }
            RecorderState::Idle => {}
        }
    }

    /// Keep timestamps increasing across a loop wrap.
    pub fn on_transport_loop(&self) {
        if self.state != RecorderState::Recording {
            return;
        }
        for recorder in self.recorders.values() {
            recorder.on_transport_loop();
        }
    }

    /// Stop and release every armed recorder. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state = RecorderState::Idle;
        for (_, mut recorder) in self.recorders.drain() {
            recorder.dispose();
        }
    }
}

impl Drop for CompositionRecorder {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Turn a take into events ticked relative to `base_time` on the timeline.
/// Messages before `base_time` land on tick 0.
pub fn take_to_events(
    take: &RecordingStopped,
    base_time: Duration,
    ticks_per_quarter_note: u16,
    tempo: &TempoTrack,
) -> Vec<MidiEvent> {
    let base_tick = time_to_tick(base_time, ticks_per_quarter_note, tempo);
    let mut events = Vec::with_capacity(take.messages.len());
    for msg in &take.messages {
        let tick = time_to_tick(take.start_time + msg.at, ticks_per_quarter_note, tempo).saturating_sub(base_tick);
        if msg.bytes.first() == Some(&0xF0) {
            let body = msg.bytes[1..].strip_suffix(&[0xF7]).unwrap_or(&msg.bytes[1..]);
            events.push(MidiEvent::new(tick, EventKind::SysEx(body.to_vec())));
        } else if let Some(message) = MidiMessage::from_bytes(&msg.bytes) {
            events.push(MidiEvent::channel(tick, message));
        }
    }
    events
}

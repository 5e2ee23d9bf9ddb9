//! Cooperatively-scheduled long operations.
//!
//! Grounded on `original_source/src/MachineBase/LongOperation.hpp`: a
//! `LongOperation` is "a non-trivial command that requires multiple
//! passes through the game loop to complete", invoked once per tick
//! until it reports done. The built-ins named in spec.md §4.9 —
//! `Pause`, `Zoom`, `Textout` — and the two decorators are reproduced
//! here; their actual pixels/audio are out of scope (§1 Non-goals), so
//! each models only the timing/state machine the core owns, exposing
//! the hook an external renderer would drive off of.

use std::time::{Duration, Instant};

use crate::bytecode::SelectOption;
use crate::expr::MemoryAccess;
use crate::machine::Machine;

/// A task that runs in place of ordinary bytecode dispatch until it
/// finishes. `invoke` returns `true` exactly when the operation is done
/// and normal execution should resume.
pub trait LongOperation {
    /// Perform one tick's worth of work.
    fn invoke(&mut self, machine: &mut Machine<'_>) -> bool;
}

/// Per-tick input the host feeds into `Pause`-family long operations.
/// Flags are consumed (reset to `false`) the instant they are observed.
#[derive(Debug, Default)]
pub struct InputState {
    click: bool,
    key: bool,
}

impl InputState {
    /// Record that the user clicked since the last tick.
    pub fn signal_click(&mut self) {
        self.click = true;
    }

    /// Record that the user pressed a dismiss key since the last tick.
    pub fn signal_key(&mut self) {
        self.key = true;
    }

    fn take_click(&mut self) -> bool {
        std::mem::take(&mut self.click)
    }

    fn take_key(&mut self) -> bool {
        std::mem::take(&mut self.key)
    }
}

/// Waits for a click, a dismiss key, or (if constructed with
/// [`Pause::with_automode`]) a deadline, whichever comes first.
#[derive(Debug)]
pub struct Pause {
    automode_deadline: Option<Instant>,
}

impl Pause {
    /// A pause with no automode timeout: only input ends it.
    pub fn new() -> Self {
        Pause {
            automode_deadline: None,
        }
    }

    /// A pause that also ends on its own after `duration`, as RealLive's
    /// "automode" message-advance setting does.
    pub fn with_automode(duration: Duration) -> Self {
        Pause {
            automode_deadline: Some(Instant::now() + duration),
        }
    }
}

impl Default for Pause {
    fn default() -> Self {
        Self::new()
    }
}

impl LongOperation for Pause {
    fn invoke(&mut self, machine: &mut Machine<'_>) -> bool {
        let input = machine.input_mut();
        if input.take_click() || input.take_key() {
            return true;
        }
        match self.automode_deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// An axis-aligned rectangle in the (unspecified) coordinate space the
/// external renderer uses; the core only interpolates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

fn lerp(a: i32, b: i32, t: f64) -> i32 {
    a + ((b - a) as f64 * t).round() as i32
}

impl Rect {
    fn lerp(a: Rect, b: Rect, t: f64) -> Rect {
        Rect {
            x: lerp(a.x, b.x, t),
            y: lerp(a.y, b.y, t),
            width: lerp(a.width, b.width, t),
            height: lerp(a.height, b.height, t),
        }
    }
}

/// Time-driven interpolation between two rectangles, as used by the
/// `zoom`/`move` family of graphics opcodes. The core tracks only the
/// current interpolated value; drawing it is the renderer's job.
#[derive(Debug)]
pub struct Zoom {
    start: Rect,
    end: Rect,
    duration: Duration,
    began: Instant,
    current: Rect,
}

impl Zoom {
    pub fn new(start: Rect, end: Rect, duration: Duration) -> Self {
        Zoom {
            start,
            end,
            duration,
            began: Instant::now(),
            current: start,
        }
    }

    /// The interpolated rectangle as of the last `invoke`.
    pub fn current(&self) -> Rect {
        self.current
    }
}

impl LongOperation for Zoom {
    fn invoke(&mut self, _machine: &mut Machine<'_>) -> bool {
        let elapsed = self.began.elapsed();
        if self.duration.is_zero() || elapsed >= self.duration {
            self.current = self.end;
            return true;
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        self.current = Rect::lerp(self.start, self.end, t);
        false
    }
}

/// Multi-frame text reveal: forwards `chunk_size` bytes of already-parsed
/// textout to the machine's [`crate::machine::TextSink`] per tick, until
/// exhausted.
#[derive(Debug)]
pub struct TextoutLongOp {
    remaining: std::collections::VecDeque<u8>,
    chunk_size: usize,
}

impl TextoutLongOp {
    /// Reveal `text` one byte per tick.
    pub fn new(text: Vec<u8>) -> Self {
        TextoutLongOp {
            remaining: text.into(),
            chunk_size: 1,
        }
    }

    /// Reveal `text` `chunk_size` bytes per tick (0 is treated as 1).
    pub fn with_chunk_size(text: Vec<u8>, chunk_size: usize) -> Self {
        TextoutLongOp {
            remaining: text.into(),
            chunk_size: chunk_size.max(1),
        }
    }
}

impl LongOperation for TextoutLongOp {
    fn invoke(&mut self, machine: &mut Machine<'_>) -> bool {
        if self.remaining.is_empty() {
            return true;
        }
        let take = self.chunk_size.min(self.remaining.len());
        let chunk: Vec<u8> = self.remaining.drain(..take).collect();
        machine.display_text(&chunk);
        self.remaining.is_empty()
    }
}

/// A menu awaiting the host's choice. Created when the machine resolves
/// a `Select` element; [`Machine::choose`] resolves it.
#[derive(Debug)]
pub struct SelectPrompt {
    /// The options as parsed from bytecode, for the host to render.
    pub options: Vec<SelectOption>,
}

impl SelectPrompt {
    pub fn new(options: Vec<SelectOption>) -> Self {
        SelectPrompt { options }
    }
}

impl LongOperation for SelectPrompt {
    fn invoke(&mut self, machine: &mut Machine<'_>) -> bool {
        match machine.take_pending_select() {
            Some(choice) => {
                machine.memory_mut().set_store_register(choice as i32);
                true
            }
            None => false,
        }
    }
}

/// A post-action a decorator queues for the host once its inner
/// operation finishes; see [`Machine::drain_text_actions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAction {
    /// Start a fresh text page (the text window clears before the next
    /// line).
    NewPage,
    /// Interrupt reveal immediately rather than waiting for the window
    /// to fill (a forced line break mid-reveal).
    HardBreak,
}

/// Decorates a `LongOperation`: runs `inner` to completion exactly as a
/// bare `LongOperation` would, then, on the tick it finishes, also
/// queues [`TextAction::NewPage`] for the host. Grounded on
/// `original_source`'s decorator pattern over `LongOperation`
/// (`NewPageAfterLongop`/`HardBrakeAfterLongop` wrapping e.g. a pause).
pub struct NewPageAfterLongop {
    inner: Box<dyn LongOperation>,
}

impl NewPageAfterLongop {
    pub fn new(inner: Box<dyn LongOperation>) -> Self {
        NewPageAfterLongop { inner }
    }
}

impl LongOperation for NewPageAfterLongop {
    fn invoke(&mut self, machine: &mut Machine<'_>) -> bool {
        if self.inner.invoke(machine) {
            machine.queue_text_action(TextAction::NewPage);
            true
        } else {
            false
        }
    }
}

/// As [`NewPageAfterLongop`], but queues [`TextAction::HardBreak`].
pub struct HardBrakeAfterLongop {
    inner: Box<dyn LongOperation>,
}

impl HardBrakeAfterLongop {
    pub fn new(inner: Box<dyn LongOperation>) -> Self {
        HardBrakeAfterLongop { inner }
    }
}

impl LongOperation for HardBrakeAfterLongop {
    fn invoke(&mut self, machine: &mut Machine<'_>) -> bool {
        if self.inner.invoke(machine) {
            machine.queue_text_action(TextAction::HardBreak);
            true
        } else {
            false
        }
    }
}

//! Machine state: the shared operand/local/frame-link stack and its cursors.
//!
//! One growable buffer of words holds every frame. For a method frame with
//! base `lv`, argument count `A` and local count `N`:
//!
//! ```text
//! lv            link index K (overwrites the caller's reference word)
//! lv+1..lv+A    arguments
//! lv+A..K       declared locals, zeroed
//! K, K+1        saved pc, saved lv
//! K+2..top      operand stack
//! ```
//!
//! The root frame has `lv = 0`, [`ROOT_FRAME_SLOTS`] locals and no link.

use ijvm_common::{Module, Word};

use crate::config::{MachineConfig, ROOT_FRAME_SLOTS};
use crate::error::RuntimeError;

/// Why the machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A HALT instruction executed.
    Halt,
    /// An ERR instruction executed; the error marker was written.
    ErrorSignal,
    /// The program counter ran past the end of the text.
    EndOfProgram,
}

/// The IJVM machine.
///
/// Borrows its module immutably and owns its input source and output sink.
pub struct Machine<'m, R, W> {
    /// The module being executed.
    pub(crate) module: &'m Module,
    /// Byte source for IN.
    pub(crate) input: R,
    /// Byte sink for OUT and ERR.
    pub(crate) output: W,
    pub(crate) config: MachineConfig,
    /// Stack buffer. Its length is the current capacity; `top` is the live count.
    pub(crate) slots: Vec<Word>,
    /// Number of live slots.
    pub(crate) top: usize,
    /// Base of the current frame.
    pub(crate) lv: usize,
    /// Offset of the next instruction.
    pub(crate) pc: usize,
    pub(crate) halted: Option<HaltReason>,
    /// Instructions executed so far.
    pub(crate) steps: u64,
}

impl<'m, R, W> Machine<'m, R, W> {
    /// Create a machine with the default configuration.
    pub fn new(module: &'m Module, input: R, output: W) -> Self {
        Self::with_config(module, input, output, MachineConfig::default())
    }

    /// Create a machine with an explicit configuration.
    pub fn with_config(module: &'m Module, input: R, output: W, config: MachineConfig) -> Self {
        let capacity = config
            .initial_stack_capacity
            .min(config.max_stack_slots)
            .max(ROOT_FRAME_SLOTS);
        Self {
            module,
            input,
            output,
            config,
            slots: vec![0; capacity],
            top: ROOT_FRAME_SLOTS,
            lv: 0,
            pc: 0,
            halted: None,
            steps: 0,
        }
    }

    // ---- Inspection ----

    /// Offset of the next instruction.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Base of the current frame.
    pub fn lv(&self) -> usize {
        self.lv
    }

    /// Number of live stack slots, root frame included.
    pub fn top(&self) -> usize {
        self.top
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.halted
    }

    /// The topmost live slot, without popping.
    pub fn tos(&self) -> Option<Word> {
        self.top.checked_sub(1).map(|i| self.slots[i])
    }

    pub fn text(&self) -> &[u8] {
        &self.module.text
    }

    pub fn text_size(&self) -> usize {
        self.module.text.len()
    }

    pub fn constant(&self, index: usize) -> Option<Word> {
        self.module.constant(index)
    }

    /// Local variable `index` of the current frame.
    pub fn local(&self, index: usize) -> Option<Word> {
        let size = self.frame_size().ok()?;
        (index < size).then(|| self.slots[self.lv + index])
    }

    /// The current frame's operand stack, bottom first.
    pub fn operand_stack(&self) -> &[Word] {
        match self.operand_base() {
            Ok(base) => &self.slots[base..self.top],
            Err(_) => &[],
        }
    }

    /// Number of method activations above the root frame.
    pub fn frame_depth(&self) -> usize {
        let mut depth = 0;
        let mut lv = self.lv;
        while lv != 0 {
            let Some(link) = self.link_of(lv) else { break };
            let saved_lv = self.slots[link + 1];
            match usize::try_from(saved_lv) {
                Ok(caller) if caller < lv => lv = caller,
                _ => break,
            }
            depth += 1;
        }
        depth
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.output
    }

    /// Consume the machine, returning its output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    // ---- Frame layout ----

    /// Validated link index for a method frame based at `lv`.
    fn link_of(&self, lv: usize) -> Option<usize> {
        let raw = *self.slots.get(lv)?;
        let link = usize::try_from(raw).ok()?;
        (link > lv && link + 2 <= self.top).then_some(link)
    }

    /// Link index of the current frame, `None` for the root frame.
    pub(crate) fn frame_link(&self) -> Result<Option<usize>, RuntimeError> {
        if self.lv == 0 {
            return Ok(None);
        }
        self.link_of(self.lv)
            .map(Some)
            .ok_or(RuntimeError::CorruptFrameLink {
                at: self.pc,
                link: self.slots[self.lv],
            })
    }

    /// Number of local slots in the current frame.
    pub(crate) fn frame_size(&self) -> Result<usize, RuntimeError> {
        Ok(match self.frame_link()? {
            Some(link) => link - self.lv,
            None => ROOT_FRAME_SLOTS,
        })
    }

    /// First operand slot of the current frame.
    pub(crate) fn operand_base(&self) -> Result<usize, RuntimeError> {
        Ok(match self.frame_link()? {
            Some(link) => link + 2,
            None => ROOT_FRAME_SLOTS,
        })
    }

    /// Number of operands on the current frame's stack.
    pub(crate) fn operand_depth(&self) -> Result<usize, RuntimeError> {
        Ok(self.top.saturating_sub(self.operand_base()?))
    }

    /// Absolute slot of local `index`, bounds-checked against the frame.
    pub(crate) fn local_slot(&self, index: u16) -> Result<usize, RuntimeError> {
        let size = self.frame_size()?;
        if usize::from(index) >= size {
            return Err(RuntimeError::LocalOutOfRange {
                at: self.pc,
                index,
                size,
            });
        }
        Ok(self.lv + usize::from(index))
    }

    // ---- Stack primitives ----

    /// Fail unless `count` more slots fit under the configured limit.
    pub(crate) fn check_room(&self, count: usize) -> Result<(), RuntimeError> {
        let limit = self.config.max_stack_slots;
        if self.top.saturating_add(count) > limit {
            return Err(RuntimeError::StackOverflow { at: self.pc, limit });
        }
        Ok(())
    }

    /// Push a word, doubling the buffer when it is full.
    pub(crate) fn push(&mut self, value: Word) -> Result<(), RuntimeError> {
        self.check_room(1)?;
        if self.top == self.slots.len() {
            let grown = (self.slots.len() * 2).clamp(self.top + 1, self.config.max_stack_slots);
            self.slots.resize(grown, 0);
        }
        self.slots[self.top] = value;
        self.top += 1;
        Ok(())
    }

    /// Operand `depth` positions below the top (0 = top), without popping.
    pub(crate) fn operand(&self, depth: usize) -> Result<Word, RuntimeError> {
        if depth >= self.operand_depth()? {
            return Err(RuntimeError::StackUnderflow { at: self.pc });
        }
        Ok(self.slots[self.top - 1 - depth])
    }

    /// Drop `count` operands already checked with [`Machine::operand`].
    pub(crate) fn discard(&mut self, count: usize) {
        self.top -= count;
    }

    pub(crate) fn pop(&mut self) -> Result<Word, RuntimeError> {
        let value = self.operand(0)?;
        self.discard(1);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn machine(module: &Module) -> Machine<'_, io::Empty, Vec<u8>> {
        Machine::new(module, io::empty(), Vec::new())
    }

    #[test]
    fn initial_state() {
        let module = Module::new(vec![], vec![]);
        let m = machine(&module);
        assert_eq!(m.pc(), 0);
        assert_eq!(m.lv(), 0);
        assert_eq!(m.top(), ROOT_FRAME_SLOTS);
        assert!(!m.is_halted());
        assert!(m.operand_stack().is_empty());
        assert_eq!(m.local(0), Some(0));
        assert_eq!(m.local(255), Some(0));
        assert_eq!(m.local(256), None);
        assert_eq!(m.frame_depth(), 0);
    }

    #[test]
    fn small_initial_capacity_still_fits_root_frame() {
        let module = Module::new(vec![], vec![]);
        let config = MachineConfig::default().with_initial_stack_capacity(4);
        let m = Machine::with_config(&module, io::empty(), Vec::<u8>::new(), config);
        assert_eq!(m.slots.len(), ROOT_FRAME_SLOTS);
    }

    #[test]
    fn push_grows_by_doubling_and_preserves_slots() {
        let module = Module::new(vec![], vec![]);
        let config = MachineConfig::default().with_initial_stack_capacity(ROOT_FRAME_SLOTS);
        let mut m = Machine::with_config(&module, io::empty(), Vec::<u8>::new(), config);
        m.slots[3] = 77;
        m.push(1).unwrap();
        assert_eq!(m.slots.len(), ROOT_FRAME_SLOTS * 2);
        assert_eq!(m.slots[3], 77);
        for i in 0..ROOT_FRAME_SLOTS {
            m.push(i as Word).unwrap();
        }
        assert_eq!(m.slots.len(), ROOT_FRAME_SLOTS * 4);
        assert_eq!(m.operand(0).unwrap(), (ROOT_FRAME_SLOTS - 1) as Word);
        assert_eq!(m.operand_stack()[0], 1);
    }

    #[test]
    fn initial_capacity_is_capped_by_limit() {
        let module = Module::new(vec![], vec![]);
        let config = MachineConfig::default()
            .with_initial_stack_capacity(usize::MAX / 2)
            .with_max_stack_slots(ROOT_FRAME_SLOTS + 16);
        let m = Machine::with_config(&module, io::empty(), Vec::<u8>::new(), config);
        assert_eq!(m.slots.len(), ROOT_FRAME_SLOTS + 16);

        let config = MachineConfig::default().with_max_stack_slots(8);
        let m = Machine::with_config(&module, io::empty(), Vec::<u8>::new(), config);
        assert_eq!(m.slots.len(), ROOT_FRAME_SLOTS);
    }

    #[test]
    fn push_past_limit_overflows() {
        let module = Module::new(vec![], vec![]);
        let config = MachineConfig::default().with_max_stack_slots(ROOT_FRAME_SLOTS + 1);
        let mut m = Machine::with_config(&module, io::empty(), Vec::<u8>::new(), config);
        m.push(1).unwrap();
        assert_eq!(
            m.push(2),
            Err(RuntimeError::StackOverflow {
                at: 0,
                limit: ROOT_FRAME_SLOTS + 1
            })
        );
        assert_eq!(m.top(), ROOT_FRAME_SLOTS + 1);
    }

    #[test]
    fn pop_below_root_operands_underflows() {
        let module = Module::new(vec![], vec![]);
        let mut m = machine(&module);
        assert_eq!(m.pop(), Err(RuntimeError::StackUnderflow { at: 0 }));
        m.push(5).unwrap();
        assert_eq!(m.tos(), Some(5));
        assert_eq!(m.pop(), Ok(5));
        assert_eq!(m.top(), ROOT_FRAME_SLOTS);
    }

    #[test]
    fn root_local_slot_bounds() {
        let module = Module::new(vec![], vec![]);
        let m = machine(&module);
        assert_eq!(m.local_slot(255), Ok(255));
        assert_eq!(
            m.local_slot(256),
            Err(RuntimeError::LocalOutOfRange {
                at: 0,
                index: 256,
                size: ROOT_FRAME_SLOTS
            })
        );
    }

    #[test]
    fn corrupt_link_is_reported() {
        let module = Module::new(vec![], vec![]);
        let mut m = machine(&module);
        m.push(0).unwrap();
        m.lv = ROOT_FRAME_SLOTS;
        m.slots[ROOT_FRAME_SLOTS] = -4;
        assert_eq!(
            m.frame_size(),
            Err(RuntimeError::CorruptFrameLink { at: 0, link: -4 })
        );
        assert!(m.operand_stack().is_empty());
        assert_eq!(m.local(0), None);
    }
}

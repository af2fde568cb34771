//! Run loop and instruction transitions for the IJVM machine.
//!
//! Each step decodes one [`Instruction`] at `pc` and hands it to
//! [`Machine::transition`], which validates, mutates and returns the next
//! `pc`. A transition that fails leaves the machine untouched.

use std::io::{self, Read, Write};

use ijvm_common::{DecodeError, Instruction, Word};
use tracing::{debug, trace, warn};

use crate::error::RuntimeError;
use crate::machine::{HaltReason, Machine};

/// Bytes written to the output by ERR.
pub const ERROR_MARKER: &[u8] = b"ERROR\n";

/// Size of a method header (`arg_count`, `local_count`).
const METHOD_HEADER_LEN: usize = 4;

impl<'m, R: Read, W: Write> Machine<'m, R, W> {
    /// Execute until the machine halts or faults.
    pub fn run(&mut self) -> Result<HaltReason, RuntimeError> {
        loop {
            if let Some(reason) = self.halted {
                return Ok(reason);
            }
            self.step()?;
        }
    }

    /// Execute a single instruction. Does nothing once halted.
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        if self.halted.is_some() {
            return Ok(());
        }
        if self.pc >= self.module.text.len() {
            self.halt(HaltReason::EndOfProgram);
            return Ok(());
        }
        if let Some(limit) = self.config.step_limit {
            if self.steps >= limit {
                return Err(RuntimeError::StepLimitExceeded { at: self.pc, limit });
            }
        }

        let instr = match Instruction::decode(&self.module.text, self.pc) {
            Ok(instr) => instr,
            Err(DecodeError::UnknownOpcode { at, opcode }) if self.config.lenient_opcodes => {
                warn!(at, opcode, "skipping unknown opcode");
                self.pc += 1;
                self.steps += 1;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        trace!(pc = self.pc, instr = %instr, top = self.top, lv = self.lv, "execute");

        let next = self.transition(instr)?;
        self.pc = next;
        self.steps += 1;
        Ok(())
    }

    /// Apply one decoded instruction and return the next `pc`.
    fn transition(&mut self, instr: Instruction) -> Result<usize, RuntimeError> {
        let at = self.pc;
        let fallthrough = at + instr.len();

        match instr {
            Instruction::Nop => {}
            Instruction::Bipush(value) => self.push(Word::from(value))?,
            Instruction::LdcW(index) => {
                let value = self.constant_at(index)?;
                self.push(value)?;
            }

            // Stack
            Instruction::Dup => {
                let value = self.operand(0)?;
                self.push(value)?;
            }
            Instruction::Pop => {
                self.pop()?;
            }
            Instruction::Swap => {
                let b = self.operand(0)?;
                let a = self.operand(1)?;
                let top = self.top;
                self.slots[top - 1] = a;
                self.slots[top - 2] = b;
            }

            // Arithmetic
            Instruction::Iadd => self.binary_op(|a, b| a.wrapping_add(b))?,
            Instruction::Isub => self.binary_op(|a, b| a.wrapping_sub(b))?,
            Instruction::Iand => self.binary_op(|a, b| a & b)?,
            Instruction::Ior => self.binary_op(|a, b| a | b)?,

            // Local variables
            Instruction::Iload { index, .. } => {
                let slot = self.local_slot(index)?;
                self.push(self.slots[slot])?;
            }
            Instruction::Istore { index, .. } => {
                let slot = self.local_slot(index)?;
                let value = self.pop()?;
                self.slots[slot] = value;
            }
            Instruction::Iinc { index, delta, .. } => {
                let slot = self.local_slot(index)?;
                self.slots[slot] = self.slots[slot].wrapping_add(Word::from(delta));
            }

            // Control flow
            Instruction::Goto(offset) => return self.branch_target(offset),
            Instruction::Ifeq(offset) => {
                return self.branch_if(1, |v| v[0] == 0, offset, fallthrough)
            }
            Instruction::Iflt(offset) => {
                return self.branch_if(1, |v| v[0] < 0, offset, fallthrough)
            }
            Instruction::IfIcmpeq(offset) => {
                return self.branch_if(2, |v| v[0] == v[1], offset, fallthrough)
            }
            Instruction::Invokevirtual(index) => return self.invoke(index, fallthrough),
            Instruction::Ireturn => return self.ireturn(),

            // Machine control
            Instruction::In => {
                self.check_room(1)?;
                let value = self.read_input()?;
                self.push(value)?;
            }
            Instruction::Out => {
                let value = self.operand(0)?;
                self.write_output(&[value as u8])?;
                self.discard(1);
            }
            Instruction::Err => {
                self.write_output(ERROR_MARKER)?;
                self.halt(HaltReason::ErrorSignal);
            }
            Instruction::Halt => self.halt(HaltReason::Halt),
        }

        Ok(fallthrough)
    }

    // ---- Transition helpers ----

    fn halt(&mut self, reason: HaltReason) {
        debug!(pc = self.pc, ?reason, steps = self.steps, "halted");
        self.halted = Some(reason);
    }

    /// Pop b, pop a, push `op(a, b)`.
    fn binary_op(&mut self, op: impl Fn(Word, Word) -> Word) -> Result<(), RuntimeError> {
        let b = self.operand(0)?;
        let a = self.operand(1)?;
        self.discard(2);
        self.push(op(a, b))
    }

    fn constant_at(&self, index: u16) -> Result<Word, RuntimeError> {
        self.module
            .constant(usize::from(index))
            .ok_or(RuntimeError::ConstantOutOfRange {
                at: self.pc,
                index,
                size: self.module.constants.len(),
            })
    }

    /// Absolute target of a branch at the current `pc`.
    fn branch_target(&self, offset: i16) -> Result<usize, RuntimeError> {
        self.pc
            .checked_add_signed(isize::from(offset))
            .ok_or(RuntimeError::BranchOutOfRange {
                at: self.pc,
                offset,
            })
    }

    /// Pop `arity` operands and branch if `taken` holds for them.
    ///
    /// `taken` sees the operands in push order (`v[0]` pushed first).
    fn branch_if(
        &mut self,
        arity: usize,
        taken: impl Fn(&[Word]) -> bool,
        offset: i16,
        fallthrough: usize,
    ) -> Result<usize, RuntimeError> {
        let mut values = [0; 2];
        for (i, value) in values[..arity].iter_mut().enumerate() {
            *value = self.operand(arity - 1 - i)?;
        }
        let next = if taken(&values[..arity]) {
            self.branch_target(offset)?
        } else {
            fallthrough
        };
        self.discard(arity);
        Ok(next)
    }

    // ---- Method invocation ----

    fn invoke(&mut self, index: u16, return_pc: usize) -> Result<usize, RuntimeError> {
        let at = self.pc;
        let raw_entry = self.constant_at(index)?;
        let (entry, (arg_count, local_count)) = usize::try_from(raw_entry)
            .ok()
            .and_then(|entry| Some((entry, self.module.method_header(entry)?)))
            .ok_or(RuntimeError::InvalidMethodEntry {
                at,
                entry: raw_entry,
            })?;

        if arg_count == 0 {
            return Err(RuntimeError::InvalidMethodHeader { at, entry });
        }
        let args = usize::from(arg_count);
        let locals = usize::from(local_count);

        let available = self.operand_depth()?;
        if available < args {
            return Err(RuntimeError::ArgumentUnderflow {
                at,
                entry,
                expected: args,
                available,
            });
        }
        self.check_room(locals + 2)?;

        let saved_lv = self.lv;
        for _ in 0..locals {
            self.push(0)?;
        }
        let new_lv = self.top - args - locals;
        let link = self.top;
        self.slots[new_lv] = link as Word;
        self.push(return_pc as Word)?;
        self.push(saved_lv as Word)?;
        self.lv = new_lv;

        debug!(
            at,
            entry,
            args,
            locals,
            lv = new_lv,
            depth = self.frame_depth(),
            "invoke"
        );

        Ok(entry + METHOD_HEADER_LEN)
    }

    fn ireturn(&mut self) -> Result<usize, RuntimeError> {
        let at = self.pc;
        let link = self
            .frame_link()?
            .ok_or(RuntimeError::ReturnFromRoot { at })?;
        let value = self.operand(0)?;

        let saved_pc = self.slots[link];
        let saved_lv = self.slots[link + 1];
        let corrupt = RuntimeError::CorruptFrameLink {
            at,
            link: link as Word,
        };
        let return_pc = usize::try_from(saved_pc).map_err(|_| corrupt.clone())?;
        let caller_lv = usize::try_from(saved_lv)
            .ok()
            .filter(|&lv| lv < self.lv)
            .ok_or(corrupt)?;

        self.top = self.lv;
        self.lv = caller_lv;
        self.push(value)?;

        debug!(at, return_pc, value, lv = caller_lv, "return");

        Ok(return_pc)
    }

    // ---- Input / output ----

    /// Read one byte of input; 0 once the source is exhausted.
    ///
    /// Pending output is flushed first so a prompt is visible while IN blocks.
    fn read_input(&mut self) -> Result<Word, RuntimeError> {
        self.output.flush().map_err(|err| self.io_error(err))?;
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(0),
                Ok(_) => return Ok(Word::from(byte[0])),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.io_error(err)),
            }
        }
    }

    fn write_output(&mut self, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.output
            .write_all(bytes)
            .map_err(|err| self.io_error(err))
    }

    fn io_error(&self, err: io::Error) -> RuntimeError {
        RuntimeError::Io {
            at: self.pc,
            kind: err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MachineConfig, ROOT_FRAME_SLOTS};
    use ijvm_common::Module;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn run_text(text: Vec<u8>) -> (Result<HaltReason, RuntimeError>, Vec<u8>) {
        let module = Module::new(vec![], text);
        let mut machine = Machine::new(&module, io::empty(), Vec::new());
        let result = machine.run();
        (result, machine.into_output())
    }

    #[test]
    fn empty_text_ends_immediately() {
        let (result, output) = run_text(vec![]);
        assert_eq!(result, Ok(HaltReason::EndOfProgram));
        assert!(output.is_empty());
    }

    #[test]
    fn halt_advances_past_itself() {
        let module = Module::new(vec![], vec![0x00, 0xFF, 0x00]);
        let mut m = Machine::new(&module, io::empty(), Vec::new());
        assert_eq!(m.run(), Ok(HaltReason::Halt));
        assert_eq!(m.pc(), 2);
        assert_eq!(m.steps(), 2);
    }

    #[test]
    fn step_after_halt_is_noop() {
        let module = Module::new(vec![], vec![0xFF, 0x10, 0x01]);
        let mut m = Machine::new(&module, io::empty(), Vec::new());
        m.step().unwrap();
        assert!(m.is_halted());
        m.step().unwrap();
        assert_eq!(m.pc(), 1);
        assert_eq!(m.top(), ROOT_FRAME_SLOTS);
    }

    #[test]
    fn err_writes_marker_and_halts() {
        let (result, output) = run_text(vec![0xFE, 0x10, 0x41, 0xFD]);
        assert_eq!(result, Ok(HaltReason::ErrorSignal));
        assert_eq!(output, ERROR_MARKER);
    }

    #[test]
    fn unknown_opcode_faults_by_default() {
        let (result, _) = run_text(vec![0x00, 0xBB]);
        assert_eq!(
            result,
            Err(RuntimeError::IllegalOpcode { at: 1, opcode: 0xBB })
        );
    }

    #[test]
    fn unknown_opcode_skipped_when_lenient() {
        let module = Module::new(vec![], vec![0xBB, 0x10, 0x41, 0xFD, 0xFF]);
        let config = MachineConfig::default().with_lenient_opcodes(true);
        let mut m = Machine::with_config(&module, io::empty(), Vec::new(), config);
        assert_eq!(m.run(), Ok(HaltReason::Halt));
        assert_eq!(m.output(), b"A");
    }

    #[test]
    fn failed_transition_leaves_state_untouched() {
        // BIPUSH 1, IADD: second operand is missing.
        let module = Module::new(vec![], vec![0x10, 0x01, 0x60]);
        let mut m = Machine::new(&module, io::empty(), Vec::new());
        m.step().unwrap();
        assert_eq!(m.step(), Err(RuntimeError::StackUnderflow { at: 2 }));
        assert_eq!(m.pc(), 2);
        assert_eq!(m.operand_stack(), &[1]);
    }

    #[test]
    fn backward_branch_before_start_faults() {
        let (result, _) = run_text(vec![0x00, 0xA7, 0xFF, 0xF0]);
        assert_eq!(
            result,
            Err(RuntimeError::BranchOutOfRange { at: 1, offset: -16 })
        );
    }

    #[test]
    fn branch_past_end_halts() {
        let (result, _) = run_text(vec![0xA7, 0x00, 0x10]);
        assert_eq!(result, Ok(HaltReason::EndOfProgram));
    }

    #[test]
    fn step_limit_stops_infinite_loop() {
        // GOTO 0
        let module = Module::new(vec![], vec![0xA7, 0x00, 0x00]);
        let config = MachineConfig::default().with_step_limit(Some(5));
        let mut m = Machine::with_config(&module, io::empty(), Vec::new(), config);
        assert_eq!(
            m.run(),
            Err(RuntimeError::StepLimitExceeded { at: 0, limit: 5 })
        );
        assert_eq!(m.steps(), 5);
    }

    #[test]
    fn ireturn_in_root_frame_faults() {
        let (result, _) = run_text(vec![0x10, 0x01, 0xAC]);
        assert_eq!(result, Err(RuntimeError::ReturnFromRoot { at: 2 }));
    }

    #[test]
    fn swap_exchanges_in_place() {
        let module = Module::new(vec![], vec![0x10, 0x01, 0x10, 0x02, 0x5F]);
        let mut m = Machine::new(&module, io::empty(), Vec::new());
        m.run().unwrap();
        assert_eq!(m.operand_stack(), &[2, 1]);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn output_failure_keeps_operand() {
        let module = Module::new(vec![], vec![0x10, 0x41, 0xFD]);
        let mut m = Machine::new(&module, io::empty(), FailingSink);
        assert_eq!(
            m.run(),
            Err(RuntimeError::Io {
                at: 2,
                kind: io::ErrorKind::BrokenPipe
            })
        );
        assert_eq!(m.tos(), Some(0x41));
    }

    /// Sink that only publishes bytes on flush.
    struct BufferedSink {
        pending: Vec<u8>,
        flushed: Rc<RefCell<Vec<u8>>>,
    }

    impl Write for BufferedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushed.borrow_mut().append(&mut self.pending);
            Ok(())
        }
    }

    /// Input that records what the sink had published when it was read.
    struct WatchingInput {
        flushed: Rc<RefCell<Vec<u8>>>,
        seen: Vec<Vec<u8>>,
    }

    impl Read for WatchingInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.seen.push(self.flushed.borrow().clone());
            buf[0] = b'z';
            Ok(1)
        }
    }

    #[test]
    fn output_is_flushed_before_input_blocks() {
        // BIPUSH 'A', OUT, IN, OUT, HALT
        let module = Module::new(vec![], vec![0x10, 0x41, 0xFD, 0xFC, 0xFD, 0xFF]);
        let flushed = Rc::new(RefCell::new(Vec::new()));
        let input = WatchingInput {
            flushed: Rc::clone(&flushed),
            seen: Vec::new(),
        };
        let sink = BufferedSink {
            pending: Vec::new(),
            flushed: Rc::clone(&flushed),
        };
        let mut m = Machine::new(&module, input, sink);
        assert_eq!(m.run(), Ok(HaltReason::Halt));
        assert_eq!(m.input.seen, vec![b"A".to_vec()]);
        assert_eq!(m.output.pending, b"z");
    }

    struct UnflushableSink;

    impl Write for UnflushableSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn flush_failure_before_input_faults_in() {
        let module = Module::new(vec![], vec![0xFC]);
        let mut m = Machine::new(&module, &b"x"[..], UnflushableSink);
        assert_eq!(
            m.run(),
            Err(RuntimeError::Io {
                at: 0,
                kind: io::ErrorKind::BrokenPipe
            })
        );
        assert_eq!(m.top(), ROOT_FRAME_SLOTS);
    }
}

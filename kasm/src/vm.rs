//! The frame-based register virtual machine (§4.2).

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::ast::{Arg, Instruction, Op};
use crate::config::VmConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::load::{self, LoadedProgram};

/// A tagged 64-bit scalar register (§3 "VM register", §9 "tagged scalar
/// registers"). `bits` holds either a signed 64-bit integer or the raw
/// IEEE-754 representation of an `f64`; `is_float` says which.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Register {
    pub bits: i64,
    pub is_float: bool,
}

impl Register {
    pub const ZERO: Self = Self { bits: 0, is_float: false };

    pub fn int(v: i64) -> Self {
        Self { bits: v, is_float: false }
    }

    pub fn float(v: f64) -> Self {
        Self { bits: v.to_bits() as i64, is_float: true }
    }

    /// Bit-reinterprets `bits` as an `f64` regardless of `is_float` — the
    /// operation §4.2.3 calls for when promoting a mixed-tag pair, and the
    /// one §9 warns must never become a numeric int-to-float conversion.
    pub fn as_f64_bits(self) -> f64 {
        f64::from_bits(self.bits as u64)
    }

    pub fn as_f64(self) -> f64 {
        if self.is_float {
            self.as_f64_bits()
        } else {
            self.bits as f64
        }
    }
}

#[derive(Clone, Debug)]
pub struct Local {
    pub name: String,
    pub type_name: String,
    pub mem: usize,
}

impl Local {
    fn is_float(&self) -> bool {
        self.type_name.starts_with('f')
    }
}

#[derive(Debug)]
pub struct Frame {
    id: u64,
    pub sp: usize,
    pub bp: usize,
    pub pc: usize,
    pub registers: [Register; 32],
    pub cmp_flag: bool,
    pub locals: Vec<Local>,
    pub parent: Option<Box<Frame>>,
}

impl Frame {
    fn new(id: u64, sp: usize, bp: usize, pc: usize, parent: Option<Box<Frame>>) -> Self {
        Self {
            id,
            sp,
            bp,
            pc,
            registers: [Register::ZERO; 32],
            cmp_flag: false,
            locals: Vec::new(),
            parent,
        }
    }

    fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().rev().find(|l| l.name == name)
    }
}

/// The VM proper: a loaded instruction array, label table, struct member
/// layout, flat memory buffer, and the current frame chain.
pub struct Vm {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
    member_offsets: HashMap<String, u32>,
    type_sizes: HashMap<String, u32>,
    memory: Vec<u8>,
    current_frame: Box<Frame>,
    config: VmConfig,
    next_frame_id: u64,
    cycles: u64,
}

impl Vm {
    /// `new_vm(memory_size)` from §6's host API, generalized to a full
    /// [VmConfig] per §4.2.9.
    pub fn new(config: VmConfig) -> Self {
        let memory_size = config.memory_size;
        let base = Frame::new(0, memory_size, memory_size, 0, None);
        Self {
            instructions: Vec::new(),
            labels: HashMap::new(),
            member_offsets: HashMap::new(),
            type_sizes: HashMap::new(),
            memory: vec![0u8; memory_size],
            current_frame: Box::new(base),
            config,
            next_frame_id: 1,
            cycles: 0,
        }
    }

    pub fn load(&mut self, kasm_text: &str) -> crate::error::LoadResult<()> {
        let LoadedProgram { instructions, labels, member_offsets, type_sizes } = load::load(kasm_text)?;
        self.instructions = instructions;
        self.labels = labels;
        self.member_offsets = member_offsets;
        self.type_sizes = type_sizes;
        Ok(())
    }

    /// Resolves the byte size backing a `newsv`/`newav` declaration. Pointer
    /// types and scalars are sized by [kappa::consts::type_size]; a bare
    /// struct name instead falls back to its loaded member layout, since
    /// `type_size` alone can't see past the type name to its fields.
    fn resolve_size(&self, type_name: &str) -> usize {
        if type_name.starts_with('*') || kappa::consts::scalar_size(type_name).is_some() {
            kappa::consts::type_size(type_name) as usize
        } else {
            self.type_sizes
                .get(type_name)
                .copied()
                .unwrap_or_else(|| kappa::consts::type_size(type_name)) as usize
        }
    }

    /// `push(program, bytes)` — writes bytes directly onto the current
    /// frame's stack, for passing arguments to the next `call`.
    pub fn push(&mut self, bytes: &[u8]) -> RuntimeResult<()> {
        let len = bytes.len();
        if len > self.current_frame.sp {
            return Err(RuntimeError::StackOverflow);
        }
        self.current_frame.sp -= len;
        let sp = self.current_frame.sp;
        self.memory[sp..sp + len].copy_from_slice(bytes);
        Ok(())
    }

    /// `call(program, label)` — pushes a new frame and sets its `pc` to the
    /// label's instruction. Returns the id of the frame that was current
    /// beforehand, which `run` needs to know when to stop.
    pub fn call(&mut self, label: &str) -> RuntimeResult<u64> {
        let target = *self
            .labels
            .get(label)
            .ok_or_else(|| RuntimeError::UnresolvedLabel { name: label.to_string() })?;
        Ok(self.push_frame(target))
    }

    /// Allocates a new frame inheriting `sp == bp == parent.sp` and jumps to
    /// `target` (§4.2.1), used both by the host-facing `call` and by the
    /// `callf` opcode for calls made from within KAPPA code.
    fn push_frame(&mut self, target: usize) -> u64 {
        let parent_id = self.current_frame.id;
        let sp = self.current_frame.sp;
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        let old = std::mem::replace(&mut self.current_frame, Box::new(Frame::new(id, sp, sp, target, None)));
        self.current_frame.parent = Some(old);
        parent_id
    }

    /// `loop(program, frame)` — dispatches instructions until the frame
    /// chain pops back to `start_frame`, then returns `r[0]` of that frame
    /// reinterpreted as `f64` (§4.2.4).
    pub fn run(&mut self, start_frame: u64) -> RuntimeResult<f64> {
        self.cycles = 0;
        while self.current_frame.id != start_frame {
            self.step()?;
        }
        Ok(self.current_frame.registers[0].as_f64())
    }

    /// Convenience: compiles down to `call` then `run` in one shot.
    pub fn call_and_run(&mut self, label: &str) -> RuntimeResult<f64> {
        let start = self.call(label)?;
        self.run(start)
    }

    fn step(&mut self) -> RuntimeResult<()> {
        self.cycles += 1;
        if self.cycles > self.config.max_cycle_count {
            return Err(RuntimeError::TooManyCycles { limit: self.config.max_cycle_count });
        }
        let pc = self.current_frame.pc;
        let instr = self
            .instructions
            .get(pc)
            .cloned()
            .ok_or_else(|| RuntimeError::UnresolvedLabel { name: format!("<pc {}>", pc) })?;
        trace!("pc={} {:?}", pc, instr.op);
        let jumped = self.execute(&instr)?;
        if !jumped {
            self.current_frame.pc += 1;
        }
        Ok(())
    }

    fn reg(&self, args: &[Arg], i: usize) -> usize {
        args[i].as_reg().expect("operand is a register") as usize
    }

    fn execute(&mut self, instr: &Instruction) -> RuntimeResult<bool> {
        use Op::*;
        match instr.op {
            Pushr => {
                let a = self.reg(&instr.args, 0);
                let bits = self.current_frame.registers[a].bits;
                if self.current_frame.sp < 8 {
                    return Err(RuntimeError::StackOverflow);
                }
                self.current_frame.sp -= 8;
                let sp = self.current_frame.sp;
                self.write_i64(sp, bits)?;
                Ok(false)
            }
            Poprr => {
                let a = self.reg(&instr.args, 0);
                if self.current_frame.sp + 8 > self.memory.len() {
                    return Err(RuntimeError::StackUnderflow);
                }
                let sp = self.current_frame.sp;
                let bits = self.read_i64(sp)?;
                self.current_frame.sp += 8;
                self.current_frame.registers[a].bits = bits;
                Ok(false)
            }
            Newsv => {
                let type_name = instr.args[0].as_name().unwrap_or_default().to_string();
                let name = instr.args[1].as_name().unwrap_or_default().to_string();
                let size = self.resolve_size(&type_name);
                if self.current_frame.sp < size {
                    return Err(RuntimeError::StackOverflow);
                }
                self.current_frame.sp -= size;
                let mem = self.current_frame.sp;
                self.current_frame.locals.push(Local { name, type_name, mem });
                Ok(false)
            }
            Newav => {
                let type_name = instr.args[0].as_name().unwrap_or_default().to_string();
                let name = instr.args[1].as_name().unwrap_or_default().to_string();
                let n = instr.args[2].as_int().unwrap_or(0).max(0) as usize;
                let elem_size = self.resolve_size(&type_name);
                let size = elem_size * n;
                if self.current_frame.sp < size {
                    return Err(RuntimeError::StackOverflow);
                }
                self.current_frame.sp -= size;
                let mem = self.current_frame.sp;
                self.current_frame.locals.push(Local { name, type_name, mem });
                Ok(false)
            }
            Leave => {
                let r0 = self.current_frame.registers[0];
                let parent = self
                    .current_frame
                    .parent
                    .take()
                    .expect("leave below the base frame");
                let mut parent = parent;
                parent.registers[0] = r0;
                self.current_frame = parent;
                Ok(true)
            }
            Movrn => {
                let a = self.reg(&instr.args, 0);
                let imm = instr.args[1].as_int().unwrap_or(0);
                self.current_frame.registers[a] = Register::int(imm);
                Ok(false)
            }
            Movrf => {
                let a = self.reg(&instr.args, 0);
                let imm = instr.args[1].as_float().unwrap_or(0.0);
                self.current_frame.registers[a] = Register::float(imm);
                Ok(false)
            }
            Movrr => {
                let a = self.reg(&instr.args, 0);
                let b = self.reg(&instr.args, 1);
                self.current_frame.registers[a] = self.current_frame.registers[b];
                Ok(false)
            }
            Callf => {
                let target = instr.args[0].as_target().expect("resolved by loader");
                self.push_frame(target);
                Ok(true)
            }
            Loadr => {
                let a = self.reg(&instr.args, 0);
                let name = instr.args[1].as_name().unwrap_or_default();
                let local = self
                    .current_frame
                    .local(name)
                    .ok_or_else(|| RuntimeError::UnknownLocal { name: name.to_string() })?
                    .clone();
                let bits = self.read_i64(local.mem)?;
                self.current_frame.registers[a] = Register { bits, is_float: local.is_float() };
                Ok(false)
            }
            Saver => {
                let name = instr.args[0].as_name().unwrap_or_default();
                let b = self.reg(&instr.args, 1);
                let mem = self
                    .current_frame
                    .local(name)
                    .ok_or_else(|| RuntimeError::UnknownLocal { name: name.to_string() })?
                    .mem;
                let bits = self.current_frame.registers[b].bits;
                self.write_i64(mem, bits)?;
                Ok(false)
            }
            Refsv => {
                let a = self.reg(&instr.args, 0);
                let name = instr.args[1].as_name().unwrap_or_default();
                let local = self
                    .current_frame
                    .local(name)
                    .ok_or_else(|| RuntimeError::UnknownLocal { name: name.to_string() })?
                    .clone();
                self.current_frame.registers[a] =
                    Register { bits: local.mem as i64, is_float: local.is_float() };
                Ok(false)
            }
            Deref => {
                let a = self.reg(&instr.args, 0);
                let b = self.reg(&instr.args, 1);
                let addr = self.current_frame.registers[b];
                let bits = self.read_i64(addr.bits as usize)?;
                self.current_frame.registers[a] = Register { bits, is_float: addr.is_float };
                Ok(false)
            }
            Savea => {
                let a = self.reg(&instr.args, 0);
                let b = self.reg(&instr.args, 1);
                let addr = self.current_frame.registers[a].bits;
                let bits = self.current_frame.registers[b].bits;
                self.write_i64(addr as usize, bits)?;
                Ok(false)
            }
            Adszr => {
                let a = self.reg(&instr.args, 0);
                let b = self.reg(&instr.args, 1);
                let member = instr.args[2].as_name().unwrap_or_default();
                let offset = *self.member_offsets.get(member).unwrap_or(&0) as i64;
                let base = self.current_frame.registers[b];
                self.current_frame.registers[a] = Register { bits: base.bits + offset, is_float: base.is_float };
                Ok(false)
            }
            Addrr => self.arith(instr, |l, r| l.wrapping_add(r), |l, r| l + r),
            Subrr => self.arith(instr, |l, r| l.wrapping_sub(r), |l, r| l - r),
            Mulrr => self.arith(instr, |l, r| l.wrapping_mul(r), |l, r| l * r),
            Divrr => self.div(instr),
            Modrr => self.modulo(instr),
            Lesrr => self.compare(instr, |l, r| l < r, |l, r| l < r),
            Grerr => self.compare(instr, |l, r| l > r, |l, r| l > r),
            Leqrr => self.compare(instr, |l, r| l <= r, |l, r| l <= r),
            Geqrr => self.compare(instr, |l, r| l >= r, |l, r| l >= r),
            Equrr => self.compare(instr, |l, r| l == r, |l, r| l == r),
            Nequrr => self.compare(instr, |l, r| l != r, |l, r| l != r),
            Negrr => {
                let a = self.reg(&instr.args, 0);
                let b = self.reg(&instr.args, 1);
                let src = self.current_frame.registers[b];
                let result = if src.is_float {
                    Register::float(-src.as_f64_bits())
                } else {
                    Register::int(-src.bits)
                };
                self.current_frame.registers[a] = result;
                Ok(false)
            }
            Cmprd => {
                let a = self.reg(&instr.args, 0);
                let imm = instr.args[1].as_int().unwrap_or(0);
                self.current_frame.cmp_flag = self.current_frame.registers[a].bits == imm;
                Ok(false)
            }
            Jmpeq => {
                let target = instr.args[0].as_target().expect("resolved by loader");
                if self.current_frame.cmp_flag {
                    self.current_frame.pc = target;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Jmpal => {
                let target = instr.args[0].as_target().expect("resolved by loader");
                self.current_frame.pc = target;
                Ok(true)
            }
        }
    }

    /// Binary arithmetic with §4.2.3's promotion: if either operand is
    /// float-tagged, both sides are bit-reinterpreted as `f64` and the op
    /// runs in floating point; otherwise it's a plain integer op. No
    /// numeric int-to-float conversion ever happens — only reinterpretation.
    fn arith(
        &mut self,
        instr: &Instruction,
        int_op: impl FnOnce(i64, i64) -> i64,
        float_op: impl FnOnce(f64, f64) -> f64,
    ) -> RuntimeResult<bool> {
        let a = self.reg(&instr.args, 0);
        let b = self.reg(&instr.args, 1);
        let c = self.reg(&instr.args, 2);
        let l = self.current_frame.registers[b];
        let r = self.current_frame.registers[c];
        let result = if l.is_float || r.is_float {
            Register::float(float_op(l.as_f64_bits(), r.as_f64_bits()))
        } else {
            Register::int(int_op(l.bits, r.bits))
        };
        self.current_frame.registers[a] = result;
        Ok(false)
    }

    fn div(&mut self, instr: &Instruction) -> RuntimeResult<bool> {
        let a = self.reg(&instr.args, 0);
        let b = self.reg(&instr.args, 1);
        let c = self.reg(&instr.args, 2);
        let l = self.current_frame.registers[b];
        let r = self.current_frame.registers[c];
        let result = if l.is_float || r.is_float {
            Register::float(l.as_f64_bits() / r.as_f64_bits())
        } else {
            if r.bits == 0 {
                return Err(RuntimeError::DivideByZero);
            }
            Register::int(l.bits.wrapping_div(r.bits))
        };
        self.current_frame.registers[a] = result;
        Ok(false)
    }

    /// `%` is never promoted to floating point — the compiler already
    /// rejects float literals on either side (§4.1.7 `unallowed_float`), so
    /// this always treats both operands as raw integer bits.
    fn modulo(&mut self, instr: &Instruction) -> RuntimeResult<bool> {
        let a = self.reg(&instr.args, 0);
        let b = self.reg(&instr.args, 1);
        let c = self.reg(&instr.args, 2);
        let l = self.current_frame.registers[b].bits;
        let r = self.current_frame.registers[c].bits;
        if r == 0 {
            return Err(RuntimeError::DivideByZero);
        }
        self.current_frame.registers[a] = Register::int(l.wrapping_rem(r));
        Ok(false)
    }

    /// Comparisons promote like arithmetic but always store a 0/1 integer
    /// result. §9 notes the source stores this boolean via an f64
    /// reinterpretation even for integer operands — "almost certainly a
    /// bug" that this implementation deliberately does not reproduce,
    /// while still tagging the result `is_float` iff either operand was, as
    /// specified.
    fn compare(
        &mut self,
        instr: &Instruction,
        int_cmp: impl FnOnce(i64, i64) -> bool,
        float_cmp: impl FnOnce(f64, f64) -> bool,
    ) -> RuntimeResult<bool> {
        let a = self.reg(&instr.args, 0);
        let b = self.reg(&instr.args, 1);
        let c = self.reg(&instr.args, 2);
        let l = self.current_frame.registers[b];
        let r = self.current_frame.registers[c];
        let is_float = l.is_float || r.is_float;
        let value = if is_float {
            float_cmp(l.as_f64_bits(), r.as_f64_bits())
        } else {
            int_cmp(l.bits, r.bits)
        };
        self.current_frame.registers[a] = Register { bits: value as i64, is_float };
        Ok(false)
    }

    fn read_i64(&self, addr: usize) -> RuntimeResult<i64> {
        if addr + 8 > self.memory.len() {
            return Err(RuntimeError::IllegalAddress { address: addr as i64 });
        }
        Ok(LittleEndian::read_i64(&self.memory[addr..addr + 8]))
    }

    fn write_i64(&mut self, addr: usize, value: i64) -> RuntimeResult<()> {
        if addr + 8 > self.memory.len() {
            return Err(RuntimeError::IllegalAddress { address: addr as i64 });
        }
        LittleEndian::write_i64(&mut self.memory[addr..addr + 8], value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_with(kasm: &str) -> Vm {
        let mut vm = Vm::new(VmConfig::default());
        vm.load(kasm).expect("loads");
        vm
    }

    #[test]
    fn integer_arithmetic_s1() {
        let mut vm = vm_with(
            "f:\n\
             \tmovrn: r0 2\n\
             \tmovrn: r1 3\n\
             \tmovrn: r2 4\n\
             \tmulrr: r1 r1 r2\n\
             \taddrr: r0 r0 r1\n\
             \tmovrr: r0 r0\n\
             \tleave:\n",
        );
        let result = vm.call_and_run("f").expect("runs");
        assert_eq!(result, 14.0);
    }

    #[test]
    fn float_arithmetic_s2() {
        let mut vm = vm_with(
            "f:\n\
             \tmovrf: r0 1.5\n\
             \tmovrf: r1 2.0\n\
             \tmulrr: r0 r0 r1\n\
             \tleave:\n",
        );
        let result = vm.call_and_run("f").expect("runs");
        assert_eq!(result, 3.0);
    }

    #[test]
    fn while_loop_s3() {
        let kasm = kappa::compile(
            "s64: f() { s64: i = 0; while (i < 10) { i = i + 1; } return i; }",
        )
        .expect("compiles");
        let mut vm = vm_with(&kasm);
        let result = vm.call_and_run("f").expect("runs");
        assert_eq!(result, 10.0);
    }

    #[test]
    fn pointer_deref_s4() {
        let kasm = kappa::compile("s64: g(s64: *p) { return *p; }").expect("compiles");
        let mut vm = vm_with(&kasm);
        // Stage `x = 42` on the stack, then pass its address as `p`, mirroring
        // `push(&x)` from a host that already owns `x`'s storage.
        vm.push(&42i64.to_le_bytes()).expect("push x");
        let addr_of_x = vm.current_frame.sp as i64;
        vm.push(&addr_of_x.to_le_bytes()).expect("push &x");
        let result = vm.call_and_run("g").expect("runs");
        assert_eq!(result, 42.0);
    }

    #[test]
    fn array_index_s5() {
        let kasm =
            kappa::compile("s64: f() { s64: a[3]; a[1] = 7; return a[1]; }").expect("compiles");
        let mut vm = vm_with(&kasm);
        let result = vm.call_and_run("f").expect("runs");
        assert_eq!(result, 7.0);
    }

    #[test]
    fn recursive_fib_s6() {
        let kasm = kappa::compile(
            "s64: fib(s64: n) { if (n < 2) { return n; } return fib(n-1) + fib(n-2); }",
        )
        .expect("compiles");
        let mut vm = vm_with(&kasm);
        vm.push(&10i64.to_le_bytes()).expect("push");
        let result = vm.call_and_run("fib").expect("runs");
        assert_eq!(result, 55.0);
    }

    #[test]
    fn multi_arg_call_binds_params_in_declared_order() {
        // If argument pushing/popping order ever got swapped this would
        // return -7 instead of 7.
        let kasm = kappa::compile(
            "s64: sub(s64: a, s64: b) { return a - b; } \
             s64: f() { return sub(10, 3); }",
        )
        .expect("compiles");
        let mut vm = vm_with(&kasm);
        let result = vm.call_and_run("f").expect("runs");
        assert_eq!(result, 7.0);
    }

    #[test]
    fn struct_local_allocates_the_sum_of_its_members() {
        // A bare `newsv: Point p` must reserve room for both of Point's
        // fields (16 bytes), not fall back to a single pointer-sized slot —
        // otherwise `p.y` would write past the end of `p`'s own storage.
        let kasm = kappa::compile(
            "type: Point { s64: x; s64: y; } \
             s64: f() { Point: p; s64: guard = 99; p.x = 3; p.y = 4; return p.x + p.y + guard; }",
        )
        .expect("compiles");
        let mut vm = vm_with(&kasm);
        let result = vm.call_and_run("f").expect("runs");
        assert_eq!(result, 106.0);
    }

    #[test]
    fn push_then_pop_restores_state() {
        let mut vm = vm_with("f:\n\tleave:\n");
        let sp_before = vm.current_frame.sp;
        vm.push(&7i64.to_le_bytes()).expect("push");
        let popped = vm.read_i64(vm.current_frame.sp).expect("read");
        assert_eq!(popped, 7);
        vm.current_frame.sp += 8;
        assert_eq!(vm.current_frame.sp, sp_before);
    }

    #[test]
    fn divide_by_zero_is_reported() {
        let mut vm = vm_with(
            "f:\n\
             \tmovrn: r0 1\n\
             \tmovrn: r1 0\n\
             \tdivrr: r0 r0 r1\n\
             \tleave:\n",
        );
        let err = vm.call_and_run("f").expect_err("divide by zero");
        assert_eq!(err, RuntimeError::DivideByZero);
    }
}

//! Instruction translator: maps the structured IL sequence onto target
//! machine instructions.
//!
//! The translator tracks the evaluation stack's *shape* (with known
//! constants), enough to materialize call arguments into the target
//! calling convention: the last 8-bit argument travels in A, the last
//! 16-bit argument in A (low) / X (high), and earlier arguments are
//! flushed left-to-right through the software argument stack. Constant
//! arguments stay symbolic until a consumer forces them into code, which
//! is what makes nametable-address macro folding possible.

use crate::catalog::{self, ArgWidth, LOCALS_BASE};
use crate::error::TranslateError;
use crate::il::{opcode_name, IlInstruction, IlOpcode, IlOperand};
use crate::mos6502::{Mnemonic::*, TargetInstruction as T};
use crate::program::Block;
use indexmap::{IndexMap, IndexSet};
use log::debug;

/// The user-code and literal-data output of translation, plus the set of
/// cataloged routines the code calls.
#[derive(Debug)]
pub struct TranslatedUnit {
    pub code: Block,
    pub data: Block,
    pub used: IndexSet<String>,
}

/// Abstract evaluation stack entry.
#[derive(Debug, Clone, PartialEq)]
enum StackEntry {
    /// Compile-time constant; not yet materialized.
    Const(i32),
    /// Address of a literal-data run (string or byte blob).
    Data(String),
    /// Value of a zero-page local.
    Local(usize),
    /// 8-bit runtime value currently live in A. At most one exists.
    Acc,
    /// 8-bit runtime value saved on the hardware stack.
    Spilled,
    /// Array allocation awaiting its initialization blob.
    Array,
    /// Comparison result living in the flags, awaiting a branch.
    Flags(Cond),
}

/// Branch condition produced by a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
}

impl Cond {
    fn mnemonic(self) -> crate::mos6502::Mnemonic {
        match self {
            Cond::Eq => BEQ,
            Cond::Ne => BNE,
            Cond::Lt => BCC,
            Cond::Ge => BCS,
        }
    }

    fn negate(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
        }
    }
}

/// How a local variable is backed.
#[derive(Debug, Clone, PartialEq)]
enum LocalBinding {
    /// A zero-page byte cell.
    ZeroPage(u8),
    /// An alias for a literal-data address (array/string local).
    Data(String),
}

pub fn translate(
    instructions: &[IlInstruction],
    blobs: &IndexMap<String, Vec<u8>>,
) -> Result<TranslatedUnit, TranslateError> {
    Translator::new(blobs).run(instructions)
}

struct Translator<'a> {
    blobs: &'a IndexMap<String, Vec<u8>>,
    code: Block,
    data: Block,
    stack: Vec<StackEntry>,
    locals: IndexMap<usize, LocalBinding>,
    next_zp: u8,
    used: IndexSet<String>,
    pending_labels: Vec<String>,
    /// Interned literal runs: payload identity -> data label.
    interned_strings: IndexMap<String, String>,
    interned_blobs: IndexMap<String, String>,
}

impl<'a> Translator<'a> {
    fn new(blobs: &'a IndexMap<String, Vec<u8>>) -> Self {
        Translator {
            blobs,
            code: Block::new("main"),
            data: Block::anonymous(),
            stack: Vec::new(),
            locals: IndexMap::new(),
            next_zp: LOCALS_BASE,
            used: IndexSet::new(),
            pending_labels: Vec::new(),
            interned_strings: IndexMap::new(),
            interned_blobs: IndexMap::new(),
        }
    }

    fn run(mut self, instructions: &[IlInstruction]) -> Result<TranslatedUnit, TranslateError> {
        // Branch targets become labels named by IL offset.
        let targets: IndexSet<usize> = instructions
            .iter()
            .filter_map(|i| i.branch_target())
            .collect();

        for inst in instructions {
            if targets.contains(&inst.offset) {
                self.pending_labels.push(branch_label(inst.offset));
            }
            self.translate_one(inst)?;
        }

        debug!(
            "Translated {} IL instructions into {} target items ({} data bytes, {} routines used)",
            instructions.len(),
            self.code.items.len(),
            self.data.size(),
            self.used.len()
        );

        Ok(TranslatedUnit {
            code: self.code,
            data: self.data,
            used: self.used,
        })
    }

    /// Emit one instruction into the user-code block, consuming any labels
    /// waiting for an emission point.
    fn emit(&mut self, inst: T) {
        let mut labels = std::mem::take(&mut self.pending_labels);
        if labels.len() > 1 {
            // Distinct IL offsets can fold onto one emission point (a branch
            // to a nop, say). Zero-size data runs bind the extra labels to
            // the same address without disturbing the byte stream.
            for extra in labels.drain(..labels.len() - 1) {
                self.code.push_data(Some(extra), Vec::new());
            }
        }
        match labels.pop() {
            Some(label) => self.code.push_labeled(&label, inst),
            None => self.code.push(inst),
        }
    }

    fn translate_one(&mut self, inst: &IlInstruction) -> Result<(), TranslateError> {
        let offset = inst.offset;
        match inst.opcode {
            IlOpcode::Nop => {}

            // Constants
            IlOpcode::LdcI4M1 => self.stack.push(StackEntry::Const(-1)),
            IlOpcode::LdcI4(n) => self.stack.push(StackEntry::Const(n as i32)),
            IlOpcode::LdcI4S => {
                let v = self.expect_int8(inst)?;
                self.stack.push(StackEntry::Const(v as i32));
            }
            IlOpcode::LdcI4Imm => {
                let v = self.expect_int32(inst)?;
                self.stack.push(StackEntry::Const(v));
            }
            IlOpcode::LdcI8 => match inst.operand {
                IlOperand::Int64(v) if i32::try_from(v).is_ok() => {
                    self.stack.push(StackEntry::Const(v as i32));
                }
                _ => return Err(self.unsupported(inst)),
            },

            // Locals
            IlOpcode::Ldloc0 => self.load_local(0)?,
            IlOpcode::Ldloc1 => self.load_local(1)?,
            IlOpcode::Ldloc2 => self.load_local(2)?,
            IlOpcode::Ldloc3 => self.load_local(3)?,
            IlOpcode::LdlocS => {
                let idx = self.expect_int8(inst)? as u8 as usize;
                self.load_local(idx)?;
            }
            IlOpcode::Ldloc => {
                let idx = self.expect_uint16(inst)? as usize;
                self.load_local(idx)?;
            }
            IlOpcode::Stloc0 => self.store_local(0, offset)?,
            IlOpcode::Stloc1 => self.store_local(1, offset)?,
            IlOpcode::Stloc2 => self.store_local(2, offset)?,
            IlOpcode::Stloc3 => self.store_local(3, offset)?,
            IlOpcode::StlocS => {
                let idx = self.expect_int8(inst)? as u8 as usize;
                self.store_local(idx, offset)?;
            }
            IlOpcode::Stloc => {
                let idx = self.expect_uint16(inst)? as usize;
                self.store_local(idx, offset)?;
            }

            // Stack manipulation
            IlOpcode::Dup => {
                let top = self.pop(inst)?;
                match &top {
                    StackEntry::Const(_)
                    | StackEntry::Data(_)
                    | StackEntry::Local(_)
                    | StackEntry::Array => {
                        self.stack.push(top.clone());
                        self.stack.push(top);
                    }
                    _ => return Err(self.unsupported(inst)),
                }
            }
            IlOpcode::Pop => {
                let top = self.pop(inst)?;
                if top == StackEntry::Spilled {
                    self.emit(T::implied(PLA));
                }
                // Dropping a value in A needs no code.
            }

            // Strings, arrays, metadata
            IlOpcode::Ldstr => {
                let text = match &inst.operand {
                    IlOperand::Str(s) => s.clone(),
                    _ => return Err(self.unsupported(inst)),
                };
                let label = self.intern_string(&text);
                self.stack.push(StackEntry::Data(label));
            }
            IlOpcode::Newarr => {
                self.pop(inst)?; // element count; the blob carries the real length
                self.stack.push(StackEntry::Array);
            }
            IlOpcode::Ldtoken => {
                let name = match &inst.operand {
                    IlOperand::Name(n) => n.clone(),
                    _ => return Err(self.unsupported(inst)),
                };
                let bytes = self
                    .blobs
                    .get(&name)
                    .ok_or_else(|| TranslateError::MissingBlob(name.clone(), offset))?
                    .clone();
                let label = self.intern_blob(&name, bytes);
                self.stack.push(StackEntry::Data(label));
            }
            IlOpcode::LdelemU1 => self.translate_ldelem(inst)?,
            IlOpcode::StelemI1 => return Err(self.unsupported(inst)),

            // Arithmetic and logic
            IlOpcode::Add => self.translate_binop(inst, BinOp::Add)?,
            IlOpcode::Sub => self.translate_binop(inst, BinOp::Sub)?,
            IlOpcode::And => self.translate_binop(inst, BinOp::And)?,
            IlOpcode::Or => self.translate_binop(inst, BinOp::Or)?,
            IlOpcode::Xor => self.translate_binop(inst, BinOp::Xor)?,
            IlOpcode::Mul => self.translate_shift_like(inst, true)?,
            IlOpcode::Div => self.translate_shift_like(inst, false)?,
            IlOpcode::Shl => self.translate_shift(inst, true)?,
            IlOpcode::Shr => self.translate_shift(inst, false)?,

            // Conversions: the machine is byte-wide, so these fold or pass
            IlOpcode::ConvU1 => {
                let top = self.pop(inst)?;
                match top {
                    StackEntry::Const(v) => self.stack.push(StackEntry::Const(v & 0xFF)),
                    other => self.stack.push(other),
                }
            }
            IlOpcode::ConvU2 | IlOpcode::ConvI4 => {
                let top = self.pop(inst)?;
                self.stack.push(top);
            }

            // Comparisons
            IlOpcode::Ceq => self.translate_compare(inst, Cond::Eq)?,
            IlOpcode::Clt | IlOpcode::CltUn => self.translate_compare(inst, Cond::Lt)?,
            IlOpcode::Cgt | IlOpcode::CgtUn => self.translate_compare_swapped(inst)?,

            // Branches
            IlOpcode::Br | IlOpcode::BrS => {
                let target = self.expect_target(inst)?;
                self.emit(T::abs_label(JMP, &target));
            }
            IlOpcode::Brtrue | IlOpcode::BrtrueS => self.translate_bool_branch(inst, true)?,
            IlOpcode::Brfalse | IlOpcode::BrfalseS => self.translate_bool_branch(inst, false)?,
            IlOpcode::Beq | IlOpcode::BeqS => self.translate_cmp_branch(inst, Cond::Eq)?,
            IlOpcode::BneUn | IlOpcode::BneUnS => self.translate_cmp_branch(inst, Cond::Ne)?,
            IlOpcode::Blt | IlOpcode::BltS => self.translate_cmp_branch(inst, Cond::Lt)?,
            IlOpcode::Bge | IlOpcode::BgeS => self.translate_cmp_branch(inst, Cond::Ge)?,

            // Calls and returns
            IlOpcode::Call => {
                let name = match &inst.operand {
                    IlOperand::Name(n) => n.clone(),
                    _ => return Err(self.unsupported(inst)),
                };
                self.translate_call(&name, inst)?;
            }
            IlOpcode::Ret => {
                self.emit(T::implied(RTS));
            }
        }
        Ok(())
    }

    // ---- calls -----------------------------------------------------------

    fn translate_call(&mut self, name: &str, inst: &IlInstruction) -> Result<(), TranslateError> {
        let offset = inst.offset;

        // Compile-time-evaluable nametable coordinate macros fold to a
        // single constant; no call is emitted.
        if let Some(base) = catalog::nametable_base(name) {
            let y = self.pop(inst)?;
            let x = self.pop(inst)?;
            match (x, y) {
                (StackEntry::Const(x), StackEntry::Const(y)) => {
                    let addr = base as i32 | ((y & 0x3F) << 5) | (x & 0x3F);
                    debug!("Folded {}({}, {}) -> 0x{:04x}", name, x, y, addr);
                    self.stack.push(StackEntry::Const(addr));
                    return Ok(());
                }
                _ => {
                    return Err(TranslateError::Unsupported(
                        format!("{} with non-constant arguments", name),
                        offset,
                    ))
                }
            }
        }

        // The array initialization idiom: newarr / dup / ldtoken / call.
        if name == "InitializeArray" {
            let blob = self.pop(inst)?;
            let arr = self.pop(inst)?;
            let label = match (arr, blob) {
                (StackEntry::Array, StackEntry::Data(label)) => label,
                _ => return Err(self.unsupported(inst)),
            };
            match self.stack.last_mut() {
                Some(slot @ StackEntry::Array) => *slot = StackEntry::Data(label),
                _ => return Err(self.unsupported(inst)),
            }
            return Ok(());
        }

        let sub = catalog::lookup(name)
            .ok_or_else(|| TranslateError::UnknownTarget(name.to_string(), offset))?;

        // Validate the call shape against the capability interface before
        // materializing anything.
        if self.stack.len() < sub.sig.args.len() {
            return Err(TranslateError::Unsupported(
                format!("call to '{}' with too few stack operands", name),
                offset,
            ));
        }
        let split = self.stack.len() - sub.sig.args.len();
        let mut args: Vec<StackEntry> = self.stack.split_off(split);

        // A live accumulator value that is not already the first argument
        // to materialize must survive the loads below.
        self.spill_buried_acc(&mut args);

        for (i, (arg, width)) in args.iter().zip(sub.sig.args.iter()).enumerate() {
            let last = i == sub.sig.args.len() - 1;
            match width {
                ArgWidth::Byte => {
                    self.load_byte_into_a(arg, offset)?;
                    if !last {
                        self.emit(T::abs_label(JSR, "pusha"));
                        self.used.insert("pusha".to_string());
                    }
                }
                ArgWidth::Word => {
                    self.load_word_into_ax(arg, offset)?;
                    if !last {
                        self.emit(T::abs_label(JSR, "pushax"));
                        self.used.insert("pushax".to_string());
                    }
                }
            }
        }

        self.emit(T::abs_label(JSR, name));
        self.used.insert(name.to_string());

        match sub.sig.returns {
            Some(ArgWidth::Byte) => self.stack.push(StackEntry::Acc),
            Some(ArgWidth::Word) => {
                return Err(TranslateError::Unsupported(
                    format!("16-bit return from '{}'", name),
                    offset,
                ))
            }
            None => {}
        }
        Ok(())
    }

    /// If an accumulator value sits anywhere it would be clobbered by the
    /// upcoming loads, park it on the hardware stack. At most one such
    /// value can exist.
    fn spill_buried_acc(&mut self, args: &mut [StackEntry]) {
        let first_is_acc = matches!(args.first(), Some(StackEntry::Acc));
        let acc_in_args = args.iter().filter(|e| **e == StackEntry::Acc).count();
        let acc_below = self.stack.iter().any(|e| *e == StackEntry::Acc);

        if acc_below || (acc_in_args > 0 && !first_is_acc) {
            self.emit(T::implied(PHA));
            for entry in self.stack.iter_mut().chain(args.iter_mut()) {
                if *entry == StackEntry::Acc {
                    *entry = StackEntry::Spilled;
                }
            }
        }
    }

    fn load_byte_into_a(&mut self, entry: &StackEntry, offset: usize) -> Result<(), TranslateError> {
        match entry {
            StackEntry::Const(v) => self.emit(T::imm(LDA, *v as u8)),
            StackEntry::Local(idx) => {
                let zp = self.zp_of(*idx, offset)?;
                self.emit(T::zp(LDA, zp));
            }
            StackEntry::Acc => {} // already where it belongs
            StackEntry::Spilled => self.emit(T::implied(PLA)),
            _ => {
                return Err(TranslateError::Unsupported(
                    "8-bit argument of non-byte shape".to_string(),
                    offset,
                ))
            }
        }
        Ok(())
    }

    fn load_word_into_ax(
        &mut self,
        entry: &StackEntry,
        offset: usize,
    ) -> Result<(), TranslateError> {
        match entry {
            StackEntry::Const(v) => {
                self.emit(T::imm(LDA, *v as u8));
                self.emit(T::imm(LDX, (*v >> 8) as u8));
            }
            StackEntry::Data(label) => {
                self.emit(T::imm_lo(LDA, label));
                self.emit(T::imm_hi(LDX, label));
            }
            StackEntry::Local(idx) => {
                // Byte locals zero-extend.
                let zp = self.zp_of(*idx, offset)?;
                self.emit(T::zp(LDA, zp));
                self.emit(T::imm(LDX, 0x00));
            }
            StackEntry::Acc => self.emit(T::imm(LDX, 0x00)),
            StackEntry::Spilled => {
                self.emit(T::implied(PLA));
                self.emit(T::imm(LDX, 0x00));
            }
            _ => {
                return Err(TranslateError::Unsupported(
                    "16-bit argument of non-word shape".to_string(),
                    offset,
                ))
            }
        }
        Ok(())
    }

    // ---- locals ----------------------------------------------------------

    fn load_local(&mut self, idx: usize) -> Result<(), TranslateError> {
        match self.locals.get(&idx) {
            Some(LocalBinding::Data(label)) => {
                self.stack.push(StackEntry::Data(label.clone()));
            }
            _ => self.stack.push(StackEntry::Local(idx)),
        }
        Ok(())
    }

    fn store_local(&mut self, idx: usize, offset: usize) -> Result<(), TranslateError> {
        let value = self.stack.pop().ok_or_else(|| {
            TranslateError::Unsupported("store from empty stack".to_string(), offset)
        })?;
        match value {
            StackEntry::Data(label) => {
                // Array/string locals alias their literal data address.
                self.locals.insert(idx, LocalBinding::Data(label));
            }
            StackEntry::Const(v) => {
                let zp = self.zp_of(idx, offset)?;
                self.emit(T::imm(LDA, v as u8));
                self.emit(T::zp(STA, zp));
            }
            StackEntry::Acc => {
                let zp = self.zp_of(idx, offset)?;
                self.emit(T::zp(STA, zp));
            }
            StackEntry::Spilled => {
                let zp = self.zp_of(idx, offset)?;
                self.emit(T::implied(PLA));
                self.emit(T::zp(STA, zp));
            }
            StackEntry::Local(src) => {
                let src_zp = self.zp_of(src, offset)?;
                let zp = self.zp_of(idx, offset)?;
                self.emit(T::zp(LDA, src_zp));
                self.emit(T::zp(STA, zp));
            }
            StackEntry::Array | StackEntry::Flags(_) => {
                return Err(TranslateError::Unsupported(
                    "store of non-value stack entry".to_string(),
                    offset,
                ))
            }
        }
        Ok(())
    }

    /// Zero-page address of a local, assigned in declaration order.
    fn zp_of(&mut self, idx: usize, offset: usize) -> Result<u8, TranslateError> {
        match self.locals.get(&idx) {
            Some(LocalBinding::ZeroPage(zp)) => Ok(*zp),
            Some(LocalBinding::Data(_)) => Err(TranslateError::Unsupported(
                "data-backed local used as a byte cell".to_string(),
                offset,
            )),
            None => {
                if self.next_zp == 0xFF {
                    return Err(TranslateError::Unsupported(
                        "zero page exhausted by locals".to_string(),
                        offset,
                    ));
                }
                let zp = self.next_zp;
                self.next_zp += 1;
                self.locals.insert(idx, LocalBinding::ZeroPage(zp));
                debug!("Local {} assigned zero page 0x{:02x}", idx, zp);
                Ok(zp)
            }
        }
    }

    // ---- arithmetic --------------------------------------------------------

    fn translate_binop(&mut self, inst: &IlInstruction, op: BinOp) -> Result<(), TranslateError> {
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;
        let offset = inst.offset;

        if let (StackEntry::Const(x), StackEntry::Const(y)) = (&a, &b) {
            self.stack.push(StackEntry::Const(op.fold(*x, *y)));
            return Ok(());
        }

        // b already in A for a commutative operation: just apply a.
        if b == StackEntry::Acc && op.commutative() {
            self.apply_binop(op, &a, offset)?;
            self.stack.push(StackEntry::Acc);
            return Ok(());
        }
        // Subtraction with the subtrahend in A goes through a scratch cell.
        if b == StackEntry::Acc {
            self.emit(T::zp(STA, catalog::TMP));
            self.load_byte_into_a(&a, offset)?;
            match op {
                BinOp::Sub => {
                    self.emit(T::implied(SEC));
                    self.emit(T::zp(SBC, catalog::TMP));
                }
                _ => unreachable!("commutative case handled above"),
            }
            self.stack.push(StackEntry::Acc);
            return Ok(());
        }

        self.load_byte_into_a(&a, offset)?;
        self.apply_binop(op, &b, offset)?;
        self.stack.push(StackEntry::Acc);
        Ok(())
    }

    fn apply_binop(
        &mut self,
        op: BinOp,
        operand: &StackEntry,
        offset: usize,
    ) -> Result<(), TranslateError> {
        let (mnemonic, carry) = match op {
            BinOp::Add => (ADC, Some(T::implied(CLC))),
            BinOp::Sub => (SBC, Some(T::implied(SEC))),
            BinOp::And => (AND, None),
            BinOp::Or => (ORA, None),
            BinOp::Xor => (EOR, None),
        };
        if let Some(setup) = carry {
            self.emit(setup);
        }
        match operand {
            StackEntry::Const(v) => self.emit(T::imm(mnemonic, *v as u8)),
            StackEntry::Local(idx) => {
                let zp = self.zp_of(*idx, offset)?;
                self.emit(T::zp(mnemonic, zp));
            }
            _ => {
                return Err(TranslateError::Unsupported(
                    "arithmetic operand of unsupported shape".to_string(),
                    offset,
                ))
            }
        }
        Ok(())
    }

    /// Multiplication/division restricted to power-of-two constants, which
    /// lower to shifts.
    fn translate_shift_like(
        &mut self,
        inst: &IlInstruction,
        is_mul: bool,
    ) -> Result<(), TranslateError> {
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;
        match (&a, &b) {
            (StackEntry::Const(x), StackEntry::Const(y)) => {
                // checked_div rejects both division by zero and the
                // i32::MIN / -1 overflow.
                let folded = if is_mul {
                    x.wrapping_mul(*y)
                } else {
                    x.checked_div(*y).ok_or_else(|| self.unsupported(inst))?
                };
                self.stack.push(StackEntry::Const(folded));
                Ok(())
            }
            (_, StackEntry::Const(y)) if *y > 0 && (y & (y - 1)) == 0 => {
                let shifts = y.trailing_zeros();
                self.load_byte_into_a(&a, inst.offset)?;
                for _ in 0..shifts {
                    self.emit(if is_mul {
                        T::accumulator(ASL)
                    } else {
                        T::accumulator(LSR)
                    });
                }
                self.stack.push(StackEntry::Acc);
                Ok(())
            }
            _ => Err(self.unsupported(inst)),
        }
    }

    fn translate_shift(&mut self, inst: &IlInstruction, left: bool) -> Result<(), TranslateError> {
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;
        match (&a, &b) {
            (StackEntry::Const(x), StackEntry::Const(y)) => {
                // Shift counts outside the operand width are unspecified in
                // the source bytecode; reject rather than fold.
                if !(0..32).contains(y) {
                    return Err(self.unsupported(inst));
                }
                let folded = if left {
                    x.wrapping_shl(*y as u32)
                } else {
                    x.wrapping_shr(*y as u32)
                };
                self.stack.push(StackEntry::Const(folded));
                Ok(())
            }
            (_, StackEntry::Const(count)) if (0..8).contains(count) => {
                self.load_byte_into_a(&a, inst.offset)?;
                for _ in 0..*count {
                    self.emit(if left {
                        T::accumulator(ASL)
                    } else {
                        T::accumulator(LSR)
                    });
                }
                self.stack.push(StackEntry::Acc);
                Ok(())
            }
            _ => Err(self.unsupported(inst)),
        }
    }

    // ---- comparisons and branches -----------------------------------------

    /// Emit `CMP` so the flags read "a <cond> b"; push the pending condition.
    fn translate_compare(&mut self, inst: &IlInstruction, cond: Cond) -> Result<(), TranslateError> {
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;
        self.emit_compare(&a, &b, inst)?;
        self.stack.push(StackEntry::Flags(cond));
        Ok(())
    }

    /// `a > b` is `b < a` with the operands swapped.
    fn translate_compare_swapped(&mut self, inst: &IlInstruction) -> Result<(), TranslateError> {
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;
        self.emit_compare(&b, &a, inst)?;
        self.stack.push(StackEntry::Flags(Cond::Lt));
        Ok(())
    }

    fn emit_compare(
        &mut self,
        a: &StackEntry,
        b: &StackEntry,
        inst: &IlInstruction,
    ) -> Result<(), TranslateError> {
        let offset = inst.offset;
        // The right operand must be addressable by CMP; a live accumulator
        // value on that side goes through the scratch cell.
        if *b == StackEntry::Acc {
            self.emit(T::zp(STA, catalog::TMP));
            self.load_byte_into_a(a, offset)?;
            self.emit(T::zp(CMP, catalog::TMP));
            return Ok(());
        }
        self.load_byte_into_a(a, offset)?;
        match b {
            StackEntry::Const(v) => self.emit(T::imm(CMP, *v as u8)),
            StackEntry::Local(idx) => {
                let zp = self.zp_of(*idx, offset)?;
                self.emit(T::zp(CMP, zp));
            }
            _ => return Err(self.unsupported(inst)),
        }
        Ok(())
    }

    fn translate_cmp_branch(&mut self, inst: &IlInstruction, cond: Cond) -> Result<(), TranslateError> {
        let target = self.expect_target(inst)?;
        let b = self.pop(inst)?;
        let a = self.pop(inst)?;

        if let (StackEntry::Const(x), StackEntry::Const(y)) = (&a, &b) {
            let taken = match cond {
                Cond::Eq => x == y,
                Cond::Ne => x != y,
                Cond::Lt => x < y,
                Cond::Ge => x >= y,
            };
            if taken {
                self.emit(T::abs_label(JMP, &target));
            }
            return Ok(());
        }

        self.emit_compare(&a, &b, inst)?;
        self.emit(T::rel(cond.mnemonic(), &target));
        Ok(())
    }

    fn translate_bool_branch(
        &mut self,
        inst: &IlInstruction,
        on_true: bool,
    ) -> Result<(), TranslateError> {
        let target = self.expect_target(inst)?;
        let value = self.pop(inst)?;
        match value {
            StackEntry::Const(v) => {
                // Constant condition: the branch folds to a jump or nothing.
                if (v != 0) == on_true {
                    self.emit(T::abs_label(JMP, &target));
                }
            }
            StackEntry::Flags(cond) => {
                let cond = if on_true { cond } else { cond.negate() };
                self.emit(T::rel(cond.mnemonic(), &target));
            }
            StackEntry::Acc => {
                self.emit(T::imm(CMP, 0x00));
                self.emit(T::rel(if on_true { BNE } else { BEQ }, &target));
            }
            StackEntry::Local(idx) => {
                let zp = self.zp_of(idx, inst.offset)?;
                self.emit(T::zp(LDA, zp));
                self.emit(T::rel(if on_true { BNE } else { BEQ }, &target));
            }
            _ => return Err(self.unsupported(inst)),
        }
        Ok(())
    }

    // ---- arrays and literal data --------------------------------------------

    fn translate_ldelem(&mut self, inst: &IlInstruction) -> Result<(), TranslateError> {
        let index = self.pop(inst)?;
        let array = self.pop(inst)?;
        let label = match array {
            StackEntry::Data(label) => label,
            _ => return Err(self.unsupported(inst)),
        };
        match index {
            StackEntry::Const(v) => self.emit(T::imm(LDX, v as u8)),
            StackEntry::Local(idx) => {
                let zp = self.zp_of(idx, inst.offset)?;
                self.emit(T::zp(LDX, zp));
            }
            StackEntry::Acc => self.emit(T::implied(TAX)),
            _ => return Err(self.unsupported(inst)),
        }
        self.emit(T::abs_x_label(LDA, &label));
        self.stack.push(StackEntry::Acc);
        Ok(())
    }

    fn intern_string(&mut self, text: &str) -> String {
        if let Some(label) = self.interned_strings.get(text) {
            return label.clone();
        }
        let label = format!("str_{}", self.interned_strings.len());
        self.data
            .push_data(Some(label.clone()), text.as_bytes().to_vec());
        self.interned_strings.insert(text.to_string(), label.clone());
        label
    }

    fn intern_blob(&mut self, name: &str, bytes: Vec<u8>) -> String {
        if let Some(label) = self.interned_blobs.get(name) {
            return label.clone();
        }
        let label = format!("blob_{}", self.interned_blobs.len());
        self.data.push_data(Some(label.clone()), bytes);
        self.interned_blobs.insert(name.to_string(), label.clone());
        label
    }

    // ---- plumbing --------------------------------------------------------------

    fn pop(&mut self, inst: &IlInstruction) -> Result<StackEntry, TranslateError> {
        self.stack.pop().ok_or_else(|| {
            TranslateError::Unsupported(
                format!("{} on empty evaluation stack", opcode_name(inst.opcode)),
                inst.offset,
            )
        })
    }

    fn expect_int8(&self, inst: &IlInstruction) -> Result<i8, TranslateError> {
        match inst.operand {
            IlOperand::Int8(v) => Ok(v),
            _ => Err(self.unsupported(inst)),
        }
    }

    fn expect_int32(&self, inst: &IlInstruction) -> Result<i32, TranslateError> {
        match inst.operand {
            IlOperand::Int32(v) => Ok(v),
            _ => Err(self.unsupported(inst)),
        }
    }

    fn expect_uint16(&self, inst: &IlInstruction) -> Result<u16, TranslateError> {
        match inst.operand {
            IlOperand::UInt16(v) => Ok(v),
            _ => Err(self.unsupported(inst)),
        }
    }

    fn expect_target(&self, inst: &IlInstruction) -> Result<String, TranslateError> {
        inst.branch_target()
            .map(branch_label)
            .ok_or_else(|| self.unsupported(inst))
    }

    fn unsupported(&self, inst: &IlInstruction) -> TranslateError {
        TranslateError::Unsupported(opcode_name(inst.opcode).to_string(), inst.offset)
    }
}

fn branch_label(offset: usize) -> String {
    format!("il_{:04x}", offset)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl BinOp {
    fn commutative(self) -> bool {
        !matches!(self, BinOp::Sub)
    }

    fn fold(self, a: i32, b: i32) -> i32 {
        match self {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
        }
    }
}

use super::{Value, VirtualMachine};
use crate::binary::decode::ByteReader;
use crate::binary::instr::{
    Conversion, FloatBinary, FloatCompare, FloatUnary, Instruction, IntBinary, IntCompare,
    IntUnary, Load, MemArg, Store, Width,
};
use crate::error::Trap;

macro_rules! int_ops {
    ($binary:ident, $unary:ident, $compare:ident, $u:ty, $s:ty) => {
        fn $binary(op: IntBinary, a: $u, b: $u) -> Result<$u, Trap> {
            let (sa, sb) = (a as $s, b as $s);
            Ok(match op {
                IntBinary::Add => a.wrapping_add(b),
                IntBinary::Sub => a.wrapping_sub(b),
                IntBinary::Mul => a.wrapping_mul(b),
                IntBinary::DivS => {
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    sa.checked_div(sb).ok_or(Trap::IntegerOverflow)? as $u
                }
                IntBinary::DivU => a.checked_div(b).ok_or(Trap::DivideByZero)?,
                IntBinary::RemS => {
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    sa.wrapping_rem(sb) as $u
                }
                IntBinary::RemU => a.checked_rem(b).ok_or(Trap::DivideByZero)?,
                IntBinary::And => a & b,
                IntBinary::Or => a | b,
                IntBinary::Xor => a ^ b,
                // shift and rotate counts are taken modulo the bit width
                IntBinary::Shl => a.wrapping_shl(b as u32),
                IntBinary::ShrS => sa.wrapping_shr(b as u32) as $u,
                IntBinary::ShrU => a.wrapping_shr(b as u32),
                IntBinary::Rotl => a.rotate_left(b as u32 % <$u>::BITS),
                IntBinary::Rotr => a.rotate_right(b as u32 % <$u>::BITS),
            })
        }

        fn $unary(op: IntUnary, a: $u) -> $u {
            match op {
                IntUnary::Clz => a.leading_zeros() as $u,
                IntUnary::Ctz => a.trailing_zeros() as $u,
                IntUnary::Popcnt => a.count_ones() as $u,
                IntUnary::Extend8S => a as i8 as $s as $u,
                IntUnary::Extend16S => a as i16 as $s as $u,
                IntUnary::Extend32S => a as i32 as $s as $u,
            }
        }

        fn $compare(op: IntCompare, a: $u, b: $u) -> bool {
            let (sa, sb) = (a as $s, b as $s);
            match op {
                IntCompare::Eq => a == b,
                IntCompare::Ne => a != b,
                IntCompare::LtS => sa < sb,
                IntCompare::LtU => a < b,
                IntCompare::GtS => sa > sb,
                IntCompare::GtU => a > b,
                IntCompare::LeS => sa <= sb,
                IntCompare::LeU => a <= b,
                IntCompare::GeS => sa >= sb,
                IntCompare::GeU => a >= b,
            }
        }
    };
}

int_ops!(i32_binary, i32_unary, i32_compare, u32, i32);
int_ops!(i64_binary, i64_unary, i64_compare, u64, i64);

macro_rules! float_ops {
    ($binary:ident, $unary:ident, $compare:ident, $f:ty) => {
        fn $binary(op: FloatBinary, a: $f, b: $f) -> $f {
            match op {
                FloatBinary::Add => a + b,
                FloatBinary::Sub => a - b,
                FloatBinary::Mul => a * b,
                FloatBinary::Div => a / b,
                // NaN wins, and -0 is smaller than +0
                FloatBinary::Min if a.is_nan() || b.is_nan() => <$f>::NAN,
                FloatBinary::Min if a == b => {
                    if a.is_sign_negative() { a } else { b }
                }
                FloatBinary::Min => a.min(b),
                FloatBinary::Max if a.is_nan() || b.is_nan() => <$f>::NAN,
                FloatBinary::Max if a == b => {
                    if a.is_sign_positive() { a } else { b }
                }
                FloatBinary::Max => a.max(b),
                FloatBinary::Copysign => a.copysign(b),
            }
        }

        fn $unary(op: FloatUnary, a: $f) -> $f {
            match op {
                FloatUnary::Abs => a.abs(),
                FloatUnary::Neg => -a,
                FloatUnary::Ceil => a.ceil(),
                FloatUnary::Floor => a.floor(),
                FloatUnary::Trunc => a.trunc(),
                FloatUnary::Nearest => a.round_ties_even(),
                FloatUnary::Sqrt => a.sqrt(),
            }
        }

        fn $compare(op: FloatCompare, a: $f, b: $f) -> bool {
            match op {
                FloatCompare::Eq => a == b,
                FloatCompare::Ne => a != b,
                FloatCompare::Lt => a < b,
                FloatCompare::Gt => a > b,
                FloatCompare::Le => a <= b,
                FloatCompare::Ge => a >= b,
            }
        }
    };
}

float_ops!(f32_binary, f32_unary, f32_compare, f32);
float_ops!(f64_binary, f64_unary, f64_compare, f64);

const I32_RANGE: (f64, f64) = (-2147483648.0, 2147483648.0);
const U32_RANGE: (f64, f64) = (0.0, 4294967296.0);
const I64_RANGE: (f64, f64) = (-9223372036854775808.0, 9223372036854775808.0);
const U64_RANGE: (f64, f64) = (0.0, 18446744073709551616.0);

/// Truncates toward zero, trapping unless the result lies in
/// `[range.0, range.1)`. Every bound is exactly representable as `f64`.
fn trunc(value: f64, range: (f64, f64)) -> Result<f64, Trap> {
    if value.is_nan() {
        return Err(Trap::InvalidConversion);
    }
    let value = value.trunc();
    if value < range.0 || value >= range.1 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(value)
}

impl VirtualMachine<'_> {
    /// Executes instructions until the call stack is back to `depth`
    /// frames.
    pub(super) fn run(&mut self, depth: usize) -> Result<(), Trap> {
        while self.frames.len() > depth {
            let frame = self.frames.last_mut()?;
            let code = frame.code;
            // the stored body stops just before its closing `end`
            let Some(&opcode) = code.get(frame.ip) else {
                self.return_from_frame()?;
                continue;
            };
            let mut bytes = ByteReader::new(&code[frame.ip..]);
            let instr = bytes
                .decode::<Instruction>()
                .map_err(|_| Trap::BadInstruction(opcode))?;
            frame.ip += bytes.position();
            self.execute(opcode, instr)?;
        }
        Ok(())
    }

    fn execute(&mut self, opcode: u8, instr: Instruction) -> Result<(), Trap> {
        use Instruction::*;
        match instr {
            Unreachable => return Err(Trap::Unreachable),
            Nop => {}
            End | Return => self.return_from_frame()?,
            Call(index) => self.call_function(index)?,

            RefNull(reference) => self.stack.push(Value::Null(reference))?,
            RefIsNull => {
                let is_null = match self.pop_operand()? {
                    Value::Null(_) => true,
                    Value::FuncRef(_) | Value::ExternRef { .. } => false,
                    _ => return Err(Trap::BadType),
                };
                self.stack.push(is_null.into())?;
            }
            RefFunc(index) => {
                if self.module.function(index).is_none() {
                    return Err(Trap::FunctionNotFound);
                }
                self.stack.push(Value::FuncRef(index))?;
            }

            Drop => {
                self.pop_operand()?;
            }
            Select(annotation) => {
                let condition = self.pop_i32()?;
                let b = self.pop_operand()?;
                let a = self.pop_operand()?;
                if a.ty() != b.ty() || annotation.is_some_and(|ty| ty != a.ty()) {
                    return Err(Trap::BadType);
                }
                self.stack.push(if condition != 0 { a } else { b })?;
            }

            LocalGet(index) => {
                let slot = self.local_slot(index)?;
                let value = self
                    .locals
                    .get(slot)
                    .cloned()
                    .ok_or(Trap::LocalOutOfBounds(index))?;
                self.stack.push(value)?;
            }
            LocalSet(index) => {
                let value = self.pop_operand()?;
                self.set_local(index, value)?;
            }
            LocalTee(index) => {
                if self.stack.len() <= self.stack_floor() {
                    return Err(Trap::StackUnderflow);
                }
                let value = self.stack.last()?.clone();
                self.set_local(index, value)?;
            }

            Load(op, arg) => self.load(op, arg)?,
            Store(op, arg) => self.store(op, arg)?,
            MemorySize => self.stack.push(Value::Int32(self.memory.pages()))?,
            MemoryGrow => {
                let delta = self.pop_i32()?;
                let old = self.memory.grow(delta).unwrap_or(u32::MAX);
                self.stack.push(Value::Int32(old))?;
            }
            MemoryCopy => {
                let len = self.pop_i32()?;
                let src = self.pop_i32()?;
                let dst = self.pop_i32()?;
                self.memory.copy_within(dst, src, len)?;
            }
            MemoryFill => {
                let len = self.pop_i32()?;
                let value = self.pop_i32()?;
                let dst = self.pop_i32()?;
                self.memory.fill(dst, value as u8, len)?;
            }

            I32Const(v) => self.stack.push(v.into())?,
            I64Const(v) => self.stack.push(v.into())?,
            F32Const(v) => self.stack.push(v.into())?,
            F64Const(v) => self.stack.push(v.into())?,

            IntEqz(Width::W32) => {
                let a = self.pop_i32()?;
                self.stack.push((a == 0).into())?;
            }
            IntEqz(Width::W64) => {
                let a = self.pop_i64()?;
                self.stack.push((a == 0).into())?;
            }
            IntCompare(Width::W32, op) => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                self.stack.push(i32_compare(op, a, b).into())?;
            }
            IntCompare(Width::W64, op) => {
                let b = self.pop_i64()?;
                let a = self.pop_i64()?;
                self.stack.push(i64_compare(op, a, b).into())?;
            }
            IntUnary(Width::W32, op) => {
                let a = self.pop_i32()?;
                self.stack.push(Value::Int32(i32_unary(op, a)))?;
            }
            IntUnary(Width::W64, op) => {
                let a = self.pop_i64()?;
                self.stack.push(Value::Int64(i64_unary(op, a)))?;
            }
            IntBinary(Width::W32, op) => {
                let b = self.pop_i32()?;
                let a = self.pop_i32()?;
                self.stack.push(Value::Int32(i32_binary(op, a, b)?))?;
            }
            IntBinary(Width::W64, op) => {
                let b = self.pop_i64()?;
                let a = self.pop_i64()?;
                self.stack.push(Value::Int64(i64_binary(op, a, b)?))?;
            }

            FloatCompare(Width::W32, op) => {
                let b = self.pop_f32()?;
                let a = self.pop_f32()?;
                self.stack.push(f32_compare(op, a, b).into())?;
            }
            FloatCompare(Width::W64, op) => {
                let b = self.pop_f64()?;
                let a = self.pop_f64()?;
                self.stack.push(f64_compare(op, a, b).into())?;
            }
            FloatUnary(Width::W32, op) => {
                let a = self.pop_f32()?;
                self.stack.push(Value::Float32(f32_unary(op, a)))?;
            }
            FloatUnary(Width::W64, op) => {
                let a = self.pop_f64()?;
                self.stack.push(Value::Float64(f64_unary(op, a)))?;
            }
            FloatBinary(Width::W32, op) => {
                let b = self.pop_f32()?;
                let a = self.pop_f32()?;
                self.stack.push(Value::Float32(f32_binary(op, a, b)))?;
            }
            FloatBinary(Width::W64, op) => {
                let b = self.pop_f64()?;
                let a = self.pop_f64()?;
                self.stack.push(Value::Float64(f64_binary(op, a, b)))?;
            }

            Convert(op) => self.convert(op)?,

            Block(_) | Loop(_) | If(_) | Else | Br(_) | BrIf(_) | BrTable { .. }
            | CallIndirect { .. } | GlobalGet(_) | GlobalSet(_) | TableGet(_) | TableSet(_) => {
                log::debug!("unsupported instruction {instr:?}");
                return Err(Trap::BadInstruction(opcode));
            }
        }
        Ok(())
    }

    fn pop_i32(&mut self) -> Result<u32, Trap> {
        match self.pop_operand()? {
            Value::Int32(v) => Ok(v),
            _ => Err(Trap::BadType),
        }
    }

    fn pop_i64(&mut self) -> Result<u64, Trap> {
        match self.pop_operand()? {
            Value::Int64(v) => Ok(v),
            _ => Err(Trap::BadType),
        }
    }

    fn pop_f32(&mut self) -> Result<f32, Trap> {
        match self.pop_operand()? {
            Value::Float32(v) => Ok(v),
            _ => Err(Trap::BadType),
        }
    }

    fn pop_f64(&mut self) -> Result<f64, Trap> {
        match self.pop_operand()? {
            Value::Float64(v) => Ok(v),
            _ => Err(Trap::BadType),
        }
    }

    fn local_slot(&self, index: u32) -> Result<usize, Trap> {
        let frame = self.frames.last()?;
        if index as usize >= frame.locals_len {
            return Err(Trap::LocalOutOfBounds(index));
        }
        Ok(frame.locals_start + index as usize)
    }

    fn set_local(&mut self, index: u32, value: Value) -> Result<(), Trap> {
        let slot = self.local_slot(index)?;
        let local = self
            .locals
            .get_mut(slot)
            .ok_or(Trap::LocalOutOfBounds(index))?;
        if local.ty() != value.ty() {
            return Err(Trap::BadType);
        }
        *local = value;
        Ok(())
    }

    fn load(&mut self, op: Load, arg: MemArg) -> Result<(), Trap> {
        let base = self.pop_i32()?;
        let (memory, offset) = (&self.memory, arg.offset);
        let value = match op {
            Load::I32 => Value::Int32(u32::from_le_bytes(memory.load(base, offset)?)),
            Load::I64 => Value::Int64(u64::from_le_bytes(memory.load(base, offset)?)),
            Load::F32 => Value::Float32(f32::from_le_bytes(memory.load(base, offset)?)),
            Load::F64 => Value::Float64(f64::from_le_bytes(memory.load(base, offset)?)),
            Load::I32S8 => Value::from(i32::from(i8::from_le_bytes(memory.load(base, offset)?))),
            Load::I32U8 => Value::from(u32::from(u8::from_le_bytes(memory.load(base, offset)?))),
            Load::I32S16 => {
                Value::from(i32::from(i16::from_le_bytes(memory.load(base, offset)?)))
            }
            Load::I32U16 => {
                Value::from(u32::from(u16::from_le_bytes(memory.load(base, offset)?)))
            }
            Load::I64S8 => Value::from(i64::from(i8::from_le_bytes(memory.load(base, offset)?))),
            Load::I64U8 => Value::from(u64::from(u8::from_le_bytes(memory.load(base, offset)?))),
            Load::I64S16 => {
                Value::from(i64::from(i16::from_le_bytes(memory.load(base, offset)?)))
            }
            Load::I64U16 => {
                Value::from(u64::from(u16::from_le_bytes(memory.load(base, offset)?)))
            }
            Load::I64S32 => {
                Value::from(i64::from(i32::from_le_bytes(memory.load(base, offset)?)))
            }
            Load::I64U32 => {
                Value::from(u64::from(u32::from_le_bytes(memory.load(base, offset)?)))
            }
        };
        self.stack.push(value)
    }

    fn store(&mut self, op: Store, arg: MemArg) -> Result<(), Trap> {
        let value = self.pop_operand()?;
        let base = self.pop_i32()?;
        let (memory, offset) = (&mut self.memory, arg.offset);
        match (op, value) {
            (Store::I32, Value::Int32(v)) => memory.store(base, offset, &v.to_le_bytes()),
            (Store::I64, Value::Int64(v)) => memory.store(base, offset, &v.to_le_bytes()),
            (Store::F32, Value::Float32(v)) => memory.store(base, offset, &v.to_le_bytes()),
            (Store::F64, Value::Float64(v)) => memory.store(base, offset, &v.to_le_bytes()),
            (Store::I32As8, Value::Int32(v)) => memory.store(base, offset, &[v as u8]),
            (Store::I32As16, Value::Int32(v)) => {
                memory.store(base, offset, &(v as u16).to_le_bytes())
            }
            (Store::I64As8, Value::Int64(v)) => memory.store(base, offset, &[v as u8]),
            (Store::I64As16, Value::Int64(v)) => {
                memory.store(base, offset, &(v as u16).to_le_bytes())
            }
            (Store::I64As32, Value::Int64(v)) => {
                memory.store(base, offset, &(v as u32).to_le_bytes())
            }
            _ => Err(Trap::BadType),
        }
    }

    fn convert(&mut self, op: Conversion) -> Result<(), Trap> {
        use Conversion::*;
        let value = match op {
            I32WrapI64 => Value::Int32(self.pop_i64()? as u32),
            I32TruncF32S => Value::from(trunc(self.pop_f32()?.into(), I32_RANGE)? as i32),
            I32TruncF32U => Value::from(trunc(self.pop_f32()?.into(), U32_RANGE)? as u32),
            I32TruncF64S => Value::from(trunc(self.pop_f64()?, I32_RANGE)? as i32),
            I32TruncF64U => Value::from(trunc(self.pop_f64()?, U32_RANGE)? as u32),
            I64ExtendI32S => Value::from(i64::from(self.pop_i32()?.cast_signed())),
            I64ExtendI32U => Value::from(u64::from(self.pop_i32()?)),
            I64TruncF32S => Value::from(trunc(self.pop_f32()?.into(), I64_RANGE)? as i64),
            I64TruncF32U => Value::from(trunc(self.pop_f32()?.into(), U64_RANGE)? as u64),
            I64TruncF64S => Value::from(trunc(self.pop_f64()?, I64_RANGE)? as i64),
            I64TruncF64U => Value::from(trunc(self.pop_f64()?, U64_RANGE)? as u64),
            F32ConvertI32S => Value::Float32(self.pop_i32()?.cast_signed() as f32),
            F32ConvertI32U => Value::Float32(self.pop_i32()? as f32),
            F32ConvertI64S => Value::Float32(self.pop_i64()?.cast_signed() as f32),
            F32ConvertI64U => Value::Float32(self.pop_i64()? as f32),
            F32DemoteF64 => Value::Float32(self.pop_f64()? as f32),
            F64ConvertI32S => Value::Float64(self.pop_i32()?.cast_signed().into()),
            F64ConvertI32U => Value::Float64(self.pop_i32()?.into()),
            F64ConvertI64S => Value::Float64(self.pop_i64()?.cast_signed() as f64),
            F64ConvertI64U => Value::Float64(self.pop_i64()? as f64),
            F64PromoteF32 => Value::Float64(self.pop_f32()?.into()),
            I32ReinterpretF32 => Value::Int32(self.pop_f32()?.to_bits()),
            I64ReinterpretF64 => Value::Int64(self.pop_f64()?.to_bits()),
            F32ReinterpretI32 => Value::Float32(f32::from_bits(self.pop_i32()?)),
            F64ReinterpretI64 => Value::Float64(f64::from_bits(self.pop_i64()?)),
            // `as` saturates and maps NaN to zero
            I32TruncSatF32S => Value::from(self.pop_f32()? as i32),
            I32TruncSatF32U => Value::from(self.pop_f32()? as u32),
            I32TruncSatF64S => Value::from(self.pop_f64()? as i32),
            I32TruncSatF64U => Value::from(self.pop_f64()? as u32),
            I64TruncSatF32S => Value::from(self.pop_f32()? as i64),
            I64TruncSatF32U => Value::from(self.pop_f32()? as u64),
            I64TruncSatF64S => Value::from(self.pop_f64()? as i64),
            I64TruncSatF64U => Value::from(self.pop_f64()? as u64),
        };
        self.stack.push(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::vm::VmConfig;
    use crate::host::HostRegistry;

    /// Builds a module exporting one function `f` of type
    /// `params -> results` whose body is `code`, with one page of memory.
    fn module(params: &[u8], results: &[u8], locals: &[u8], code: &[u8]) -> Vec<u8> {
        fn section(id: u8, body: Vec<u8>) -> Vec<u8> {
            let mut out = vec![id, body.len() as u8];
            out.extend(body);
            out
        }
        let mut ty = vec![0x01, 0x60, params.len() as u8];
        ty.extend(params);
        ty.push(results.len() as u8);
        ty.extend(results);

        let mut body = vec![locals.len() as u8];
        for local in locals {
            body.extend([0x01, *local]);
        }
        body.extend(code);
        body.push(0x0b);
        let mut code_section = vec![0x01, body.len() as u8];
        code_section.extend(body);

        let mut out = b"\0asm\x01\0\0\0".to_vec();
        out.extend(section(0x01, ty));
        out.extend(section(0x03, vec![0x01, 0x00]));
        out.extend(section(0x05, vec![0x01, 0x00, 0x01]));
        out.extend(section(0x07, vec![0x01, 0x01, b'f', 0x00, 0x00]));
        out.extend(section(0x0a, code_section));
        out
    }

    fn run(bytes: &[u8], args: &[Value]) -> Result<Vec<Value>, Error> {
        VirtualMachine::instantiate(bytes)?.call("f", args)
    }

    #[test_log::test]
    fn integer_arithmetic() -> anyhow::Result<()> {
        // (a - b) * 3
        let bytes = module(
            &[0x7f, 0x7f],
            &[0x7f],
            &[],
            &[0x20, 0x00, 0x20, 0x01, 0x6b, 0x41, 0x03, 0x6c],
        );
        assert_eq!(
            vec![Value::from(-6i32)],
            run(&bytes, &[Value::from(1u32), Value::from(3u32)])?
        );
        Ok(())
    }

    #[test_log::test]
    fn division_traps() -> anyhow::Result<()> {
        let div_s = module(&[0x7f, 0x7f], &[0x7f], &[], &[0x20, 0x00, 0x20, 0x01, 0x6d]);
        assert_eq!(
            Err(Error::Trap(Trap::DivideByZero)),
            run(&div_s, &[Value::from(1u32), Value::from(0u32)])
        );
        assert_eq!(
            Err(Error::Trap(Trap::IntegerOverflow)),
            run(&div_s, &[Value::from(i32::MIN), Value::from(-1i32)])
        );
        assert_eq!(
            vec![Value::from(-3i32)],
            run(&div_s, &[Value::from(-7i32), Value::from(2i32)])?
        );
        Ok(())
    }

    #[test_log::test]
    fn locals_start_zeroed() -> anyhow::Result<()> {
        // local 0 is i64, local.tee it then drop the copy and read it back
        let bytes = module(
            &[],
            &[0x7e, 0x7e],
            &[0x7e],
            &[0x20, 0x00, 0x42, 0x05, 0x22, 0x00, 0x1a, 0x20, 0x00],
        );
        assert_eq!(
            vec![Value::Int64(0), Value::Int64(5)],
            run(&bytes, &[])?
        );
        Ok(())
    }

    #[test_log::test]
    fn local_type_is_enforced() -> anyhow::Result<()> {
        let bytes = module(&[0x7f], &[], &[], &[0x42, 0x01, 0x21, 0x00]);
        assert_eq!(
            Err(Error::Trap(Trap::BadType)),
            run(&bytes, &[Value::from(1u32)])
        );
        let bytes = module(&[0x7f], &[], &[], &[0x20, 0x01, 0x1a]);
        assert_eq!(
            Err(Error::Trap(Trap::LocalOutOfBounds(1))),
            run(&bytes, &[Value::from(1u32)])
        );
        Ok(())
    }

    #[test_log::test]
    fn memory_access() -> anyhow::Result<()> {
        // store the argument at 8 as 16 bits, load it back sign-extended
        let bytes = module(
            &[0x7f],
            &[0x7f],
            &[],
            &[
                0x41, 0x08, 0x20, 0x00, 0x3b, 0x01, 0x00, // i32.store16
                0x41, 0x00, 0x2e, 0x01, 0x08, // i32.load16_s offset=8
            ],
        );
        assert_eq!(
            vec![Value::from(-1i32)],
            run(&bytes, &[Value::from(0xffffu32)])?
        );

        let oob = module(&[0x7f], &[0x7f], &[], &[0x20, 0x00, 0x28, 0x02, 0x00]);
        assert_eq!(
            Err(Error::Trap(Trap::MemoryOutOfBounds)),
            run(&oob, &[Value::from(65533u32)])
        );
        Ok(())
    }

    #[test_log::test]
    fn memory_grow_and_size() -> anyhow::Result<()> {
        // memory.grow(arg); memory.size
        let bytes = module(&[0x7f], &[0x7f, 0x7f], &[], &[0x20, 0x00, 0x40, 0x00, 0x3f, 0x00]);
        let config = VmConfig {
            max_memory_pages: 4,
            ..VmConfig::default()
        };
        let mut vm = VirtualMachine::instantiate_with(&bytes, config, HostRegistry::default())?;
        assert_eq!(
            vec![Value::Int32(1), Value::Int32(3)],
            vm.call("f", &[Value::from(2u32)])?
        );
        assert_eq!(
            vec![Value::Int32(u32::MAX), Value::Int32(3)],
            vm.call("f", &[Value::from(2u32)])?
        );
        assert_eq!(3 * 65536, vm.memory().len());
        Ok(())
    }

    #[test_log::test]
    fn float_ops() -> anyhow::Result<()> {
        // f64.min(a, b), f32.nearest(2.5)
        let bytes = module(
            &[0x7c, 0x7c],
            &[0x7c, 0x7d],
            &[],
            &[0x20, 0x00, 0x20, 0x01, 0xa4, 0x43, 0x00, 0x00, 0x20, 0x40, 0x90],
        );
        let results = run(&bytes, &[Value::from(0.0f64), Value::from(-0.0f64)])?;
        assert!(matches!(results[0], Value::Float64(v) if v == 0.0 && v.is_sign_negative()));
        assert_eq!(Value::Float32(2.0), results[1]);

        let results = run(&bytes, &[Value::from(f64::NAN), Value::from(1.0f64)])?;
        assert!(matches!(results[0], Value::Float64(v) if v.is_nan()));
        Ok(())
    }

    #[test_log::test]
    fn truncation() -> anyhow::Result<()> {
        let trunc_s = module(&[0x7d], &[0x7f], &[], &[0x20, 0x00, 0xa8]);
        assert_eq!(
            vec![Value::from(-3i32)],
            run(&trunc_s, &[Value::from(-3.9f32)])?
        );
        assert_eq!(
            Err(Error::Trap(Trap::InvalidConversion)),
            run(&trunc_s, &[Value::from(f32::NAN)])
        );
        assert_eq!(
            Err(Error::Trap(Trap::IntegerOverflow)),
            run(&trunc_s, &[Value::from(2147483648.0f32)])
        );

        let trunc_u = module(&[0x7c], &[0x7f], &[], &[0x20, 0x00, 0xab]);
        assert_eq!(
            vec![Value::from(0u32)],
            run(&trunc_u, &[Value::from(-0.9f64)])?
        );
        assert_eq!(
            vec![Value::from(u32::MAX)],
            run(&trunc_u, &[Value::from(4294967295.5f64)])?
        );

        let sat = module(&[0x7d], &[0x7f], &[], &[0x20, 0x00, 0xfc, 0x00]);
        assert_eq!(
            vec![Value::from(i32::MAX)],
            run(&sat, &[Value::from(1e20f32)])?
        );
        assert_eq!(vec![Value::from(0u32)], run(&sat, &[Value::from(f32::NAN)])?);
        Ok(())
    }

    #[test_log::test]
    fn bits_and_shifts() -> anyhow::Result<()> {
        // clz(a), rotl(a, 33) on i64 via extend
        let bytes = module(
            &[0x7f],
            &[0x7f, 0x7e],
            &[],
            &[
                0x20, 0x00, 0x67, // i32.clz
                0x20, 0x00, 0xad, 0x42, 0x21, 0x89, // i64.extend_i32_u; i64.rotl 33
            ],
        );
        assert_eq!(
            vec![Value::Int32(31), Value::Int64(1 << 33)],
            run(&bytes, &[Value::from(1u32)])?
        );
        Ok(())
    }

    #[test_log::test]
    fn select_and_refs() -> anyhow::Result<()> {
        let bytes = module(
            &[0x7f],
            &[0x7e, 0x7f],
            &[],
            &[
                0x42, 0x0a, 0x42, 0x14, 0x20, 0x00, 0x1b, // select
                0xd0, 0x70, 0xd1, // ref.null func; ref.is_null
            ],
        );
        assert_eq!(
            vec![Value::Int64(10), Value::Int32(1)],
            run(&bytes, &[Value::from(1u32)])?
        );
        assert_eq!(
            vec![Value::Int64(20), Value::Int32(1)],
            run(&bytes, &[Value::from(0u32)])?
        );
        Ok(())
    }

    #[test_log::test]
    fn typed_select_checks_annotation() -> anyhow::Result<()> {
        // i64.const 10; i64.const 20; local.get 0; select (result <ty>)
        let typed = |ty: u8| {
            module(
                &[0x7f],
                &[0x7e],
                &[],
                &[0x42, 0x0a, 0x42, 0x14, 0x20, 0x00, 0x1c, 0x01, ty],
            )
        };
        assert_eq!(
            vec![Value::Int64(20)],
            run(&typed(0x7e), &[Value::from(0u32)])?
        );
        assert_eq!(
            Err(Error::Trap(Trap::BadType)),
            run(&typed(0x7f), &[Value::from(1u32)])
        );
        Ok(())
    }

    #[test_log::test]
    fn structured_control_is_unsupported() -> anyhow::Result<()> {
        let bytes = module(&[], &[], &[], &[0x02, 0x40, 0x0b]);
        assert_eq!(Err(Error::Trap(Trap::BadInstruction(0x02))), run(&bytes, &[]));
        let bytes = module(&[], &[], &[], &[0x00]);
        assert_eq!(Err(Error::Trap(Trap::Unreachable)), run(&bytes, &[]));
        Ok(())
    }

    #[test_log::test]
    fn result_type_is_checked() -> anyhow::Result<()> {
        let bytes = module(&[], &[0x7f], &[], &[0x42, 0x00]);
        assert_eq!(Err(Error::Trap(Trap::BadType)), run(&bytes, &[]));
        let bytes = module(&[], &[0x7f], &[], &[]);
        assert_eq!(Err(Error::Trap(Trap::StackUnderflow)), run(&bytes, &[]));
        Ok(())
    }

    #[test_log::test]
    fn internal_calls() -> anyhow::Result<()> {
        // f calls itself forever
        let bytes = module(&[], &[], &[], &[0x10, 0x00]);
        assert_eq!(Err(Error::Trap(Trap::StackOverflow)), run(&bytes, &[]));
        Ok(())
    }
}

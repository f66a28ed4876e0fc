use std::sync::Arc;

use crate::binary::ty::{Number, Reference, ValueType};

/// A runtime value held on the operand stack or in a local slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int32(u32),
    Int64(u64),
    Float32(f32),
    Float64(f64),
    Vec128([u8; 16]),
    FuncRef(u32),
    ExternRef { module: Arc<str>, func: Arc<str> },
    Null(Reference),
}

impl Value {
    /// The zero value a freshly declared local of type `ty` starts with.
    pub fn default_for(ty: ValueType) -> Self {
        match ty {
            ValueType::Num(Number::I32) => Self::Int32(0),
            ValueType::Num(Number::I64) => Self::Int64(0),
            ValueType::Num(Number::F32) => Self::Float32(0.0),
            ValueType::Num(Number::F64) => Self::Float64(0.0),
            ValueType::Vec128 => Self::Vec128([0; 16]),
            ValueType::Ref(r) => Self::Null(r),
        }
    }

    pub fn ty(&self) -> ValueType {
        match self {
            Self::Int32(_) => ValueType::I32,
            Self::Int64(_) => ValueType::I64,
            Self::Float32(_) => ValueType::F32,
            Self::Float64(_) => ValueType::F64,
            Self::Vec128(_) => ValueType::Vec128,
            Self::FuncRef(_) | Self::Null(Reference::Func) => ValueType::Ref(Reference::Func),
            Self::ExternRef { .. } | Self::Null(Reference::Extern) => {
                ValueType::Ref(Reference::Extern)
            }
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v.cast_unsigned())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Int64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v.cast_unsigned())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Int32(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_their_type() {
        for ty in [
            ValueType::I32,
            ValueType::I64,
            ValueType::F32,
            ValueType::F64,
            ValueType::Vec128,
            ValueType::Ref(Reference::Func),
            ValueType::Ref(Reference::Extern),
        ] {
            assert_eq!(ty, Value::default_for(ty).ty());
        }
    }

    #[test]
    fn extern_ref_type() {
        let value = Value::ExternRef {
            module: "env".into(),
            func: "log".into(),
        };
        assert_eq!(ValueType::Ref(Reference::Extern), value.ty());
        assert_eq!(Value::Int32(u32::MAX), Value::from(-1i32));
    }
}

//! Owned values and the conversion rules shared by every variable kind.

use std::fmt;
use std::num::IntErrorKind;

use serde::Serialize;

use crate::status::ValueError;
use crate::types::{TypeCategory, TypeDescriptor, TypeKind, read_ne, until_nul};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// `None` is a null string, distinct from the empty string.
    Str(Option<String>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Str(Some(value.into()))
    }

    pub const fn null_text() -> Self {
        Self::Str(None)
    }

    pub const fn kind(&self) -> TypeKind {
        match self {
            Self::Bool(_) => TypeKind::Bool,
            Self::I8(_) => TypeKind::I8,
            Self::I16(_) => TypeKind::I16,
            Self::I32(_) => TypeKind::I32,
            Self::I64(_) => TypeKind::I64,
            Self::U8(_) => TypeKind::U8,
            Self::U16(_) => TypeKind::U16,
            Self::U32(_) => TypeKind::U32,
            Self::U64(_) => TypeKind::U64,
            Self::F32(_) => TypeKind::F32,
            Self::F64(_) => TypeKind::F64,
            Self::Str(_) => TypeKind::Str,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.scalar().ok()? {
            Scalar::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.scalar().ok()? {
            Scalar::Signed(v) => Some(v),
            Scalar::Unsigned(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.scalar().ok()? {
            Scalar::Signed(v) => u64::try_from(v).ok(),
            Scalar::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Str(_) | Self::Bool(_) => None,
            _ => self.scalar().ok().map(Scalar::as_f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => text.as_deref(),
            _ => None,
        }
    }

    /// Text form used for string destinations and diagnostics.
    pub fn render(&self) -> String {
        match self {
            Self::Bool(v) => v.to_string(),
            Self::I8(v) => v.to_string(),
            Self::I16(v) => v.to_string(),
            Self::I32(v) => v.to_string(),
            Self::I64(v) => v.to_string(),
            Self::U8(v) => v.to_string(),
            Self::U16(v) => v.to_string(),
            Self::U32(v) => v.to_string(),
            Self::U64(v) => v.to_string(),
            Self::F32(v) => format!("{v:E}"),
            Self::F64(v) => format!("{v:E}"),
            Self::Str(v) => v.clone().unwrap_or_default(),
        }
    }

    /// Numeric view of a non-string value.
    fn scalar(&self) -> Result<Scalar, ValueError> {
        Ok(match *self {
            Self::Bool(v) => Scalar::Bool(v),
            Self::I8(v) => Scalar::Signed(v.into()),
            Self::I16(v) => Scalar::Signed(v.into()),
            Self::I32(v) => Scalar::Signed(v.into()),
            Self::I64(v) => Scalar::Signed(v),
            Self::U8(v) => Scalar::Unsigned(v.into()),
            Self::U16(v) => Scalar::Unsigned(v.into()),
            Self::U32(v) => Scalar::Unsigned(v.into()),
            Self::U64(v) => Scalar::Unsigned(v),
            Self::F32(v) => Scalar::Real(v.into()),
            Self::F64(v) => Scalar::Real(v),
            Self::Str(_) => return Err(ValueError::TypeMismatch),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Some(value))
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        Self::Str(value.map(ToOwned::to_owned))
    }
}

/// Kind-independent numeric value used while validating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Scalar {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Real(f64),
}

impl Scalar {
    pub(crate) fn is_negative(self) -> bool {
        match self {
            Self::Signed(v) => v < 0,
            Self::Real(v) => v < 0.0,
            Self::Bool(_) | Self::Unsigned(_) => false,
        }
    }

    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Self::Bool(v) => f64::from(u8::from(v)),
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Real(v) => v,
        }
    }

    fn as_i128(self) -> Option<i128> {
        match self {
            Self::Bool(v) => Some(v.into()),
            Self::Signed(v) => Some(v.into()),
            Self::Unsigned(v) => Some(v.into()),
            Self::Real(_) => None,
        }
    }
}

/// Numeric view of `value` as it would be written into `dest`.
///
/// Text is parsed according to the destination's category. A null string is rejected.
pub(crate) fn scalar_for(value: &Value, dest: &TypeDescriptor) -> Result<Scalar, ValueError> {
    let Value::Str(text) = value else {
        return value.scalar();
    };
    let text = text.as_deref().ok_or(ValueError::Null)?.trim();
    match dest.category {
        TypeCategory::Boolean => {
            if text.eq_ignore_ascii_case("true") {
                Ok(Scalar::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Scalar::Bool(false))
            } else {
                parse_integer(text, false)
            }
        }
        TypeCategory::Integer => parse_integer(text, dest.unsigned),
        TypeCategory::Real => text
            .parse::<f64>()
            .map(Scalar::Real)
            .map_err(|_| ValueError::TypeMismatch),
        TypeCategory::String => Err(ValueError::TypeMismatch),
    }
}

fn parse_integer(text: &str, unsigned: bool) -> Result<Scalar, ValueError> {
    let parsed = if unsigned && !text.starts_with('-') {
        text.parse::<u64>().map(Scalar::Unsigned)
    } else {
        text.parse::<i64>().map(Scalar::Signed)
    };
    parsed.map_err(|error| match error.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ValueError::Overflow,
        _ => ValueError::TypeMismatch,
    })
}

/// Native-endian bytes of `scalar` in `dest`'s representation.
pub(crate) fn encode_scalar(scalar: Scalar, dest: &TypeDescriptor) -> Result<Vec<u8>, ValueError> {
    match dest.category {
        TypeCategory::Boolean => {
            let truthy = match scalar {
                Scalar::Bool(v) => v,
                Scalar::Signed(v) => v != 0,
                Scalar::Unsigned(v) => v != 0,
                Scalar::Real(v) => v != 0.0,
            };
            Ok(vec![u8::from(truthy)])
        }
        TypeCategory::Integer => encode_integer(scalar, dest.kind),
        TypeCategory::Real => {
            let v = scalar.as_f64();
            if dest.size == 4 {
                if v.is_finite() && v.abs() > f64::from(f32::MAX) {
                    return Err(ValueError::Overflow);
                }
                Ok((v as f32).to_ne_bytes().to_vec())
            } else {
                Ok(v.to_ne_bytes().to_vec())
            }
        }
        TypeCategory::String => Err(ValueError::TypeMismatch),
    }
}

fn integer_bounds(kind: TypeKind) -> (i128, i128) {
    match kind {
        TypeKind::I8 => (i8::MIN.into(), i8::MAX.into()),
        TypeKind::I16 => (i16::MIN.into(), i16::MAX.into()),
        TypeKind::I32 => (i32::MIN.into(), i32::MAX.into()),
        TypeKind::I64 => (i64::MIN.into(), i64::MAX.into()),
        TypeKind::U8 => (0, u8::MAX.into()),
        TypeKind::U16 => (0, u16::MAX.into()),
        TypeKind::U32 => (0, u32::MAX.into()),
        _ => (0, u64::MAX.into()),
    }
}

fn encode_integer(scalar: Scalar, kind: TypeKind) -> Result<Vec<u8>, ValueError> {
    let (min, max) = integer_bounds(kind);
    let v = match scalar.as_i128() {
        Some(v) => v,
        None => {
            let real = scalar.as_f64().trunc();
            if !real.is_finite() || real < min as f64 || real > max as f64 {
                return Err(ValueError::Overflow);
            }
            real as i128
        }
    };
    if v < min || v > max {
        return Err(ValueError::Overflow);
    }
    // Bounds were checked above, the narrowing casts below are exact.
    Ok(match kind {
        TypeKind::I8 => (v as i8).to_ne_bytes().to_vec(),
        TypeKind::I16 => (v as i16).to_ne_bytes().to_vec(),
        TypeKind::I32 => (v as i32).to_ne_bytes().to_vec(),
        TypeKind::I64 => (v as i64).to_ne_bytes().to_vec(),
        TypeKind::U8 => (v as u8).to_ne_bytes().to_vec(),
        TypeKind::U16 => (v as u16).to_ne_bytes().to_vec(),
        TypeKind::U32 => (v as u32).to_ne_bytes().to_vec(),
        _ => (v as u64).to_ne_bytes().to_vec(),
    })
}

/// Reads one stored element back as a value of its own kind.
pub(crate) fn decode(desc: &TypeDescriptor, bytes: &[u8]) -> Value {
    macro_rules! ne {
        ($ty:ty, $variant:ident) => {
            Value::$variant(
                read_ne::<{ size_of::<$ty>() }>(bytes)
                    .map_or(<$ty>::default(), <$ty>::from_ne_bytes),
            )
        };
    }
    match desc.kind {
        TypeKind::Bool => Value::Bool(bytes.first().copied().unwrap_or(0) != 0),
        TypeKind::I8 => ne!(i8, I8),
        TypeKind::I16 => ne!(i16, I16),
        TypeKind::I32 => ne!(i32, I32),
        TypeKind::I64 => ne!(i64, I64),
        TypeKind::U8 => ne!(u8, U8),
        TypeKind::U16 => ne!(u16, U16),
        TypeKind::U32 => ne!(u32, U32),
        TypeKind::U64 => ne!(u64, U64),
        TypeKind::F32 | TypeKind::UF32 => ne!(f32, F32),
        TypeKind::F64 | TypeKind::UF64 => ne!(f64, F64),
        TypeKind::Str => Value::text(String::from_utf8_lossy(until_nul(bytes))),
    }
}

/// Converts `value` into the representation of `dest` under the write rules, without any
/// per-variable constraint.
pub fn convert(value: &Value, dest: &TypeDescriptor) -> Result<Value, ValueError> {
    if dest.kind == TypeKind::Str {
        return match value {
            Value::Str(_) => Ok(value.clone()),
            other => Ok(Value::text(other.render())),
        };
    }
    let scalar = scalar_for(value, dest)?;
    if dest.unsigned && scalar.is_negative() {
        return Err(ValueError::Negative);
    }
    let bytes = encode_scalar(scalar, dest)?;
    Ok(decode(dest, &bytes))
}

/// Inclusive bounds of a numeric variable, kept in the destination's numeric domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum Range {
    Signed { min: i64, max: i64 },
    Unsigned { min: u64, max: u64 },
    Real { min: f64, max: f64 },
}

impl Range {
    /// Builds the range for `dest`, swapping out-of-order bounds.
    pub(crate) fn new(dest: &TypeDescriptor, min: &Value, max: &Value) -> Result<Self, ValueError> {
        if !dest.is_numeric() {
            return Err(ValueError::TypeMismatch);
        }
        let lo = scalar_for(min, dest)?;
        let hi = scalar_for(max, dest)?;
        if dest.unsigned && (lo.is_negative() || hi.is_negative()) {
            return Err(ValueError::Negative);
        }
        let range = match (dest.category, dest.unsigned) {
            (TypeCategory::Real, _) => Self::Real {
                min: lo.as_f64(),
                max: hi.as_f64(),
            },
            (_, true) => Self::Unsigned {
                min: bound::<u64>(lo)?,
                max: bound::<u64>(hi)?,
            },
            (_, false) => Self::Signed {
                min: bound::<i64>(lo)?,
                max: bound::<i64>(hi)?,
            },
        };
        Ok(range.ordered())
    }

    fn ordered(self) -> Self {
        match self {
            Self::Signed { min, max } if min > max => Self::Signed { min: max, max: min },
            Self::Unsigned { min, max } if min > max => Self::Unsigned { min: max, max: min },
            Self::Real { min, max } if min > max => Self::Real { min: max, max: min },
            other => other,
        }
    }

    pub(crate) fn contains(&self, scalar: Scalar) -> bool {
        match (*self, scalar.as_i128()) {
            (Self::Signed { min, max }, Some(v)) => {
                (i128::from(min)..=i128::from(max)).contains(&v)
            }
            (Self::Unsigned { min, max }, Some(v)) => {
                (i128::from(min)..=i128::from(max)).contains(&v)
            }
            (Self::Signed { min, max }, None) => {
                (min as f64..=max as f64).contains(&scalar.as_f64())
            }
            (Self::Unsigned { min, max }, None) => {
                (min as f64..=max as f64).contains(&scalar.as_f64())
            }
            (Self::Real { min, max }, _) => (min..=max).contains(&scalar.as_f64()),
        }
    }
}

fn bound<T: TryFrom<i128>>(scalar: Scalar) -> Result<T, ValueError> {
    let v = match scalar.as_i128() {
        Some(v) => v,
        None => {
            let real = scalar.as_f64().trunc();
            if !real.is_finite() || real.abs() > i128::MAX as f64 {
                return Err(ValueError::Overflow);
            }
            real as i128
        }
    };
    T::try_from(v).map_err(|_| ValueError::Overflow)
}

#[cfg(test)]
#[path = "tests/value_tests.rs"]
mod tests;

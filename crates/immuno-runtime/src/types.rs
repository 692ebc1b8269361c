//! Process-wide descriptors of the primitive kinds a variable can hold.

use immuno_plugin_api::ImTypeKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    UF32,
    F64,
    UF64,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    Boolean,
    Integer,
    Real,
    String,
}

/// Static description of one primitive kind.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub kind: TypeKind,
    pub category: TypeCategory,
    /// Rejects negative inputs before range checks.
    pub unsigned: bool,
    /// Element width in bytes. Zero for strings, whose width is chosen per variable.
    pub size: usize,
    /// Renders one stored element as text.
    pub render: fn(&[u8]) -> String,
}

impl TypeDescriptor {
    pub const fn is_numeric(&self) -> bool {
        matches!(self.category, TypeCategory::Integer | TypeCategory::Real)
    }

    pub fn of(kind: TypeKind) -> &'static TypeDescriptor {
        match kind {
            TypeKind::Bool => &BOOL,
            TypeKind::I8 => &I8,
            TypeKind::I16 => &I16,
            TypeKind::I32 => &I32,
            TypeKind::I64 => &I64,
            TypeKind::U8 => &U8,
            TypeKind::U16 => &U16,
            TypeKind::U32 => &U32,
            TypeKind::U64 => &U64,
            TypeKind::F32 => &F32,
            TypeKind::UF32 => &UF32,
            TypeKind::F64 => &F64,
            TypeKind::UF64 => &UF64,
            TypeKind::Str => &STR,
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for TypeDescriptor {}

macro_rules! int_descriptor {
    ($ident:ident, $name:literal, $kind:ident, $ty:ty, $unsigned:literal) => {
        pub static $ident: TypeDescriptor = TypeDescriptor {
            name: $name,
            kind: TypeKind::$kind,
            category: TypeCategory::Integer,
            unsigned: $unsigned,
            size: size_of::<$ty>(),
            render: |bytes| {
                read_ne::<{ size_of::<$ty>() }>(bytes)
                    .map_or_else(String::new, |b| <$ty>::from_ne_bytes(b).to_string())
            },
        };
    };
}

pub static BOOL: TypeDescriptor = TypeDescriptor {
    name: "bool",
    kind: TypeKind::Bool,
    category: TypeCategory::Boolean,
    unsigned: false,
    size: 1,
    render: |bytes| {
        if bytes.first().copied().unwrap_or(0) != 0 {
            "true".to_string()
        } else {
            "false".to_string()
        }
    },
};

int_descriptor!(I8, "int8", I8, i8, false);
int_descriptor!(I16, "int16", I16, i16, false);
int_descriptor!(I32, "int32", I32, i32, false);
int_descriptor!(I64, "int64", I64, i64, false);
int_descriptor!(U8, "uint8", U8, u8, true);
int_descriptor!(U16, "uint16", U16, u16, true);
int_descriptor!(U32, "uint32", U32, u32, true);
int_descriptor!(U64, "uint64", U64, u64, true);

pub static F32: TypeDescriptor = TypeDescriptor {
    name: "float",
    kind: TypeKind::F32,
    category: TypeCategory::Real,
    unsigned: false,
    size: 4,
    render: render_f32,
};

pub static UF32: TypeDescriptor = TypeDescriptor {
    name: "ufloat",
    kind: TypeKind::UF32,
    category: TypeCategory::Real,
    unsigned: true,
    size: 4,
    render: render_f32,
};

pub static F64: TypeDescriptor = TypeDescriptor {
    name: "double",
    kind: TypeKind::F64,
    category: TypeCategory::Real,
    unsigned: false,
    size: 8,
    render: render_f64,
};

pub static UF64: TypeDescriptor = TypeDescriptor {
    name: "udouble",
    kind: TypeKind::UF64,
    category: TypeCategory::Real,
    unsigned: true,
    size: 8,
    render: render_f64,
};

pub static STR: TypeDescriptor = TypeDescriptor {
    name: "string",
    kind: TypeKind::Str,
    category: TypeCategory::String,
    unsigned: false,
    size: 0,
    render: |bytes| String::from_utf8_lossy(until_nul(bytes)).into_owned(),
};

fn render_f32(bytes: &[u8]) -> String {
    read_ne::<4>(bytes).map_or_else(String::new, |b| format!("{:E}", f32::from_ne_bytes(b)))
}

fn render_f64(bytes: &[u8]) -> String {
    read_ne::<8>(bytes).map_or_else(String::new, |b| format!("{:E}", f64::from_ne_bytes(b)))
}

pub(crate) fn read_ne<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    bytes.get(..N)?.try_into().ok()
}

/// Bytes of a NUL-terminated element, without the terminator.
pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

impl From<ImTypeKind> for TypeKind {
    fn from(kind: ImTypeKind) -> Self {
        match kind {
            ImTypeKind::Bool => Self::Bool,
            ImTypeKind::I8 => Self::I8,
            ImTypeKind::I16 => Self::I16,
            ImTypeKind::I32 => Self::I32,
            ImTypeKind::I64 => Self::I64,
            ImTypeKind::U8 => Self::U8,
            ImTypeKind::U16 => Self::U16,
            ImTypeKind::U32 => Self::U32,
            ImTypeKind::U64 => Self::U64,
            ImTypeKind::F32 => Self::F32,
            ImTypeKind::UF32 => Self::UF32,
            ImTypeKind::F64 => Self::F64,
            ImTypeKind::UF64 => Self::UF64,
            ImTypeKind::Str => Self::Str,
        }
    }
}

impl From<TypeKind> for ImTypeKind {
    fn from(kind: TypeKind) -> Self {
        match kind {
            TypeKind::Bool => Self::Bool,
            TypeKind::I8 => Self::I8,
            TypeKind::I16 => Self::I16,
            TypeKind::I32 => Self::I32,
            TypeKind::I64 => Self::I64,
            TypeKind::U8 => Self::U8,
            TypeKind::U16 => Self::U16,
            TypeKind::U32 => Self::U32,
            TypeKind::U64 => Self::U64,
            TypeKind::F32 => Self::F32,
            TypeKind::UF32 => Self::UF32,
            TypeKind::F64 => Self::F64,
            TypeKind::UF64 => Self::UF64,
            TypeKind::Str => Self::Str,
        }
    }
}

/// Rust scalars that map onto a fixed-width kind.
pub trait Primitive: Copy + sealed::Sealed {
    const KIND: TypeKind;
}

mod sealed {
    pub trait Sealed {}
}

macro_rules! primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Primitive for $ty {
                const KIND: TypeKind = TypeKind::$kind;
            }
        )*
    };
}

primitive!(
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

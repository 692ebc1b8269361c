//! Generic validated storage shared by every registry class.

use std::ptr::NonNull;

use crate::status::ValueError;
use crate::types::{Primitive, TypeCategory, TypeDescriptor, TypeKind};
use crate::value::{Range, Scalar, Value, convert, decode, encode_scalar, scalar_for};

/// Plugin-owned memory a variable writes through.
///
/// The registry never frees it.
#[derive(Debug)]
pub struct ExternalBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl ExternalBuffer {
    /// # Safety
    /// `ptr..ptr+len` must stay valid for reads and writes, and must not be accessed through
    /// other references, for as long as the owning registry entry exists.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    pub fn from_static<T: Primitive>(slice: &'static mut [T]) -> Self {
        let len = size_of_val(slice);
        let ptr = NonNull::from(slice).cast::<u8>();
        Self { ptr, len }
    }

    /// Fixed-width string storage, one element per `width` bytes.
    pub fn from_static_bytes(bytes: &'static mut [u8]) -> Self {
        let len = bytes.len();
        let ptr = NonNull::from(bytes).cast::<u8>();
        Self { ptr, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Where a variable's elements live.
#[derive(Debug)]
pub enum Backing {
    /// Registry-owned storage that grows on demand.
    Growable,
    External(ExternalBuffer),
}

#[derive(Debug)]
enum Storage {
    Owned(Vec<u8>),
    External(ExternalBuffer),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Owned(bytes) => bytes,
            // SAFETY: `ExternalBuffer` construction guarantees exclusive validity of the region.
            Self::External(buf) => unsafe { std::slice::from_raw_parts(buf.ptr.as_ptr(), buf.len) },
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Owned(bytes) => bytes,
            // SAFETY: see `bytes`.
            Self::External(buf) => unsafe {
                std::slice::from_raw_parts_mut(buf.ptr.as_ptr(), buf.len)
            },
        }
    }
}

/// Registration request for one variable.
#[derive(Debug)]
pub struct VariableDecl {
    pub kind: TypeKind,
    pub name: String,
    pub description: String,
    pub backing: Backing,
    /// Byte width of one string element including its terminator. Ignored for fixed-width kinds.
    pub width: usize,
    pub max: usize,
}

impl VariableDecl {
    pub fn new(kind: TypeKind, name: impl Into<String>, backing: Backing, max: usize) -> Self {
        Self {
            kind,
            name: name.into(),
            description: String::new(),
            backing,
            width: 0,
            max,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

#[derive(Debug, Default)]
enum Constraint {
    #[default]
    None,
    Range(Range),
    Text {
        allow_list: Vec<String>,
        null_permitted: bool,
    },
}

/// One registered value or array.
#[derive(Debug)]
pub struct Variable {
    descriptor: &'static TypeDescriptor,
    name: String,
    description: String,
    element_size: usize,
    count: usize,
    max: usize,
    resizable: bool,
    storage: Storage,
    constraint: Constraint,
}

impl Variable {
    pub fn register(decl: VariableDecl) -> Result<Self, ValueError> {
        let descriptor = TypeDescriptor::of(decl.kind);
        let element_size = if descriptor.category == TypeCategory::String {
            if decl.width == 0 {
                return Err(ValueError::Overflow);
            }
            decl.width
        } else {
            descriptor.size
        };
        let bytes_needed = element_size
            .checked_mul(decl.max)
            .ok_or(ValueError::AllocationFailure)?;

        let (storage, resizable) = match decl.backing {
            Backing::Growable => {
                if decl.max == 1 {
                    return Err(ValueError::Null);
                }
                let mut bytes = Vec::new();
                bytes
                    .try_reserve_exact(bytes_needed)
                    .map_err(|_| ValueError::AllocationFailure)?;
                bytes.resize(bytes_needed, 0);
                (Storage::Owned(bytes), true)
            }
            Backing::External(buf) => {
                if buf.len < bytes_needed {
                    return Err(ValueError::Overflow);
                }
                (Storage::External(buf), false)
            }
        };

        let constraint = if descriptor.category == TypeCategory::String {
            Constraint::Text {
                allow_list: Vec::new(),
                null_permitted: false,
            }
        } else {
            Constraint::None
        };

        Ok(Self {
            descriptor,
            name: decl.name,
            description: decl.description,
            element_size,
            count: usize::from(decl.max == 1),
            max: decl.max,
            resizable,
            storage,
            constraint,
        })
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_resizable(&self) -> bool {
        self.resizable
    }

    pub fn range(&self) -> Option<Range> {
        match self.constraint {
            Constraint::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn allow_list(&self) -> &[String] {
        match &self.constraint {
            Constraint::Text { allow_list, .. } => allow_list,
            _ => &[],
        }
    }

    pub fn null_permitted(&self) -> bool {
        matches!(
            self.constraint,
            Constraint::Text {
                null_permitted: true,
                ..
            }
        )
    }

    /// Raw bytes of element `i`, including unused string padding.
    pub fn element(&self, i: usize) -> Result<&[u8], ValueError> {
        if i >= self.count {
            return Err(ValueError::IndexOutOfBounds);
        }
        let start = i * self.element_size;
        Ok(&self.storage.bytes()[start..start + self.element_size])
    }

    /// Element `i` in its own kind.
    pub fn value(&self, i: usize) -> Result<Value, ValueError> {
        Ok(decode(self.descriptor, self.element(i)?))
    }

    /// Element `i` converted to `kind`.
    pub fn get(&self, i: usize, kind: TypeKind) -> Result<Value, ValueError> {
        convert(&self.value(i)?, TypeDescriptor::of(kind))
    }

    pub fn render(&self, i: usize) -> Result<String, ValueError> {
        Ok((self.descriptor.render)(self.element(i)?))
    }

    /// Validates `value`, then writes it at `i`.
    ///
    /// Writing at `count` appends one element, growing a resizable variable by one slot when it
    /// is full. Nothing changes on failure.
    pub fn set(&mut self, i: usize, value: &Value) -> Result<(), ValueError> {
        let bytes = self.encode(value)?;
        self.reserve_slot(i)?;

        let start = i * self.element_size;
        let slot = &mut self.storage.bytes_mut()[start..start + self.element_size];
        slot.fill(0);
        slot[..bytes.len()].copy_from_slice(&bytes);
        if i == self.count {
            self.count += 1;
        }
        Ok(())
    }

    /// Changes the capacity. Fixed variables can only shrink.
    pub fn resize(&mut self, max: usize) -> Result<(), ValueError> {
        if max == 0 {
            return Err(ValueError::CapacityChangeRejected);
        }
        match &mut self.storage {
            Storage::Owned(bytes) => {
                let len = max
                    .checked_mul(self.element_size)
                    .ok_or(ValueError::AllocationFailure)?;
                if len > bytes.len() {
                    bytes
                        .try_reserve_exact(len - bytes.len())
                        .map_err(|_| ValueError::AllocationFailure)?;
                }
                bytes.resize(len, 0);
            }
            Storage::External(_) => {
                if max > self.max {
                    return Err(ValueError::CapacityChangeRejected);
                }
            }
        }
        self.max = max;
        self.count = self.count.min(max);
        Ok(())
    }

    pub fn set_range(&mut self, min: &Value, max: &Value) -> Result<(), ValueError> {
        let range = Range::new(self.descriptor, min, max)?;
        self.constraint = Constraint::Range(range);
        Ok(())
    }

    pub fn set_null_permitted(&mut self, permitted: bool) -> Result<(), ValueError> {
        match &mut self.constraint {
            Constraint::Text { null_permitted, .. } => {
                *null_permitted = permitted;
                Ok(())
            }
            _ => Err(ValueError::TypeMismatch),
        }
    }

    /// Replaces the allow-list. An empty list accepts any value.
    pub fn set_allow_list(&mut self, items: Vec<String>) -> Result<(), ValueError> {
        match &mut self.constraint {
            Constraint::Text { allow_list, .. } => {
                *allow_list = items;
                Ok(())
            }
            _ => Err(ValueError::TypeMismatch),
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, ValueError> {
        if self.descriptor.category == TypeCategory::String {
            return self.encode_text(value);
        }
        let scalar = scalar_for(value, self.descriptor)?;
        self.check_numeric(scalar)?;
        encode_scalar(scalar, self.descriptor)
    }

    fn check_numeric(&self, scalar: Scalar) -> Result<(), ValueError> {
        if self.descriptor.unsigned && scalar.is_negative() {
            return Err(ValueError::Negative);
        }
        if let Constraint::Range(range) = &self.constraint
            && !range.contains(scalar)
        {
            return Err(ValueError::OutOfRange);
        }
        Ok(())
    }

    fn encode_text(&self, value: &Value) -> Result<Vec<u8>, ValueError> {
        let text = match value {
            Value::Str(Some(text)) => text.clone(),
            Value::Str(None) => {
                if !self.null_permitted() {
                    return Err(ValueError::Null);
                }
                String::new()
            }
            other => other.render(),
        };
        let allow_list = self.allow_list();
        if !allow_list.is_empty()
            && !matches!(value, Value::Str(None))
            && !allow_list.iter().any(|item| *item == text)
        {
            return Err(ValueError::NotFound);
        }
        if text.len() + 1 > self.element_size {
            return Err(ValueError::Overflow);
        }
        let mut bytes = text.into_bytes();
        bytes.push(0);
        Ok(bytes)
    }

    fn reserve_slot(&mut self, i: usize) -> Result<(), ValueError> {
        if i > self.count {
            return Err(ValueError::IndexOutOfBounds);
        }
        if i < self.max {
            return Ok(());
        }
        if !self.resizable {
            return Err(ValueError::IndexOutOfBounds);
        }
        self.resize(self.max + 1)
    }
}

#[cfg(test)]
#[path = "tests/variable_tests.rs"]
mod tests;

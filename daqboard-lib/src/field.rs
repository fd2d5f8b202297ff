//! Bit-field registers.
//!
//! A [`Register`] is an ordered list of [`Field`]s packed low-bit-first into
//! one 32-bit word: the offset of a field is the sum of the widths declared
//! before it.

use crate::error::DaqError;
use crate::wire::RegisterAddress;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub width: u32,
    pub min: u32,
    pub max: u32,
    pub set_value: u32,
    pub read_value: u32,
}

impl Field {
    pub const fn new(name: &'static str, width: u32, min: u32, max: u32, default: u32) -> Self {
        Self {
            name,
            width,
            min,
            max,
            set_value: default,
            read_value: 0,
        }
    }

    /// Full-range field of the given width, default zero.
    pub const fn full(name: &'static str, width: u32) -> Self {
        Self::new(name, width, 0, mask(width), 0)
    }

    pub fn accepts(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Writable configuration with engineer-chosen defaults.
    Config,
    /// Read-only ADC monitoring value.
    Monitor,
    /// Protocol or identification word.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    name: &'static str,
    address: Option<RegisterAddress>,
    kind: RegisterKind,
    fields: Vec<Field>,
}

/// `width` low bits set; `width` may be 32.
pub const fn mask(width: u32) -> u32 {
    if width >= 32 { u32::MAX } else { (1u32 << width) - 1 }
}

impl Register {
    pub fn new(name: &'static str, address: Option<RegisterAddress>, kind: RegisterKind) -> Self {
        Self {
            name,
            address,
            kind,
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn address(&self) -> Option<RegisterAddress> {
        self.address
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Result<&Field, DaqError> {
        self.fields.get(index).ok_or(DaqError::FieldIndex {
            register: self.name,
            index,
            len: self.fields.len(),
        })
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn total_width(&self) -> u32 {
        self.fields.iter().map(|f| f.width).sum()
    }

    /// Bit offset of field `index`.
    pub fn offset(&self, index: usize) -> Result<u32, DaqError> {
        self.field(index)?;
        Ok(self.fields[..index].iter().map(|f| f.width).sum())
    }

    /// Checks the shape invariants: non-empty, widths in 1..=32, total at most
    /// 32 bits, ranges representable and defaults inside them.
    pub fn validate(&self) -> Result<(), DaqError> {
        let invalid = |reason: String| DaqError::InvalidRegister {
            register: self.name,
            reason,
        };
        if self.fields.is_empty() {
            return Err(DaqError::EmptyRegister(self.name));
        }
        for f in &self.fields {
            if !(1..=32).contains(&f.width) {
                return Err(invalid(format!("field {} has width {}", f.name, f.width)));
            }
            if f.min > f.max {
                return Err(invalid(format!("field {} has min {} > max {}", f.name, f.min, f.max)));
            }
            if f.max > mask(f.width) {
                return Err(invalid(format!(
                    "field {} max {} does not fit in {} bits",
                    f.name, f.max, f.width
                )));
            }
            if self.kind == RegisterKind::Config && !f.accepts(f.set_value) {
                return Err(invalid(format!("field {} default {} out of range", f.name, f.set_value)));
            }
        }
        let total = self.total_width();
        if total > 32 {
            return Err(invalid(format!("fields span {total} bits")));
        }
        Ok(())
    }

    /// Assigns `set_value` of one field. Nothing changes on error.
    pub fn set_field_value(&mut self, index: usize, value: u32) -> Result<(), DaqError> {
        let name = self.name;
        let len = self.fields.len();
        let field = self
            .fields
            .get_mut(index)
            .ok_or(DaqError::FieldIndex { register: name, index, len })?;
        if !field.accepts(value) {
            warn!(
                field = field.name,
                value,
                min = field.min,
                max = field.max,
                "Rejected out-of-range field value"
            );
            return Err(DaqError::OutOfRange {
                field: field.name.to_string(),
                value,
                min: field.min,
                max: field.max,
            });
        }
        field.set_value = value;
        Ok(())
    }

    /// Packs every `set_value` into one word.
    pub fn pack(&self) -> Result<u32, DaqError> {
        if self.fields.is_empty() {
            return Err(DaqError::EmptyRegister(self.name));
        }
        let mut word = 0u32;
        let mut offset = 0u32;
        for f in &self.fields {
            word |= (f.set_value & mask(f.width)).checked_shl(offset).unwrap_or(0);
            offset += f.width;
        }
        Ok(word)
    }

    /// Splits `word` into the `read_value` of every field.
    pub fn decode_word(&mut self, word: u32) {
        let mut offset = 0u32;
        for f in &mut self.fields {
            f.read_value = word.checked_shr(offset).unwrap_or(0) & mask(f.width);
            offset += f.width;
        }
    }

    pub fn read_value(&self, index: usize) -> Result<u32, DaqError> {
        Ok(self.field(index)?.read_value)
    }

    pub fn set_value(&self, index: usize) -> Result<u32, DaqError> {
        Ok(self.field(index)?.set_value)
    }
}

/// Primitive kinds that can appear on the wire
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Byte = 0,
    Short = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    Bytes = 5,
}

impl ValueKind {
    /// Encoded size for fixed-width kinds. Strings and byte arrays are
    /// length-prefixed and have no fixed size.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ValueKind::Byte => Some(1),
            ValueKind::Short => Some(2),
            ValueKind::Int | ValueKind::Float => Some(4),
            ValueKind::Str | ValueKind::Bytes => None,
        }
    }
}

/// One decoded primitive, handed to a message descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(u8),
    Short(i16),
    Int(i32),
    Float(f32),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Byte(_) => ValueKind::Byte,
            Value::Short(_) => ValueKind::Short,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Bytes(_) => ValueKind::Bytes,
        }
    }

    // The router always supplies the kind a descriptor asked for, so the
    // accessors below fall back to a neutral value instead of failing.

    pub fn as_int(&self) -> i32 {
        match *self {
            Value::Int(v) => v,
            Value::Short(v) => v as i32,
            Value::Byte(v) => v as i32,
            _ => 0,
        }
    }

    pub fn as_short(&self) -> i16 {
        match *self {
            Value::Short(v) => v,
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f32 {
        match *self {
            Value::Float(v) => v,
            _ => 0.0,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match *self {
            Value::Byte(v) => v,
            _ => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        self.as_byte() != 0
    }

    pub fn into_string(self) -> String {
        match self {
            Value::Str(s) => s,
            _ => String::new(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Value::Bytes(b) => b,
            Value::Str(s) => s.into_bytes(),
            _ => Vec::new(),
        }
    }
}

/// Element encoding of a field value buffer
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldFormat {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
}

impl FieldFormat {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(FieldFormat::I8),
            1 => Some(FieldFormat::U8),
            2 => Some(FieldFormat::I16),
            3 => Some(FieldFormat::U16),
            4 => Some(FieldFormat::I32),
            5 => Some(FieldFormat::U32),
            6 => Some(FieldFormat::I64),
            7 => Some(FieldFormat::U64),
            8 => Some(FieldFormat::F32),
            9 => Some(FieldFormat::F64),
            _ => None,
        }
    }

    /// Size in bytes of one stored value.
    pub fn byte_width(self) -> usize {
        match self {
            FieldFormat::I8 | FieldFormat::U8 => 1,
            FieldFormat::I16 | FieldFormat::U16 => 2,
            FieldFormat::I32 | FieldFormat::U32 | FieldFormat::F32 => 4,
            FieldFormat::I64 | FieldFormat::U64 | FieldFormat::F64 => 8,
        }
    }

    pub fn is_floating(self) -> bool {
        matches!(self, FieldFormat::F32 | FieldFormat::F64)
    }

    /// Round a double through this element type, the way a value computed
    /// in double precision is stored back as the field's own type.
    pub fn narrow(self, v: f64) -> f64 {
        match self {
            FieldFormat::I8 => v as i8 as f64,
            FieldFormat::U8 => v as u8 as f64,
            FieldFormat::I16 => v as i16 as f64,
            FieldFormat::U16 => v as u16 as f64,
            FieldFormat::I32 => v as i32 as f64,
            FieldFormat::U32 => v as u32 as f64,
            FieldFormat::I64 => v as i64 as f64,
            FieldFormat::U64 => v as u64 as f64,
            FieldFormat::F32 => v as f32 as f64,
            FieldFormat::F64 => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_widths() {
        assert_eq!(FieldFormat::U8.byte_width(), 1);
        assert_eq!(FieldFormat::I16.byte_width(), 2);
        assert_eq!(FieldFormat::F32.byte_width(), 4);
        assert_eq!(FieldFormat::F64.byte_width(), 8);
        assert_eq!(FieldFormat::from_u8(8), Some(FieldFormat::F32));
        assert_eq!(FieldFormat::from_u8(42), None);
    }

    #[test]
    fn test_narrow_truncates_to_element_type() {
        assert_eq!(FieldFormat::I16.narrow(3.7), 3.0);
        assert_eq!(FieldFormat::U8.narrow(300.0), 255.0);
        assert_eq!(FieldFormat::F32.narrow(0.1), 0.1f32 as f64);
        assert_eq!(FieldFormat::F64.narrow(0.1), 0.1);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(7).as_int(), 7);
        assert_eq!(Value::Short(-3).as_int(), -3);
        assert!(Value::Byte(2).as_bool());
        assert_eq!(Value::Str("a".into()).kind(), ValueKind::Str);
        assert_eq!(ValueKind::Float.fixed_size(), Some(4));
        assert_eq!(ValueKind::Bytes.fixed_size(), None);
    }
}

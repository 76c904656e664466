//! Device IR types

use std::fmt;

use crate::hlo::PrimitiveType;

/// Type of a device IR value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    /// Integer of the given bit width
    Int(u32),
    Half,
    Float,
    Double,
    /// Opaque pointer
    Ptr,
    /// Fixed-length vector
    Vector(Box<IrType>, u32),
    /// Anonymous struct with sequential fields
    Struct(Vec<IrType>),
    Array(Box<IrType>, u64),
}

impl IrType {
    pub const I1: IrType = IrType::Int(1);
    pub const I8: IrType = IrType::Int(8);
    pub const I32: IrType = IrType::Int(32);
    pub const I64: IrType = IrType::Int(64);

    pub fn vector(elem: IrType, len: u32) -> Self {
        IrType::Vector(Box::new(elem), len)
    }

    /// Bit width of scalar and vector types; `None` for aggregates,
    /// pointers and void
    pub fn primitive_size_in_bits(&self) -> Option<u32> {
        match self {
            IrType::Int(bits) => Some(*bits),
            IrType::Half => Some(16),
            IrType::Float => Some(32),
            IrType::Double => Some(64),
            IrType::Vector(elem, len) => elem.primitive_size_in_bits().map(|bits| bits * len),
            IrType::Void | IrType::Ptr | IrType::Struct(_) | IrType::Array(..) => None,
        }
    }

    /// Storage size in bytes, with fields packed without padding
    pub fn store_size(&self) -> u64 {
        match self {
            IrType::Void => 0,
            IrType::Int(bits) => u64::from(bits.div_ceil(8)),
            IrType::Half => 2,
            IrType::Float => 4,
            IrType::Double => 8,
            IrType::Ptr => 8,
            IrType::Vector(elem, len) => elem.store_size() * u64::from(*len),
            IrType::Struct(fields) => fields.iter().map(IrType::store_size).sum(),
            IrType::Array(elem, len) => elem.store_size() * len,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, IrType::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::Half | IrType::Float | IrType::Double)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, IrType::Vector(..))
    }

    pub fn is_first_class(&self) -> bool {
        !matches!(self, IrType::Void)
    }

    /// IR type used to hold values of a graph element type
    pub fn from_primitive(ty: PrimitiveType) -> Self {
        match ty {
            PrimitiveType::Pred | PrimitiveType::S8 | PrimitiveType::U8 => IrType::Int(8),
            PrimitiveType::S16 | PrimitiveType::U16 | PrimitiveType::Bf16 => IrType::Int(16),
            PrimitiveType::S32 | PrimitiveType::U32 => IrType::Int(32),
            PrimitiveType::S64 | PrimitiveType::U64 => IrType::Int(64),
            PrimitiveType::F16 => IrType::Half,
            PrimitiveType::F32 => IrType::Float,
            PrimitiveType::F64 => IrType::Double,
            PrimitiveType::C64 => IrType::Struct(vec![IrType::Float, IrType::Float]),
            PrimitiveType::C128 => IrType::Struct(vec![IrType::Double, IrType::Double]),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Int(bits) => write!(f, "i{}", bits),
            IrType::Half => write!(f, "half"),
            IrType::Float => write!(f, "float"),
            IrType::Double => write!(f, "double"),
            IrType::Ptr => write!(f, "ptr"),
            IrType::Vector(elem, len) => write!(f, "<{} x {}>", len, elem),
            IrType::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
            IrType::Array(elem, len) => write!(f, "[{} x {}]", len, elem),
        }
    }
}

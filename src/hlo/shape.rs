//! Array shapes, element types and physical layouts

use std::fmt;

use serde::{Deserialize, Serialize};

/// Element type of an array shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
    C64,
    C128,
}

impl PrimitiveType {
    /// Size of one element in bytes
    pub fn byte_width(self) -> u32 {
        match self {
            PrimitiveType::Pred | PrimitiveType::S8 | PrimitiveType::U8 => 1,
            PrimitiveType::S16 | PrimitiveType::U16 | PrimitiveType::F16 | PrimitiveType::Bf16 => 2,
            PrimitiveType::S32 | PrimitiveType::U32 | PrimitiveType::F32 => 4,
            PrimitiveType::S64 | PrimitiveType::U64 | PrimitiveType::F64 | PrimitiveType::C64 => 8,
            PrimitiveType::C128 => 16,
        }
    }

    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            PrimitiveType::F16 | PrimitiveType::Bf16 | PrimitiveType::F32 | PrimitiveType::F64
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(self, PrimitiveType::C64 | PrimitiveType::C128)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::S8
                | PrimitiveType::S16
                | PrimitiveType::S32
                | PrimitiveType::S64
                | PrimitiveType::U8
                | PrimitiveType::U16
                | PrimitiveType::U32
                | PrimitiveType::U64
        )
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveType::Pred => "pred",
            PrimitiveType::S8 => "s8",
            PrimitiveType::S16 => "s16",
            PrimitiveType::S32 => "s32",
            PrimitiveType::S64 => "s64",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::F16 => "f16",
            PrimitiveType::Bf16 => "bf16",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::C64 => "c64",
            PrimitiveType::C128 => "c128",
        };
        f.write_str(name)
    }
}

/// Physical ordering of a shape's dimensions, most minor first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layout {
    pub minor_to_major: Vec<usize>,
}

impl Layout {
    pub fn new(minor_to_major: Vec<usize>) -> Self {
        Self { minor_to_major }
    }

    /// Row-major layout: the last logical dimension is the most minor
    pub fn row_major(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank).rev().collect(),
        }
    }

    /// Position of a logical dimension in `minor_to_major`
    pub fn position_of(&self, dim: usize) -> Option<usize> {
        self.minor_to_major.iter().position(|&d| d == dim)
    }

    /// Whether `dims` occupy a contiguous run of physical positions
    ///
    /// The order in which `dims` is given does not matter. Dimensions that
    /// are not part of the layout make the set non-consecutive.
    pub fn are_dimensions_consecutive(&self, dims: &[usize]) -> bool {
        let mut positions = Vec::with_capacity(dims.len());
        for &dim in dims {
            match self.position_of(dim) {
                Some(pos) => positions.push(pos),
                None => return false,
            }
        }
        positions.sort_unstable();
        positions.windows(2).all(|w| w[1] == w[0] + 1)
    }
}

/// Array shape: element type, logical dimensions and layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    pub element_type: PrimitiveType,
    pub dimensions: Vec<i64>,
    pub layout: Layout,
}

impl Shape {
    /// Shape with the default row-major layout
    pub fn new(element_type: PrimitiveType, dimensions: impl Into<Vec<i64>>) -> Self {
        let dimensions = dimensions.into();
        let layout = Layout::row_major(dimensions.len());
        Self {
            element_type,
            dimensions,
            layout,
        }
    }

    pub fn with_layout(mut self, minor_to_major: impl Into<Vec<usize>>) -> Self {
        self.layout = Layout::new(minor_to_major.into());
        self
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Self::new(element_type, Vec::new())
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension(&self, dim: usize) -> Option<i64> {
        self.dimensions.get(dim).copied()
    }

    /// Whether the shape is a matrix once `batch_dims` leading batch
    /// dimensions are set aside
    pub fn is_rank2_beyond_batch(&self, batch_dims: usize) -> bool {
        self.rank() == batch_dims + 2
    }

    pub fn element_count(&self) -> i64 {
        self.dimensions.iter().product()
    }

    pub fn is_zero_element_array(&self) -> bool {
        self.dimensions.iter().any(|&d| d == 0)
    }

    /// Keeps only the dimensions for which `keep` holds
    ///
    /// Surviving dimensions are renumbered densely; the layout keeps their
    /// relative physical order.
    pub fn filter_dimensions(&self, keep: impl Fn(usize) -> bool) -> Shape {
        let kept: Vec<usize> = (0..self.rank()).filter(|&d| keep(d)).collect();
        let dimensions = kept.iter().map(|&d| self.dimensions[d]).collect();
        let minor_to_major = self
            .layout
            .minor_to_major
            .iter()
            .filter_map(|d| kept.iter().position(|k| k == d))
            .collect();
        Shape {
            element_type: self.element_type,
            dimensions,
            layout: Layout::new(minor_to_major),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dimensions.iter().map(|d| d.to_string()).collect();
        let layout: Vec<String> = self
            .layout
            .minor_to_major
            .iter()
            .map(|d| d.to_string())
            .collect();
        write!(
            f,
            "{}[{}]{{{}}}",
            self.element_type,
            dims.join(","),
            layout.join(",")
        )
    }
}

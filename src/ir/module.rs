//! Device IR modules, declarations and functions

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use super::types::IrType;
use crate::diagnostics::EmitError;

/// Declared function index within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub u32);

/// Defined function index within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Global string index within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Block index within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// Value index within its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Function type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<IrType>,
    pub ret: IrType,
}

impl Signature {
    pub fn new(params: Vec<IrType>, ret: IrType) -> Self {
        Self { params, ret }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

/// Function attributes applicable to declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FnAttribute {
    ReadNone,
    ReadOnly,
    NoUnwind,
    Convergent,
    NoInline,
}

impl fmt::Display for FnAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FnAttribute::ReadNone => write!(f, "readnone"),
            FnAttribute::ReadOnly => write!(f, "readonly"),
            FnAttribute::NoUnwind => write!(f, "nounwind"),
            FnAttribute::Convergent => write!(f, "convergent"),
            FnAttribute::NoInline => write!(f, "noinline"),
        }
    }
}

/// External function declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub signature: Signature,
    pub attributes: BTreeSet<FnAttribute>,
}

impl FunctionDecl {
    /// LLVM reserves the `llvm.` prefix for intrinsics
    pub fn is_intrinsic(&self) -> bool {
        self.name.starts_with("llvm.")
    }
}

/// Private NUL-terminated string constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalString {
    pub name: String,
    pub value: String,
}

/// Integer or floating-point constant
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    /// Bit pattern, zero-extended to 128 bits
    Int(u128),
    Float(f64),
}

/// Where a value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Param(u32),
    Const(Constant),
    Global(GlobalId),
    /// Result of the instruction at this position of a block
    Instr { block: BlockId, index: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueData {
    pub ty: IrType,
    pub kind: ValueKind,
}

/// Cast opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    BitCast,
    ZExt,
    Trunc,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastOp::BitCast => write!(f, "bitcast"),
            CastOp::ZExt => write!(f, "zext"),
            CastOp::Trunc => write!(f, "trunc"),
        }
    }
}

/// Device IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Call { callee: DeclId, args: Vec<ValueId> },
    Cast { op: CastOp, value: ValueId },
    ExtractElement { vector: ValueId, index: u32 },
    InsertElement { vector: ValueId, element: ValueId, index: u32 },
    Alloca { ty: IrType },
    /// Address of a field of the struct `ty` stored at `base`
    StructFieldPtr { base: ValueId, ty: IrType, field: u32 },
    Store { value: ValueId, ptr: ValueId },
    ICmpEq { lhs: ValueId, rhs: ValueId },
    And { lhs: ValueId, rhs: ValueId },
    Br { target: BlockId },
    CondBr { cond: ValueId, then_block: BlockId, else_block: BlockId },
    Ret { value: Option<ValueId> },
}

impl InstrKind {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstrKind::Br { .. } | InstrKind::CondBr { .. } | InstrKind::Ret { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<ValueId>,
    pub kind: InstrKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

/// Function definition
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub params: Vec<ValueId>,
    pub blocks: Vec<Block>,
    values: Vec<ValueData>,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        let mut function = Self {
            name: name.into(),
            signature,
            params: Vec::new(),
            blocks: vec![Block {
                label: "entry".to_string(),
                instructions: Vec::new(),
            }],
            values: Vec::new(),
        };
        for (i, ty) in function.signature.params.clone().into_iter().enumerate() {
            let id = function.add_value(ty, ValueKind::Param(i as u32));
            function.params.push(id);
        }
        function
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn param(&self, index: usize) -> Option<ValueId> {
        self.params.get(index).copied()
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize)
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.0 as usize)
    }

    pub(crate) fn add_value(&mut self, ty: IrType, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, kind });
        id
    }

    pub fn value(&self, id: ValueId) -> Option<&ValueData> {
        self.values.get(id.0 as usize)
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn value_type(&self, id: ValueId) -> Result<&IrType, EmitError> {
        self.value(id)
            .map(|data| &data.ty)
            .ok_or_else(|| EmitError::UnknownEntity {
                kind: "value",
                name: id.to_string(),
            })
    }

    /// All instructions, in block order
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }
}

/// Compilation unit under construction
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub target_triple: Option<String>,
    declarations: IndexMap<String, FunctionDecl>,
    globals: Vec<GlobalString>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_triple: None,
            declarations: IndexMap::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = Some(triple.into());
        self
    }

    /// Returns the declaration named `name`, creating it if absent
    ///
    /// Redeclaring a name with a different signature is an error rather
    /// than a second declaration.
    pub fn get_or_insert_function(
        &mut self,
        name: &str,
        signature: Signature,
    ) -> Result<DeclId, EmitError> {
        if let Some((index, _, existing)) = self.declarations.get_full(name) {
            if existing.signature != signature {
                return Err(EmitError::ConflictingDeclaration {
                    name: name.to_string(),
                    expected: existing.signature.to_string(),
                    found: signature.to_string(),
                });
            }
            return Ok(DeclId(index as u32));
        }

        tracing::trace!("Declaring `{}` as {}", name, signature);
        let (index, _) = self.declarations.insert_full(
            name.to_string(),
            FunctionDecl {
                name: name.to_string(),
                signature,
                attributes: BTreeSet::new(),
            },
        );
        Ok(DeclId(index as u32))
    }

    pub fn declaration(&self, id: DeclId) -> Option<&FunctionDecl> {
        self.declarations
            .get_index(id.0 as usize)
            .map(|(_, decl)| decl)
    }

    pub(crate) fn declaration_mut(&mut self, id: DeclId) -> Option<&mut FunctionDecl> {
        self.declarations
            .get_index_mut(id.0 as usize)
            .map(|(_, decl)| decl)
    }

    pub fn find_declaration(&self, name: &str) -> Option<&FunctionDecl> {
        self.declarations.get(name)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.declarations.values()
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations.len()
    }

    pub(crate) fn add_global_string(&mut self, value: &str) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(GlobalString {
            name: format!(".str.{}", id.0),
            value: value.to_string(),
        });
        id
    }

    pub fn global(&self, id: GlobalId) -> Option<&GlobalString> {
        self.globals.get(id.0 as usize)
    }

    pub fn globals(&self) -> &[GlobalString] {
        &self.globals
    }

    /// Adds a function definition with an empty entry block
    pub fn add_function(&mut self, name: impl Into<String>, signature: Signature) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Function::new(name, signature));
        id
    }

    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0 as usize)
    }

    pub(crate) fn function_mut(&mut self, id: FunctionId) -> Option<&mut Function> {
        self.functions.get_mut(id.0 as usize)
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }
}

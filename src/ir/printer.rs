//! Textual form of device IR modules
//!
//! The output follows LLVM assembly syntax closely enough to read like it,
//! but value numbers are the builder's value ids and are not renumbered.

use std::fmt;

use super::module::{Constant, Function, InstrKind, Instruction, Module, ValueId, ValueKind};
use super::types::IrType;

/// Escapes a string for a `c"..."` initializer
fn escape_c_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if (byte.is_ascii_graphic() && byte != b'"' && byte != b'\\') || byte == b' ' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{:02X}", byte));
        }
    }
    out.push_str("\\00");
    out
}

/// Constants print as signed values of their width
fn format_int(bits: u32, value: u128) -> String {
    if bits == 1 {
        return if value & 1 == 1 { "true" } else { "false" }.to_string();
    }
    if bits == 0 || bits > 128 {
        return value.to_string();
    }
    let shift = 128 - bits;
    (((value << shift) as i128) >> shift).to_string()
}

struct FunctionPrinter<'a> {
    module: &'a Module,
    function: &'a Function,
}

impl FunctionPrinter<'_> {
    fn ty(&self, value: ValueId) -> IrType {
        self.function
            .value(value)
            .map(|data| data.ty.clone())
            .unwrap_or(IrType::Void)
    }

    fn operand(&self, value: ValueId) -> String {
        match self.function.value(value).map(|data| (&data.ty, &data.kind)) {
            Some((IrType::Int(bits), ValueKind::Const(Constant::Int(v)))) => format_int(*bits, *v),
            Some((_, ValueKind::Const(Constant::Int(v)))) => v.to_string(),
            Some((_, ValueKind::Const(Constant::Float(v)))) => format!("{:?}", v),
            Some((_, ValueKind::Global(global))) => match self.module.global(*global) {
                Some(global) => format!("@{}", global.name),
                None => "@<unknown>".to_string(),
            },
            _ => value.to_string(),
        }
    }

    fn typed(&self, value: ValueId) -> String {
        format!("{} {}", self.ty(value), self.operand(value))
    }

    fn label(&self, block: super::module::BlockId) -> String {
        match self.function.block(block) {
            Some(b) => format!("label %{}", b.label),
            None => format!("label %bb{}", block.0),
        }
    }

    fn instruction(&self, f: &mut fmt::Formatter<'_>, instr: &Instruction) -> fmt::Result {
        write!(f, "  ")?;
        if let Some(result) = instr.result {
            if self.ty(result) != IrType::Void {
                write!(f, "{} = ", result)?;
            }
        }
        let written = match &instr.kind {
            InstrKind::Call { callee, args } => {
                let (name, ret) = match self.module.declaration(*callee) {
                    Some(decl) => (decl.name.as_str(), decl.signature.ret.clone()),
                    None => ("<unknown>", IrType::Void),
                };
                let args: Vec<String> = args.iter().map(|a| self.typed(*a)).collect();
                write!(f, "call {} @{}({})", ret, name, args.join(", "))
            }
            InstrKind::Cast { op, value } => {
                let to = instr.result.map(|r| self.ty(r)).unwrap_or(IrType::Void);
                write!(f, "{} {} to {}", op, self.typed(*value), to)
            }
            InstrKind::ExtractElement { vector, index } => {
                write!(f, "extractelement {}, i32 {}", self.typed(*vector), index)
            }
            InstrKind::InsertElement {
                vector,
                element,
                index,
            } => write!(
                f,
                "insertelement {}, {}, i32 {}",
                self.typed(*vector),
                self.typed(*element),
                index
            ),
            InstrKind::Alloca { ty } => write!(f, "alloca {}", ty),
            InstrKind::StructFieldPtr { base, ty, field } => write!(
                f,
                "getelementptr inbounds {}, {}, i64 0, i32 {}",
                ty,
                self.typed(*base),
                field
            ),
            InstrKind::Store { value, ptr } => {
                write!(f, "store {}, {}", self.typed(*value), self.typed(*ptr))
            }
            InstrKind::ICmpEq { lhs, rhs } => {
                write!(f, "icmp eq {}, {}", self.typed(*lhs), self.operand(*rhs))
            }
            InstrKind::And { lhs, rhs } => {
                write!(f, "and {}, {}", self.typed(*lhs), self.operand(*rhs))
            }
            InstrKind::Br { target } => write!(f, "br {}", self.label(*target)),
            InstrKind::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, {}, {}",
                self.typed(*cond),
                self.label(*then_block),
                self.label(*else_block)
            ),
            InstrKind::Ret { value: None } => write!(f, "ret void"),
            InstrKind::Ret { value: Some(v) } => write!(f, "ret {}", self.typed(*v)),
        };
        written?;
        writeln!(f)
    }
}

impl fmt::Display for FunctionPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.function.params.iter().map(|p| self.typed(*p)).collect();
        writeln!(
            f,
            "define {} @{}({}) {{",
            self.function.signature.ret,
            self.function.name,
            params.join(", ")
        )?;
        for (i, block) in self.function.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.label)?;
            for instr in &block.instructions {
                self.instruction(f, instr)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if let Some(triple) = &self.target_triple {
            writeln!(f, "target triple = \"{}\"", triple)?;
        }

        if !self.globals().is_empty() {
            writeln!(f)?;
        }
        for global in self.globals() {
            writeln!(
                f,
                "@{} = private unnamed_addr constant [{} x i8] c\"{}\"",
                global.name,
                global.value.len() + 1,
                escape_c_string(&global.value)
            )?;
        }

        for function in self.functions() {
            writeln!(f)?;
            write!(
                f,
                "{}",
                FunctionPrinter {
                    module: self,
                    function,
                }
            )?;
        }

        if self.declaration_count() > 0 {
            writeln!(f)?;
        }
        for decl in self.declarations() {
            let params: Vec<String> = decl.signature.params.iter().map(|p| p.to_string()).collect();
            write!(
                f,
                "declare {} @{}({})",
                decl.signature.ret,
                decl.name,
                params.join(", ")
            )?;
            for attr in &decl.attributes {
                write!(f, " {}", attr)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//! GPU emission CLI
//!
//! Main entry point for the `gpuemit` command.

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gpu_emission::config::BackendConfig;
use gpu_emission::emit::{emit_full_warp_shuffle_down, emit_printf, is_block0_thread0};
use gpu_emission::hlo::{self, HloOpcode, PrimitiveType};
use gpu_emission::ir::{IrBuilder, IrType, Module, Signature};
use gpu_emission::libcall;
use gpu_emission::target::{SimtIntrinsic, TargetMachineFeatures};

#[derive(Parser)]
#[command(name = "gpuemit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Library-call decisions and portable device code for GPU kernels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend configuration (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide, per instruction, between a library call and a generated kernel
    Classify {
        /// Graph file (JSON)
        #[arg(value_name = "GRAPH")]
        input: PathBuf,
    },

    /// List portable intrinsics and the symbols they resolve to
    Intrinsics,

    /// Print a sample kernel that shuffles a value down the warp and
    /// prints it from block 0, thread 0
    Emit {
        /// Element type of the shuffled value
        #[arg(long = "type", value_enum, default_value = "f32")]
        element_type: ElementType,

        /// Lane offset
        #[arg(long, default_value = "1")]
        offset: i32,
    },

    /// Show information about the configured backend
    Info,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ElementType {
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
}

impl ElementType {
    fn primitive(self) -> PrimitiveType {
        match self {
            ElementType::S8 => PrimitiveType::S8,
            ElementType::S16 => PrimitiveType::S16,
            ElementType::S32 => PrimitiveType::S32,
            ElementType::S64 => PrimitiveType::S64,
            ElementType::U8 => PrimitiveType::U8,
            ElementType::U16 => PrimitiveType::U16,
            ElementType::U32 => PrimitiveType::U32,
            ElementType::U64 => PrimitiveType::U64,
            ElementType::F16 => PrimitiveType::F16,
            ElementType::Bf16 => PrimitiveType::Bf16,
            ElementType::F32 => PrimitiveType::F32,
            ElementType::F64 => PrimitiveType::F64,
        }
    }

    /// printf conversion for the value as stored in the argument record;
    /// narrow floats are shown as raw bits
    fn conversion(self) -> &'static str {
        match self {
            ElementType::F64 => "%f",
            ElementType::F32 => "%#x",
            ElementType::S64 => "%lld",
            ElementType::U64 => "%llu",
            ElementType::F16 | ElementType::Bf16 => "%#hx",
            ElementType::U8 | ElementType::U16 | ElementType::U32 => "%u",
            ElementType::S8 | ElementType::S16 | ElementType::S32 => "%d",
        }
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let config = match &cli.config {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::default(),
    };

    match cli.command {
        Commands::Classify { input } => classify(&input),
        Commands::Intrinsics => intrinsics(&config),
        Commands::Emit {
            element_type,
            offset,
        } => emit(&config, element_type, offset),
        Commands::Info => info(&config),
    }
}

fn classify(input: &Path) -> Result<()> {
    tracing::info!("Classifying {:?}", input);
    let computation = hlo::load_computation(input)?;
    tracing::debug!("Loaded {} instructions", computation.len());

    for instr in computation.instructions() {
        let decision = match libcall::library_call_kind(instr) {
            Some(kind) => format!("library call: {}", kind),
            None if instr.opcode() == HloOpcode::Reduce => {
                if libcall::is_vector_reduction(instr) {
                    "kernel (vector reduction)".to_string()
                } else {
                    "kernel (general reduction)".to_string()
                }
            }
            None => "kernel".to_string(),
        };
        println!("{:<24} {:<12} {}", instr.to_string(), instr.opcode(), decision);
    }
    Ok(())
}

fn intrinsics(config: &BackendConfig) -> Result<()> {
    let features = config.target_features();
    println!("Target: {} ({})", features.target_name(), features.target_triple());
    for intrinsic in SimtIntrinsic::ALL {
        match features.lookup(intrinsic) {
            Some(symbol) => println!("  {:<16} {}", intrinsic, symbol),
            None => println!("  {:<16} (unavailable)", intrinsic),
        }
    }
    Ok(())
}

fn emit(config: &BackendConfig, element_type: ElementType, offset: i32) -> Result<()> {
    let features = config.target_features();
    let value_ty = IrType::from_primitive(element_type.primitive());
    tracing::info!(
        "Emitting shuffle of {} for {}",
        value_ty,
        features.cpu_name()
    );

    let mut module = Module::new("shuffle_demo").with_target_triple(features.target_triple());
    let kernel = module.add_function("kernel", Signature::new(vec![value_ty], IrType::Void));
    build_kernel(&mut module, kernel, element_type, offset, features.as_ref())?;

    if features.could_need_device_library(&module) {
        for path in config.device_library_paths() {
            tracing::info!("Links {}", path.display());
        }
    }
    print!("{}", module);
    Ok(())
}

fn build_kernel(
    module: &mut Module,
    kernel: gpu_emission::ir::FunctionId,
    element_type: ElementType,
    offset: i32,
    features: &dyn TargetMachineFeatures,
) -> Result<()> {
    let mut b = IrBuilder::new(module, kernel)?;
    let value = b.param(0)?;
    let offset = b.const_i32(offset);
    let shuffled = emit_full_warp_shuffle_down(value, offset, &mut b, features)?;

    let first = is_block0_thread0(&mut b, features)?;
    let print_block = b.append_block("print");
    let exit_block = b.append_block("exit");
    b.create_cond_br(first, print_block, exit_block)?;

    b.position_at_end(print_block)?;
    let format = format!("shuffled: {}\n", element_type.conversion());
    emit_printf(&format, &[shuffled], &mut b)?;
    b.create_br(exit_block)?;

    b.position_at_end(exit_block)?;
    b.create_ret(None)?;
    Ok(())
}

fn info(config: &BackendConfig) -> Result<()> {
    let features = config.target_features();
    println!("gpuemit {}", gpu_emission::VERSION);
    println!();
    println!("Target:");
    println!("  Family:    {}", features.target_name());
    println!("  Triple:    {}", features.target_triple());
    println!("  Processor: {}", features.cpu_name());
    if !features.features().is_empty() {
        println!("  Features:  {}", features.features());
    }
    println!("  Opt level: {}", config.opt_level);
    println!();

    let libs = config.device_library_paths();
    if libs.is_empty() {
        println!("Device libraries: none configured");
    } else {
        println!("Device libraries:");
        for lib in libs {
            println!("  - {}", lib.display());
        }
    }
    Ok(())
}

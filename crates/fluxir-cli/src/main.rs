use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fluxir")]
#[command(about = "FluxIR - edge-indexed dataflow analyses over a small SSA IR")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a dataflow analysis over every function in a file
    Analyze {
        input: PathBuf,

        #[arg(long, value_enum)]
        analysis: AnalysisKind,

        /// Restrict to a single function by name
        #[arg(long)]
        function: Option<String>,

        #[arg(long)]
        json: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the parsed program with instruction indices
    Dump {
        input: PathBuf,

        /// Also print per-instruction control-flow edges
        #[arg(long)]
        edges: bool,
    },

    /// Check that a file parses
    Validate {
        input: PathBuf,

        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnalysisKind {
    Liveness,
    Reaching,
    MayPointTo,
}

impl AnalysisKind {
    fn name(&self) -> &'static str {
        match self {
            AnalysisKind::Liveness => "liveness",
            AnalysisKind::Reaching => "reaching",
            AnalysisKind::MayPointTo => "may-point-to",
        }
    }
}

#[derive(Serialize)]
struct FunctionReport {
    function: String,
    analysis: String,
    points: Vec<PointFact>,
}

#[derive(Serialize)]
struct PointFact {
    point: usize,
    instruction: String,
    fact: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            analysis,
            function,
            json,
            output,
            verbose,
        } => cmd_analyze(input, analysis, function, json, output, verbose),
        Commands::Dump { input, edges } => cmd_dump(input, edges),
        Commands::Validate { input, verbose } => cmd_validate(input, verbose),
    }
}

fn cmd_analyze(
    input: PathBuf,
    analysis: AnalysisKind,
    function: Option<String>,
    json: bool,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    use colored::*;
    use std::fs;

    if verbose {
        println!("{}", "FluxIR Analyzer".bright_blue().bold());
        println!("{}", "=".repeat(50).bright_blue());
        println!("Input: {}", input.display());
        println!("Analysis: {}", analysis.name());
        println!();
    }

    let functions = fluxir_parser::parse_file(&input)?;
    let selected: Vec<_> = functions
        .iter()
        .filter(|f| function.as_deref().map_or(true, |name| f.name == name))
        .collect();

    if let Some(name) = &function {
        if selected.is_empty() {
            anyhow::bail!("no function named @{} in {}", name, input.display());
        }
    }

    let mut reports = Vec::new();
    for func in selected {
        if verbose {
            println!("Analyzing @{}...", func.name);
        }
        reports.push(run_analysis(analysis, func)?);
    }

    let rendered = if json {
        serde_json::to_string_pretty(&reports)?
    } else {
        let mut text = String::new();
        for report in &reports {
            text.push_str(&format!("func @{} ({})\n", report.function, report.analysis));
            for point in &report.points {
                text.push_str(&format!("{}: {}\n", point.point, point.fact));
            }
        }
        text
    };

    if let Some(path) = output {
        fs::write(&path, rendered)?;
        if verbose {
            println!("{} wrote {}", "SUCCESS:".bright_green().bold(), path.display());
        }
    } else {
        print!("{}", rendered);
    }
    Ok(())
}

fn run_analysis(kind: AnalysisKind, function: &fluxir_core::Function) -> Result<FunctionReport> {
    use fluxir_core::{
        LivenessAnalysis, LivenessFact, MayPointToAnalysis, MayPointToFact, ReachingAnalysis,
        ReachingFact,
    };

    match kind {
        AnalysisKind::Liveness => collect_facts(
            kind,
            function,
            fluxir_core::DataFlowEngine::new(
                LivenessAnalysis,
                LivenessFact::new(),
                LivenessFact::new(),
            ),
        ),
        AnalysisKind::Reaching => collect_facts(
            kind,
            function,
            fluxir_core::DataFlowEngine::new(
                ReachingAnalysis,
                ReachingFact::new(),
                ReachingFact::new(),
            ),
        ),
        AnalysisKind::MayPointTo => collect_facts(
            kind,
            function,
            fluxir_core::DataFlowEngine::new(
                MayPointToAnalysis,
                MayPointToFact::new(),
                MayPointToFact::new(),
            ),
        ),
    }
}

fn collect_facts<A: fluxir_core::Analysis>(
    kind: AnalysisKind,
    function: &fluxir_core::Function,
    mut engine: fluxir_core::DataFlowEngine<A>,
) -> Result<FunctionReport> {
    let index = engine.run(function)?;

    let mut points = Vec::with_capacity(index.len());
    for point in 0..index.len() {
        let instruction = index
            .instruction(&function.body, point)
            .map(|inst| render_instruction(&function.body, inst))
            .unwrap_or_default();
        points.push(PointFact {
            point,
            instruction,
            fact: engine.fact_at(point).to_string(),
        });
    }

    Ok(FunctionReport {
        function: function.name.clone(),
        analysis: kind.name().to_string(),
        points,
    })
}

/// Render an instruction with source block labels instead of raw block ids,
/// so dump output round-trips with the input text.
fn render_instruction(
    body: &fluxir_core::FunctionBody,
    inst: &fluxir_core::Instruction,
) -> String {
    use fluxir_core::{BlockId, Instruction};

    let label = |id: BlockId| {
        body.get_block(id)
            .map(|block| block.label.clone())
            .unwrap_or_else(|| id.to_string())
    };

    match inst {
        Instruction::Jump { target } => format!("jmp {}", label(*target)),
        Instruction::Branch {
            condition,
            then_block,
            else_block,
        } => format!(
            "br {}, {}, {}",
            condition,
            label(*then_block),
            label(*else_block)
        ),
        Instruction::Phi { result, incoming } => {
            let arms: Vec<String> = incoming
                .iter()
                .map(|(block, value)| format!("[{}, {}]", label(*block), value))
                .collect();
            format!("{} = phi {}", result, arms.join(", "))
        }
        other => other.to_string(),
    }
}

fn cmd_dump(input: PathBuf, edges: bool) -> Result<()> {
    use colored::*;
    use fluxir_core::InstructionIndex;

    let functions = fluxir_parser::parse_file(&input)?;

    for function in &functions {
        let params: Vec<String> = function
            .params
            .iter()
            .map(|p| format!("%{}", p.name))
            .collect();
        println!(
            "{}",
            format!("func @{}({}) {{", function.name, params.join(", "))
                .bright_green()
                .bold()
        );

        let index = InstructionIndex::build(&function.body)?;
        let mut point = 0;
        for block in function.body.blocks.values() {
            println!("{}:", block.label);
            for inst in &block.instructions {
                let rendered = render_instruction(&function.body, inst);
                if edges {
                    let format_points = |points: &[usize]| {
                        points
                            .iter()
                            .map(|p| p.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    println!(
                        "  [{:>3}] {:<40} preds=[{}] succs=[{}]",
                        point,
                        rendered,
                        format_points(index.predecessors(point)),
                        format_points(index.successors(point))
                    );
                } else {
                    println!("  [{:>3}] {}", point, rendered);
                }
                point += 1;
            }
        }
        println!("}}");
        println!();
    }
    Ok(())
}

fn cmd_validate(input: PathBuf, verbose: bool) -> Result<()> {
    use colored::*;

    match fluxir_parser::parse_file(&input) {
        Ok(functions) => {
            println!("{}", "VALID".bright_green().bold());
            if verbose {
                for function in &functions {
                    println!(
                        "  @{}: {} blocks, {} instructions",
                        function.name,
                        function.body.blocks.len(),
                        function.body.instruction_count()
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", "INVALID".bright_red().bold());
            println!("{}", e);
            Err(anyhow::anyhow!("validation failed"))
        }
    }
}

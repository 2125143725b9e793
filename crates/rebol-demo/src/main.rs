//! Thin binary exercising the embedding API (spec 6.1): boots an
//! `Interpreter`, builds one of a handful of canned programs the same
//! way a scanner would hand the core an already-tokenized array, runs
//! it through `do_array`, and prints the result.
//!
//! There is no scanner in this core (spec's Non-goals), so this demo
//! cannot parse REBOL source text; it assembles cell arrays directly,
//! the same way the worked scenarios in spec section 8 are built in
//! `core-runtime`'s own tests.

use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use core_bind::Specifier;
use core_cell::{Cell, CellKind};
use core_runtime::{BootConfig, Interpreter};
use tracing_appender::non_blocking::WorkerGuard;

/// One of spec section 8's worked end-to-end scenarios.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    /// `1 + 2 * 3` -> `9`
    Arithmetic,
    /// `either 1 = 1 ["yes"] ["no"]` -> branch taken via logic
    Either,
    /// `do [x: 10  x + 5]` -> `15`, `x` left bound to `10`
    DoSet,
    /// `trap [1 / 0]` -> a caught `zero-divide` error
    Trap,
    /// `catch [throw 42]` -> `42`
    Catch,
    /// `f: func [x] [return x + 1]` then `f 41` -> `42`
    Function,
    /// construct and release 10,000 temporary arrays, then recycle
    Recycle,
}

#[derive(Parser, Debug)]
#[command(name = "rebol-demo", version, about = "REBOL/Ren-C core runtime demo")]
struct Args {
    /// Which worked scenario to run.
    #[arg(value_enum, default_value_t = ScenarioArg::Arithmetic)]
    scenario: ScenarioArg,
    /// Optional boot-config TOML file (overrides the built-in defaults).
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

// `clap`'s `ValueEnum` derive wants a type distinct from the one we
// pattern-match on so the two don't need to agree on derive traits;
// kept as a one-to-one mirror of `Scenario`.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ScenarioArg {
    #[default]
    Arithmetic,
    Either,
    DoSet,
    Trap,
    Catch,
    Function,
    Recycle,
}

impl From<ScenarioArg> for Scenario {
    fn from(v: ScenarioArg) -> Self {
        match v {
            ScenarioArg::Arithmetic => Scenario::Arithmetic,
            ScenarioArg::Either => Scenario::Either,
            ScenarioArg::DoSet => Scenario::DoSet,
            ScenarioArg::Trap => Scenario::Trap,
            ScenarioArg::Catch => Scenario::Catch,
            ScenarioArg::Function => Scenario::Function,
            ScenarioArg::Recycle => Scenario::Recycle,
        }
    }
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join("rebol-demo.log");
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, "rebol-demo.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

/// Renders a cell well enough to show a demo scenario's result;
/// `describe` is this binary's own concern, not the core's molder
/// (spec's Non-goals exclude the molder/former from the core).
fn describe(interp: &Interpreter, cell: &Cell) -> String {
    match cell.kind() {
        CellKind::Integer => cell.as_integer().map(|v| v.to_string()).unwrap_or_default(),
        CellKind::Float => cell.as_float().map(|v| v.to_string()).unwrap_or_default(),
        CellKind::Logic => cell.as_logic().map(|v| v.to_string()).unwrap_or_default(),
        CellKind::None => "none".to_string(),
        CellKind::Void => "void".to_string(),
        CellKind::Word | CellKind::SetWord | CellKind::GetWord | CellKind::LitWord => cell
            .symbol()
            .map(|s| interp.symbols().spelling(s).to_string())
            .unwrap_or_else(|| "word".to_string()),
        CellKind::Error => "an error! value".to_string(),
        other => format!("{other:?} value"),
    }
}

/// `1 + 2 * 3` -> `9`: left-to-right enfix chaining, spec 8 scenario (a).
fn run_arithmetic(interp: &mut Interpreter) -> Result<()> {
    let (plus_sym, plus_idx) = interp.native_symbol("+").expect("+ is a registered native");
    let (star_sym, star_idx) = interp.native_symbol("*").expect("* is a registered native");
    let lib = interp.lib_context();

    let program = interp.make_array(5);
    interp.push_cell(program, Cell::integer(1))?;
    interp.push_cell(program, Cell::word_bound(plus_sym, lib, plus_idx))?;
    interp.push_cell(program, Cell::integer(2))?;
    interp.push_cell(program, Cell::word_bound(star_sym, lib, star_idx))?;
    interp.push_cell(program, Cell::integer(3))?;
    interp.manage_array(program)?;

    let mut out = Cell::none_value();
    interp.do_array(program, 0, Specifier::None, &mut out)?;
    println!("1 + 2 * 3 => {}", describe(interp, &out));
    Ok(())
}

/// `either 1 = 1 [10] [20]` -> `10`: spec 8 scenario (b), with an
/// integer branch result in place of the molder-dependent string form.
fn run_either(interp: &mut Interpreter) -> Result<()> {
    let (eq_sym, eq_idx) = interp.native_symbol("=").expect("= is a registered native");
    let (either_sym, either_idx) = interp.native_symbol("either").expect("either is a registered native");
    let lib = interp.lib_context();

    let yes_branch = interp.make_array(1);
    interp.push_cell(yes_branch, Cell::integer(10))?;
    interp.manage_array(yes_branch)?;

    let no_branch = interp.make_array(1);
    interp.push_cell(no_branch, Cell::integer(20))?;
    interp.manage_array(no_branch)?;

    let program = interp.make_array(6);
    interp.push_cell(program, Cell::word_bound(either_sym, lib, either_idx))?;
    interp.push_cell(program, Cell::integer(1))?;
    interp.push_cell(program, Cell::word_bound(eq_sym, lib, eq_idx))?;
    interp.push_cell(program, Cell::integer(1))?;
    interp.push_cell(program, Cell::block(yes_branch, 0))?;
    interp.push_cell(program, Cell::block(no_branch, 0))?;
    interp.manage_array(program)?;

    let mut out = Cell::none_value();
    interp.do_array(program, 0, Specifier::None, &mut out)?;
    println!("either 1 = 1 [10] [20] => {}", describe(interp, &out));
    Ok(())
}

/// `do [x: 10  x + 5]` -> `15`, leaving `x` bound to `10` in the user
/// context afterward: spec 8 scenario (c).
fn run_do_set(interp: &mut Interpreter) -> Result<()> {
    let (plus_sym, plus_idx) = interp.native_symbol("+").expect("+ is a registered native");
    let x_sym = interp.intern("x");
    let lib = interp.lib_context();

    let user_context = interp.create_user_context(&[x_sym]);

    let inner = interp.make_array(4);
    interp.push_cell(inner, Cell::set_word_bound(x_sym, user_context, 1))?;
    interp.push_cell(inner, Cell::integer(10))?;
    interp.push_cell(inner, Cell::word_bound(x_sym, user_context, 1))?;
    interp.push_cell(inner, Cell::word_bound(plus_sym, lib, plus_idx))?;
    interp.manage_array(inner)?;
    // `x + 5`'s trailing literal has no matching word to pre-bind, so
    // it is pushed straight onto `inner` rather than routed through
    // `bind_program` (which only rebinds already-present word cells).
    interp.push_cell(inner, Cell::integer(5))?;

    let program = interp.make_array(2);
    let (do_sym, do_idx) = interp.native_symbol("do").expect("do is a registered native");
    interp.push_cell(program, Cell::word_bound(do_sym, lib, do_idx))?;
    interp.push_cell(program, Cell::block(inner, 0))?;
    interp.manage_array(program)?;

    let mut out = Cell::none_value();
    interp.do_array(program, 0, Specifier::None, &mut out)?;
    println!("do [x: 10  x + 5] => {}", describe(interp, &out));

    let x_value = interp.read_user_var(user_context, 1)?;
    println!("x afterward => {}", describe(interp, &x_value));
    Ok(())
}

/// `trap [1 / 0]` -> a caught error value whose `id` is `zero-divide`:
/// spec 8 scenario (d).
fn run_trap(interp: &mut Interpreter) -> Result<()> {
    let (div_sym, div_idx) = interp.native_symbol("/").expect("/ is a registered native");
    let (trap_sym, trap_idx) = interp.native_symbol("trap").expect("trap is a registered native");
    let lib = interp.lib_context();

    let body = interp.make_array(3);
    interp.push_cell(body, Cell::integer(1))?;
    interp.push_cell(body, Cell::word_bound(div_sym, lib, div_idx))?;
    interp.push_cell(body, Cell::integer(0))?;
    interp.manage_array(body)?;

    let program = interp.make_array(2);
    interp.push_cell(program, Cell::word_bound(trap_sym, lib, trap_idx))?;
    interp.push_cell(program, Cell::block(body, 0))?;
    interp.manage_array(program)?;

    let mut out = Cell::none_value();
    interp.do_array(program, 0, Specifier::None, &mut out)?;
    println!("trap [1 / 0] => {}", describe(interp, &out));
    Ok(())
}

/// `catch [throw 42]` -> `42`: spec 8 scenario (e) (the unnamed case;
/// named catch/throw pairing is covered directly in `core-eval`'s own
/// tests rather than re-demonstrated here).
fn run_catch(interp: &mut Interpreter) -> Result<()> {
    let (throw_sym, throw_idx) = interp.native_symbol("throw").expect("throw is a registered native");
    let (catch_sym, catch_idx) = interp.native_symbol("catch").expect("catch is a registered native");
    let lib = interp.lib_context();

    let body = interp.make_array(2);
    interp.push_cell(body, Cell::word_bound(throw_sym, lib, throw_idx))?;
    interp.push_cell(body, Cell::integer(42))?;
    interp.manage_array(body)?;

    let program = interp.make_array(2);
    interp.push_cell(program, Cell::word_bound(catch_sym, lib, catch_idx))?;
    interp.push_cell(program, Cell::block(body, 0))?;
    interp.manage_array(program)?;

    let mut out = Cell::none_value();
    interp.do_array(program, 0, Specifier::None, &mut out)?;
    println!("catch [throw 42] => {}", describe(interp, &out));
    Ok(())
}

/// `f: func [x] [return x + 1]` then `f 41` -> `42`: spec 8 scenario
/// (f).
fn run_function(interp: &mut Interpreter) -> Result<()> {
    let (plus_sym, plus_idx) = interp.native_symbol("+").expect("+ is a registered native");
    let (func_sym, func_idx) = interp.native_symbol("func").expect("func is a registered native");
    let (return_sym, return_idx) = interp.native_symbol("return").expect("return is a registered native");
    let f_sym = interp.intern("f");
    let x_sym = interp.intern("x");
    let lib = interp.lib_context();

    let user_context = interp.create_user_context(&[f_sym]);

    let spec_block = interp.make_array(1);
    interp.push_cell(spec_block, Cell::word_unbound(x_sym))?;
    interp.manage_array(spec_block)?;

    let body_block = interp.make_array(4);
    interp.push_cell(body_block, Cell::word_bound(return_sym, lib, return_idx))?;
    interp.push_cell(body_block, Cell::word_unbound(x_sym))?;
    interp.push_cell(body_block, Cell::word_bound(plus_sym, lib, plus_idx))?;
    interp.push_cell(body_block, Cell::integer(1))?;
    interp.manage_array(body_block)?;

    let define = interp.make_array(4);
    interp.push_cell(define, Cell::set_word_bound(f_sym, user_context, 1))?;
    interp.push_cell(define, Cell::word_bound(func_sym, lib, func_idx))?;
    interp.push_cell(define, Cell::block(spec_block, 0))?;
    interp.push_cell(define, Cell::block(body_block, 0))?;
    interp.manage_array(define)?;

    let mut out = Cell::none_value();
    interp.do_array(define, 0, Specifier::None, &mut out)?;

    let call = interp.make_array(2);
    interp.push_cell(call, Cell::word_bound(f_sym, user_context, 1))?;
    interp.push_cell(call, Cell::integer(41))?;
    interp.manage_array(call)?;

    interp.do_array(call, 0, Specifier::None, &mut out)?;
    println!("f: func [x] [return x + 1]  f 41 => {}", describe(interp, &out));
    Ok(())
}

/// Constructs and drops 10,000 temporary arrays, then recycles: spec 8
/// scenario (g) (`mem_in_use` returns to its pre-test value).
fn run_recycle(interp: &mut Interpreter) -> Result<()> {
    let before = interp.mem_in_use();
    for _ in 0..10_000 {
        let handle = interp.make_array(4);
        interp.push_cell(handle, Cell::integer(1))?;
        interp.manage_array(handle)?;
        // Dropped immediately: nothing roots it past this loop
        // iteration, so the next recycle reclaims it.
    }
    let stats = interp.recycle(&[]);
    let after = interp.mem_in_use();
    println!(
        "recycle: {} nodes freed, {} bytes recycled, mem_in_use {} -> {}",
        stats.nodes_freed, stats.bytes_recycled, before, after
    );
    Ok(())
}

fn run(scenario: Scenario, config: &BootConfig) -> Result<()> {
    let mut interp = Interpreter::try_init(config)?;
    let result = match scenario {
        Scenario::Arithmetic => run_arithmetic(&mut interp),
        Scenario::Either => run_either(&mut interp),
        Scenario::DoSet => run_do_set(&mut interp),
        Scenario::Trap => run_trap(&mut interp),
        Scenario::Catch => run_catch(&mut interp),
        Scenario::Function => run_function(&mut interp),
        Scenario::Recycle => run_recycle(&mut interp),
    };
    interp.shutdown_core();
    result
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging();
    install_panic_hook();

    let config = core_runtime::load_config(args.config.as_deref());
    tracing::info!(target: "demo.startup", scenario = ?args.scenario, "rebol_demo_start");
    run(args.scenario.into(), &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_runs_without_leaking() {
        for scenario in [
            Scenario::Arithmetic,
            Scenario::Either,
            Scenario::DoSet,
            Scenario::Trap,
            Scenario::Catch,
            Scenario::Function,
            Scenario::Recycle,
        ] {
            run(scenario, &BootConfig::default()).expect("scenario runs cleanly");
        }
    }
}

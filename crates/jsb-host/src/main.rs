//! jsb-host: Sample Host
//!
//! Initializes the global allocator and logging, brings up the bridge from
//! an optional TOML file, and walks the engine through the handle and
//! finalizer lifecycles a host relies on.

use anyhow::{ensure, Context, Result};
use jsb_bridge::{init, shutdown, BridgeConfig, BridgeEngine, HandleId, HostBridge, HostCallbacks, HostFn};
use jsb_engine::{EngineError, ErrorReport, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Use mimalloc as the global allocator for reduced memory fragmentation
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type Collected = Rc<RefCell<Vec<HandleId>>>;

fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("jsb-host starting...");
    let config = load_config()?;

    let collected = Collected::default();
    let mut engine = init(config, callbacks(collected.clone()))?;

    rooted_handle_survives(&mut engine)?;
    finalizer_reports_collection(&mut engine, &collected)?;
    staged_call(&mut engine)?;
    class_objects(&mut engine, &collected)?;

    info!(
        handles = engine.handle_count(),
        live_cells = engine.heap_stats().live_cells,
        "{}",
        engine.stats().format()
    );
    shutdown(engine);

    info!(notified = collected.borrow().len(), "jsb-host shutting down");
    Ok(())
}

fn load_config() -> Result<BridgeConfig> {
    let Some(path) = std::env::args().nth(1) else {
        info!("Using standard configuration");
        return Ok(BridgeConfig::standard());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let config = BridgeConfig::from_toml_str(&text).with_context(|| format!("parsing {}", path))?;
    info!("Loaded configuration from {}", path);
    Ok(config)
}

fn native<F>(f: F) -> HostFn
where
    F: Fn(&mut BridgeEngine, Value, &[Value]) -> Result<Value, EngineError> + 'static,
{
    Rc::new(f)
}

fn callbacks(collected: Collected) -> HostCallbacks {
    HostCallbacks {
        error_reporter: Box::new(|report: &ErrorReport| {
            error!(file = report.file_name(), line = report.lineno(), "{}", report.message);
        }),
        entry: native(|_, _, args| {
            info!(argc = args.len(), "CS.Call");
            Ok(Value::Undefined)
        }),
        require: native(|e, _, args| {
            let name = args.first().copied().unwrap_or_default();
            info!(module = e.string(name)?, "CS.require");
            Ok(Value::Null)
        }),
        on_collected: Box::new(move |id| {
            info!(%id, "Host object released");
            collected.borrow_mut().push(id);
        }),
    }
}

/// A rooted handle outlives a forced collection.
fn rooted_handle_survives(engine: &mut BridgeEngine) -> Result<()> {
    let obj = engine.new_plain_object();
    let id = engine.add(Value::Object(obj));
    engine.set_trace(id, true);
    engine.gc();

    let alive = engine.get_val(id).map(|v| engine.is_live(v)).unwrap_or(false);
    ensure!(alive, "rooted {} was collected", id);
    info!(%id, "Rooted handle survived collection");

    engine.set_trace(id, false);
    engine.remove_by_id(id);
    Ok(())
}

/// An unreferenced finalizer-bridged object is reported exactly once.
fn finalizer_reports_collection(engine: &mut BridgeEngine, collected: &Collected) -> Result<()> {
    let obj = engine.new_plain_object();
    let id = engine.add(Value::Object(obj));
    ensure!(engine.attach_finalizer_object(id), "could not attach finalizer to {}", id);

    engine.gc();
    engine.gc();

    let notified = collected.borrow().iter().filter(|c| **c == id).count();
    ensure!(notified == 1, "{} notified {} times", id, notified);
    ensure!(engine.get_val(id).is_none(), "{} still in the handle table", id);
    info!(%id, "Finalizer reported collection");
    Ok(())
}

/// Stage arguments by id and call a script function.
fn staged_call(engine: &mut BridgeEngine) -> Result<()> {
    let global = engine.global();
    let sum = engine.define_function(
        global,
        "sum",
        native(|_, _, args| Ok(Value::Number(args.iter().filter_map(|v| v.as_number()).sum()))),
    )?;
    let fun = engine.add_function(Value::Object(sum));

    let mut staged = Vec::new();
    for (i, n) in [3.0, 4.0, 5.0].into_iter().enumerate() {
        let id = engine.add(Value::Number(n));
        engine.move_id_to_arr(id, i);
        staged.push(id);
    }

    ensure!(engine.call_function_by_id(None, fun, staged.len()), "sum failed");
    let result = engine.fun_ret_id().and_then(|id| engine.get_val(id));
    ensure!(result == Some(Value::Number(12.0)), "unexpected result {:?}", result);
    info!(?result, "Staged call returned");

    for id in staged {
        engine.remove_by_id(id);
    }
    engine.remove_by_id(fun);
    Ok(())
}

/// Build objects of a script class both ways.
fn class_objects(engine: &mut BridgeEngine, collected: &Collected) -> Result<()> {
    let global = engine.global();
    let ns = engine.new_plain_object();
    engine.set_prop(global, "Demo", Value::Object(ns))?;
    let table = engine.new_plain_object();
    engine.set_prop(ns, "Counter", Value::Object(table))?;
    engine.define_function(
        table,
        "ctor",
        native(|e, this, _| {
            let id = e.add(this);
            e.attach_finalizer_object(id);
            Ok(Value::Undefined)
        }),
    )?;

    let plain = engine.create_class_object("Demo.Counter").context("create_class_object failed")?;
    let built = engine.new_class_object("Demo.Counter").context("new_class_object failed")?;
    info!(%plain, %built, "Class objects created");

    let before = collected.borrow().len();
    engine.gc();
    let released = collected.borrow().len() - before;
    ensure!(released == 2, "expected 2 class objects released, got {}", released);
    engine.remove_by_id(built);
    Ok(())
}

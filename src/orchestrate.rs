//! Worker pool over the run queue.
//!
//! The work list is built once before any worker starts and never
//! mutated afterwards; workers pull task indices from a channel until it
//! drains. Opening a raw source is serialized through one process-wide
//! mutex (reader backends are not re-entrant on open); everything after
//! the open runs concurrently. A run that fails is logged and counted,
//! and its worker moves on; a failed run writes no output file.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::unbounded;
use log::{error, info};

use crate::config::QualConfig;
use crate::discover::RunInput;
use crate::filter::FilterRule;
use crate::iddb::IdDatabase;
use crate::pipeline::{compute_panel, RunError};
use crate::reader::{open_raw, FilteredSource};
use crate::report::write_panel;

/// Shared state handed to every worker.
struct WorkerContext {
    sources: Vec<RunInput>,
    config: QualConfig,
    filters: Vec<FilterRule>,
    open_lock: Mutex<()>,
    failures: AtomicUsize,
}

/// Process every input; returns the number of failed runs.
pub fn run_all(config: &QualConfig, inputs: Vec<RunInput>, filters: Vec<FilterRule>) -> usize {
    if inputs.is_empty() {
        return 0;
    }
    let worker_count = config.effective_cpus().min(inputs.len());
    let (tx, rx) = unbounded::<usize>();
    for task in 0..inputs.len() {
        // The channel is unbounded; enqueueing before start cannot block.
        let _ = tx.send(task);
    }
    drop(tx);

    let ctx = Arc::new(WorkerContext {
        sources: inputs,
        config: config.clone(),
        filters,
        open_lock: Mutex::new(()),
        failures: AtomicUsize::new(0),
    });

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let rx = rx.clone();
            let ctx = Arc::clone(&ctx);
            scope.spawn(move || {
                while let Ok(task) = rx.recv() {
                    let input = &ctx.sources[task];
                    if let Err(e) = process_task(&ctx, input) {
                        error!("{}: {e}", input.raw_path.display());
                        ctx.failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    ctx.failures.load(Ordering::Relaxed)
}

fn process_task(ctx: &WorkerContext, input: &RunInput) -> Result<(), RunError> {
    let started = Instant::now();
    let db = IdDatabase::open(&input.iddb_path)?;

    let source = {
        // Serialized: backend open calls are not re-entrant.
        let _guard = ctx
            .open_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        open_raw(&input.raw_path)?
    };
    info!("started processing {}", input.raw_path.display());

    let source = FilteredSource::new(source, ctx.filters.clone());
    let panel = compute_panel(
        &source,
        &db,
        input.source_id,
        ctx.config.chromatogram_output,
    )?;
    let written = write_panel(&panel, &input.raw_path)?;

    info!(
        "{} analyzed in {:.2} s; wrote {}",
        input.raw_path.display(),
        started.elapsed().as_secs_f64(),
        written.display()
    );
    Ok(())
}

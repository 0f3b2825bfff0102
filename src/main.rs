//! Stress driver for the Wound-Wait lock.
//!
//! Runs a pool of worker threads that take random overlapping sets of locks
//! in random order, then checks that nothing was left owned and that no
//! update guarded by the locks was lost.

use anyhow::{anyhow, bail, ensure};
use clap::Parser;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    thread::{self, ScopedJoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use wdlock::{Wdlock, WdlockCtx};

#[derive(Parser, Debug)]
#[command(name = "wdlock-stress")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Worker threads
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Shared locks
    #[arg(long, default_value_t = 16)]
    locks: usize,

    /// Distinct locks taken by every transaction
    #[arg(long, default_value_t = 4)]
    locks_per_txn: usize,

    /// Transactions per worker
    #[arg(long, default_value_t = 1_000)]
    txns: usize,

    /// Base seed, worker `i` uses `seed + i`. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Bound each wait instead of blocking until the owner changes
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Time spent inside the critical section
    #[arg(long, default_value_t = 0)]
    hold_us: u64,
}

struct Slot {
    lock: Wdlock,
    // Updated with load + store, only the wound-wait lock keeps it exact
    hits: AtomicU64,
}

#[derive(Default)]
struct Stats {
    committed: u64,
    retries: u64,
    grants: u64,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wdlock=info,wdlock_stress=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    ensure!(args.locks > 0, "--locks must be at least 1");
    ensure!(
        (1..=args.locks).contains(&args.locks_per_txn),
        "--locks-per-txn must be between 1 and --locks ({})",
        args.locks
    );
    info!(?args, "starting");

    let slots = (0..args.locks)
        .map(|_| Slot {
            lock: Wdlock::new(),
            hits: AtomicU64::new(0),
        })
        .collect::<Vec<_>>();

    let started = Instant::now();
    let per_worker = thread::scope(|s| {
        let ths = (0..args.threads)
            .map(|i| {
                let (slots, args) = (&slots, &args);
                let mut rng = match args.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_entropy(),
                };
                s.spawn(move || worker(i, slots, args, &mut rng))
            })
            .collect::<Vec<_>>();
        join_all(ths)
    })?;
    let elapsed = started.elapsed();

    let total = per_worker.iter().fold(Stats::default(), |acc, s| Stats {
        committed: acc.committed + s.committed,
        retries: acc.retries + s.retries,
        grants: acc.grants + s.grants,
    });

    if let Some(i) = slots.iter().position(|s| s.lock.is_locked()) {
        bail!(
            "lock {i} still owned by {:?} after all workers finished",
            slots[i].lock.owner()
        );
    }
    let hits = slots
        .iter()
        .map(|s| s.hits.load(Ordering::Relaxed))
        .sum::<u64>();
    if hits != total.grants {
        bail!("lost updates: {hits} recorded, {} committed", total.grants);
    }

    info!(
        committed = total.committed,
        retries = total.retries,
        grants = total.grants,
        ?elapsed,
        "all transactions committed"
    );
    Ok(())
}

// Joins every handle before reporting, so `thread::scope` has nothing left to re-panic on
fn join_all<T>(ths: Vec<ScopedJoinHandle<'_, T>>) -> anyhow::Result<Vec<T>> {
    let joined = ths.into_iter().map(|th| th.join()).collect::<Vec<_>>();
    joined
        .into_iter()
        .enumerate()
        .map(|(i, res)| res.map_err(|_| anyhow!("worker {i} panicked")))
        .collect()
}

fn worker(id: usize, slots: &[Slot], args: &Args, rng: &mut StdRng) -> Stats {
    let hold = Duration::from_micros(args.hold_us);
    let timeout = args.timeout_ms.map(Duration::from_millis);
    let mut stats = Stats::default();
    let mut picks = (0..slots.len()).collect::<Vec<_>>();

    for _ in 0..args.txns {
        picks.shuffle(rng);
        let order = &picks[..args.locks_per_txn];

        let mut ctx = WdlockCtx::new();
        let done = ctx.transaction(|ctx| {
            for &i in order {
                match timeout {
                    Some(timeout) => slots[i].lock.lock_timeout(ctx, timeout)?,
                    None => slots[i].lock.lock(ctx)?,
                }
            }
            for &i in order {
                let hits = slots[i].hits.load(Ordering::Relaxed);
                if !hold.is_zero() {
                    thread::sleep(hold);
                }
                slots[i].hits.store(hits + 1, Ordering::Relaxed);
            }
            Ok(())
        });

        stats.committed += 1;
        stats.retries += done.retries as u64;
        stats.grants += order.len() as u64;
    }
    debug!(
        worker = id,
        committed = stats.committed,
        retries = stats.retries,
        "worker done"
    );
    stats
}

//! Chunked parallel execution on scoped worker threads.
//!
//! Work items are CPU-bound and independent; workers never block or talk to
//! each other. Results land in per-chunk slots, so completion order can
//! never leak into output order.

use std::thread;

/// Worker count when the caller does not override it: half the hardware
/// threads, at least one.
pub fn default_concurrency() -> usize {
    let hw = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
    (hw / 2).max(1)
}

/// Number of jobs to run for `chunks` independent work items.
///
/// `max_concurrency` of zero means "use the default". Never more jobs than
/// chunks, never fewer than one.
pub fn jobs_by_chunks(chunks: usize, max_concurrency: usize) -> usize {
    let max_jobs = if max_concurrency > 0 {
        max_concurrency
    } else {
        default_concurrency()
    };
    chunks.min(max_jobs).max(1)
}

/// Run `func(begin, end)` over contiguous chunks of `0..total`, one chunk
/// per job, on scoped threads. With a single job the call runs on the
/// caller's thread.
pub fn parallelize<F>(func: F, jobs: usize, total: usize)
where
    F: Fn(usize, usize) + Sync,
{
    if total == 0 {
        return;
    }
    let jobs = jobs.clamp(1, total);
    if jobs == 1 {
        func(0, total);
        return;
    }

    let chunk = total.div_ceil(jobs);
    thread::scope(|s| {
        for j in 0..jobs {
            let begin = j * chunk;
            let end = ((j + 1) * chunk).min(total);
            if begin >= end {
                break;
            }
            let func = &func;
            s.spawn(move || func(begin, end));
        }
    });
}

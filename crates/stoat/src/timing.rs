// =============================================================================
// Timing & Benchmarking — expression timing, stopwatch, repeat benchmarks
// =============================================================================

use std::fmt;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// time — measure a single expression
// ---------------------------------------------------------------------------

/// Run `f` once and return its result together with the wall-clock duration.
///
/// # Example
/// ```
/// use stoat::timing::time;
///
/// let (sum, elapsed) = time(|| (0..1000).sum::<u64>());
/// assert_eq!(sum, 499_500);
/// assert!(elapsed.as_nanos() > 0);
/// ```
pub fn time<F, R>(f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

// ---------------------------------------------------------------------------
// Stopwatch — simple reusable timer
// ---------------------------------------------------------------------------

/// A simple stopwatch for manual timing.
///
/// # Example
/// ```
/// use stoat::timing::Stopwatch;
///
/// let mut sw = Stopwatch::new();
/// sw.start();
/// // ... do work ...
/// let lap = sw.lap();
/// let total = sw.stop();
/// assert!(total >= lap);
/// ```
pub struct Stopwatch {
    start: Option<Instant>,
    laps: Vec<Duration>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self {
            start: None,
            laps: Vec::new(),
        }
    }

    /// Start (or restart) the stopwatch.
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
        self.laps.clear();
    }

    /// Record a lap split without stopping.
    pub fn lap(&mut self) -> Duration {
        let elapsed = self.start.map(|s| s.elapsed()).unwrap_or_default();
        self.laps.push(elapsed);
        elapsed
    }

    /// Stop and return total elapsed time.
    pub fn stop(&mut self) -> Duration {
        let elapsed = self.start.map(|s| s.elapsed()).unwrap_or_default();
        self.start = None;
        elapsed
    }

    /// Get all recorded laps.
    pub fn laps(&self) -> &[Duration] {
        &self.laps
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// BenchOptions — repeat-benchmark parameters
// ---------------------------------------------------------------------------

/// Parameters for [`bench_with`]: untimed warmup rounds and timed iterations.
#[derive(Debug, Clone)]
pub struct BenchOptions {
    /// Untimed iterations run before measurement starts.
    pub warmup: usize,
    /// Timed iterations.
    pub iters: usize,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            warmup: 3,
            iters: 10,
        }
    }
}

impl BenchOptions {
    /// Set the number of warmup rounds.
    pub fn with_warmup(mut self, warmup: usize) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the number of timed iterations.
    pub fn with_iters(mut self, iters: usize) -> Self {
        self.iters = iters;
        self
    }
}

// ---------------------------------------------------------------------------
// BenchReport — aggregated timings, printed with Display
// ---------------------------------------------------------------------------

/// Result of a repeat benchmark.
#[derive(Debug, Clone)]
pub struct BenchReport {
    /// Label passed to [`bench`].
    pub label: String,
    /// Number of timed iterations run.
    pub iters: usize,
    /// Total wall time for all timed iterations.
    pub total: Duration,
    /// Average time per iteration.
    pub avg: Duration,
    /// Fastest iteration.
    pub best: Duration,
    /// Slowest iteration.
    pub worst: Duration,
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} iters", self.label, self.iters)?;
        writeln!(f, "  Total:      {:.2?}", self.total)?;
        writeln!(f, "  Avg/iter:   {:.2?}", self.avg)?;
        writeln!(f, "  Best/Worst: {:.2?} / {:.2?}", self.best, self.worst)?;
        Ok(())
    }
}

/// Benchmark a closure: `warmup` untimed rounds, then `iters` timed rounds.
///
/// # Example
/// ```
/// use stoat::timing::bench;
///
/// let report = bench("vec-sum", 1, 5, || (0..10_000).sum::<u64>());
/// assert_eq!(report.iters, 5);
/// assert!(report.best <= report.worst);
/// println!("{report}");
/// ```
pub fn bench<F, R>(label: &str, warmup: usize, iters: usize, f: F) -> BenchReport
where
    F: FnMut() -> R,
{
    bench_with(
        label,
        &BenchOptions::default().with_warmup(warmup).with_iters(iters),
        f,
    )
}

/// [`bench`] with an explicit [`BenchOptions`].
pub fn bench_with<F, R>(label: &str, opts: &BenchOptions, mut f: F) -> BenchReport
where
    F: FnMut() -> R,
{
    for _ in 0..opts.warmup {
        let _ = f();
    }

    let mut times = Vec::with_capacity(opts.iters);
    let total_start = Instant::now();
    for _ in 0..opts.iters {
        let start = Instant::now();
        let _ = f();
        times.push(start.elapsed());
    }
    let total = total_start.elapsed();

    let best = times.iter().min().copied().unwrap_or_default();
    let worst = times.iter().max().copied().unwrap_or_default();
    let avg = if opts.iters > 0 {
        total / opts.iters as u32
    } else {
        Duration::ZERO
    };

    BenchReport {
        label: label.to_string(),
        iters: opts.iters,
        total,
        avg,
        best,
        worst,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_time() {
        let (value, elapsed) = time(|| {
            thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(value, 42);
        assert!(elapsed >= Duration::from_millis(4));
    }

    #[test]
    fn test_stopwatch() {
        let mut sw = Stopwatch::new();
        sw.start();
        thread::sleep(Duration::from_millis(5));
        let lap = sw.lap();
        assert!(lap >= Duration::from_millis(4));
        let total = sw.stop();
        assert!(total >= lap);
        assert_eq!(sw.laps().len(), 1);
    }

    #[test]
    fn test_stopwatch_restart_clears_laps() {
        let mut sw = Stopwatch::new();
        sw.start();
        sw.lap();
        sw.lap();
        assert_eq!(sw.laps().len(), 2);
        sw.start();
        assert!(sw.laps().is_empty());
    }

    #[test]
    fn test_bench() {
        let report = bench("sleepy", 1, 3, || {
            thread::sleep(Duration::from_millis(2));
        });
        assert_eq!(report.iters, 3);
        assert!(report.total >= Duration::from_millis(5));
        assert!(report.best <= report.worst);
        assert!(report.total >= report.best);
        let s = format!("{report}");
        assert!(s.contains("sleepy"));
        assert!(s.contains("3 iters"));
    }

    #[test]
    fn test_bench_options_builder() {
        let opts = BenchOptions::default().with_warmup(0).with_iters(7);
        assert_eq!(opts.warmup, 0);
        assert_eq!(opts.iters, 7);
        let report = bench_with("noop", &opts, || {});
        assert_eq!(report.iters, 7);
    }
}

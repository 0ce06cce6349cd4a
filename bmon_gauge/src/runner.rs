//! Fixed-cadence sampling loop: sample → estimate → publish.
//!
//! The runner owns one estimator and one sample source per configured
//! battery, plus the telemetry sinks. Each tick it pulls a sample per
//! battery, feeds the estimator with the measured elapsed time, and hands
//! the resulting snapshot to the sinks. A rejected sample is logged and
//! counted; the estimator state is untouched and the loop carries on.
//!
//! Two loop flavors exist. The default build paces with
//! `std::thread::sleep` and only counts overruns. With the `rt` feature
//! the loop uses `clock_nanosleep(TIMER_ABSTIME)` on `CLOCK_MONOTONIC`
//! for drift-free pacing and treats an overrun as a hard deadline miss.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use bmon_common::config::{ConfigError, MonitorConfig};
use bmon_common::consts::MAX_BATTERIES;
use bmon_common::error::EstimatorError;
use bmon_common::types::Snapshot;

use crate::estimator::ChargeEstimator;
use crate::sink::TelemetrySink;
use crate::source::{SampleSource, build_source};

// ─── Loop Statistics ────────────────────────────────────────────────

/// O(1) per-tick loop statistics.
///
/// Updated every loop tick with no allocation. Tracks tick latency for
/// overrun monitoring plus the count of rejected samples.
#[derive(Debug, Clone)]
pub struct LoopStats {
    /// Total loop ticks executed.
    pub tick_count: u64,
    /// Last tick duration [ns].
    pub last_tick_ns: i64,
    /// Minimum tick duration [ns].
    pub min_tick_ns: i64,
    /// Maximum tick duration [ns].
    pub max_tick_ns: i64,
    /// Running sum for average computation.
    pub sum_tick_ns: i64,
    /// Number of ticks that exceeded the sampling interval.
    pub overruns: u64,
    /// Number of samples rejected by the estimator.
    pub rejected_samples: u64,
}

impl LoopStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: i64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
            rejected_samples: 0,
        }
    }

    /// Record a tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        if duration_ns < self.min_tick_ns {
            self.min_tick_ns = duration_ns;
        }
        if duration_ns > self.max_tick_ns {
            self.max_tick_ns = duration_ns;
        }
        self.sum_tick_ns += duration_ns;
    }

    /// Average tick time [ns] (returns 0 if no ticks).
    #[inline]
    pub fn avg_tick_ns(&self) -> i64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count as i64
        }
    }
}

impl Default for LoopStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Loop Errors ────────────────────────────────────────────────────

/// Errors during loop setup or execution.
#[derive(Debug)]
pub enum LoopError {
    /// RT system call failed.
    RtSetup(String),
    /// Sampling deadline missed (rt builds only).
    DeadlineOverrun {
        /// Actual tick duration [ns].
        actual_ns: i64,
        /// Configured sampling interval [ns].
        budget_ns: i64,
    },
    /// Estimator could not be constructed.
    Estimator(EstimatorError),
    /// Source construction or battery registration failed.
    Config(ConfigError),
}

impl std::fmt::Display for LoopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtSetup(msg) => write!(f, "RT setup error: {msg}"),
            Self::DeadlineOverrun {
                actual_ns,
                budget_ns,
            } => write!(f, "sampling overrun: {actual_ns}ns > {budget_ns}ns budget"),
            Self::Estimator(e) => write!(f, "estimator error: {e}"),
            Self::Config(e) => write!(f, "config error: {e}"),
        }
    }
}

impl std::error::Error for LoopError {}

impl From<EstimatorError> for LoopError {
    fn from(e: EstimatorError) -> Self {
        Self::Estimator(e)
    }
}

impl From<ConfigError> for LoopError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

/// Lock all current and future memory pages (prevent page faults in the loop).
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), LoopError> {
    use nix::sys::mman::{MlockAllFlags, mlockall};
    mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
        .map_err(|e| LoopError::RtSetup(format!("mlockall failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), LoopError> {
    Ok(())
}

/// Prefault stack pages so the loop never page-faults on stack growth.
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

/// Pin the current thread to a specific CPU core.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), LoopError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| LoopError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| LoopError::RtSetup(format!("sched_setaffinity failed: {e}")))?;
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), LoopError> {
    Ok(())
}

/// Set SCHED_FIFO with the given RT priority.
///
/// No-op when the `rt` feature is not enabled.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), LoopError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(LoopError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), LoopError> {
    Ok(())
}

/// Perform the full RT setup sequence before entering the loop.
///
/// In the default build all RT calls are no-ops; stack prefaulting still
/// runs since it is harmless either way.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), LoopError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Per-Battery Runtime ────────────────────────────────────────────

/// One tracked battery: its estimator and the source feeding it.
struct BatteryRuntime {
    name: String,
    estimator: ChargeEstimator,
    source: Box<dyn SampleSource>,
}

// ─── Gauge Runner ───────────────────────────────────────────────────

/// The sampling loop runner.
///
/// Owns all per-battery runtime state and the telemetry sinks. A runner
/// is single-threaded by construction: `tick_once()` and `run()` take
/// `&mut self`, so ticks on one instance are serialized by the borrow
/// checker. Independent runners share nothing.
pub struct GaugeRunner {
    /// Per-battery runtime slots (bounded, pre-allocated).
    batteries: heapless::Vec<BatteryRuntime, MAX_BATTERIES>,
    /// Telemetry sinks, invoked in order.
    sinks: Vec<Box<dyn TelemetrySink>>,
    /// Configured sampling interval.
    interval: Duration,
    /// Publish throttle [ticks].
    publish_every: u64,
    /// Ticks processed (drives the publish throttle).
    seq: u64,
    /// Loop statistics.
    stats: LoopStats,
}

impl GaugeRunner {
    /// Create a runner from a validated configuration.
    ///
    /// Builds one estimator and one sample source per `[[battery]]` entry.
    pub fn new(
        config: &MonitorConfig,
        sinks: Vec<Box<dyn TelemetrySink>>,
    ) -> Result<Self, LoopError> {
        let mut runner = Self::with_settings(
            Duration::from_millis(config.sample_interval_ms),
            config.publish_every,
            sinks,
        );
        for battery in &config.batteries {
            let source = build_source(battery)?;
            runner.add_battery(&battery.name, battery.capacity_mah, source)?;
        }
        Ok(runner)
    }

    /// Create an empty runner with explicit loop settings.
    pub fn with_settings(
        interval: Duration,
        publish_every: u64,
        sinks: Vec<Box<dyn TelemetrySink>>,
    ) -> Self {
        Self {
            batteries: heapless::Vec::new(),
            sinks,
            interval,
            publish_every: publish_every.max(1),
            seq: 0,
            stats: LoopStats::new(),
        }
    }

    /// Register a battery with its sample source.
    pub fn add_battery(
        &mut self,
        name: &str,
        capacity_mah: f64,
        source: Box<dyn SampleSource>,
    ) -> Result<(), LoopError> {
        let runtime = BatteryRuntime {
            name: name.to_string(),
            estimator: ChargeEstimator::new(capacity_mah)?,
            source,
        };
        debug!(battery = name, capacity_mah, "battery registered");
        self.batteries.push(runtime).map_err(|_| {
            LoopError::Config(ConfigError::ValidationError(format!(
                "battery slots exhausted (limit {MAX_BATTERIES})"
            )))
        })
    }

    /// Number of registered batteries.
    pub fn battery_count(&self) -> usize {
        self.batteries.len()
    }

    /// Loop statistics.
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Current estimator snapshot for a battery, by name.
    pub fn battery_snapshot(&self, name: &str) -> Option<Snapshot> {
        self.batteries
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.estimator.snapshot())
    }

    /// Execute one loop tick with the given elapsed time.
    ///
    /// Pulls a sample per battery, runs the estimator, forwards cycle
    /// events immediately and publishes snapshots per the throttle.
    /// Exposed for tests and benches; `run()` calls this with measured
    /// elapsed times.
    pub fn tick_once(&mut self, dt: Duration) {
        let elapsed_hours = dt.as_secs_f64() / 3600.0;
        let publish = self.seq % self.publish_every == 0;
        self.seq += 1;

        for battery in self.batteries.iter_mut() {
            let sample = battery.source.next_sample(dt);
            match battery.estimator.tick(sample.current_ma, elapsed_hours) {
                Ok(tick) => {
                    if let Some(event) = tick.cycle_completed {
                        info!(
                            battery = %battery.name,
                            cycles = event.full_cycle_count,
                            "cycle odometer advanced"
                        );
                        for sink in self.sinks.iter_mut() {
                            sink.cycle_completed(&battery.name, &event);
                        }
                    }
                    if publish {
                        for sink in self.sinks.iter_mut() {
                            sink.publish(&battery.name, &sample, &tick.snapshot);
                        }
                    }
                }
                Err(e) => {
                    self.stats.rejected_samples += 1;
                    warn!(battery = %battery.name, error = %e, "sample rejected; state preserved");
                }
            }
        }
    }

    /// Enter the sampling loop.
    ///
    /// Runs until `running` is cleared or `max_ticks` is reached. The
    /// first tick uses the nominal interval as elapsed time; subsequent
    /// ticks use the measured time between loop wakeups.
    ///
    /// # Errors
    /// With the `rt` feature, returns [`LoopError::DeadlineOverrun`] on
    /// the first tick that exceeds the sampling interval. The default
    /// build logs overruns and keeps going.
    pub fn run(
        &mut self,
        running: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> Result<(), LoopError> {
        #[cfg(feature = "rt")]
        {
            self.run_rt_loop(running, max_ticks)
        }

        #[cfg(not(feature = "rt"))]
        {
            self.run_std_loop(running, max_ticks)
        }
    }

    /// Sampling loop paced with `std::thread::sleep`.
    #[cfg(not(feature = "rt"))]
    fn run_std_loop(
        &mut self,
        running: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> Result<(), LoopError> {
        use std::time::Instant;

        let budget_ns = self.interval.as_nanos() as i64;
        let mut last_wake = Instant::now();
        let mut first = true;

        while running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();
            let dt = if first {
                first = false;
                self.interval
            } else {
                tick_start - last_wake
            };
            last_wake = tick_start;

            self.tick_once(dt);

            let elapsed = tick_start.elapsed();
            let duration_ns = elapsed.as_nanos() as i64;
            self.stats.record(duration_ns);
            if duration_ns > budget_ns {
                self.stats.overruns += 1;
                warn!(
                    actual_ns = duration_ns,
                    budget_ns, "tick exceeded sampling interval"
                );
            }

            if let Some(max) = max_ticks {
                if self.stats.tick_count >= max {
                    break;
                }
            }

            if let Some(remaining) = self.interval.checked_sub(elapsed) {
                std::thread::sleep(remaining);
            }
        }
        Ok(())
    }

    /// Sampling loop paced with `clock_nanosleep(TIMER_ABSTIME)`.
    #[cfg(feature = "rt")]
    fn run_rt_loop(
        &mut self,
        running: &AtomicBool,
        max_ticks: Option<u64>,
    ) -> Result<(), LoopError> {
        use nix::time::{ClockId, ClockNanosleepFlags, clock_gettime, clock_nanosleep};

        let clock = ClockId::CLOCK_MONOTONIC;
        let budget_ns = self.interval.as_nanos() as i64;
        let mut next_wake = clock_gettime(clock)
            .map_err(|e| LoopError::RtSetup(format!("clock_gettime: {e}")))?;
        let mut last_wake = next_wake;
        let mut first = true;

        while running.load(Ordering::SeqCst) {
            next_wake = timespec_add_ns(next_wake, budget_ns);

            let tick_start = clock_gettime(clock)
                .map_err(|e| LoopError::RtSetup(format!("clock_gettime: {e}")))?;
            let dt_ns = if first {
                first = false;
                budget_ns
            } else {
                timespec_diff_ns(&tick_start, &last_wake).max(1)
            };
            last_wake = tick_start;

            self.tick_once(Duration::from_nanos(dt_ns as u64));

            let tick_end = clock_gettime(clock)
                .map_err(|e| LoopError::RtSetup(format!("clock_gettime: {e}")))?;
            let duration_ns = timespec_diff_ns(&tick_end, &tick_start);
            self.stats.record(duration_ns);
            if duration_ns > budget_ns {
                self.stats.overruns += 1;
                return Err(LoopError::DeadlineOverrun {
                    actual_ns: duration_ns,
                    budget_ns,
                });
            }

            if let Some(max) = max_ticks {
                if self.stats.tick_count >= max {
                    break;
                }
            }

            // Absolute-time sleep for drift-free pacing.
            let _ = clock_nanosleep(clock, ClockNanosleepFlags::TIMER_ABSTIME, &next_wake);
        }
        Ok(())
    }
}

// ─── Time Helpers ───────────────────────────────────────────────────

/// Add nanoseconds to a TimeSpec.
#[cfg(feature = "rt")]
fn timespec_add_ns(ts: nix::sys::time::TimeSpec, ns: i64) -> nix::sys::time::TimeSpec {
    use nix::sys::time::TimeSpec;
    let mut secs = ts.tv_sec();
    let mut nanos = ts.tv_nsec() + ns;
    while nanos >= 1_000_000_000 {
        secs += 1;
        nanos -= 1_000_000_000;
    }
    while nanos < 0 {
        secs -= 1;
        nanos += 1_000_000_000;
    }
    TimeSpec::new(secs, nanos)
}

/// Compute the difference (a - b) in nanoseconds.
#[cfg(feature = "rt")]
fn timespec_diff_ns(a: &nix::sys::time::TimeSpec, b: &nix::sys::time::TimeSpec) -> i64 {
    (a.tv_sec() - b.tv_sec()) * 1_000_000_000 + (a.tv_nsec() - b.tv_nsec())
}

// ─── Tests ──────────────────────────────────────────────────────────

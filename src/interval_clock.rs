use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use log::debug;

use crate::freeze_gate::FreezeGate;
use crate::record_counter::CountingPool;
use crate::report_format::ReportStyle;

/// How many intervals are sampled to pick the 100% level when the chart baseline is
/// left for auto-calibration.
const CALIBRATION_SAMPLES: usize = 5;

/// What the --chart option resolved to.
#[derive(Debug, PartialEq)]
pub enum ChartMode {
    Disabled,
    Autocalibrate,
    Fixed(f64),
}

impl ChartMode {
    /// Maps the raw option value: negative disables the chart, zero asks for
    /// auto-calibration, positive fixes the 100% baseline.
    pub fn from_option(value: f64) -> ChartMode {
        if value < 0.0 {
            ChartMode::Disabled
        } else if value == 0.0 {
            ChartMode::Autocalibrate
        } else {
            ChartMode::Fixed(value)
        }
    }
}

/// Chart rendering state. Auto-calibration collects the first few throughput
/// samples and then locks the 100% baseline to their maximum. The calibration is
/// one-shot: once the baseline is fixed it never changes again.
pub enum ChartState {
    Disabled,
    Calibrating { samples: Vec<f64> },
    Active { baseline: f64 },
}

impl ChartState {
    pub fn new(mode: ChartMode) -> ChartState {
        match mode {
            ChartMode::Disabled => ChartState::Disabled,
            ChartMode::Autocalibrate => ChartState::Calibrating {
                samples: Vec::with_capacity(CALIBRATION_SAMPLES),
            },
            ChartMode::Fixed(baseline) => ChartState::Active { baseline },
        }
    }

    /// Renders one interval report, advancing the calibration window if it is still
    /// open. The interval that fills the window still gets a placeholder; the bar
    /// starts on the next one.
    pub fn render_interval(&mut self, throughput: f64, style: &ReportStyle) -> String {
        match self {
            ChartState::Disabled => style.plain_line(throughput),
            ChartState::Calibrating { samples } => {
                samples.push(throughput);
                if samples.len() == CALIBRATION_SAMPLES {
                    let baseline = samples.iter().cloned().fold(0.0, f64::max);
                    debug!("Chart calibrated: 100% = {} lines/sec", baseline);
                    *self = ChartState::Active { baseline };
                }
                style.calibration_line(throughput)
            }
            ChartState::Active { baseline } => style.chart_line(throughput, *baseline),
        }
    }

    /// Renders the end-of-stream report. Never records a sample - the calibration
    /// window only tracks full intervals.
    pub fn render_final(&self, throughput: f64, style: &ReportStyle) -> String {
        match self {
            ChartState::Disabled => style.plain_line(throughput),
            ChartState::Calibrating { .. } => style.calibration_line(throughput),
            ChartState::Active { baseline } => style.chart_line(throughput, *baseline),
        }
    }
}

/// The interval clock loop. Runs on its own thread until the stream ends, the
/// iteration limit is reached, or a report fails to write.
///
/// Once per `delta` seconds: freeze the reader, let every already-dispatched chunk
/// land, atomically take-and-reset the counter, write one report, unfreeze. The
/// counter is never reset before the pause is in effect and its value has been
/// read, so nothing observed before the freeze can leak into the next interval.
#[allow(clippy::too_many_arguments)]
pub fn run_clock(
    delta: u64,
    limit: Option<u64>,
    mut chart: ChartState,
    style: ReportStyle,
    mut report_sink: Box<dyn Write + Send>,
    pool: CountingPool,
    gate: Arc<FreezeGate>,
    final_request: Receiver<()>,
    completion: Sender<Result<(), String>>,
) {
    let mut iterations = 0u64;
    loop {
        // The wait for a final-report request doubles as the interval sleep.
        match final_request.recv_timeout(Duration::from_secs(delta)) {
            Err(RecvTimeoutError::Timeout) => {
                gate.pause();
                pool.drain();
                let count = pool.take_and_reset();
                let throughput = count as f64 / delta as f64;
                debug!("Interval complete: {} matching records", count);

                let line = chart.render_interval(throughput, &style);
                if let Err(e) = report_sink
                    .write_all(line.as_bytes())
                    .and_then(|_| report_sink.flush())
                {
                    let _ = completion.send(Err(format!("Error writing report: {}", e)));
                    return;
                }
                gate.resume();

                iterations += 1;
                if let Some(limit) = limit {
                    if iterations >= limit {
                        debug!("Iteration limit reached");
                        let _ = completion.send(Ok(()));
                        return;
                    }
                }
            }
            Ok(()) => {
                // The reader hit end-of-stream. Report the partial interval that
                // would otherwise be dropped silently. Its elapsed time is taken to
                // be the full delta even though less has actually passed, so this
                // last figure is an underestimate - a known approximation, kept.
                pool.drain();
                let throughput = pool.value() as f64 / delta as f64;
                let line = chart.render_final(throughput, &style);
                if let Err(e) = report_sink
                    .write_all(line.as_bytes())
                    .and_then(|_| report_sink.flush())
                {
                    let _ = completion.send(Err(format!("Error writing report: {}", e)));
                    return;
                }
                let _ = completion.send(Ok(()));
                return;
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The reader is gone without requesting a final report, which means
                // it failed with a read error and has already signalled completion.
                return;
            }
        }
    }
}

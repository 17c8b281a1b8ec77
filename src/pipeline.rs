use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use log::debug;

use crate::freeze_gate::FreezeGate;
use crate::frontend::MeterConfig;
use crate::interval_clock::{self, ChartState};
use crate::record_counter::CountingPool;
use crate::report_format::ReportStyle;
use crate::stream_reader;

/// Runs the measurement pipeline to completion over the given source and sinks.
///
/// Spawns the interval clock and the stream reader on their own threads and blocks
/// until one of them signals completion: end-of-stream (after the final report),
/// the iteration limit, or a fatal I/O error. Generic over the source and sinks so
/// tests can run the whole pipeline in memory.
///
/// There is no cancellation path beyond completion itself - whichever thread is
/// still blocked in read() or its interval sleep afterwards is reclaimed when the
/// process exits.
pub fn run<R: Read + Send + 'static>(
    config: MeterConfig,
    source: R,
    report_sink: Box<dyn Write + Send>,
    tee_sink: Option<Box<dyn Write + Send>>,
) -> Result<(), String> {
    let MeterConfig { delta, filter, limit, chart, style, timestamp } = config;

    let gate = Arc::new(FreezeGate::new());
    let pool = CountingPool::new(filter);

    // Capacity 1 is enough - the reader sends at most one final-report request.
    let (final_sender, final_receiver) = crossbeam::channel::bounded::<()>(1);
    // Each side signals completion at most once.
    let (completion_sender, completion_receiver) =
        crossbeam::channel::bounded::<Result<(), String>>(2);

    let report_style = ReportStyle { style, timestamp };
    let chart_state = ChartState::new(chart);

    {
        let pool = pool.clone();
        let gate = gate.clone();
        let completion_sender = completion_sender.clone();
        thread::Builder::new()
            .name("interval_clock".to_string())
            .spawn(move || {
                interval_clock::run_clock(
                    delta,
                    limit,
                    chart_state,
                    report_style,
                    report_sink,
                    pool,
                    gate,
                    final_receiver,
                    completion_sender,
                )
            })
            .expect("Failed to spawn thread");
    }

    thread::Builder::new()
        .name("stream_reader".to_string())
        .spawn(move || {
            if let Err(e) = stream_reader::run_reader(source, pool, gate, tee_sink, final_sender) {
                let _ = completion_sender.send(Err(e));
            }
        })
        .expect("Failed to spawn thread");

    let result = completion_receiver.recv().expect("Completion channel disconnected");
    debug!("Pipeline finished");
    result
}

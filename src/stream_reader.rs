use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use crossbeam::channel::Sender;
use log::debug;

use crate::freeze_gate::FreezeGate;
use crate::record_counter::CountingPool;

/// Size of the reusable read buffer, and therefore the largest possible chunk.
/// Reads beyond this size simply come back as multiple chunks.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Pulls chunks from the input source until it ends, handing each one to the
/// counting pool and, in tee mode, echoing it verbatim to the passthrough sink.
///
/// Before every read attempt the reader waits on the freeze gate; while the clock
/// holds it frozen no bytes are pulled - the source buffers them, nothing is lost,
/// only deferred. Returns Ok once the source reports end-of-stream, after asking
/// the clock for one last report so the trailing partial interval isn't dropped.
/// Read and tee-write errors are fatal and returned to the caller.
pub fn run_reader<R: Read>(
    mut source: R,
    pool: CountingPool,
    gate: Arc<FreezeGate>,
    mut tee_sink: Option<Box<dyn Write + Send>>,
    final_request: Sender<()>,
) -> Result<(), String> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        gate.wait_while_frozen();

        let n = match source.read(&mut buf) {
            Ok(0) => break, // end of stream
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(format!("Error reading input: {}", e)),
        };

        if let Some(sink) = tee_sink.as_mut() {
            // Echo the exact bytes through, in their original order, before counting
            sink.write_all(&buf[..n])
                .and_then(|_| sink.flush())
                .map_err(|e| format!("Error writing tee output: {}", e))?;
        }

        pool.dispatch(buf[..n].to_vec());
    }

    debug!("Input stream ended");
    // Ask for one last report covering the partial interval. If the clock already
    // shut down on its iteration limit there is nobody left to tell, which is fine.
    let _ = final_request.send(());
    Ok(())
}

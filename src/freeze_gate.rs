use std::sync::{Condvar, Mutex};

/// Coordinates the pause/resume handshake between the interval clock and the stream
/// reader.
///
/// The gate has two states: RUNNING (the reader may read) and FROZEN (it must not).
/// The clock is the only caller of pause()/resume() and strictly alternates them,
/// once each per interval. The reader waits on the gate before every read attempt,
/// so no read can begin between a pause and the matching resume - which is what lets
/// the clock read and reset the counter without racing against new input.
pub struct FreezeGate {
    frozen: Mutex<bool>,
    unfrozen: Condvar,
}

impl FreezeGate {
    pub fn new() -> FreezeGate {
        FreezeGate {
            frozen: Mutex::new(false),
            unfrozen: Condvar::new(),
        }
    }

    /// Freezes the reader. Takes effect for its next read attempt; a read already in
    /// progress completes and its chunk is still attributed to the current interval.
    pub fn pause(&self) {
        *self.frozen.lock().expect("Freeze gate lock poisoned") = true;
    }

    /// Unfreezes the reader and wakes it if it was waiting.
    pub fn resume(&self) {
        *self.frozen.lock().expect("Freeze gate lock poisoned") = false;
        self.unfrozen.notify_all();
    }

    /// Blocks while the gate is frozen. Returns as soon as it is (or already was)
    /// running. The lock is only ever held briefly, so this never delays the clock.
    pub fn wait_while_frozen(&self) {
        let guard = self.frozen.lock().expect("Freeze gate lock poisoned");
        let _guard = self
            .unfrozen
            .wait_while(guard, |frozen| *frozen)
            .expect("Freeze gate lock poisoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_when_running() {
        let gate = FreezeGate::new();
        // Must not block - the gate starts out running
        gate.wait_while_frozen();
    }

    #[test]
    fn pause_blocks_waiter_until_resume() {
        let gate = Arc::new(FreezeGate::new());
        gate.pause();

        let (sender, receiver) = std::sync::mpsc::channel();
        let gate2 = gate.clone();
        std::thread::spawn(move || {
            gate2.wait_while_frozen();
            sender.send(()).unwrap();
        });

        // The waiter must still be blocked while the gate is frozen
        assert!(receiver.recv_timeout(Duration::from_millis(200)).is_err());

        gate.resume();
        assert!(receiver.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn pause_resume_alternation() {
        let gate = FreezeGate::new();
        for _ in 0..3 {
            gate.pause();
            gate.resume();
        }
        gate.wait_while_frozen();
    }
}

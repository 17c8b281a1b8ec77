use std::process::ExitCode;

mod freeze_gate;
mod frontend;
mod interval_clock;
mod pipeline;
mod record_counter;
mod report_format;
mod stream_reader;

fn main() -> ExitCode {
    frontend::frontend_main()
}

use log::LevelFilter;

struct DebugLogger;

static LOGGER: DebugLogger = DebugLogger;

impl log::Log for DebugLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        // Filtering happens through the max level alone.
        unreachable!()
    }

    fn log(&self, record: &log::Record) {
        // Host findings own stdout; tracing goes to stderr.
        eprintln!("[Debug] {}", record.args());
    }

    fn flush(&self) {}
}

/// Called at most once, before any worker starts.
pub fn init() {
    let _ = log::set_logger(&LOGGER).map(|_| log::set_max_level(LevelFilter::Debug));
}

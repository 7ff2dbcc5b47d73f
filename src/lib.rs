use std::process;

use error::AuditError;

pub mod error;
pub mod logger;
pub mod probe;
pub mod report;
pub mod resolver;
pub mod scan;
pub mod session;

pub fn abort(error: AuditError) -> ! {
    eprintln!("Internal Error: {}", error);
    process::exit(1);
}

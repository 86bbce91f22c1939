pub mod http_helpers;
pub mod log_throttle;
pub mod logger;

pub use http_helpers::HTTPError;
pub use logger::init_logging;

pub mod host;
pub mod logging;

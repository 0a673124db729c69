pub mod dates;
pub mod http;
pub mod logging;
pub mod timing;

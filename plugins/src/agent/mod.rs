pub mod http;
pub mod offline;

pub use http::HttpTurnAgent;
pub use offline::OfflineTurnAgent;

pub mod handler;
pub mod relay;

pub use handler::{ProxyConfig, QueryProxy};
pub use relay::{relay_query, FunctionInvoker, LocalInvoker};

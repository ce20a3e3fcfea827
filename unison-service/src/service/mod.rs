pub mod divergence_loop;
pub mod flow;
pub mod metrics;
pub mod node;
pub mod retention_loop;
pub mod round_loop;
pub mod stream_loop;

pub use flow::ServiceFlow;
pub use node::run_node;

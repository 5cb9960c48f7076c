//! Types and traits for data processed by shardflow

/// Data which may move through a dataflow.
/// Processors are driven on worker threads, hence data must be `Send`
#[diagnostic::on_unimplemented(message = "Type must be `Clone + Send + 'static` to be used as data")]
pub trait Data: Clone + Send + 'static {}
impl<T: Clone + Send + 'static> Data for T {}

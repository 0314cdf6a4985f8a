pub mod dead_letter;
pub mod dispatcher;
pub mod metrics;
pub mod queue;

pub use dead_letter::{ChannelDeadLetterSink, DeadLetter, DeadLetterSink, LogDeadLetterSink};
pub use dispatcher::{Delivery, Dispatcher};
pub use metrics::PipelineMetrics;
pub use queue::{ReadyQueue, Readiness};

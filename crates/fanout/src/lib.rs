//! # Fanout
//!
//! 字节流分发引擎。
//!
//! 负责：
//! - 按源顺序把每个 chunk 复制给所有 sink（背压按 sink 隔离）
//! - 管理外部进程的生命周期（超时、异常退出、broken pipe 容忍）
//! - 所有 sink 完成后一次性给出聚合结果或单个错误

pub mod completion;
pub mod distributor;
pub mod fanout;
pub mod handle;
pub mod metrics;
pub mod process;
pub mod sinks;
pub mod source;

pub use completion::{CompletionCoordinator, RunOutcome};
pub use contracts::{AggregateResult, Chunk, ChunkSink, ContractError};
pub use distributor::Distributor;
pub use fanout::{Fanout, FanoutBuilder, DEFAULT_QUEUE_CAPACITY};
pub use handle::{SinkEvent, SinkHandle, SinkInput};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use process::{ProcessFailure, ProcessHandle, ProcessState};
pub use sinks::{AccumulatingSink, ProcessSink};
pub use source::ChunkSource;

//! Fan-out 运行指标收集模块
//!
//! 通过 `metrics` facade 上报计数器/直方图，并在内存中聚合单次运行的摘要。

use std::collections::BTreeMap;
use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// 记录一个分发到所有 sink 的 chunk
pub fn record_chunk_distributed(bytes: usize, sinks: usize) {
    counter!("stream_tee_chunks_distributed_total").increment(1);
    counter!("stream_tee_bytes_distributed_total").increment(bytes as u64);
    histogram!("stream_tee_chunk_size_bytes").record(bytes as f64);
    gauge!("stream_tee_active_sinks").set(sinks as f64);
}

/// 记录 sink 队列深度
pub fn record_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "stream_tee_sink_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// 记录 sink 完成
pub fn record_sink_completed(sink_name: &str, output_bytes: usize) {
    counter!(
        "stream_tee_sink_completed_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
    histogram!(
        "stream_tee_sink_output_bytes",
        "sink" => sink_name.to_string()
    )
    .record(output_bytes as f64);
}

/// 记录 sink 失败 (kind 为错误分类标签)
pub fn record_sink_failed(sink_name: &str, kind: &'static str) {
    counter!(
        "stream_tee_sink_failed_total",
        "sink" => sink_name.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// 记录外部进程退出码
pub fn record_process_exit(sink_name: &str, code: Option<i32>) {
    let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
    counter!(
        "stream_tee_process_exit_total",
        "sink" => sink_name.to_string(),
        "code" => code
    )
    .increment(1);
}

/// 记录一次运行结束
pub fn record_run_finished(success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("stream_tee_runs_total", "status" => status).increment(1);
    histogram!("stream_tee_run_duration_ms").record(duration.as_secs_f64() * 1000.0);
}

/// 单次运行的内存聚合
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// 分发的 chunk 数
    pub chunks: u64,

    /// 分发的字节总数
    pub bytes: u64,

    pub chunk_sizes: ChunkSizes,

    /// 各 sink 消费的字节数
    pub sink_bytes_in: BTreeMap<String, u64>,

    /// 各 sink 结果字节数 (仅成功时)
    pub sink_bytes_out: BTreeMap<String, u64>,

    pub duration: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, bytes: usize) {
        self.chunks += 1;
        self.bytes += bytes as u64;
        self.chunk_sizes.observe(bytes);
    }

    /// 吞吐量 (MiB/s), 耗时为零时记 0
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }

    /// 消费字节数与分发字节数不一致的 sink
    pub fn mismatched_sinks(&self) -> Vec<&str> {
        self.sink_bytes_in
            .iter()
            .filter_map(|(name, bytes)| (*bytes != self.bytes).then_some(name.as_str()))
            .collect()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "distributed {} bytes in {} chunks over {:.3}s ({:.2} MiB/s)",
            self.bytes,
            self.chunks,
            self.duration.as_secs_f64(),
            self.throughput_mib_s()
        )?;
        writeln!(f, "chunk size: {}", self.chunk_sizes)?;
        for (sink, consumed) in &self.sink_bytes_in {
            match self.sink_bytes_out.get(sink) {
                Some(out) => writeln!(f, "  {sink}: {consumed} in, {out} out")?,
                None => writeln!(f, "  {sink}: {consumed} in")?,
            }
        }
        Ok(())
    }
}

/// chunk 大小的最小/最大/平均值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkSizes {
    count: u64,
    total: u64,
    min: usize,
    max: usize,
}

impl ChunkSizes {
    pub fn observe(&mut self, len: usize) {
        self.min = if self.count == 0 { len } else { self.min.min(len) };
        self.max = self.max.max(len);
        self.count += 1;
        self.total += len as u64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn mean(&self) -> f64 {
        match self.count {
            0 => 0.0,
            n => self.total as f64 / n as f64,
        }
    }
}

impl std::fmt::Display for ChunkSizes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return f.write_str("n/a");
        }
        write!(
            f,
            "min={} max={} mean={:.1} (n={})",
            self.min,
            self.max,
            self.mean(),
            self.count
        )
    }
}

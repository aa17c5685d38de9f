//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 真实子进程（`cat` / `sh` / `tr`）驱动的 e2e 测试

#[cfg(test)]
mod contract_tests {
    use contracts::{FanoutConfig, SinkKind};

    #[test]
    fn test_config_defaults_snapshot() {
        let config = FanoutConfig::default();
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.chunk_size, 65536);
        assert!(config.sinks.is_empty());
    }

    #[test]
    fn test_config_roundtrip_through_loader() {
        let toml = r#"
[[sinks]]
name = "original"
kind = "accumulate"

[[sinks]]
name = "frame"
kind = "process"
process = { program = "cat" }
"#;
        let config =
            config_loader::ConfigLoader::load_from_str(toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(config.sinks[1].kind, SinkKind::Process);
        assert_eq!(config.sinks[1].process.as_ref().unwrap().timeout_ms, 30_000);

        let json = config_loader::ConfigLoader::to_json(&config).unwrap();
        let back =
            config_loader::ConfigLoader::load_from_str(&json, config_loader::ConfigFormat::Json)
                .unwrap();
        assert_eq!(back.sinks.len(), 2);
        assert_eq!(back.sinks[1].process, config.sinks[1].process);
    }
}

#[cfg(all(test, unix))]
mod e2e_tests {
    use std::time::{Duration, Instant};

    use bytes::Bytes;
    use contracts::{ContractError, ProcessSpec};
    use fanout::{ChunkSource, Fanout, FanoutBuilder};

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").args(["-c", script])
    }

    fn chunks(sizes: &[usize]) -> (Vec<Bytes>, Vec<u8>) {
        let mut all = Vec::new();
        let chunks = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let chunk: Vec<u8> = (0..size).map(|j| (i * 31 + j) as u8).collect();
                all.extend_from_slice(&chunk);
                Bytes::from(chunk)
            })
            .collect();
        (chunks, all)
    }

    /// Accumulating output is the in-order concatenation of the source chunks
    #[tokio::test]
    async fn test_accumulating_sink_concatenates_in_order() {
        let cases: [&[usize]; 4] = [&[1], &[3, 0, 7, 1], &[4096; 40], &[1, 65536, 2, 100_000]];
        for sizes in cases {
            let (source_chunks, expected) = chunks(sizes);
            let fanout = Fanout::builder()
                .queue_capacity(2)
                .accumulating("a")
                .accumulating("b")
                .build()
                .unwrap();

            let result = fanout.run(ChunkSource::from_chunks(source_chunks)).await.unwrap();
            assert_eq!(result.get("a").unwrap().as_ref(), expected.as_slice());
            assert_eq!(result.get("b").unwrap().as_ref(), expected.as_slice());
        }
    }

    /// 10 + 20 + 5 bytes through an accumulating sink and an echoing process
    #[tokio::test]
    async fn test_echo_process_and_copy_agree() {
        let (source_chunks, expected) = chunks(&[10, 20, 5]);
        let fanout = Fanout::builder()
            .accumulating("copy")
            .process("echo", &ProcessSpec::new("cat"))
            .unwrap()
            .build()
            .unwrap();

        let (outcome, summary) = fanout
            .run_with_summary(ChunkSource::from_chunks(source_chunks))
            .await;
        let result = outcome.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.get("copy").unwrap().len(), 35);
        assert_eq!(result.get("copy").unwrap().as_ref(), expected.as_slice());
        assert_eq!(result.get("echo").unwrap().as_ref(), expected.as_slice());
        assert_eq!(summary.bytes, 35);
        assert!(summary.mismatched_sinks().is_empty());
    }

    /// The process stops reading after the first chunk, then exits 0 with 12 bytes
    #[tokio::test]
    async fn test_broken_pipe_is_tolerated() {
        let mut source_chunks = vec![Bytes::from_static(b"0123456789")];
        source_chunks.extend((0..4).map(|_| Bytes::from(vec![b'z'; 1 << 20])));
        let total: usize = source_chunks.iter().map(Bytes::len).sum();

        let fanout = Fanout::builder()
            .accumulating("copy")
            .process(
                "early",
                &sh("head -c 10 >/dev/null; exec 0<&-; printf 'twelve bytes'"),
            )
            .unwrap()
            .build()
            .unwrap();

        let (outcome, summary) = fanout
            .run_with_summary(ChunkSource::from_chunks(source_chunks))
            .await;
        let result = outcome.unwrap();

        assert_eq!(result.get("early").unwrap().as_ref(), b"twelve bytes");
        assert_eq!(result.get("copy").unwrap().len(), total);
        // every sink still accounts for every distributed byte
        assert_eq!(summary.bytes, total as u64);
        assert!(summary.mismatched_sinks().is_empty());
    }

    /// Stops reading after 10 bytes and exits 1 while input is still flowing
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exit_after_abandoning_input_is_stable() {
        for round in 0..20 {
            let mut source_chunks = vec![Bytes::from_static(b"0123456789")];
            source_chunks.extend((0..4).map(|_| Bytes::from(vec![b'z'; 1 << 20])));

            let fanout = Fanout::builder()
                .accumulating("copy")
                .process("p", &sh("head -c 10 >/dev/null; printf out; exit 1"))
                .unwrap()
                .build()
                .unwrap();

            let result = fanout
                .run(ChunkSource::from_chunks(source_chunks))
                .await
                .unwrap_or_else(|e| panic!("round {round}: {e:?}"));
            assert_eq!(result.get("p").unwrap().as_ref(), b"out", "round {round}");
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_code() {
        let fanout = Fanout::builder()
            .accumulating("copy")
            .process("bad", &sh("cat >/dev/null; echo partial; exit 3"))
            .unwrap()
            .build()
            .unwrap();

        let err = fanout
            .run(ChunkSource::from_chunks(vec![Bytes::from_static(b"input")]))
            .await
            .unwrap_err();
        match err {
            ContractError::ProcessExit {
                sink_name, code, ..
            } => {
                assert_eq!(sink_name, "bad");
                assert_eq!(code, Some(3));
            }
            other => panic!("expected ProcessExit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let spec = sh("sleep 30").timeout(Duration::from_millis(200));
        let fanout = Fanout::builder()
            .accumulating("copy")
            .process("stuck", &spec)
            .unwrap()
            .build()
            .unwrap();

        let started = Instant::now();
        let err = fanout
            .run(ChunkSource::from_chunks(vec![Bytes::from_static(b"data")]))
            .await
            .unwrap_err();

        assert!(
            matches!(err, ContractError::ProcessTimeout { ref sink_name, timeout_ms: 200 } if sink_name == "stuck"),
            "unexpected error: {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// A timeout fires even while the source is still producing
    #[tokio::test]
    async fn test_timeout_during_distribution() {
        let spec = sh("sleep 30").timeout(Duration::from_millis(200));
        let fanout = Fanout::builder()
            .queue_capacity(1)
            .process("stuck", &spec)
            .unwrap()
            .build()
            .unwrap();

        let (tx, source) = ChunkSource::channel(1);
        let producer = tokio::spawn(async move {
            // never ends on its own
            while tx.send(Ok(Bytes::from(vec![1u8; 1 << 16]))).await.is_ok() {}
        });

        let err = fanout.run(source).await.unwrap_err();
        assert!(matches!(err, ContractError::ProcessTimeout { .. }));
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_sinks_fails_before_reading() {
        let (tx, source) = ChunkSource::channel(1);
        let fanout = FanoutBuilder::new().build().unwrap();

        let err = fanout.run(source).await.unwrap_err();
        assert!(matches!(err, ContractError::Configuration { .. }));
        assert!(tx.is_closed());
        assert!(tx.try_send(Ok(Bytes::from_static(b"late"))).is_err());
    }

    #[tokio::test]
    async fn test_empty_source_fails_with_empty_result() {
        let fanout = Fanout::builder().accumulating("copy").build().unwrap();
        let err = fanout
            .run(ChunkSource::from_chunks(Vec::<Bytes>::new()))
            .await
            .unwrap_err();
        match err {
            ContractError::EmptyResult { sink_name } => assert_eq!(sink_name, "copy"),
            other => panic!("expected EmptyResult, got {other:?}"),
        }
    }

    /// A process producing no output fails the whole run, the copy is not returned
    #[tokio::test]
    async fn test_no_partial_result() {
        let fanout = Fanout::builder()
            .accumulating("copy")
            .process("silent", &sh("cat >/dev/null"))
            .unwrap()
            .build()
            .unwrap();

        let result = fanout
            .run(ChunkSource::from_chunks(vec![Bytes::from_static(b"payload")]))
            .await;
        assert!(matches!(result, Err(ContractError::EmptyResult { .. })));
    }

    /// Two failing sinks still produce exactly one error
    #[tokio::test]
    async fn test_single_error_for_multiple_failures() {
        let fanout = Fanout::builder()
            .process("first", &sh("cat >/dev/null; exit 4"))
            .unwrap()
            .process("second", &sh("cat >/dev/null; exit 5"))
            .unwrap()
            .build()
            .unwrap();

        let err = fanout
            .run(ChunkSource::from_chunks(vec![Bytes::from_static(b"x")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContractError::ProcessExit {
                code: Some(4 | 5),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let result = Fanout::builder()
            .accumulating("copy")
            .process("ghost", &ProcessSpec::new("/nonexistent/stream-tee-program"));
        assert!(matches!(result, Err(ContractError::ProcessSpawn { .. })));
    }

    #[tokio::test]
    async fn test_source_error_fails_run() {
        let fanout = Fanout::builder()
            .accumulating("copy")
            .process("echo", &ProcessSpec::new("cat"))
            .unwrap()
            .build()
            .unwrap();

        let (tx, source) = ChunkSource::channel(4);
        tx.send(Ok(Bytes::from_static(b"start"))).await.unwrap();
        tx.send(Err(std::io::Error::other("device unplugged")))
            .await
            .unwrap();

        let err = fanout.run(source).await.unwrap_err();
        assert!(matches!(err, ContractError::Source { .. }));
    }

    /// Large stream through a process: input and output pipes both fill up
    #[tokio::test]
    async fn test_large_stream_through_process() {
        let data: Vec<u8> = (0..8 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let source = ChunkSource::from_reader(std::io::Cursor::new(data.clone()), 64 * 1024, 4);

        let fanout = Fanout::builder()
            .queue_capacity(2)
            .accumulating("copy")
            .process("echo", &ProcessSpec::new("cat"))
            .unwrap()
            .build()
            .unwrap();

        let result = fanout.run(source).await.unwrap();
        assert_eq!(result.get("copy").unwrap().as_ref(), data.as_slice());
        assert_eq!(result.get("echo").unwrap().as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_config_driven_run() {
        let config = config_loader::ConfigLoader::load_from_str(
            r#"
queue_capacity = 4
chunk_size = 16

[[sinks]]
name = "lower"
kind = "accumulate"

[[sinks]]
name = "upper"
kind = "process"

[sinks.process]
program = "tr"
args = ["a-z", "A-Z"]
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let text = "the quick brown fox jumps over the lazy dog";
        let source =
            ChunkSource::from_reader(std::io::Cursor::new(text.as_bytes().to_vec()), 16, 4);
        let fanout = FanoutBuilder::from_config(&config).unwrap().build().unwrap();
        let result = fanout.run(source).await.unwrap();

        assert_eq!(result.get("lower").unwrap().as_ref(), text.as_bytes());
        assert_eq!(
            result.get("upper").unwrap().as_ref(),
            text.to_uppercase().as_bytes()
        );
    }
}

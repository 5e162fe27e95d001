//! # Integration Tests
//!
//! End-to-end pipelines across crates:
//! - In-process taps and external command producers
//! - Sequential and concurrent fan-out
//! - Checkpoints, the null-schema gate and sink crash handling

#[cfg(test)]
mod contract_tests {
    use contracts::{DeliveryMode, Message, SinkType};

    #[test]
    fn test_blueprint_loads_and_validates() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[tap]
command = "tap-fixerio --config fixer.json"
key = "date"

[dispatch]
mode = "concurrent"

[[sinks]]
name = "csv"
sink_type = "command"
command = "target-csv --config csv.json"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(blueprint.dispatch.mode, DeliveryMode::Concurrent);
        assert_eq!(blueprint.sinks[0].sink_type, SinkType::Command);
        assert_eq!(
            observability::normalize(&config_loader::producer_name(&blueprint)),
            "tap_fixerio___config_fixer_json"
        );
    }

    #[test]
    fn test_framed_lines_parse_back() {
        let record = serde_json::json!({"id": 1, "v": "a"})
            .as_object()
            .cloned()
            .unwrap();
        let pair = framing::frame(
            "users",
            record,
            serde_json::json!({"type": "object"}),
            &"id".into(),
        )
        .unwrap();
        assert!(matches!(
            framing::parse(pair.schema.line()).unwrap(),
            Message::Schema { .. }
        ));
        assert!(framing::parse(pair.record.line()).unwrap().is_record());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use contracts::{
        CheckpointMode, CheckpointStore, ContractError, DataSink, DeliveryMode, Message,
        RowSource,
    };
    use dispatcher::{DispatcherBuilder, DispatcherConfig, DispatcherError, FileSink, Sink};
    use observability::MetricsRegistry;
    use serde_json::{json, Value};
    use tap::{FileCheckpoint, JsonLinesSource, MemoryCheckpoint, Producer, Tap};

    struct Rows(VecDeque<Value>);

    #[async_trait]
    impl RowSource for Rows {
        async fn emit(&mut self) -> Result<Option<Value>, ContractError> {
            Ok(self.0.pop_front())
        }
    }

    type Seen = Arc<Mutex<Vec<Vec<String>>>>;

    /// Records every unit; refuses the unit numbered `fail_at` (1-based)
    struct Recorder {
        name: String,
        seen: Seen,
        fail_at: Option<usize>,
    }

    impl Recorder {
        fn new(name: &str) -> (Self, Seen) {
            let seen = Seen::default();
            let sink = Self {
                name: name.into(),
                seen: Arc::clone(&seen),
                fail_at: None,
            };
            (sink, seen)
        }

        fn failing_at(name: &str, unit: usize) -> (Self, Seen) {
            let (mut sink, seen) = Self::new(name);
            sink.fail_at = Some(unit);
            (sink, seen)
        }
    }

    #[async_trait]
    impl DataSink for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, lines: &[String]) -> Result<String, ContractError> {
            let mut seen = self.seen.lock().unwrap();
            if self.fail_at == Some(seen.len() + 1) {
                return Err(ContractError::sink_write(&self.name, "refused"));
            }
            seen.push(lines.to_vec());
            Ok(format!("ok {}", seen.len()))
        }
    }

    fn rows(values: Vec<Value>) -> Box<dyn RowSource> {
        Box::new(Rows(values.into()))
    }

    fn users(values: Vec<Value>) -> Tap {
        Tap::new("users", "id", rows(values)).unwrap()
    }

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(&contracts::default_histogram_buckets()).unwrap()
    }

    fn script(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        format!("sh {}", path.display())
    }

    fn parsed(line: &str) -> Message {
        framing::parse(line).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_fan_out_to_two_sinks() {
        let (a, seen_a) = Recorder::new("sink a");
        let (b, seen_b) = Recorder::new("sink b");
        let registry = registry();
        let config = DispatcherConfig {
            mode: DeliveryMode::Concurrent,
            ..DispatcherConfig::default()
        };

        let dispatcher = DispatcherBuilder::new(users(vec![
            json!({"id": 1, "v": "a"}),
            json!({"id": 2, "v": "b"}),
        ]))
        .config(config)
        .registry(registry.clone())
        .sink(Sink::handler(a))
        .sink(Sink::handler(b))
        .build()
        .await
        .unwrap();

        let report = dispatcher.run().await.unwrap();
        assert_eq!(report.units, 2);

        for seen in [seen_a, seen_b] {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            for (unit, id) in seen.iter().zip([1, 2]) {
                assert_eq!(unit.len(), 2);
                match parsed(&unit[0]) {
                    Message::Schema {
                        stream,
                        schema,
                        key_properties,
                        ..
                    } => {
                        assert_eq!(stream, "users");
                        assert_eq!(key_properties, vec!["id"]);
                        assert_eq!(schema["properties"]["id"]["type"], "integer");
                        assert_eq!(schema["properties"]["v"]["type"], "string");
                    }
                    other => panic!("unexpected {other:?}"),
                }
                match parsed(&unit[1]) {
                    Message::Record { record, .. } => assert_eq!(record["id"], json!(id)),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }

        let text = registry.render();
        assert!(text.contains("total_users 2"), "{text}");
        assert!(text.contains("total_sink_a 2"), "{text}");
        assert!(text.contains("total_sink_b 2"), "{text}");
    }

    #[tokio::test]
    async fn test_sequential_delivery_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out/users.jsonl");
        let sink = FileSink::open("dump", &out).await.unwrap();

        let dispatcher = DispatcherBuilder::new(users(vec![
            json!({"id": 1}),
            json!({"id": 2}),
            json!({"id": 3}),
        ]))
        .sink(Sink::handler(sink))
        .build()
        .await
        .unwrap();
        dispatcher.run().await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        let ids: Vec<Value> = written
            .lines()
            .filter_map(|line| match parsed(line) {
                Message::Record { record, .. } => record.get("id").cloned(),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_null_schema_gate_on_and_off() {
        let row = || vec![json!({"id": 1, "note": null})];

        let (a, seen) = Recorder::new("a");
        let config = DispatcherConfig {
            reject_null_schema: true,
            ..DispatcherConfig::default()
        };
        let err = DispatcherBuilder::new(users(row()))
            .config(config)
            .sink(Sink::handler(a))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Contract(ContractError::NullSchemaField { .. })
        ));
        assert!(seen.lock().unwrap().is_empty());

        let (b, seen) = Recorder::new("b");
        DispatcherBuilder::new(users(row()))
            .sink(Sink::handler(b))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0][0].contains("\"note\":{\"type\":\"null\"}"), "{}", seen[0][0]);
    }

    #[tokio::test]
    async fn test_missing_key_aborts_run() {
        let (a, seen) = Recorder::new("a");
        let err = DispatcherBuilder::new(users(vec![json!({"id": 1}), json!({"v": 2})]))
            .sink(Sink::handler(a))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Contract(ContractError::MissingKey { .. })
        ));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_tracks_last_row() {
        let store = Arc::new(MemoryCheckpoint::new());
        let tap = users(vec![json!({"id": 3}), json!({"id": 7}), json!({"id": 9})])
            .with_checkpoint(store.clone(), CheckpointMode::OnRetrieve);
        let (a, _) = Recorder::new("a");

        DispatcherBuilder::new(tap)
            .sink(Sink::handler(a))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(store.get().as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn test_after_delivery_checkpoint_stops_at_last_delivered_unit() {
        let store = Arc::new(MemoryCheckpoint::new());
        let tap = users(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})])
            .with_checkpoint(store.clone(), CheckpointMode::AfterDelivery);
        let (a, _) = Recorder::failing_at("a", 3);

        let err = DispatcherBuilder::new(tap)
            .sink(Sink::handler(a))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Contract(ContractError::SinkWrite { .. })
        ));
        assert_eq!(store.get().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_file_checkpoint_resumes_json_lines_source() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("orders.jsonl");
        let store = Arc::new(FileCheckpoint::under(dir.path().join("state"), "shop", "orders"));
        std::fs::write(&input, "{\"id\": 1}\n{\"id\": 2}\n").unwrap();

        async fn run_once(input: &std::path::Path, store: &Arc<FileCheckpoint>) -> Vec<Vec<String>> {
            let mut source = JsonLinesSource::open(input).await.unwrap();
            if let Ok(position) = store.pull().await {
                source = source.resume_after("id", position);
            }
            let tap = Tap::new("orders", "id", Box::new(source))
                .unwrap()
                .with_checkpoint(store.clone(), CheckpointMode::OnRetrieve);
            let (sink, seen) = Recorder::new("sink");
            DispatcherBuilder::new(tap)
                .sink(Sink::handler(sink))
                .build()
                .await
                .unwrap()
                .run()
                .await
                .unwrap();
            let seen = seen.lock().unwrap().clone();
            seen
        }

        assert_eq!(run_once(&input, &store).await.len(), 2);
        assert_eq!(store.pull().await.unwrap(), "2");

        std::fs::write(&input, "{\"id\": 1}\n{\"id\": 2}\n{\"id\": 10}\n").unwrap();
        let second = run_once(&input, &store).await;
        assert_eq!(second.len(), 1);
        assert!(second[0][1].contains("\"id\":10"));
        assert_eq!(store.pull().await.unwrap(), "10");
    }

    #[tokio::test]
    async fn test_cat_subprocess_sink_acknowledges() {
        let registry = registry();
        let dispatcher = DispatcherBuilder::new(users(vec![json!({"id": 1}), json!({"id": 2})]))
            .registry(registry.clone())
            .sink(Sink::Command("cat".into()))
            .build()
            .await
            .unwrap();

        let report = dispatcher.run().await.unwrap();
        assert_eq!(report.units, 2);
        assert_eq!(report.sinks[0].0, "cat");
        assert_eq!(report.sinks[0].1.total, 2);
        assert!(registry.render().contains("total_cat 2"));
    }

    #[tokio::test]
    async fn test_external_command_producer() {
        let dir = tempfile::tempdir().unwrap();
        let producer = script(
            &dir,
            "tap.sh",
            r#"cat <<'EOF'
{"type":"SCHEMA","stream":"rates","schema":{"type":"object","properties":{"date":{"type":"string"}}},"key_properties":["date"]}
{"type":"RECORD","stream":"rates","record":{"date":"2020-01-01","usd":1.1}}

{"type":"STATE","value":{"date":"2020-01-01"}}
EOF
"#,
        );
        let (sink, seen) = Recorder::new("sink");

        let report = DispatcherBuilder::new(Producer::Command(producer))
            .sink(Sink::handler(sink))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.units, 3);
        let seen = seen.lock().unwrap();
        let kinds: Vec<&str> = seen.iter().map(|unit| parsed(&unit[0]).kind()).collect();
        assert_eq!(kinds, vec!["SCHEMA", "RECORD", "STATE"]);
    }

    #[tokio::test]
    async fn test_transform_of_external_producer_reinfers_schema() {
        let dir = tempfile::tempdir().unwrap();
        let producer = script(
            &dir,
            "tap.sh",
            r#"cat <<'EOF'
{"type":"SCHEMA","stream":"rates","schema":{"type":"object","properties":{"usd":{"type":"number"}}},"key_properties":["date"]}
{"type":"RECORD","stream":"rates","record":{"date":"2020-01-01","usd":1.1}}
EOF
"#,
        );
        let (sink, seen) = Recorder::new("sink");

        DispatcherBuilder::new(Producer::Command(producer))
            .sink(Sink::handler(sink))
            .transform(|mut record| {
                record.insert("usd".into(), json!("1.1"));
                Ok(record.into())
            })
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        match parsed(&seen[0][0]) {
            Message::Schema {
                schema,
                key_properties,
                ..
            } => {
                assert_eq!(schema["properties"]["usd"]["type"], "string");
                assert_eq!(key_properties, vec!["date"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    const CRASHING_SINK: &str = r#"read line
echo "Traceback (most recent call last):" >&2
echo "ValueError: bad record" >&2
exit 1
"#;

    fn many_rows() -> Vec<Value> {
        (0..200).map(|id| json!({"id": id})).collect()
    }

    #[tokio::test]
    async fn test_sink_crash_raises_without_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let sink = script(&dir, "sink.sh", CRASHING_SINK);

        let err = DispatcherBuilder::new(users(many_rows()))
            .sink(Sink::Command(sink.clone()))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();

        match err {
            DispatcherError::Contract(ContractError::SinkCrash {
                process, excerpt, ..
            }) => {
                assert_eq!(process, sink);
                assert!(excerpt.contains("ValueError"), "{excerpt}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sink_crash_terminates_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let sink = script(&dir, "sink.sh", CRASHING_SINK);
        let terminated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&terminated);
        let config = DispatcherConfig {
            graceful_shutdown: Duration::from_millis(200),
            ..DispatcherConfig::default()
        };

        let dispatcher = DispatcherBuilder::new(users(many_rows()))
            .config(config)
            .sink(Sink::Command(sink))
            .terminator(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .await
            .unwrap();

        let started = Instant::now();
        let err = dispatcher.run().await.unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Contract(ContractError::SinkCrash { .. })
        ));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    const CRASH_ON_CLOSE: &str = r#"cat > /dev/null
echo "Traceback (most recent call last):" >&2
echo "RuntimeError: flush failed" >&2
exit 1
"#;

    #[tokio::test]
    async fn test_sink_crash_on_close_raises_without_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let sink = script(&dir, "sink.sh", CRASH_ON_CLOSE);

        let err = DispatcherBuilder::new(users(vec![json!({"id": 1}), json!({"id": 2})]))
            .sink(Sink::Command(sink.clone()))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();

        match err {
            DispatcherError::Contract(ContractError::SinkCrash {
                process, excerpt, ..
            }) => {
                assert_eq!(process, sink);
                assert!(excerpt.contains("RuntimeError"), "{excerpt}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sink_crash_on_close_terminates_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let sink = script(&dir, "sink.sh", CRASH_ON_CLOSE);
        let terminated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&terminated);
        let config = DispatcherConfig {
            graceful_shutdown: Duration::from_millis(100),
            ..DispatcherConfig::default()
        };

        let err = DispatcherBuilder::new(users(vec![json!({"id": 1})]))
            .config(config)
            .sink(Sink::Command(sink))
            .terminator(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatcherError::Contract(ContractError::SinkCrash { .. })
        ));
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_producer_crash_after_last_line_is_raised() {
        let dir = tempfile::tempdir().unwrap();
        let producer = script(
            &dir,
            "producer.sh",
            r#"echo '{"type": "RECORD", "stream": "rates", "record": {"date": "2024-01-02"}}'
exec 1>&-
echo "Traceback (most recent call last):" >&2
exit 1
"#,
        );
        let (sink, _) = Recorder::new("rates");

        let err = DispatcherBuilder::new(Producer::Command(producer.clone()))
            .sink(Sink::handler(sink))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap_err();

        match err {
            DispatcherError::Contract(ContractError::SinkCrash { process, .. }) => {
                assert_eq!(process, producer);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    type Events = Arc<Mutex<Vec<String>>>;

    /// Logs every emitted row id before handing it out
    struct LoggedRows {
        next: u64,
        last: u64,
        events: Events,
    }

    #[async_trait]
    impl RowSource for LoggedRows {
        async fn emit(&mut self) -> Result<Option<Value>, ContractError> {
            if self.next > self.last {
                return Ok(None);
            }
            let id = self.next;
            self.next += 1;
            self.events.lock().unwrap().push(format!("emit {id}"));
            Ok(Some(json!({"id": id})))
        }
    }

    /// Logs the record id of every unit it receives
    struct LoggedSink {
        name: String,
        events: Events,
    }

    #[async_trait]
    impl DataSink for LoggedSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn write(&mut self, lines: &[String]) -> Result<String, ContractError> {
            tokio::task::yield_now().await;
            let id = match parsed(&lines[1]) {
                Message::Record { record, .. } => record["id"].clone(),
                other => panic!("unexpected {other:?}"),
            };
            self.events
                .lock()
                .unwrap()
                .push(format!("{} {id}", self.name));
            Ok(String::new())
        }
    }

    async fn logged_run(mode: DeliveryMode) -> Vec<String> {
        let events = Events::default();
        let source = LoggedRows {
            next: 1,
            last: 3,
            events: Arc::clone(&events),
        };
        let sink = |name: &str| {
            Sink::handler(LoggedSink {
                name: name.into(),
                events: Arc::clone(&events),
            })
        };
        let config = DispatcherConfig {
            mode,
            ..DispatcherConfig::default()
        };

        DispatcherBuilder::new(Tap::new("users", "id", Box::new(source)).unwrap())
            .config(config)
            .sink(sink("a"))
            .sink(sink("b"))
            .build()
            .await
            .unwrap()
            .run()
            .await
            .unwrap();

        let events = events.lock().unwrap().clone();
        events
    }

    #[tokio::test]
    async fn test_sequential_unit_reaches_every_sink_before_the_next() {
        let events = logged_run(DeliveryMode::Sequential).await;
        let expected: Vec<String> = (1..=3)
            .flat_map(|id| [format!("emit {id}"), format!("a {id}"), format!("b {id}")])
            .collect();
        assert_eq!(events, expected);
    }

    #[tokio::test]
    async fn test_concurrent_unit_joins_before_next_emit() {
        let events = logged_run(DeliveryMode::Concurrent).await;
        assert_eq!(events.len(), 9, "{events:?}");
        for (chunk, id) in events.chunks(3).zip(1..=3) {
            assert_eq!(chunk[0], format!("emit {id}"), "{events:?}");
            let mut delivered = chunk[1..].to_vec();
            delivered.sort();
            assert_eq!(delivered, vec![format!("a {id}"), format!("b {id}")], "{events:?}");
        }
    }
}

//! End-to-end dispatch through the standard pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kraken_core::config::hook_names;
use kraken_core::{
    ChatMessageInput, ChatMessageOutput, GuardConfig, MemoryProbe, MemorySnapshot, Result,
    SessionError, SessionEvent, Terminator, ToolInput, ToolOutput,
};
use kraken_hooks::HookPipeline;
use parking_lot::Mutex;

struct SteadyProbe {
    rss: u64,
    samples: AtomicU64,
}

impl MemoryProbe for SteadyProbe {
    fn snapshot(&self) -> Result<MemorySnapshot> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySnapshot::rss_only(self.rss))
    }
}

#[derive(Default)]
struct Exits(Mutex<Vec<i32>>);

impl Terminator for Exits {
    fn terminate(&self, code: i32) {
        self.0.lock().push(code);
    }
}

fn pipeline(config: &GuardConfig, rss: u64) -> (HookPipeline, Arc<SteadyProbe>, Arc<Exits>) {
    let probe = Arc::new(SteadyProbe {
        rss,
        samples: AtomicU64::new(0),
    });
    let exits = Arc::new(Exits::default());
    let pipeline = HookPipeline::from_config(config, probe.clone(), exits.clone());
    (pipeline, probe, exits)
}

#[tokio::test(start_paused = true)]
async fn test_grep_output_is_bounded_by_both_truncators() {
    let (pipeline, _, _) = pipeline(&GuardConfig::default(), 200);

    let lines: Vec<String> = (0..20_000)
        .map(|i| format!("src/lib.rs:{}:fn item_{}() {{}}", i, i))
        .collect();
    let original = lines.join("\n");

    let input = ToolInput::new("grep", "s1").with_call_id("c1");
    let mut output = ToolOutput::text(original.clone());
    pipeline.tool_execute_after(&input, &mut output).await;

    let text = output.output_text().unwrap();
    assert!(text.len() < original.len());
    assert!(text.starts_with("src/lib.rs:0:fn item_0() {}"));
    // The grep pass cuts the generic banner off with the tail
    assert!(text.ends_with("matches omitted]"));
}

#[tokio::test(start_paused = true)]
async fn test_memory_sampled_on_interval_across_calls() {
    let (pipeline, probe, exits) = pipeline(&GuardConfig::default(), 200);

    for i in 0..25 {
        let mut input = ToolInput::new("read", "s1").with_call_id(format!("c{}", i));
        pipeline.tool_execute_before(&mut input).await;
        let mut output = ToolOutput::text("ok");
        pipeline.tool_execute_after(&input, &mut output).await;
    }

    // Memory guard samples at calls 10 and 20; the throttle pauses at call 15
    assert_eq!(probe.samples.load(Ordering::SeqCst), 3);
    assert!(exits.0.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_kill_threshold_requests_exit() {
    let mut config = GuardConfig::default();
    config.memory_guard.check_interval = 1;
    let (pipeline, _, exits) = pipeline(&config, 4096);

    let input = ToolInput::new("read", "s1");
    let mut output = ToolOutput::text("ok");
    pipeline.tool_execute_after(&input, &mut output).await;

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    tokio::task::yield_now().await;
    assert_eq!(*exits.0.lock(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_hooks_do_not_run() {
    let config = GuardConfig {
        disabled_hooks: hook_names::ALL.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    let (pipeline, probe, _) = pipeline(&config, 200);
    assert!(pipeline.is_empty());

    let big = "x".repeat(1_000_000);
    let input = ToolInput::new("grep", "s1");
    let mut output = ToolOutput::text(big.clone());
    pipeline.tool_execute_after(&input, &mut output).await;

    assert_eq!(output.output_text(), Some(big.as_str()));
    assert_eq!(probe.samples.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_events_flow_through() {
    let (pipeline, probe, _) = pipeline(&GuardConfig::default(), 200);

    pipeline
        .event(&SessionEvent::Start {
            session_id: "s1".to_string(),
        })
        .await;
    pipeline
        .chat_message(&ChatMessageInput::new("s1"), &mut ChatMessageOutput::default())
        .await;
    pipeline
        .event(&SessionEvent::Error {
            session_id: "s1".to_string(),
            error: Some(SessionError::from("authentication failed")),
        })
        .await;
    pipeline
        .event(&SessionEvent::End {
            session_id: "s1".to_string(),
        })
        .await;

    // Only the memory guard samples on session end
    assert_eq!(probe.samples.load(Ordering::SeqCst), 1);
}

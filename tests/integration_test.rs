/// End-to-end tests wiring config, tools, agent and bus the way the `opsy`
/// binary does, with the scripted mock model in place of the real backend.
use std::sync::Arc;
use std::time::{Duration, Instant};

use opsy_config::Config;
use opsy_core::{channel, Agent, AgentState, CommunicationReceivers, Message, Status};
use opsy_model::{CompletionResponse, MockProvider, ModelProvider, ScriptedMockProvider, ToolUse};
use opsy_tools::{ExecutedCommand, ToolRegistry, ToolRunner};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Collect everything a run publishes until its terminal status.
async fn consume(mut rx: CommunicationReceivers) -> (Vec<ExecutedCommand>, Vec<Message>, Vec<Status>) {
    let (mut commands, mut messages, mut statuses) = (Vec::new(), Vec::new(), Vec::new());
    loop {
        tokio::select! {
            Some(c) = rx.commands.recv() => commands.push(c),
            Some(m) = rx.messages.recv() => messages.push(m),
            s = rx.status.recv() => match s {
                Some(s) => {
                    statuses.push(s);
                    if s.is_terminal() {
                        while let Ok(c) = rx.commands.try_recv() { commands.push(c); }
                        while let Ok(m) = rx.messages.try_recv() { messages.push(m); }
                        break;
                    }
                }
                None => break,
            },
        }
    }
    (commands, messages, statuses)
}

/// Parse a config document directly so host config files and `OPSY_*`
/// variables cannot leak into the run.
fn test_config(tools_dir: &std::path::Path, exec_timeout: u64) -> Config {
    let yaml = format!(
        "agent:\n  channel_capacity: 2\ntools:\n  directory: {}\n  timeout: 30\n  exec:\n    timeout: {exec_timeout}\n",
        tools_dir.display()
    );
    let config: Config = serde_yaml::from_str(&yaml).unwrap();
    config.validate().unwrap();
    config
}

#[tokio::test]
async fn mock_provider_echoes_task() {
    let model: Arc<dyn ModelProvider> = Arc::new(MockProvider);
    let (bus, rx) = channel(4);
    let agent = Agent::new(model, Arc::new(Default::default()), bus);
    let consumer = tokio::spawn(consume(rx));

    let tools = ToolRegistry::with_exec(Arc::new(Default::default()));
    let report = agent.run("hello", &tools, CancellationToken::new()).await;

    assert_eq!(report.state, AgentState::Finished);
    assert_eq!(report.answer().as_deref(), Some("MOCK: hello"));
    let (_, messages, statuses) = consumer.await.unwrap();
    assert_eq!(statuses, vec![Status::Running, Status::Finished]);
    assert_eq!(messages[0].message, "MOCK: hello");
}

#[tokio::test]
async fn full_run_with_loaded_config_and_tools() {
    let home = tempfile::tempdir().unwrap();
    let tools_dir = home.path().join("tools");
    std::fs::create_dir(&tools_dir).unwrap();
    std::fs::write(
        tools_dir.join("disk.yaml"),
        "display_name: Disk\ndescription: Inspects disk usage\nexecutable: sh\n",
    )
    .unwrap();
    std::fs::write(tools_dir.join("broken.yaml"), "display_name: Broken\n").unwrap();

    let config = test_config(&tools_dir, 0);
    assert_eq!(config.agent.channel_capacity, 2);

    let work = tempfile::tempdir().unwrap();
    std::fs::write(work.path().join("marker.txt"), "x").unwrap();
    let wd = work.path().to_string_lossy().into_owned();

    let model = Arc::new(ScriptedMockProvider::from_responses(vec![
        CompletionResponse::tool_uses(vec![
            ToolUse { id: "1".into(), name: "exec".into(), input: json!({"command": "echo -n hello", "task": "print hello"}) },
            ToolUse { id: "2".into(), name: "exec".into(), input: json!({"command": "ls", "working_directory": wd}) },
            ToolUse { id: "3".into(), name: "missing".into(), input: json!({"task": "?"}) },
        ]),
        CompletionResponse::text("hello printed, marker found"),
    ]));
    let (bus, rx) = channel(config.agent.channel_capacity);
    let agent = Arc::new(Agent::new(model.clone(), Arc::new(config.agent.clone()), bus));
    let runner: Arc<dyn ToolRunner> = agent.clone();
    let tools = ToolRegistry::load(&config.tools.directory_path(), Arc::new(config.tools.clone()), Some(runner)).unwrap();
    assert_eq!(tools.names(), vec!["disk", "exec"]);

    // Small channels: the run only completes if the consumer keeps up.
    let consumer = tokio::spawn(consume(rx));
    let report = agent.run("print hello and look for the marker", &tools, CancellationToken::new()).await;
    let (commands, messages, statuses) = consumer.await.unwrap();

    assert_eq!(report.state, AgentState::Finished, "{:?}", report.error);
    assert_eq!(report.answer().as_deref(), Some("hello printed, marker found"));
    assert_eq!(statuses, vec![Status::Running, Status::Finished]);

    let executed: Vec<&str> = commands.iter().map(|c| c.command.as_str()).collect();
    assert_eq!(executed, vec!["echo -n hello", "ls"]);
    assert_eq!(commands[0].output, "hello");
    assert_eq!(commands[1].working_directory, wd);
    assert!(commands[1].output.contains("marker.txt"));
    for c in &commands {
        assert!(c.started_at.unwrap() < c.completed_at.unwrap());
    }

    assert!(messages.iter().any(|m| m.tool.as_deref() == Some("missing")));
    assert_eq!(messages.last().unwrap().message, "hello printed, marker found");

    let second = &model.recorded()[1];
    assert_eq!(second.tools.len(), 2);
    assert_eq!(second.messages.last().unwrap().tool_result_ids(), vec!["1", "2", "3"]);
    assert!(report.conversation.is_well_formed());
}

#[tokio::test]
async fn exec_timeout_from_config_kills_long_command() {
    let home = tempfile::tempdir().unwrap();
    let tools_dir = home.path().join("tools");
    std::fs::create_dir(&tools_dir).unwrap();
    let config = test_config(&tools_dir, 1);

    let model = Arc::new(ScriptedMockProvider::tool_then_text("1", "exec", json!({"command": "sleep 5"}), "timed out"));
    let (bus, rx) = channel(8);
    let agent = Agent::new(model.clone(), Arc::new(config.agent.clone()), bus);
    let tools = ToolRegistry::load(&tools_dir, Arc::new(config.tools.clone()), None).unwrap();
    let consumer = tokio::spawn(consume(rx));

    let started = Instant::now();
    let report = agent.run("sleep", &tools, CancellationToken::new()).await;
    let (commands, _, _) = consumer.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(report.is_success());
    let out = &report.outputs[0];
    assert!(out.is_error);
    assert!(out.result.is_empty());
    assert_eq!(commands.len(), 1);
    let recorded = model.recorded();
    let result = &recorded[1].messages.last().unwrap().content[0];
    assert!(matches!(result, opsy_model::ContentBlock::ToolResult { content, is_error: true, .. } if content.contains("signal: killed")));
}

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AgentSettings;
use crate::protocol::{ResponseEvent, Submission, Turn, TurnItem, turn_channel};

use super::AgentSession;

const SQ_CAPACITY: usize = 64;
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Agent session backed by the `claude` CLI in stream-json mode.
///
/// One background task owns the submission queue and runs one CLI process per
/// query, resuming the same conversation id on every follow-up.
pub struct ClaudeSession {
    tx_sub: mpsc::Sender<Submission>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ClaudeSession {
    pub async fn open(settings: AgentSettings) -> Result<Self> {
        check_cli(&settings.cli_path).await?;

        let (tx_sub, rx_sub) = mpsc::channel::<Submission>(SQ_CAPACITY);
        let agent = ClaudeAgent {
            settings,
            session_id: None,
        };
        let task = tokio::spawn(async move {
            info!("Claude session started");
            agent.run(rx_sub).await;
            info!("Claude session stopped");
        });

        Ok(Self {
            tx_sub,
            task: Mutex::new(Some(task)),
        })
    }
}

#[async_trait]
impl AgentSession for ClaudeSession {
    async fn query(&self, text: &str) -> Result<Turn> {
        let (events, turn) = turn_channel();
        self.tx_sub
            .send(Submission::Query {
                text: text.to_string(),
                events,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Agent session closed"))?;
        Ok(turn)
    }

    async fn close(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut task) = task else {
            return;
        };
        let _ = self.tx_sub.send(Submission::Shutdown).await;
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            warn!("Claude session did not stop in time, aborting");
            task.abort();
        }
    }
}

impl Drop for ClaudeSession {
    fn drop(&mut self) {
        // Aborting drops any running child, which is killed on drop.
        if let Some(task) = self.task.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

async fn check_cli(cli_path: &str) -> Result<()> {
    let version_check = Command::new(cli_path)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(VERSION_CHECK_TIMEOUT, version_check)
        .await
        .map_err(|_| anyhow::anyhow!("'{cli_path} --version' timed out"))?
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to run '{cli_path}': {e}. Is claude installed? Set CLAUDE_CLI_PATH to override."
            )
        })?;
    if !output.status.success() {
        anyhow::bail!(
            "'{cli_path} --version' exited with code {}",
            output.status.code().unwrap_or(-1)
        );
    }
    info!(
        "Using {cli_path} {}",
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}

struct ClaudeAgent {
    settings: AgentSettings,
    session_id: Option<String>,
}

impl ClaudeAgent {
    async fn run(mut self, mut rx_sub: mpsc::Receiver<Submission>) {
        while let Some(sub) = rx_sub.recv().await {
            let (text, events) = match sub {
                Submission::Query { text, events } => (text, events),
                Submission::Shutdown => break,
            };
            if let Err(e) = self.run_turn(&text, &events).await {
                error!("Claude turn failed: {e:#}");
                let _ = events.send(Err(e)).await;
            }
            // Dropping `events` ends the turn for the renderer.
        }
    }

    async fn run_turn(&mut self, prompt: &str, events: &mpsc::Sender<TurnItem>) -> Result<()> {
        let mut cmd = Command::new(&self.settings.cli_path);
        cmd.args(build_args(&self.settings, prompt, self.session_id.as_deref()))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .current_dir(&self.settings.workspace);

        info!("Spawning {} -p ...", self.settings.cli_path);
        let mut child = cmd.spawn().map_err(|e| {
            anyhow::anyhow!("Failed to spawn '{}': {e}", self.settings.cli_path)
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!("claude stderr: {line}");
                    }
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let mut failure: Option<String> = None;

        while let Some(line) = lines.next_line().await? {
            let Some(record) = parse_record(&line) else {
                continue;
            };
            match record {
                StreamRecord::Init { session_id, model } => {
                    info!("Claude init: model={model}, session={}", truncate(&session_id, 12));
                    self.session_id = Some(session_id);
                }
                StreamRecord::Events(batch) => {
                    for event in batch {
                        if events.send(Ok(event)).await.is_err() {
                            warn!("Turn receiver dropped, discarding events");
                            break;
                        }
                    }
                }
                StreamRecord::Finished {
                    session_id,
                    num_turns,
                    duration_ms,
                } => {
                    info!("Claude result: turns={num_turns}, duration={duration_ms}ms");
                    if session_id.is_some() {
                        self.session_id = session_id;
                    }
                }
                StreamRecord::Failed(msg) => {
                    warn!("Claude result: error, msg={msg}");
                    failure = Some(msg);
                }
            }
        }

        let status = child.wait().await?;
        if let Some(msg) = failure {
            anyhow::bail!(msg);
        }
        if !status.success() {
            anyhow::bail!("claude exited with code {}", status.code().unwrap_or(-1));
        }
        Ok(())
    }
}

fn build_args(settings: &AgentSettings, prompt: &str, session_id: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-p".into(),
        prompt.into(),
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
        "--model".into(),
        settings.model.clone(),
    ];
    if !settings.allowed_tools.is_empty() {
        args.push("--allowedTools".into());
        args.push(settings.allowed_tools.join(","));
    }
    if !settings.setting_sources.is_empty() {
        args.push("--setting-sources".into());
        args.push(settings.setting_sources.join(","));
    }
    if let Some(id) = session_id {
        args.push("--resume".into());
        args.push(id.to_string());
    }
    args
}

/// One decoded line of stream-json output.
#[derive(Debug, PartialEq)]
enum StreamRecord {
    Init {
        session_id: String,
        model: String,
    },
    Events(Vec<ResponseEvent>),
    Finished {
        session_id: Option<String>,
        num_turns: u64,
        duration_ms: u64,
    },
    Failed(String),
}

fn parse_record(line: &str) -> Option<StreamRecord> {
    if line.trim().is_empty() {
        return None;
    }
    let json: Value = serde_json::from_str(line).ok()?;

    match json["type"].as_str().unwrap_or("") {
        "system" => {
            let session_id = json["session_id"].as_str()?.to_string();
            let model = json["model"].as_str().unwrap_or("unknown").to_string();
            Some(StreamRecord::Init { session_id, model })
        }
        "assistant" => {
            let content = json["message"]["content"].as_array()?;
            let batch: Vec<ResponseEvent> = content
                .iter()
                .filter_map(|block| match block["type"].as_str().unwrap_or("") {
                    "text" => block["text"]
                        .as_str()
                        .filter(|t| !t.is_empty())
                        .map(ResponseEvent::text),
                    "tool_use" => Some(ResponseEvent::tool_use(
                        block["name"].as_str().unwrap_or("unknown"),
                    )),
                    _ => None,
                })
                .collect();
            (!batch.is_empty()).then_some(StreamRecord::Events(batch))
        }
        "result" => {
            let subtype = json["subtype"].as_str().unwrap_or("");
            let is_error = json["is_error"].as_bool().unwrap_or(false);
            if is_error || subtype.starts_with("error") {
                let msg = json["error"]
                    .as_str()
                    .or_else(|| json["result"].as_str())
                    .filter(|m| !m.is_empty())
                    .unwrap_or(subtype);
                let msg = if msg.is_empty() { "Unknown error" } else { msg };
                return Some(StreamRecord::Failed(msg.to_string()));
            }
            Some(StreamRecord::Finished {
                session_id: json["session_id"].as_str().map(str::to_string),
                num_turns: json["num_turns"].as_u64().unwrap_or(0),
                duration_ms: json["duration_ms"].as_u64().unwrap_or(0),
            })
        }
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_query_has_no_resume() {
        let args = build_args(&AgentSettings::default(), "hello there", None);
        assert_eq!(&args[..2], ["-p", "hello there"]);
        assert!(args.windows(2).any(|w| w == ["--model", "claude-sonnet-4-5"]));
        assert!(args.windows(2).any(|w| w == ["--allowedTools", "Skill,Bash,Read,Write"]));
        assert!(args.windows(2).any(|w| w == ["--setting-sources", "project"]));
        assert!(!args.iter().any(|a| a == "--resume"));
    }

    #[test]
    fn follow_up_resumes_session() {
        let args = build_args(&AgentSettings::default(), "next", Some("sess-1"));
        assert!(args.windows(2).any(|w| w == ["--resume", "sess-1"]));
    }

    #[test]
    fn parses_init_record() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc-123","model":"claude-sonnet-4-5"}"#;
        assert_eq!(
            parse_record(line),
            Some(StreamRecord::Init {
                session_id: "abc-123".into(),
                model: "claude-sonnet-4-5".into()
            })
        );
    }

    #[test]
    fn parses_assistant_blocks_in_order() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"Saving now."},
            {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}},
            {"type":"text","text":""},
            {"type":"thinking","thinking":"..."}
        ]}}"#
            .replace('\n', "");
        assert_eq!(
            parse_record(&line),
            Some(StreamRecord::Events(vec![
                ResponseEvent::text("Saving now."),
                ResponseEvent::tool_use("Bash"),
            ]))
        );
    }

    #[test]
    fn tool_results_and_noise_are_skipped() {
        let user = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"ok"}]}}"#;
        assert_eq!(parse_record(user), None);
        assert_eq!(parse_record("not json"), None);
        assert_eq!(parse_record("   "), None);
    }

    #[test]
    fn parses_result_records() {
        let ok = r#"{"type":"result","subtype":"success","is_error":false,"num_turns":3,"duration_ms":1200,"session_id":"abc"}"#;
        assert_eq!(
            parse_record(ok),
            Some(StreamRecord::Finished {
                session_id: Some("abc".into()),
                num_turns: 3,
                duration_ms: 1200
            })
        );

        let failed = r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#;
        assert_eq!(
            parse_record(failed),
            Some(StreamRecord::Failed("error_max_turns".into()))
        );

        let with_msg = r#"{"type":"result","subtype":"error","error":"rate limited"}"#;
        assert_eq!(
            parse_record(with_msg),
            Some(StreamRecord::Failed("rate limited".into()))
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("héllo", 2), "h...");
    }

    #[cfg(unix)]
    mod fake_cli {
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        use super::*;

        const SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "9.9.9 (fake)"
  exit 0
fi
echo "$@" >> "$(dirname "$0")/args.log"
echo '{"type":"system","subtype":"init","session_id":"sess-42","model":"fake"}'
echo '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t","name":"Skill","input":{}}]}}'
echo '{"type":"assistant","message":{"content":[{"type":"text","text":"Vault Updated"}]}}'
echo '{"type":"result","subtype":"success","is_error":false,"num_turns":1,"duration_ms":5,"session_id":"sess-42"}'
"#;

        fn install(dir: &Path) -> AgentSettings {
            let path = dir.join("claude");
            std::fs::write(&path, SCRIPT).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            AgentSettings {
                cli_path: path.to_string_lossy().to_string(),
                workspace: dir.to_string_lossy().to_string(),
                ..AgentSettings::default()
            }
        }

        async fn collect(mut turn: Turn) -> Vec<ResponseEvent> {
            let mut out = Vec::new();
            while let Some(item) = turn.recv().await {
                out.push(item.unwrap());
            }
            out
        }

        #[tokio::test]
        async fn streams_events_and_resumes_conversation() {
            let dir = tempfile::tempdir().unwrap();
            let session = ClaudeSession::open(install(dir.path())).await.unwrap();

            let first = collect(session.query("first question").await.unwrap()).await;
            assert_eq!(
                first,
                vec![ResponseEvent::tool_use("Skill"), ResponseEvent::text("Vault Updated")]
            );
            let _ = collect(session.query("second question").await.unwrap()).await;
            session.close().await;

            let log = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
            let calls: Vec<&str> = log.lines().collect();
            assert_eq!(calls.len(), 2);
            assert!(!calls[0].contains("--resume"));
            assert!(calls[1].contains("--resume sess-42"));
        }

        #[tokio::test]
        async fn query_after_close_fails() {
            let dir = tempfile::tempdir().unwrap();
            let session = ClaudeSession::open(install(dir.path())).await.unwrap();
            session.close().await;
            session.close().await;
            assert!(session.query("late").await.is_err());
        }

        #[tokio::test]
        async fn missing_cli_fails_fast() {
            let settings = AgentSettings {
                cli_path: "/nonexistent/claude".into(),
                ..AgentSettings::default()
            };
            let err = ClaudeSession::open(settings).await.err().unwrap();
            assert!(err.to_string().contains("CLAUDE_CLI_PATH"));
        }
    }
}

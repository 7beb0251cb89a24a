// ─── Subprocess Output ───
// Line-by-line streaming of child stdout/stderr into the log, with a bounded
// copy kept for error reports.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Lines retained for error messages.
const CAPTURED_LINES: usize = 200;

#[derive(Debug, Clone, Copy)]
enum Channel {
    Stdout,
    Stderr,
}

/// Output of a running child, mirrored into the log as it arrives.
pub struct CapturedOutput {
    lines: Arc<Mutex<VecDeque<String>>>,
    readers: Vec<JoinHandle<()>>,
}

impl CapturedOutput {
    /// Take the child's piped stdout and stderr. stdout lines are logged at
    /// `info`, stderr at `warn`, both prefixed with `[tag]`.
    pub fn attach(child: &mut Child, tag: &'static str) -> Self {
        let lines = Arc::new(Mutex::new(VecDeque::new()));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tag, Channel::Stdout, lines.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tag, Channel::Stderr, lines.clone()));
        }
        Self { lines, readers }
    }

    /// Wait for both channels to close and return the captured text.
    pub async fn finish(self) -> String {
        for reader in self.readers {
            let _ = reader.await;
        }
        match self.lines.lock() {
            Ok(lines) => lines.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        }
    }
}

fn spawn_reader<R>(
    stream: R,
    tag: &'static str,
    channel: Channel,
    sink: Arc<Mutex<VecDeque<String>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match channel {
                Channel::Stdout => info!("[{}] {}", tag, line),
                Channel::Stderr => warn!("[{}] {}", tag, line),
            }
            if let Ok(mut lines) = sink.lock() {
                if lines.len() == CAPTURED_LINES {
                    lines.pop_front();
                }
                lines.push_back(line);
            }
        }
    })
}

/// Copy-pasteable rendering of `cmd` for the log.
pub fn format_command_for_logs(cmd: &Command) -> String {
    let cmd = cmd.as_std();
    let program = shell_escape(&cmd.get_program().to_string_lossy());
    let args = cmd
        .get_args()
        .map(|arg| shell_escape(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;

    #[test]
    fn command_rendering_quotes_only_when_needed() {
        let mut cmd = Command::new("java");
        cmd.args(["-Xmx2G", "-cp", "a.jar:b c.jar", "Main", ""]);
        assert_eq!(
            format_command_for_logs(&cmd),
            "java -Xmx2G -cp \"a.jar:b c.jar\" Main \"\""
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_both_channels() {
        let mut child = Command::new("sh")
            .args(["-c", "echo out; echo err >&2; echo; echo done"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let output = CapturedOutput::attach(&mut child, "test");
        child.wait().await.unwrap();
        let text = output.finish().await;

        for expected in ["out", "err", "done"] {
            assert!(text.lines().any(|l| l == expected), "{text}");
        }
        assert_eq!(text.lines().count(), 3);
    }
}

/// Lifecycle of the external Solargraph server.
///
/// A [`ServerSession`] is either *attached* to a server somebody else runs
/// (the endpoint is known up front) or *spawned* by us.  A spawned server
/// announces the port it listens on in its output; the session watches
/// stdout and stderr for a ready line and publishes the endpoint once it
/// appears.  The HTTP transport asks the session for the endpoint on every
/// request, so nothing about the server lives in process-wide globals.
///
/// Two ready-line formats are understood:
///
/// - a structured line: `{"event":"ready","port":7657}`
/// - Solargraph's own startup log, which contains `port=7657`
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tower_lsp::lsp_types::Url;

use crate::config::{BundlerMode, ServerConfig};
use crate::error::SessionError;

static PORT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"port=([0-9]+)").expect("port pattern is a valid regex"));

/// Where the session is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Not started, or started and waiting for the ready line.
    Pending,
    Ready(Url),
    /// The server's output closed (the process died or was stopped).
    Exited,
}

#[derive(Debug, Deserialize)]
struct ReadySignal {
    event: String,
    port: u16,
}

#[derive(Debug)]
pub struct ServerSession {
    config: ServerConfig,
    attached: bool,
    state: watch::Sender<Readiness>,
    child: Mutex<Option<Child>>,
}

impl ServerSession {
    /// A session for a server that is already listening on `host:port`.
    pub fn attach(host: &str, port: u16) -> Result<Self, SessionError> {
        let url = endpoint_url(host, port)
            .ok_or_else(|| SessionError::InvalidEndpoint(format!("{}:{}", host, port)))?;
        let (state, _) = watch::channel(Readiness::Ready(url));
        Ok(Self {
            config: ServerConfig {
                host: host.to_string(),
                port: Some(port),
                ..ServerConfig::default()
            },
            attached: true,
            state,
            child: Mutex::new(None),
        })
    }

    /// A session that will spawn the server on [`start`](Self::start).
    pub fn spawned(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(Readiness::Pending);
        Self {
            config,
            attached: false,
            state,
            child: Mutex::new(None),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn readiness(&self) -> Readiness {
        self.state.borrow().clone()
    }

    /// The server's base URL, once it is ready.
    pub fn endpoint(&self) -> Option<Url> {
        match &*self.state.borrow() {
            Readiness::Ready(url) => Some(url.clone()),
            _ => None,
        }
    }

    /// Spawn the server in `workspace`.
    ///
    /// Does nothing for attached sessions or when a process is already
    /// running.  Must be called from within a tokio runtime.
    pub fn start(&self, workspace: Option<&Path>) -> Result<(), SessionError> {
        if self.attached {
            return Ok(());
        }
        if self.config.command.is_empty() {
            return Err(SessionError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty server command"),
            });
        }
        let mut guard = self.child.lock();
        if guard.is_some() {
            return Ok(());
        }

        let argv = command_line(&self.config.command, self.config.bundler, workspace);
        tracing::info!("starting Solargraph server: {}", argv.join(" "));

        let mut command = build_command(&argv, workspace);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|source| SessionError::Spawn {
            command: argv.join(" "),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        if stdout.is_none() && stderr.is_none() {
            return Err(SessionError::NoOutput);
        }

        self.state.send_replace(Readiness::Pending);
        tokio::spawn(watch_output(
            stdout.map(|s| BufReader::new(s).lines()),
            stderr.map(|s| BufReader::new(s).lines()),
            self.config.host.clone(),
            self.state.clone(),
        ));
        *guard = Some(child);
        drop(guard);

        if self.config.document_gems {
            document_gems(self.config.bundler, workspace);
        }
        Ok(())
    }

    /// Wait until the server has announced its port.
    pub async fn await_ready(&self, timeout: Duration) -> Result<Url, SessionError> {
        let mut rx = self.state.subscribe();
        let wait = async {
            loop {
                match &*rx.borrow_and_update() {
                    Readiness::Ready(url) => return Ok(url.clone()),
                    Readiness::Exited => return Err(SessionError::Exited),
                    Readiness::Pending => {}
                }
                if rx.changed().await.is_err() {
                    return Err(SessionError::Exited);
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| SessionError::ReadyTimeout(timeout))?
    }

    /// Kill the spawned server, if any.
    pub async fn stop(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            tracing::info!("stopping Solargraph server");
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill Solargraph server: {}", e);
            }
            self.state.send_replace(Readiness::Exited);
        }
    }
}

/// Extract the port from a server output line, if it is a ready line.
pub fn parse_ready_line(line: &str) -> Option<u16> {
    let trimmed = line.trim();
    if trimmed.starts_with('{')
        && let Ok(signal) = serde_json::from_str::<ReadySignal>(trimmed)
    {
        return (signal.event == "ready").then_some(signal.port);
    }
    PORT_PATTERN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The full argument vector for `command` under the given bundler mode.
///
/// `bundle exec` is prepended when bundler applies; on Windows the whole
/// line goes through `powershell` so that batch shims resolve.
pub fn command_line(command: &[String], bundler: BundlerMode, workspace: Option<&Path>) -> Vec<String> {
    let mut argv = Vec::with_capacity(command.len() + 3);
    if cfg!(windows) {
        argv.push("powershell".to_string());
    }
    if uses_bundler(bundler, workspace) {
        argv.push("bundle".to_string());
        argv.push("exec".to_string());
    }
    argv.extend(command.iter().cloned());
    argv
}

fn uses_bundler(mode: BundlerMode, workspace: Option<&Path>) -> bool {
    match mode {
        BundlerMode::Always => true,
        BundlerMode::Never => false,
        BundlerMode::Auto => workspace.is_some_and(|w| w.join("Gemfile").is_file()),
    }
}

fn build_command(argv: &[String], workspace: Option<&Path>) -> Command {
    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    if let Some(dir) = workspace {
        command.current_dir(dir);
    }
    command
}

fn endpoint_url(host: &str, port: u16) -> Option<Url> {
    Url::parse(&format!("http://{}:{}/", host, port)).ok()
}

/// Generate YARD documentation for installed gems in the background.
fn document_gems(bundler: BundlerMode, workspace: Option<&Path>) {
    let argv = command_line(&["yard".to_string(), "gems".to_string()], bundler, workspace);
    let mut command = build_command(&argv, workspace);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    match command.spawn() {
        Ok(mut child) => {
            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => tracing::debug!("`yard gems` finished: {}", status),
                    Err(e) => tracing::debug!("`yard gems` failed: {}", e),
                }
            });
        }
        Err(e) => tracing::warn!("could not run `{}`: {}", argv.join(" "), e),
    }
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let reader = lines.as_mut()?;
    match reader.next_line().await {
        Ok(Some(line)) => Some(line),
        Ok(None) => {
            *lines = None;
            None
        }
        Err(e) => {
            tracing::debug!("error reading Solargraph output: {}", e);
            *lines = None;
            None
        }
    }
}

/// Log the server's output and publish the endpoint on the first ready
/// line.  Marks the session exited once both streams close.
async fn watch_output<O, E>(
    mut stdout: Option<Lines<O>>,
    mut stderr: Option<Lines<E>>,
    host: String,
    state: watch::Sender<Readiness>,
) where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    loop {
        let (stream, line) = tokio::select! {
            Some(line) = next_line(&mut stdout) => ("stdout", line),
            Some(line) = next_line(&mut stderr) => ("stderr", line),
            else => break,
        };
        tracing::debug!("[{} from Solargraph server] {}", stream, line);

        let pending = matches!(*state.borrow(), Readiness::Pending);
        if pending && let Some(port) = parse_ready_line(&line) {
            match endpoint_url(&host, port) {
                Some(url) => {
                    tracing::info!("Solargraph server listening on {}", url);
                    state.send_replace(Readiness::Ready(url));
                }
                None => tracing::error!("invalid Solargraph endpoint {}:{}", host, port),
            }
        }
    }

    tracing::warn!("Solargraph server output closed");
    state.send_replace(Readiness::Exited);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_ready_line() {
        assert_eq!(parse_ready_line(r#"{"event":"ready","port":7657}"#), Some(7657));
        assert_eq!(parse_ready_line(r#"{"event":"starting","port":7657}"#), None);
    }

    #[test]
    fn test_parse_legacy_port_line() {
        assert_eq!(
            parse_ready_line("[2024-01-01 10:00:00] INFO  WEBrick::HTTPServer#start: pid=42 port=7657"),
            Some(7657)
        );
        assert_eq!(parse_ready_line("INFO  WEBrick 1.8.1"), None);
        assert_eq!(parse_ready_line("port=99999999"), None);
    }

    #[test]
    fn test_command_line_bundler_modes() {
        let command = vec!["solargraph".to_string(), "server".to_string()];
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let never = command_line(&command, BundlerMode::Never, Some(dir.path()));
        assert_eq!(never.last().map(String::as_str), Some("server"));
        assert!(!never.contains(&"bundle".to_string()));

        let auto_without_gemfile = command_line(&command, BundlerMode::Auto, Some(dir.path()));
        assert!(!auto_without_gemfile.contains(&"bundle".to_string()));

        std::fs::write(dir.path().join("Gemfile"), "source 'https://rubygems.org'\n")
            .expect("failed to write Gemfile");
        let auto_with_gemfile = command_line(&command, BundlerMode::Auto, Some(dir.path()));
        let tail: Vec<&str> = auto_with_gemfile.iter().rev().take(4).rev().map(String::as_str).collect();
        assert_eq!(tail, vec!["bundle", "exec", "solargraph", "server"]);

        let always = command_line(&command, BundlerMode::Always, None);
        assert!(always.contains(&"bundle".to_string()));
    }

    #[tokio::test]
    async fn test_attached_session_is_ready() {
        let session = ServerSession::attach("127.0.0.1", 7657).unwrap();
        assert!(session.is_attached());
        let url = session.await_ready(Duration::from_millis(10)).await.unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:7657/");
        session.start(None).unwrap();
        session.stop().await;
        assert_eq!(session.endpoint(), Some(url));
    }

    #[tokio::test]
    async fn test_unstarted_spawned_session_times_out() {
        let session = ServerSession::spawned(ServerConfig::default());
        assert_eq!(session.endpoint(), None);
        let err = session.await_ready(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, SessionError::ReadyTimeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_session_reads_port_from_output() {
        let config = ServerConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo 'booting' ; echo 'INFO WEBrick::HTTPServer#start: pid=1 port=45678' >&2 ; sleep 5".to_string(),
            ],
            bundler: BundlerMode::Never,
            document_gems: false,
            ..ServerConfig::default()
        };
        let session = ServerSession::spawned(config);
        session.start(None).unwrap();

        let url = session.await_ready(Duration::from_secs(5)).await.unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:45678/");
        assert_eq!(session.endpoint(), Some(url));

        session.stop().await;
        assert_eq!(session.readiness(), Readiness::Exited);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_session_reports_early_exit() {
        let config = ServerConfig {
            command: vec!["sh".to_string(), "-c".to_string(), "echo 'no port here'".to_string()],
            bundler: BundlerMode::Never,
            document_gems: false,
            ..ServerConfig::default()
        };
        let session = ServerSession::spawned(config);
        session.start(None).unwrap();

        let err = session.await_ready(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, SessionError::Exited));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let config = ServerConfig {
            command: vec!["definitely-not-a-real-solargraph-binary".to_string()],
            bundler: BundlerMode::Never,
            document_gems: false,
            ..ServerConfig::default()
        };
        let session = ServerSession::spawned(config);
        let err = session.start(None).unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }
}

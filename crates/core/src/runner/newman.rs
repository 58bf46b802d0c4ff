//! Runner backed by the `newman` command line tool.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::RunnerConfig;

use super::error::RunnerError;
use super::traits::CollectionRunner;
use super::types::{RequestInfo, RunEvent, RunOptions, RunSummary};

/// Name of the JSON report inside the per-run scratch directory.
const REPORT_FILE: &str = "report.json";

/// Runs collections by spawning `newman run` and reading its JSON report.
///
/// Newman exits non-zero when assertions fail; that alone does not fail the
/// run. Only a run-level error in the report, or a missing report, does.
pub struct NewmanRunner {
    config: RunnerConfig,
}

impl NewmanRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(RunnerConfig::default())
    }

    /// Builds the `newman run` argument list.
    fn build_args(&self, options: &RunOptions, report_path: &Path) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            options.collection.to_string_lossy().to_string(),
            "--environment".to_string(),
            options.environment.to_string_lossy().to_string(),
        ];

        if options.insecure {
            args.push("--insecure".to_string());
        }

        if let Some(ref export) = options.export_environment {
            args.extend([
                "--export-environment".to_string(),
                export.to_string_lossy().to_string(),
            ]);
        }

        if let Some(ref data) = options.iteration_data {
            args.extend([
                "--iteration-data".to_string(),
                data.to_string_lossy().to_string(),
            ]);
            // The row count is advisory; newman derives iterations from the records it parses
        }

        let mut reporters: Vec<&str> = self
            .config
            .reporters
            .iter()
            .map(String::as_str)
            .filter(|r| *r != "json")
            .collect();
        reporters.push("json");
        args.extend([
            "--reporters".to_string(),
            reporters.join(","),
            "--reporter-json-export".to_string(),
            report_path.to_string_lossy().to_string(),
        ]);

        args.extend(self.config.extra_args.iter().cloned());
        args
    }

    fn spawn_error(&self, e: std::io::Error) -> RunnerError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunnerError::ExecutableNotFound {
                path: self.config.newman_path.clone(),
            }
        } else {
            RunnerError::spawn_failed(e.to_string())
        }
    }
}

#[async_trait]
impl CollectionRunner for NewmanRunner {
    fn name(&self) -> &str {
        "newman"
    }

    async fn run(
        &self,
        options: RunOptions,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<(), RunnerError> {
        let scratch = tempfile::Builder::new().prefix("batchman-run-").tempdir()?;
        let report_path = scratch.path().join(REPORT_FILE);
        let args = self.build_args(&options, &report_path);

        debug!(newman = %self.config.newman_path.display(), ?args, "Spawning newman");

        let mut child = Command::new(&self.config.newman_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "batchman::newman", "{}", line);
            }
        }

        let status = child.wait().await?;
        let stderr_output = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        let report = match tokio::fs::read_to_string(&report_path).await {
            Ok(report) => report,
            Err(_) => {
                let mut message = format!("newman exited with {} without a report", status);
                let stderr_output = stderr_output.trim();
                if !stderr_output.is_empty() {
                    message.push_str(": ");
                    message.push_str(stderr_output);
                }
                let _ = events.send(RunEvent::done_err(message)).await;
                return Ok(());
            }
        };

        match parse_report(&report) {
            Ok((request_events, summary)) => {
                for event in request_events {
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                let _ = events.send(RunEvent::done_ok(Some(summary))).await;
            }
            Err(e) => {
                let _ = events.send(RunEvent::done_err(e.to_string())).await;
            }
        }

        Ok(())
    }

    async fn validate(&self) -> Result<(), RunnerError> {
        let output = Command::new(&self.config.newman_path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(RunnerError::spawn_failed(format!(
                "`{} --version` failed: {}",
                self.config.newman_path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "newman available"
        );
        Ok(())
    }
}

#[derive(Deserialize)]
struct Report {
    run: ReportRun,
}

#[derive(Deserialize)]
struct ReportRun {
    #[serde(default)]
    stats: ReportStats,
    #[serde(default)]
    executions: Vec<ReportExecution>,
    #[serde(default)]
    failures: Vec<ReportFailure>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize, Default)]
struct ReportStats {
    #[serde(default)]
    iterations: ReportCounter,
    #[serde(default)]
    requests: ReportCounter,
    #[serde(default)]
    assertions: ReportCounter,
}

#[derive(Deserialize, Default)]
struct ReportCounter {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    failed: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportExecution {
    #[serde(default)]
    item: Option<ReportItem>,
    #[serde(default)]
    request: Option<ReportRequest>,
    #[serde(default)]
    response: Option<ReportResponse>,
    #[serde(default)]
    request_error: Option<Value>,
}

#[derive(Deserialize)]
struct ReportItem {
    name: Option<String>,
}

#[derive(Deserialize)]
struct ReportRequest {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    url: Value,
}

#[derive(Deserialize)]
struct ReportResponse {
    code: Option<u16>,
}

#[derive(Deserialize)]
struct ReportFailure {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    source: Option<ReportItem>,
}

/// Converts a newman JSON report into request events plus the run summary.
fn parse_report(report: &str) -> Result<(Vec<RunEvent>, RunSummary), RunnerError> {
    let report: Report = serde_json::from_str(report)
        .map_err(|e| RunnerError::report_parse(format!("invalid newman report: {}", e)))?;
    let run = report.run;

    let mut events = Vec::with_capacity(run.executions.len() * 2);
    for execution in &run.executions {
        let request = RequestInfo {
            name: execution.item.as_ref().and_then(|i| i.name.clone()),
            method: execution.request.as_ref().and_then(|r| r.method.clone()),
            url: execution
                .request
                .as_ref()
                .map(|r| render_url(&r.url))
                .unwrap_or_default(),
        };
        events.push(RunEvent::BeforeRequest {
            request: request.clone(),
            error: None,
        });
        events.push(RunEvent::Request {
            request,
            status: execution.response.as_ref().and_then(|r| r.code),
            error: execution.request_error.as_ref().map(error_message),
        });
    }

    let failures = run
        .failures
        .iter()
        .map(|f| {
            let source = f
                .source
                .as_ref()
                .and_then(|s| s.name.clone())
                .unwrap_or_else(|| "<unknown>".to_string());
            let message = f.error.as_ref().map(error_message).unwrap_or_default();
            format!("{}: {}", source, message)
        })
        .collect();

    let summary = RunSummary {
        iterations: run.stats.iterations.total,
        requests_total: run.stats.requests.total,
        requests_failed: run.stats.requests.failed,
        assertions_total: run.stats.assertions.total,
        assertions_failed: run.stats.assertions.failed,
        error: run
            .error
            .as_ref()
            .filter(|e| !e.is_null())
            .map(error_message),
        failures,
    };

    Ok((events, summary))
}

/// Best-effort text for an error value (string, `{message}` object, or raw JSON).
fn error_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

/// Renders a request URL as newman serializes it: a plain string or a
/// postman URL object (`raw`, or `protocol`/`host`/`path` parts).
fn render_url(url: &Value) -> String {
    match url {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(raw) = map.get("raw").and_then(Value::as_str) {
                return raw.to_string();
            }
            let join = |key: &str, sep: &str| -> String {
                map.get(key)
                    .and_then(Value::as_array)
                    .map(|parts| {
                        parts
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(sep)
                    })
                    .unwrap_or_default()
            };

            let mut rendered = String::new();
            if let Some(protocol) = map.get("protocol").and_then(Value::as_str) {
                rendered.push_str(protocol);
                rendered.push_str("://");
            }
            rendered.push_str(&join("host", "."));
            if let Some(port) = map.get("port").and_then(Value::as_str) {
                rendered.push(':');
                rendered.push_str(port);
            }
            let path = join("path", "/");
            if !path.is_empty() {
                rendered.push('/');
                rendered.push_str(&path);
            }
            rendered
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn runner() -> NewmanRunner {
        NewmanRunner::with_defaults()
    }

    #[test]
    fn test_build_args_auth_phase() {
        let options = RunOptions::new("auth.json", "env.json").with_export_environment("env.json");
        let args = runner().build_args(&options, Path::new("/tmp/r/report.json"));

        assert_eq!(&args[..4], &["run", "auth.json", "--environment", "env.json"]);
        assert!(args.contains(&"--insecure".to_string()));
        let export = args.iter().position(|a| a == "--export-environment").unwrap();
        assert_eq!(args[export + 1], "env.json");
        assert!(!args.contains(&"--iteration-data".to_string()));
        let reporters = args.iter().position(|a| a == "--reporters").unwrap();
        assert_eq!(args[reporters + 1], "cli,json");
        assert_eq!(args.last().unwrap(), "/tmp/r/report.json");
    }

    #[test]
    fn test_build_args_update_phase() {
        let options =
            RunOptions::new("update.json", "env.json").with_iteration_data("input1.csv", Some(4));
        let args = runner().build_args(&options, Path::new("report.json"));

        let data = args.iter().position(|a| a == "--iteration-data").unwrap();
        assert_eq!(args[data + 1], "input1.csv");
        assert!(!args.contains(&"--iteration-count".to_string()));
    }

    #[test]
    fn test_build_args_line_count_never_drives_iterations() {
        // Two CSV records, three lines: a quoted field spans a line break
        let rows = crate::dataset::count_data_rows("id,note\n1,\"line one\nline two\"\n2,c\n");
        assert_eq!(rows, 3);

        let options = RunOptions::new("update.json", "env.json")
            .with_iteration_data("multiline.csv", Some(rows));
        let args = runner().build_args(&options, Path::new("report.json"));
        assert!(!args.contains(&"--iteration-count".to_string()));
        assert!(!args.contains(&rows.to_string()));
    }

    #[test]
    fn test_build_args_zero_iterations_not_forwarded() {
        let options =
            RunOptions::new("update.json", "env.json").with_iteration_data("header.csv", Some(0));
        let args = runner().build_args(&options, Path::new("report.json"));
        assert!(args.contains(&"--iteration-data".to_string()));
        assert!(!args.contains(&"--iteration-count".to_string()));
    }

    #[test]
    fn test_build_args_dedups_json_reporter_and_appends_extra() {
        let runner = NewmanRunner::new(RunnerConfig {
            newman_path: PathBuf::from("newman"),
            reporters: vec!["json".to_string(), "htmlextra".to_string()],
            extra_args: vec!["--bail".to_string()],
        });
        let args = runner.build_args(&RunOptions::new("c.json", "e.json"), Path::new("r.json"));
        let reporters = args.iter().position(|a| a == "--reporters").unwrap();
        assert_eq!(args[reporters + 1], "htmlextra,json");
        assert_eq!(args.last().unwrap(), "--bail");
    }

    #[test]
    fn test_parse_report_executions_and_stats() {
        let report = json!({
            "collection": {"info": {"name": "Main"}},
            "run": {
                "stats": {
                    "iterations": {"total": 2, "pending": 0, "failed": 0},
                    "requests": {"total": 2, "pending": 0, "failed": 1},
                    "assertions": {"total": 4, "pending": 0, "failed": 1}
                },
                "executions": [
                    {
                        "item": {"name": "Update record"},
                        "request": {
                            "method": "PUT",
                            "url": {"protocol": "https", "host": ["api", "test"], "path": ["v1", "records"]}
                        },
                        "response": {"code": 200, "status": "OK"}
                    },
                    {
                        "item": {"name": "Update record"},
                        "request": {"method": "PUT", "url": "https://api.test/v1/records"},
                        "requestError": {"message": "ECONNRESET"}
                    }
                ],
                "failures": [
                    {"error": {"name": "AssertionError", "message": "expected 200"}, "source": {"name": "Update record"}}
                ],
                "error": null
            }
        })
        .to_string();

        let (events, summary) = parse_report(&report).unwrap();
        assert_eq!(events.len(), 4);
        match &events[1] {
            RunEvent::Request { request, status, error } => {
                assert_eq!(request.url, "https://api.test/v1/records");
                assert_eq!(request.method.as_deref(), Some("PUT"));
                assert_eq!(*status, Some(200));
                assert!(error.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[3] {
            RunEvent::Request { status, error, .. } => {
                assert!(status.is_none());
                assert_eq!(error.as_deref(), Some("ECONNRESET"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.requests_failed, 1);
        assert_eq!(summary.assertions_total, 4);
        assert!(summary.run_error().is_none());
        assert_eq!(summary.failures, vec!["Update record: expected 200".to_string()]);
    }

    #[test]
    fn test_parse_report_run_error() {
        let report = json!({
            "run": {"error": {"message": "collection could not be loaded"}}
        })
        .to_string();
        let (events, summary) = parse_report(&report).unwrap();
        assert!(events.is_empty());
        assert_eq!(summary.run_error(), Some("collection could not be loaded"));
    }

    #[test]
    fn test_parse_report_invalid_json() {
        let err = parse_report("not json").unwrap_err();
        assert!(matches!(err, RunnerError::ReportParse { .. }));
    }

    #[test]
    fn test_render_url_variants() {
        assert_eq!(render_url(&json!("http://a/b")), "http://a/b");
        assert_eq!(render_url(&json!({"raw": "{{base}}/x"})), "{{base}}/x");
        assert_eq!(
            render_url(&json!({"protocol": "http", "host": ["localhost"], "port": "8443", "path": ["a", "b"]})),
            "http://localhost:8443/a/b"
        );
        assert_eq!(render_url(&Value::Null), "");
    }

    #[tokio::test]
    async fn test_validate_missing_executable() {
        let runner = NewmanRunner::new(RunnerConfig {
            newman_path: PathBuf::from("/nonexistent/bin/newman"),
            ..Default::default()
        });
        let err = runner.validate().await.unwrap_err();
        assert!(matches!(err, RunnerError::ExecutableNotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_missing_executable_is_an_error() {
        let runner = NewmanRunner::new(RunnerConfig {
            newman_path: PathBuf::from("/nonexistent/bin/newman"),
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(8);
        let err = runner
            .run(RunOptions::new("c.json", "e.json"), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ExecutableNotFound { .. }));
        assert!(rx.recv().await.is_none());
    }
}

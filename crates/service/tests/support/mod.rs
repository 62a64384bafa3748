#![forbid(unsafe_code)]
#![allow(dead_code)]

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub(crate) struct Server {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    storage_dir: PathBuf,
    next_id: i64,
}

impl Server {
    pub(crate) fn start(test_name: &str) -> Self {
        let storage_dir = temp_dir(test_name);
        let mut child = Command::new(env!("CARGO_BIN_EXE_crm_service"))
            .arg("--storage-dir")
            .arg(&storage_dir)
            .env_remove("CRM_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn crm_service");

        let stdin = child.stdin.take().expect("stdin");
        let stdout = BufReader::new(child.stdout.take().expect("stdout"));

        Self {
            child,
            stdin,
            stdout,
            storage_dir,
            next_id: 1,
        }
    }

    pub(crate) fn send_line(&mut self, line: &str) {
        writeln!(self.stdin, "{line}").expect("write request");
        self.stdin.flush().expect("flush request");
    }

    pub(crate) fn recv(&mut self) -> Value {
        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read response");
        assert!(!line.trim().is_empty(), "empty response line");
        serde_json::from_str(&line).expect("parse response json")
    }

    pub(crate) fn request(&mut self, req: Value) -> Value {
        self.send_line(&req.to_string());
        self.recv()
    }

    /// Sends `method` with a fresh id and returns the whole response envelope.
    pub(crate) fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let resp = self.request(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }));
        assert_eq!(resp.get("id"), Some(&json!(id)), "response id mismatch");
        resp
    }

    /// Like `call`, but panics unless the call succeeded; returns `result`.
    pub(crate) fn ok(&mut self, method: &str, params: Value) -> Value {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("success").and_then(|v| v.as_bool()),
            Some(true),
            "{method} failed: {resp}"
        );
        resp.get("result").cloned().expect("result")
    }

    /// Like `call`, but panics unless the call failed; returns `error`.
    pub(crate) fn err(&mut self, method: &str, params: Value) -> Value {
        let resp = self.call(method, params);
        assert_eq!(
            resp.get("success").and_then(|v| v.as_bool()),
            Some(false),
            "{method} unexpectedly succeeded: {resp}"
        );
        resp.get("error").cloned().expect("error")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.storage_dir);
    }
}

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("crm_service_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub(crate) fn agent(actor_id: &str) -> Value {
    json!({ "actor_id": actor_id, "scope": "owner" })
}

pub(crate) fn broker(actor_id: &str) -> Value {
    json!({ "actor_id": actor_id, "scope": "all" })
}

pub(crate) fn error_code(error: &Value) -> &str {
    error
        .get("code")
        .and_then(|v| v.as_str())
        .expect("error.code")
}

pub(crate) fn error_status(error: &Value) -> u64 {
    error
        .get("status")
        .and_then(|v| v.as_u64())
        .expect("error.status")
}

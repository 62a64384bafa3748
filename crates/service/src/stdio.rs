#![forbid(unsafe_code)]

use crate::protocol::{INVALID_REQUEST, JsonRpcRequest, PARSE_ERROR, json_rpc_error};
use crate::server::CrmServer;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};

fn write_newline_json(
    stdout: &mut std::io::StdoutLock<'_>,
    resp: &Value,
) -> Result<(), Box<dyn std::error::Error>> {
    writeln!(stdout, "{}", serde_json::to_string(resp)?)?;
    stdout.flush()?;
    Ok(())
}

fn handle_newline_request(
    server: &mut CrmServer,
    stdout: &mut std::io::StdoutLock<'_>,
    raw: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => {
            let resp = json_rpc_error(None, PARSE_ERROR, "Parse error");
            return write_newline_json(stdout, &resp);
        }
    };
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(_) => {
            let resp = json_rpc_error(id, INVALID_REQUEST, "Invalid Request");
            return write_newline_json(stdout, &resp);
        }
    };

    if let Some(resp) = server.handle(request) {
        write_newline_json(stdout, &resp)?;
    }
    Ok(())
}

/// One JSON-RPC message per line in, one response per line out. EOF ends the session.
pub(crate) fn run_stdio(server: &mut CrmServer) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut reader = BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            break;
        }
        let raw = line.trim();
        if raw.is_empty() {
            continue;
        }
        handle_newline_request(server, &mut stdout, raw)?;
    }
    log::debug!("stdin closed, shutting down");
    Ok(())
}

//! In-process stand-in for the switch's REST rule-table interface. Serves
//! the two endpoints the client uses over a real TCP socket and applies
//! filters server side, the way the real control plane does.

use anyhow::{Result, bail};
use flowcheck::{FlowFilter, Rule};
use slog::{Logger, info, o, warn};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

const DPID: u64 = 101;

/// The switch's flow table, shared between the REST server and whatever
/// plays the part of the forwarding engine.
#[derive(Clone)]
pub struct FlowTable(Arc<Mutex<Vec<Rule>>>);

impl FlowTable {
    pub fn install(&self, rule: Rule) {
        self.0.lock().unwrap().push(rule);
    }

    pub fn remove_where(&self, predicate: impl Fn(&Rule) -> bool) {
        self.0.lock().unwrap().retain(|rule| !predicate(rule));
    }

    fn snapshot(&self) -> Vec<Rule> {
        self.0.lock().unwrap().clone()
    }
}

pub struct MockSwitch {
    table: FlowTable,
    base_url: String,
}

impl MockSwitch {
    /// Bind an ephemeral port and serve the rule table from a background
    /// thread. The table starts with just the catch-all default rule.
    pub fn start(logger: &Logger) -> Result<MockSwitch> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let table = FlowTable(Arc::new(Mutex::new(vec![default_rule()])));
        let logger = logger.new(o!("switch" => DPID));
        info!(logger, "Rule-table source listening on {base_url}");

        let server_table = table.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                if let Err(e) = serve(stream, &server_table) {
                    warn!(logger, "Request failed: {e}");
                }
            }
        });

        Ok(MockSwitch { table, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn flow_table(&self) -> FlowTable {
        self.table.clone()
    }
}

/// The catch-all rule the pipeline always carries in the subscriber table.
fn default_rule() -> Rule {
    Rule {
        table_id: 0,
        priority: 0,
        match_fields: BTreeMap::new(),
        instructions: vec![],
    }
}

fn serve(mut stream: TcpStream, table: &FlowTable) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse()?;
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
        bail!("bad request line {request_line:?}");
    };

    let (status, payload) = match (method, path) {
        ("GET", "/stats/switches") => ("200 OK", serde_json::to_string(&[DPID])?),
        ("POST", p) if p == format!("/stats/flow/{DPID}") => {
            let filter: FlowFilter = serde_json::from_slice(&body)?;
            let rules: Vec<Rule> = table
                .snapshot()
                .into_iter()
                .filter(|rule| filter.matches(rule))
                .collect();
            let response = HashMap::from([(DPID.to_string(), rules)]);
            ("200 OK", serde_json::to_string(&response)?)
        }
        _ => ("404 Not Found", String::new()),
    };

    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    )?;
    stream.flush()?;
    Ok(())
}

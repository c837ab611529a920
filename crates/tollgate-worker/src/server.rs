//! Newline-delimited JSON server over a Unix socket.
//!
//! Each accepted connection gets its own worker. A connection runs three
//! tasks: the reader (this module), the worker executor, and a writer that
//! serializes every [`Reply`] onto the stream in the order it was queued.

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use tollgate_types::protocol::{Reply, Request};

use crate::config::LimitsConfig;
use crate::worker::{CancelSlot, WorkerHandle};

/// The socket server.
pub struct Server {
    socket_path: PathBuf,
    limits: LimitsConfig,
}

impl Server {
    pub fn new(socket_path: PathBuf, limits: LimitsConfig) -> Self {
        Self {
            socket_path,
            limits,
        }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("worker listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let limits = self.limits;
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, limits).await {
                            warn!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Serve one host over `reader`/`writer` until the host closes its side and
/// every queued command has been answered.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    limits: LimitsConfig,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (replies, outbox) = mpsc::unbounded_channel();
    let cancel = CancelSlot::default();
    let writer_task = tokio::spawn(write_replies(writer, outbox, cancel.clone()));
    let worker = WorkerHandle::spawn(limits, replies, cancel);
    debug!("connection opened");

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let read_result = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e),
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match serde_json::from_str::<Request>(text) {
            Ok(request) => worker.submit(request),
            Err(e) => worker.reject_line(format!("invalid request: {e}")),
        }
    };

    worker.finish().await;
    writer_task.await??;
    debug!("connection closed");
    Ok(read_result?)
}

/// Drain `outbox` onto `writer`, one JSON object per line. A failed write
/// means the host is gone, so running work is cancelled.
async fn write_replies<W>(
    mut writer: W,
    mut outbox: mpsc::UnboundedReceiver<Reply>,
    cancel: CancelSlot,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = outbox.recv().await {
        let mut json = serde_json::to_string(&reply)?;
        json.push('\n');
        let written = async {
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            cancel.cancel();
            return Err(e.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};

    use tollgate_crypto::encoding::decode_digest;
    use tollgate_pow::open::{OpenEntry, OpenRequest};
    use tollgate_pow::posw::{Commitment, PoswParams};
    use tollgate_pow::verify::{verify_openings, PoswStatement};
    use tollgate_types::wire::WireOpenEntry;

    struct Host {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
        server: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    impl Host {
        fn connect() -> Self {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let (server_read, server_write) = tokio::io::split(server);
            let server = tokio::spawn(handle_connection(
                server_read,
                server_write,
                LimitsConfig::default(),
            ));
            let (client_read, writer) = tokio::io::split(client);
            Self {
                lines: BufReader::new(client_read).lines(),
                writer,
                server,
            }
        }

        async fn send(&mut self, msg: Value) {
            self.send_raw(&msg.to_string()).await;
        }

        async fn send_raw(&mut self, text: &str) {
            self.writer
                .write_all(format!("{text}\n").as_bytes())
                .await
                .expect("write");
        }

        async fn next(&mut self) -> Value {
            let line = self
                .lines
                .next_line()
                .await
                .expect("read")
                .expect("connection open");
            serde_json::from_str(&line).expect("reply json")
        }

        /// Next completion for `rid`, collecting its progress on the way.
        async fn completion(&mut self, rid: Value) -> (Value, Vec<Value>) {
            let mut progress = Vec::new();
            loop {
                let msg = self.next().await;
                if msg["type"] == "PROGRESS" {
                    assert_eq!(msg["rid"], rid);
                    progress.push(msg);
                    continue;
                }
                assert_eq!(msg["rid"], rid, "out of order: {msg}");
                return (msg, progress);
            }
        }

        async fn close(mut self) {
            self.writer.shutdown().await.expect("shutdown");
            while self.lines.next_line().await.expect("read").is_some() {}
            self.server.await.expect("join").expect("serve");
        }
    }

    #[tokio::test]
    async fn test_commit_then_open_scenario() {
        let mut host = Host::connect();
        host.send(json!({
            "type": "INIT", "rid": 1, "bindingString": "scenario",
            "steps": 4, "yieldEvery": 1
        }))
        .await;
        let (reply, _) = host.completion(json!(1)).await;
        assert_eq!(reply["type"], "INIT_OK");

        host.send(json!({"type": "COMMIT", "rid": 2})).await;
        let (reply, progress) = host.completion(json!(2)).await;
        assert_eq!(reply["type"], "COMMIT_OK");
        let root_b64 = reply["rootB64"].as_str().expect("root").to_string();
        let nonce = reply["nonce"].as_str().expect("nonce").to_string();
        assert_eq!(root_b64.len(), 43);
        let chain: Vec<&Value> = progress.iter().filter(|p| p["phase"] == "chain").collect();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[3]["done"], 4);
        assert_eq!(chain[3]["total"], 4);

        host.send(json!({"type": "OPEN", "rid": "o", "indices": [2], "segLens": [2]}))
            .await;
        let (reply, _) = host.completion(json!("o")).await;
        assert_eq!(reply["type"], "OPEN_OK");
        assert_eq!(reply["opens"][0]["prev"], 0);

        let wire: Vec<WireOpenEntry> =
            serde_json::from_value(reply["opens"].clone()).expect("entries");
        let entries = wire
            .iter()
            .map(OpenEntry::try_from)
            .collect::<Result<Vec<_>, _>>()
            .expect("decode");
        let params = PoswParams::new("scenario", 4).expect("params");
        let commitment = Commitment {
            root: decode_digest(&root_b64).expect("root digest"),
            nonce,
            attempts: 1,
        };
        let statement = PoswStatement::new(&params, &commitment);
        let challenge = OpenRequest::new([2]).with_seg_lens([2]);
        verify_openings(&statement, &challenge, &entries).expect("verify");

        host.close().await;
    }

    #[tokio::test]
    async fn test_open_before_commit() {
        let mut host = Host::connect();
        host.send(json!({"type": "OPEN", "rid": 1, "indices": [1]})).await;
        let (reply, _) = host.completion(json!(1)).await;
        assert_eq!(reply["type"], "ERROR");
        assert_eq!(reply["reason"], "commit_missing");
        host.close().await;
    }

    #[tokio::test]
    async fn test_unknown_and_unparsable_lines() {
        let mut host = Host::connect();
        host.send(json!({"type": "RESET", "rid": 5})).await;
        let reply = host.next().await;
        assert_eq!(reply["type"], "ERROR");
        assert_eq!(reply["rid"], 5);
        assert_eq!(reply["reason"], "unknown_command");

        host.send_raw("{not json").await;
        let reply = host.next().await;
        assert_eq!(reply["reason"], "parse_error");
        assert!(reply["rid"].is_null());

        host.send_raw("").await;
        host.send(json!({"type": "CANCEL", "rid": 6})).await;
        let reply = host.next().await;
        assert_eq!(reply, json!({"type": "CANCEL_OK", "rid": 6}));
        host.close().await;
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_commit() {
        let mut host = Host::connect();
        // 64 leading zero bits: the grinder only stops when cancelled.
        host.send(json!({
            "type": "INIT", "rid": 1, "bindingString": "grind",
            "steps": 16, "hashcashBits": 64, "yieldEvery": 1
        }))
        .await;
        host.completion(json!(1)).await;

        host.send(json!({"type": "COMMIT", "rid": 2})).await;
        let first = host.next().await;
        assert_eq!(first["type"], "PROGRESS");

        host.send(json!({"type": "CANCEL", "rid": 3})).await;
        let mut cancel_ok = false;
        let mut aborted = false;
        while !(cancel_ok && aborted) {
            let msg = host.next().await;
            match msg["type"].as_str() {
                Some("PROGRESS") => assert_eq!(msg["rid"], 2),
                Some("CANCEL_OK") => cancel_ok = true,
                Some("ERROR") => {
                    assert_eq!(msg["rid"], 2);
                    assert_eq!(msg["reason"], "aborted");
                    aborted = true;
                }
                other => panic!("unexpected message {other:?}"),
            }
        }

        // A fresh INIT resets the token.
        host.send(json!({"type": "INIT", "rid": 4, "bindingString": "grind", "steps": 4}))
            .await;
        let (reply, _) = host.completion(json!(4)).await;
        assert_eq!(reply["type"], "INIT_OK");
        host.send(json!({"type": "COMMIT", "rid": 5})).await;
        let (reply, _) = host.completion(json!(5)).await;
        assert_eq!(reply["type"], "COMMIT_OK");
        host.close().await;
    }

    #[tokio::test]
    async fn test_dispose_then_reject() {
        let mut host = Host::connect();
        host.send(json!({"type": "INIT", "rid": 1, "bindingString": "d", "steps": 2}))
            .await;
        host.completion(json!(1)).await;
        host.send(json!({"type": "DISPOSE", "rid": 2})).await;
        let (reply, _) = host.completion(json!(2)).await;
        assert_eq!(reply["type"], "DISPOSE_OK");

        host.send(json!({"type": "COMMIT", "rid": 3})).await;
        let (reply, _) = host.completion(json!(3)).await;
        assert_eq!(reply["reason"], "disposed");

        host.send(json!({"type": "DISPOSE", "rid": 4})).await;
        let (reply, _) = host.completion(json!(4)).await;
        assert_eq!(reply["type"], "DISPOSE_OK");
        host.send(json!({"type": "CANCEL", "rid": 5})).await;
        let (reply, _) = host.completion(json!(5)).await;
        assert_eq!(reply["type"], "CANCEL_OK");
        host.close().await;
    }
}

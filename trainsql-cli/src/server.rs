//! The §6 line protocol over TCP: one task per accepted connection, each
//! owning its own `Session` against a shared `MVCC` handle. Framing is
//! newline-delimited UTF-8: the server writes the `trainSQL>>` prompt,
//! reads a `cmd: args` line, and responds with `OK: <body>\n` or
//! `ERROR: <msg>\n`.

use anyhow::Result;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use trainsql::mvcc::MVCC;
use trainsql::result::ResultSet;
use trainsql::session::Session;
use trainsql::storage::engine::Engine;

/// Runs the accept loop until the listener errors or is dropped. Never
/// returns on the happy path.
pub async fn serve<E: Engine + 'static>(listen_addr: &str, mvcc: MVCC<E>) -> Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!("trainsql server listening on {}", listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("accepted connection from {}", peer);
        let session_mvcc = mvcc.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(socket, session_mvcc).await {
                warn!("connection from {} ended with error: {}", peer, err);
            }
        });
    }
}

async fn handle_connection<E: Engine + 'static>(socket: TcpStream, mvcc: MVCC<E>) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut session = Session::new(mvcc);

    loop {
        write_half.write_all(b"trainSQL>> ").await?;
        write_half.flush().await?;

        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            // peer closed the connection
            return Ok(());
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, args) = match line.split_once(':') {
            Some((cmd, args)) => (cmd.trim(), args.trim()),
            None => (line, ""),
        };

        match cmd {
            "exit" => {
                write_half.write_all(b"OK: bye\n").await?;
                return Ok(());
            }
            "sql" => {
                let response = render_response(session.execute(args));
                write_half.write_all(response.as_bytes()).await?;
            }
            other => {
                write_half
                    .write_all(format!("ERROR: unknown command '{}'\n", other).as_bytes())
                    .await?;
            }
        }
    }
}

fn render_response(result: ResultSet) -> String {
    match result {
        ResultSet::Error { msg } => format!("ERROR: {}\n", msg),
        other => {
            let body = other.to_string().replace('\n', "\\n");
            format!("OK: {}\n", body)
        }
    }
}

//! Server accept and echo over loopback TCP.

mod common;

use evloom::io::Available;
use evloom::net::{self, Server, Session};
use evloom::{fiber, Scheduler};

async fn echo_session(mut session: Session) {
    loop {
        session.reader.refill(1024).await.expect("session refill");
        match session.reader.available() {
            Available::Eof => break,
            Available::Bytes(0) => {}
            Available::Bytes(_) => {
                let chunk = session.reader.buffer().to_vec();
                session.reader.consume(chunk.len());
                session.writer.write(&chunk);
                session.writer.flush().await.expect("session flush");
            }
        }
    }
    session.close();
}

#[test]
fn server_echoes_client_bytes() {
    common::init_logging();
    Scheduler::run(async {
        let server = Server::bind("127.0.0.1:0".parse().expect("addr"), 16).expect("bind");
        let addr = server.local_addr().expect("local addr");

        let serving = {
            let server = server.clone();
            async move {
                server.serve(echo_session).await.expect("serve");
            }
        };
        let client = {
            let server = server.clone();
            async move {
                let mut session = net::connect(addr).await.expect("connect");
                assert_eq!(session.peer_addr(), Some(addr));
                session.writer.write(b"ping");
                session.writer.flush().await.expect("client flush");

                let mut got = Vec::new();
                while got.len() < 4 {
                    session.reader.refill(64).await.expect("client refill");
                    match session.reader.available() {
                        Available::Eof => break,
                        Available::Bytes(0) => {}
                        Available::Bytes(_) => {
                            let chunk = session.reader.buffer().to_vec();
                            session.reader.consume(chunk.len());
                            got.extend(chunk);
                        }
                    }
                }
                assert_eq!(got, b"ping");
                session.close();
                server.close();
            }
        };
        fiber::join(serving, client).await;
    });
}

#[test]
fn server_close_is_idempotent() {
    common::init_logging();
    Scheduler::run(async {
        let server = Server::bind("127.0.0.1:0".parse().expect("addr"), 4).expect("bind");
        server.close();
        server.close();
        assert!(server.local_addr().is_err());
    });
}

#[test]
fn sessions_run_concurrently() {
    common::init_logging();
    Scheduler::run(async {
        let server = Server::bind("127.0.0.1:0".parse().expect("addr"), 16).expect("bind");
        let addr = server.local_addr().expect("local addr");

        let serving = {
            let server = server.clone();
            async move {
                server.serve(echo_session).await.expect("serve");
            }
        };
        let clients = {
            let server = server.clone();
            async move {
                let mut first = net::connect(addr).await.expect("connect first");
                let mut second = net::connect(addr).await.expect("connect second");
                // Interleave: the second session answers while the first
                // stays open.
                second.writer.write(b"b");
                second.writer.flush().await.expect("flush second");
                second.reader.refill(16).await.expect("refill second");
                assert_eq!(second.reader.buffer(), b"b");
                second.reader.consume(1);

                first.writer.write(b"a");
                first.writer.flush().await.expect("flush first");
                first.reader.refill(16).await.expect("refill first");
                assert_eq!(first.reader.buffer(), b"a");
                first.reader.consume(1);

                first.close();
                second.close();
                server.close();
            }
        };
        fiber::join(serving, clients).await;
    });
}

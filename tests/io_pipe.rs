//! Buffered pipe I/O: round trips, growth, EOF.

mod common;

use evloom::io::{self, Available};
use evloom::Scheduler;

/// Reads until `want` bytes arrive or the stream ends.
async fn read_exact(reader: &mut io::Reader, want: usize) -> Vec<u8> {
    let mut got = Vec::new();
    while got.len() < want {
        reader.refill(4096).await.expect("refill");
        match reader.available() {
            Available::Eof => break,
            Available::Bytes(0) => {}
            Available::Bytes(_) => {
                let chunk = reader.buffer().to_vec();
                reader.consume(chunk.len());
                got.extend(chunk);
            }
        }
    }
    got
}

#[test]
fn pipe_round_trip() {
    common::init_logging();
    Scheduler::run(async {
        let (mut reader, writer) = io::pipe().expect("pipe");
        writer.write(b"ping");
        writer.flush().await.expect("flush");
        let got = read_exact(&mut reader, 4).await;
        assert_eq!(got, b"ping");
        writer.close();
        reader.close();
    });
}

#[test]
fn writer_grows_past_default_capacity() {
    common::init_logging();
    Scheduler::run(async {
        let (mut reader, writer) = io::pipe().expect("pipe");

        let first: Vec<u8> = (0..3072u32).map(|i| (i % 251) as u8).collect();
        writer.write(&first);

        // The staging buffer starts at 4 KiB with 3 KiB committed, so a
        // 10 KB reservation must grow it.
        let second: Vec<u8> = (0..10_000u32).map(|i| (i % 249) as u8).collect();
        {
            let mut prepared = writer.prepare(second.len());
            prepared.copy_from_slice(&second);
            prepared.commit(second.len());
        }
        assert_eq!(writer.pending(), first.len() + second.len());

        writer.flush().await.expect("flush");
        assert_eq!(writer.pending(), 0);

        let got = read_exact(&mut reader, first.len() + second.len()).await;
        let mut expected = first;
        expected.extend_from_slice(&second);
        assert_eq!(got, expected);

        writer.close();
        reader.close();
    });
}

#[test]
fn reader_observes_eof_after_drain() {
    common::init_logging();
    Scheduler::run(async {
        let (mut reader, writer) = io::pipe().expect("pipe");
        writer.write(b"hi");
        writer.flush().await.expect("flush");
        writer.close();

        let mut got = Vec::new();
        loop {
            reader.refill(16).await.expect("refill");
            match reader.available() {
                Available::Eof => break,
                Available::Bytes(0) => {}
                Available::Bytes(_) => {
                    let chunk = reader.buffer().to_vec();
                    reader.consume(chunk.len());
                    got.extend(chunk);
                }
            }
        }
        assert_eq!(got, b"hi");
        assert_eq!(reader.available(), Available::Eof);
        reader.close();
    });
}

#[test]
fn transactions_commit_on_scope_exit() {
    common::init_logging();
    Scheduler::run(async {
        let (mut reader, writer) = io::pipe().expect("pipe");
        let staged = writer
            .with_transaction(8, |tx| {
                tx[..3].copy_from_slice(b"abc");
                tx.commit(3);
                3usize
            })
            .await;
        assert_eq!(staged, 3);
        writer.flush().await.expect("flush");
        let got = read_exact(&mut reader, 3).await;
        assert_eq!(got, b"abc");
        writer.close();
        reader.close();
    });
}

#[test]
fn uncommitted_transaction_stages_nothing() {
    common::init_logging();
    Scheduler::run(async {
        let (mut reader, writer) = io::pipe().expect("pipe");
        writer.with_transaction(8, |tx| tx[0] = b'x').await;
        assert_eq!(writer.pending(), 0);
        writer.write(b"ok");
        writer.flush().await.expect("flush");
        let got = read_exact(&mut reader, 2).await;
        assert_eq!(got, b"ok");
        writer.close();
        reader.close();
    });
}

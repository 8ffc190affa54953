use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use reqwest::blocking::Client;

use seqidx::domain::{Protocol, RemoteFileRef};
use seqidx::error::SeqidxError;
use seqidx::remote::{Fetcher, NetFetcher};

const BODY: &[u8] = b">chr1\nACGTACGTACGT\n";

/// Answers a single request: `/pub/genome.fa.gz` gets BODY, anything else 404.
fn serve_once() -> (u16, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).unwrap();
            if header == "\r\n" || header.is_empty() {
                break;
            }
        }
        let path = request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string();
        if path == "/pub/genome.fa.gz" {
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                BODY.len()
            )
            .unwrap();
            stream.write_all(BODY).unwrap();
        } else {
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
        }
        stream.flush().unwrap();
        path
    });
    (port, handle)
}

fn fetcher() -> NetFetcher {
    let client = Client::builder().no_proxy().build().unwrap();
    NetFetcher::from_parts(client, Duration::from_secs(5))
}

#[test]
fn http_body_is_streamed_into_sink() {
    let (port, server) = serve_once();
    let file = RemoteFileRef::new(Protocol::Http, "127.0.0.1", "/pub/", "genome.fa.gz").with_port(port);
    let mut sink = Vec::new();

    let bytes = fetcher().retrieve(&file, &mut sink).unwrap();

    assert_eq!(bytes, BODY.len() as u64);
    assert_eq!(sink, BODY);
    assert_eq!(server.join().unwrap(), "/pub/genome.fa.gz");
}

#[test]
fn http_error_status_is_a_transfer_error() {
    let (port, server) = serve_once();
    let file = RemoteFileRef::new(Protocol::Http, "127.0.0.1", "pub", "missing.gtf.gz").with_port(port);
    let mut sink = Vec::new();

    let err = fetcher().retrieve(&file, &mut sink).unwrap_err();

    assert_matches!(
        err,
        SeqidxError::Transfer { ref file, ref message }
            if file == "missing.gtf.gz" && message.contains("404")
    );
    assert!(sink.is_empty());
    server.join().unwrap();
}

#[test]
fn unreachable_ftp_host_is_a_transfer_error() {
    // Bind then drop to get a local port nothing listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let file = RemoteFileRef::new(Protocol::Ftp, "127.0.0.1", "pub", "genome.fa.gz").with_port(port);
    let mut sink = Vec::new();

    let err = fetcher().retrieve(&file, &mut sink).unwrap_err();

    assert_matches!(err, SeqidxError::Transfer { ref file, .. } if file == "genome.fa.gz");
}

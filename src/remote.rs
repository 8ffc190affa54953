use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tracing::debug;

use crate::domain::{Protocol, RemoteFileRef};
use crate::error::SeqidxError;

const ANONYMOUS: &str = "anonymous";

/// Retrieves one named remote file as a byte stream.
pub trait Fetcher: Send + Sync {
    /// Streams the file into `sink` and returns the number of bytes written.
    fn retrieve(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError>;
}

/// Fetcher speaking anonymous FTP and plain HTTP.
#[derive(Clone)]
pub struct NetFetcher {
    http: Client,
    timeout: Duration,
}

impl NetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SeqidxError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("seqidx/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SeqidxError::InvalidArgument(err.to_string()))?,
        );
        // Genome FASTA files take far longer than any sane total timeout.
        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout)
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| SeqidxError::InvalidArgument(err.to_string()))?;
        Ok(Self::from_parts(http, timeout))
    }

    pub fn from_parts(http: Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    fn http_get(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError> {
        let url = file.url();
        debug!(%url, "http get");
        let mut response = self
            .http
            .get(&url)
            .send()
            .map_err(|err| transfer_error(file, err))?;
        if !response.status().is_success() {
            return Err(transfer_error(
                file,
                format!("server returned status {}", response.status().as_u16()),
            ));
        }
        io::copy(&mut response, sink).map_err(|err| transfer_error(file, err))
    }

    fn ftp_get(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError> {
        let addr = resolve_addr(file)?;
        debug!(%addr, path = %file.remote_path(), "ftp retrieve");
        let mut ftp =
            FtpStream::connect_timeout(addr, self.timeout).map_err(|err| transfer_error(file, err))?;
        let result = ftp_session(&mut ftp, file, sink);
        // The session may already be broken; the transfer result is what matters.
        if let Err(err) = ftp.quit() {
            debug!(error = %err, "ftp quit failed");
        }
        result
    }
}

impl Fetcher for NetFetcher {
    fn retrieve(&self, file: &RemoteFileRef, sink: &mut dyn Write) -> Result<u64, SeqidxError> {
        match file.protocol {
            Protocol::Ftp => self.ftp_get(file, sink),
            Protocol::Http => self.http_get(file, sink),
        }
    }
}

fn ftp_session(
    ftp: &mut FtpStream,
    file: &RemoteFileRef,
    sink: &mut dyn Write,
) -> Result<u64, SeqidxError> {
    ftp.login(ANONYMOUS, ANONYMOUS)
        .map_err(|err| transfer_error(file, err))?;
    ftp.cwd(&file.remote_dir)
        .map_err(|err| transfer_error(file, err))?;
    ftp.transfer_type(FileType::Binary)
        .map_err(|err| transfer_error(file, err))?;

    let mut stream = ftp
        .retr_as_stream(&file.file_name)
        .map_err(|err| transfer_error(file, err))?;
    let copied = io::copy(&mut stream, sink).map_err(|err| transfer_error(file, err))?;
    ftp.finalize_retr_stream(stream)
        .map_err(|err| transfer_error(file, err))?;
    Ok(copied)
}

fn resolve_addr(file: &RemoteFileRef) -> Result<SocketAddr, SeqidxError> {
    (file.host.as_str(), file.port)
        .to_socket_addrs()
        .map_err(|err| transfer_error(file, err))?
        .next()
        .ok_or_else(|| transfer_error(file, "host did not resolve to any address"))
}

fn transfer_error(file: &RemoteFileRef, err: impl std::fmt::Display) -> SeqidxError {
    SeqidxError::Transfer {
        file: file.file_name.clone(),
        message: format!("{} ({err})", file.url()),
    }
}

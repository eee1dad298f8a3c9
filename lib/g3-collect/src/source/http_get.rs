/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::time::Duration;

use atoi::{FromRadix10, FromRadix16Checked};
use rustls_pki_types::ServerName;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{BodySource, DEFAULT_METRICS_SCHEMA, FetchedBody};
use crate::Endpoint;

const METRICS_SCHEMA_HEADER: &str = "metrics-schema";

#[derive(Debug, Error)]
pub enum HttpFetchError {
    #[error("io failed: {0:?}")]
    Io(#[from] io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported uri scheme {0}")]
    UnsupportedScheme(String),
    #[error("no host found in uri")]
    NoHost,
    #[error("no tls client config set for https uri")]
    NoTlsConfig,
    #[error("invalid tls server name {0}")]
    InvalidTlsName(String),
    #[error("tls handshake failed: {0:?}")]
    TlsHandshake(io::Error),
    #[error("connection closed early")]
    ClosedEarly,
    #[error("response header too large")]
    HeadTooLarge,
    #[error("invalid status line")]
    InvalidStatusLine,
    #[error("invalid header line")]
    InvalidHeaderLine,
    #[error("invalid content-length value")]
    InvalidContentLength,
    #[error("invalid chunk size line")]
    InvalidChunkSize,
    #[error("response body too large")]
    BodyTooLarge,
    #[error("unexpected response status code {0}")]
    UnexpectedStatus(u16),
}

/// A minimal HTTP/1.1 GET client, one connection per request. `https` uris
/// use the tls client config of the endpoint.
#[derive(Clone, Debug)]
pub struct HttpSource {
    rsp_head_max_size: usize,
    body_max_size: usize,
}

impl Default for HttpSource {
    fn default() -> Self {
        HttpSource {
            rsp_head_max_size: 8192,
            body_max_size: 16 << 20,
        }
    }
}

#[derive(Default)]
struct ResponseHead {
    code: u16,
    content_length: Option<u64>,
    chunked: bool,
    content_type: Option<String>,
    schema: Option<String>,
}

fn parse_status_code(line: &[u8]) -> Result<u16, HttpFetchError> {
    let Some(p) = memchr::memchr(b' ', line) else {
        return Err(HttpFetchError::InvalidStatusLine);
    };
    match &line[0..p] {
        b"HTTP/1.0" | b"HTTP/1.1" => {}
        _ => return Err(HttpFetchError::InvalidStatusLine),
    }
    let (code, len) = u16::from_radix_10(&line[p + 1..]);
    if len != 3 {
        return Err(HttpFetchError::InvalidStatusLine);
    }
    Ok(code)
}

fn parse_header_line(line: &[u8], head: &mut ResponseHead) -> Result<(), HttpFetchError> {
    let line = std::str::from_utf8(line).map_err(|_| HttpFetchError::InvalidHeaderLine)?;
    let Some(p) = memchr::memchr(b':', line.as_bytes()) else {
        return Err(HttpFetchError::InvalidHeaderLine);
    };
    let name = line[0..p].trim();
    let value = line[p + 1..].trim();

    if name.eq_ignore_ascii_case("content-length") {
        let (len, offset) = u64::from_radix_10(value.as_bytes());
        if offset == 0 || offset != value.len() {
            return Err(HttpFetchError::InvalidContentLength);
        }
        head.content_length = Some(len);
    } else if name.eq_ignore_ascii_case("transfer-encoding") {
        head.chunked = value
            .rsplit(',')
            .next()
            .map(|s| s.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
    } else if name.eq_ignore_ascii_case("content-type") {
        head.content_type = Some(value.to_string());
    } else if name.eq_ignore_ascii_case(METRICS_SCHEMA_HEADER) {
        head.schema = Some(value.to_string());
    }
    Ok(())
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max_len: usize) -> Result<(), HttpFetchError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut limited = (&mut *reader).take(max_len as u64);
    let nr = limited.read_until(b'\n', buf).await?;
    if nr == 0 {
        return Err(HttpFetchError::ClosedEarly);
    }
    if buf.last() != Some(&b'\n') {
        return if nr >= max_len {
            Err(HttpFetchError::HeadTooLarge)
        } else {
            Err(HttpFetchError::ClosedEarly)
        };
    }
    Ok(())
}

impl HttpSource {
    pub fn new(rsp_head_max_size: usize, body_max_size: usize) -> Self {
        HttpSource {
            rsp_head_max_size,
            body_max_size,
        }
    }

    fn write_request_head(&self, endpoint: &Endpoint, buf: &mut Vec<u8>) {
        let uri = endpoint.uri();
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        buf.extend_from_slice(b"GET ");
        buf.extend_from_slice(path.as_bytes());
        buf.extend_from_slice(b" HTTP/1.1\r\n");
        if let Some(authority) = uri.authority() {
            buf.extend_from_slice(b"Host: ");
            buf.extend_from_slice(authority.as_str().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"Connection: close\r\n");
        for (header, value) in endpoint.headers() {
            buf.extend_from_slice(header.as_str().as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
    }

    async fn read_head<R>(&self, reader: &mut R) -> Result<ResponseHead, HttpFetchError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line_buf = Vec::with_capacity(256);
        let mut left = self.rsp_head_max_size;

        read_line(reader, &mut line_buf, left).await?;
        left -= line_buf.len();
        let mut head = ResponseHead {
            code: parse_status_code(trim_line_end(&line_buf))?,
            ..Default::default()
        };

        loop {
            if left == 0 {
                return Err(HttpFetchError::HeadTooLarge);
            }
            read_line(reader, &mut line_buf, left).await?;
            left -= line_buf.len();
            let line = trim_line_end(&line_buf);
            if line.is_empty() {
                return Ok(head);
            }
            parse_header_line(line, &mut head)?;
        }
    }

    async fn read_chunked_body<R>(&self, reader: &mut R) -> Result<Vec<u8>, HttpFetchError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut body = Vec::new();
        let mut line_buf = Vec::with_capacity(32);
        loop {
            read_line(reader, &mut line_buf, 1024).await?;
            let (size, offset) = u64::from_radix_16_checked(&line_buf);
            if offset == 0 {
                return Err(HttpFetchError::InvalidChunkSize);
            }
            let Some(size) = size else {
                return Err(HttpFetchError::InvalidChunkSize);
            };
            match line_buf.get(offset) {
                Some(b'\r' | b'\n' | b';') => {}
                _ => return Err(HttpFetchError::InvalidChunkSize),
            }
            if size == 0 {
                break;
            }
            let left = self.body_max_size.saturating_sub(body.len());
            if size > left as u64 {
                return Err(HttpFetchError::BodyTooLarge);
            }

            let start = body.len();
            body.resize(start + size as usize, 0);
            reader.read_exact(&mut body[start..]).await?;
            read_line(reader, &mut line_buf, 2).await?;
        }

        // skip trailer fields
        loop {
            read_line(reader, &mut line_buf, self.rsp_head_max_size).await?;
            if trim_line_end(&line_buf).is_empty() {
                return Ok(body);
            }
        }
    }

    async fn read_body<R>(&self, reader: &mut R, head: &ResponseHead) -> Result<Vec<u8>, HttpFetchError>
    where
        R: AsyncBufRead + Unpin,
    {
        if head.chunked {
            return self.read_chunked_body(reader).await;
        }

        if let Some(len) = head.content_length {
            if len > self.body_max_size as u64 {
                return Err(HttpFetchError::BodyTooLarge);
            }
            let mut body = vec![0u8; len as usize];
            reader.read_exact(&mut body).await?;
            return Ok(body);
        }

        let mut body = Vec::new();
        let mut limited = (&mut *reader).take(self.body_max_size as u64 + 1);
        limited.read_to_end(&mut body).await?;
        if body.len() > self.body_max_size {
            return Err(HttpFetchError::BodyTooLarge);
        }
        Ok(body)
    }

    async fn get(&self, endpoint: &Endpoint) -> Result<FetchedBody, HttpFetchError> {
        let uri = endpoint.uri();
        let tls = match uri.scheme_str() {
            None | Some("http") => false,
            Some("https") => true,
            Some(s) => return Err(HttpFetchError::UnsupportedScheme(s.to_string())),
        };
        let host = uri.host().ok_or(HttpFetchError::NoHost)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

        if !tls {
            let stream = TcpStream::connect((host, port)).await?;
            return self.exchange(endpoint, stream).await;
        }

        let tls_client = endpoint
            .tls_client()
            .ok_or(HttpFetchError::NoTlsConfig)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| HttpFetchError::InvalidTlsName(host.to_string()))?;
        let stream = TcpStream::connect((host, port)).await?;
        let stream = TlsConnector::from(tls_client.clone())
            .connect(server_name, stream)
            .await
            .map_err(HttpFetchError::TlsHandshake)?;
        self.exchange(endpoint, stream).await
    }

    async fn exchange<S>(&self, endpoint: &Endpoint, mut stream: S) -> Result<FetchedBody, HttpFetchError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut req_buf = Vec::with_capacity(512);
        self.write_request_head(endpoint, &mut req_buf);
        stream.write_all(&req_buf).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let head = self.read_head(&mut reader).await?;
        if head.code != 200 {
            return Err(HttpFetchError::UnexpectedStatus(head.code));
        }
        let body = self.read_body(&mut reader, &head).await?;

        Ok(FetchedBody {
            body,
            content_type: head.content_type,
            schema: head
                .schema
                .unwrap_or_else(|| DEFAULT_METRICS_SCHEMA.to_string()),
        })
    }
}

impl BodySource for HttpSource {
    async fn fetch(&self, endpoint: &Endpoint) -> anyhow::Result<FetchedBody> {
        let timeout = endpoint.timeout();
        match tokio::time::timeout(timeout, self.get(endpoint)).await {
            Ok(Ok(fetched)) => Ok(fetched),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(HttpFetchError::Timeout(timeout).into()),
        }
    }
}

use std::{pin::Pin, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use http::{HeaderMap, Method, Request, Response, Uri, header, request, response};
use itertools::Itertools;
use log::{Level, debug, log_enabled, trace};
use serde::de::DeserializeOwned;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, lookup_host},
    time::timeout,
};
use tokio_native_tls::{TlsConnector as TokioTlsConnector, TlsStream, native_tls::TlsConnector};

const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

pub enum MaybeTlsStream<S> {
    Plain(S),
    Tls(TlsStream<S>),
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for MaybeTlsStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for MaybeTlsStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Connection options shared by every outgoing request.
#[derive(Debug, Clone, Copy)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub prefer_ipv6: bool,
}

/// Request skeleton for a one-shot `Connection: close` exchange.
pub fn request_builder(uri: &str, method: Method) -> anyhow::Result<request::Builder> {
    let uri = uri.parse::<Uri>()?;
    let authority = uri
        .authority()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?
        .as_str();
    let host = authority
        .find('@')
        .map(|idx| authority.split_at(idx + 1).1)
        .unwrap_or(authority);

    if host.is_empty() {
        anyhow::bail!("URL error: empty host name");
    }

    Ok(Request::builder()
        .method(method)
        .header(header::HOST, host)
        .header(header::CONNECTION, "close")
        .header(header::ACCEPT_ENCODING, "identity")
        .uri(uri))
}

/// GET `uri` and decode the body as JSON. Non-2xx answers are errors.
pub async fn get_json<T: DeserializeOwned>(uri: &str, opts: HttpOptions) -> anyhow::Result<T> {
    let req = request_builder(uri, Method::GET)?
        .header(header::ACCEPT, "application/json")
        .body(Bytes::new())?;

    let resp = send(req, opts).await?;
    if !resp.status().is_success() {
        anyhow::bail!("HTTP error: GET {uri} answered {}", resp.status().as_u16());
    }

    Ok(serde_json::from_slice(resp.body())?)
}

/// Send `req` and wait for the complete response, bounded by `opts.timeout`.
pub async fn send<T: AsRef<[u8]>>(
    req: Request<T>,
    opts: HttpOptions,
) -> anyhow::Result<Response<Bytes>> {
    let uri = req.uri().clone();
    timeout(opts.timeout, exchange(req, opts.prefer_ipv6))
        .await
        .map_err(|_| anyhow::anyhow!("HTTP error: {uri} timed out after {:?}", opts.timeout))?
}

async fn exchange<T: AsRef<[u8]>>(
    req: Request<T>,
    prefer_ipv6: bool,
) -> anyhow::Result<Response<Bytes>> {
    let mut stream = connect(req.uri(), prefer_ipv6).await?;

    stream.write_all(&assemble_http_request(&req)).await?;
    stream.flush().await?;

    let mut buffer = BytesMut::with_capacity(512);
    while stream.read_buf(&mut buffer).await? != 0 {}

    let buffer = buffer.freeze();
    trace!("Response: {:?}", String::from_utf8_lossy(&buffer));
    parse_http_response(buffer)
}

async fn connect(uri: &Uri, prefer_ipv6: bool) -> anyhow::Result<MaybeTlsStream<TcpStream>> {
    let tls = match uri.scheme_str() {
        Some("https") => true,
        Some("http") | None => false,
        Some(other) => anyhow::bail!("URL error: unsupported scheme '{other}'"),
    };
    let domain = uri
        .host()
        .ok_or_else(|| anyhow::anyhow!("URL error: no host name"))?;
    let domain = domain
        .strip_prefix('[')
        .and_then(|d| d.strip_suffix(']'))
        .unwrap_or(domain);
    let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

    let stream = connect_any((domain, port), prefer_ipv6).await?;

    Ok(if tls {
        let connector = TokioTlsConnector::from(TlsConnector::new()?);
        MaybeTlsStream::Tls(connector.connect(domain, stream).await?)
    } else {
        MaybeTlsStream::Plain(stream)
    })
}

/// Try every resolved address, alternating families starting with the preferred one.
async fn connect_any(addr: (&str, u16), prefer_ipv6: bool) -> anyhow::Result<TcpStream> {
    let (v4, v6): (Vec<_>, Vec<_>) = lookup_host(addr).await?.partition(|a| a.is_ipv4());
    let (first, second) = if prefer_ipv6 { (v6, v4) } else { (v4, v6) };

    for candidate in first.into_iter().interleave(second) {
        trace!("connecting to {candidate}");
        match timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(candidate)).await {
            Ok(Ok(stream)) => {
                debug!("connection established with {candidate}");
                return Ok(stream);
            }
            Ok(Err(e)) => trace!("connection attempt to {candidate} failed: {e}"),
            Err(_) => trace!("connection attempt to {candidate} timed out"),
        }
    }

    Err(anyhow::anyhow!(
        "I/O error: unable to connect to {}:{}",
        addr.0,
        addr.1
    ))
}

fn assemble_http_request<T: AsRef<[u8]>>(req: &Request<T>) -> Bytes {
    let body = req.body().as_ref();
    let mut buffer = BytesMut::with_capacity(256 + body.len());

    buffer.put_slice(
        format!(
            "{} {} {:?}\r\n",
            req.method(),
            req.uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/"),
            req.version()
        )
        .as_bytes(),
    );

    for (name, value) in req.headers() {
        buffer.put_slice(name.as_str().as_bytes());
        buffer.put_slice(b": ");
        buffer.put(value.as_bytes());
        buffer.put_slice(b"\r\n");
    }
    if !req.headers().contains_key(header::CONTENT_LENGTH) && !body.is_empty() {
        buffer.put_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }

    buffer.put_slice(b"\r\n");
    buffer.put_slice(body);

    if log_enabled!(Level::Trace) {
        trace!(
            "Request: {} {} {:?} [{}] {:?}",
            req.method(),
            req.uri(),
            redacted_headers(req.headers()),
            body.len(),
            String::from_utf8_lossy(body)
        );
    }

    buffer.freeze()
}

/// Header list for logs, with credentials masked.
fn redacted_headers(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if name == header::AUTHORIZATION {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{name}: {value}")
        })
        .collect()
}

fn parse_http_response(bytes: Bytes) -> anyhow::Result<Response<Bytes>> {
    const MAX_HEADERS: usize = 64;
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut headers);

    let httparse::Status::Complete(body_start) = resp.parse(&bytes)? else {
        anyhow::bail!("HTTP error: response is incomplete");
    };

    let mut builder = response::Builder::new()
        .status(resp.code.unwrap_or(200))
        .version(match resp.version.unwrap_or(1) {
            0 => http::Version::HTTP_10,
            _ => http::Version::HTTP_11,
        });

    let mut chunked = false;
    for header in resp.headers.iter() {
        if header.name.eq_ignore_ascii_case(header::TRANSFER_ENCODING.as_str()) {
            chunked = String::from_utf8_lossy(header.value)
                .to_ascii_lowercase()
                .contains("chunked");
        }
        builder = builder.header(header.name, header.value);
    }

    let body = bytes.slice(body_start..);
    let body = if chunked { decode_chunked(&body)? } else { body };

    Ok(builder.body(body)?)
}

fn decode_chunked(mut raw: &[u8]) -> anyhow::Result<Bytes> {
    let mut out = BytesMut::with_capacity(raw.len());
    loop {
        let httparse::Status::Complete((header_len, size)) = httparse::parse_chunk_size(raw)
            .map_err(|_| anyhow::anyhow!("HTTP error: bad chunk size"))?
        else {
            anyhow::bail!("HTTP error: truncated chunk header");
        };
        raw = &raw[header_len..];

        if size == 0 {
            return Ok(out.freeze());
        }
        let chunk = usize::try_from(size)
            .ok()
            .and_then(|size| raw.get(..size))
            .ok_or_else(|| anyhow::anyhow!("HTTP error: truncated chunk"))?;
        let Some(rest) = raw[chunk.len()..].strip_prefix(b"\r\n") else {
            anyhow::bail!("HTTP error: chunk is not terminated");
        };
        out.put_slice(chunk);
        raw = rest;
    }
}

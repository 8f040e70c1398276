use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use boring::ssl::SslAcceptor;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// One request as the server saw it, headers in wire order.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self, name: &str) -> usize {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .count()
    }

    /// Lower-case header names in wire order.
    pub fn header_names(&self) -> Vec<String> {
        self.headers
            .iter()
            .map(|(k, _)| k.to_ascii_lowercase())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200).body(body)
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::new(status).header("Location", location)
    }

    /// 200 carrying the request body back with the request's content type.
    pub fn echo(request: &CapturedRequest) -> Self {
        let content_type = request.header("content-type").unwrap_or("text/plain");
        Self::ok(request.body.clone()).header("Content-Type", content_type)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn to_http1(&self) -> Vec<u8> {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        out.push_str("Connection: close\r\n\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

pub type Handler = Arc<dyn Fn(&CapturedRequest) -> MockResponse + Send + Sync>;

/// Shared record of every request a server handled.
#[derive(Clone, Default)]
pub struct RequestLog(Arc<Mutex<Vec<CapturedRequest>>>);

impl RequestLog {
    fn push(&self, request: CapturedRequest) {
        self.0.lock().unwrap().push(request);
    }

    pub fn all(&self) -> Vec<CapturedRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<CapturedRequest> {
        self.0.lock().unwrap().last().cloned()
    }
}

/// Mock origin answering one request per connection.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    log: RequestLog,
}

impl MockHttpServer {
    /// Bind to a random local port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            log: RequestLog::default(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn url_tls(&self) -> String {
        format!("https://127.0.0.1:{}", self.port)
    }

    pub fn log(&self) -> RequestLog {
        self.log.clone()
    }

    /// Plain HTTP/1.1.
    pub fn start<F>(self, handler: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(&CapturedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(serve_http1(stream, handler.clone(), self.log.clone()));
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        })
    }

    /// HTTP/1.1 over TLS.
    pub fn start_tls<F>(self, acceptor: SslAcceptor, handler: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(&CapturedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let acceptor = Arc::new(acceptor);
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                let acceptor = acceptor.clone();
                let handler = handler.clone();
                let log = self.log.clone();
                tokio::spawn(async move {
                    match tokio_boring::accept(&acceptor, stream).await {
                        Ok(tls) => serve_http1(tls, handler, log).await,
                        Err(e) => tracing::debug!("TLS accept failed: {}", e),
                    }
                });
            }
        })
    }

    /// HTTP/2 over TLS; the acceptor must select `h2`.
    pub fn start_h2_tls<F>(self, acceptor: SslAcceptor, handler: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(&CapturedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let acceptor = Arc::new(acceptor);
        tokio::spawn(async move {
            while let Ok((stream, _)) = self.listener.accept().await {
                let acceptor = acceptor.clone();
                let handler = handler.clone();
                let log = self.log.clone();
                tokio::spawn(async move {
                    let tls = match tokio_boring::accept(&acceptor, stream).await {
                        Ok(tls) => tls,
                        Err(e) => {
                            tracing::debug!("TLS accept failed: {}", e);
                            return;
                        }
                    };
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handler = handler.clone();
                        let log = log.clone();
                        async move { Ok::<_, Infallible>(answer_h2(req, &handler, &log).await) }
                    });
                    if let Err(e) = http2::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(tls), service)
                        .await
                    {
                        tracing::debug!("h2 connection error: {}", e);
                    }
                });
            }
        })
    }

    /// Read one request, then never answer. The receiver fires once the
    /// client closes the connection.
    pub fn start_stalled(self) -> oneshot::Receiver<()> {
        let (closed_tx, closed_rx) = oneshot::channel();
        tokio::spawn(async move {
            let Ok((mut stream, _)) = self.listener.accept().await else {
                return;
            };
            if let Some(request) = read_request(&mut stream).await {
                self.log.push(request);
            }
            let mut buf = [0u8; 1024];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            let _ = closed_tx.send(());
        });
        closed_rx
    }
}

async fn serve_http1<S>(mut stream: S, handler: Handler, log: RequestLog)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(request) = read_request(&mut stream).await else {
        return;
    };
    let response = handler(&request);
    log.push(request);
    if let Err(e) = stream.write_all(&response.to_http1()).await {
        tracing::debug!("Write error: {}", e);
        return;
    }
    let _ = stream.shutdown().await;
}

async fn answer_h2(req: Request<Incoming>, handler: &Handler, log: &RequestLog) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(_) => Vec::new(),
    };
    let request = CapturedRequest {
        method: parts.method.to_string(),
        path: parts
            .uri
            .path_and_query()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "/".to_string()),
        version: "HTTP/2".to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body,
    };
    let reply = handler(&request);
    log.push(request);

    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() = StatusCode::from_u16(reply.status).unwrap();
    for (name, value) in &reply.headers {
        response.headers_mut().append(
            hyper::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
            hyper::header::HeaderValue::from_str(value).unwrap(),
        );
    }
    response
}

/// Read one HTTP/1.x request with a Content-Length body.
pub async fn read_request<S>(stream: &mut S) -> Option<CapturedRequest>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut req = httparse::Request::new(&mut headers);
        let head_len = match req.parse(&buf) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => continue,
            Err(_) => return None,
        };

        let headers: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect();
        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut request = CapturedRequest {
            method: req.method?.to_string(),
            path: req.path?.to_string(),
            version: format!("HTTP/1.{}", req.version?),
            headers,
            body: buf[head_len..].to_vec(),
        };
        while request.body.len() < length {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            request.body.extend_from_slice(&chunk[..n]);
        }
        request.body.truncate(length);
        return Some(request);
    }
}

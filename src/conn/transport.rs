//! Transport construction: plain TCP or TLS-wrapped TCP, behind a single
//! boxed `AsyncRead + AsyncWrite` so the rest of the connection engine
//! never has to know which.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::NetworkError;

/// A single host:port plus the TLS policy to apply when connecting.
#[derive(Debug, Clone)]
pub struct HostSpec {
    pub addr: String,
    pub tls: bool,
    pub skip_verify: bool,
    pub ca_path: Option<String>,
}

/// A boxed bidirectional byte stream, erasing whether it's plain TCP or
/// wrapped in TLS.
pub struct Transport {
    inner: Pin<Box<dyn AsyncReadWrite + Send>>,
}

trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

impl AsyncRead for Transport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        self.get_mut().inner.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.get_mut().inner.as_mut().poll_shutdown(cx)
    }
}

/// Opens a transport to `spec`, applying TLS when configured. With the
/// `tls-native` feature (the default) TLS uses `native-tls`; CA pool
/// verification is used when `ca_path` is set, otherwise system roots, with
/// `skip_verify` as the escape hatch for self-signed test servers.
pub async fn connect(spec: &HostSpec) -> Result<Transport, NetworkError> {
    let tcp = TcpStream::connect(&spec.addr).await.map_err(NetworkError::Connect)?;
    let _ = tcp.set_nodelay(true);

    if !spec.tls {
        return Ok(Transport { inner: Box::pin(tcp) });
    }

    #[cfg(feature = "tls-native")]
    {
        let host = spec.addr.split(':').next().unwrap_or(&spec.addr);
        let mut builder = native_tls::TlsConnector::builder();
        builder.danger_accept_invalid_certs(spec.skip_verify);
        if let Some(ca_path) = &spec.ca_path {
            let pem = tokio::fs::read(ca_path)
                .await
                .map_err(NetworkError::Connect)?;
            let cert = native_tls::Certificate::from_pem(&pem)
                .map_err(|e| NetworkError::Tls(e.to_string()))?;
            builder.add_root_certificate(cert);
        }
        let connector = builder
            .build()
            .map_err(|e| NetworkError::Tls(e.to_string()))?;
        let connector = tokio_native_tls::TlsConnector::from(connector);
        let tls_stream = connector
            .connect(host, tcp)
            .await
            .map_err(|e| NetworkError::Tls(e.to_string()))?;
        return Ok(Transport { inner: Box::pin(tls_stream) });
    }

    #[cfg(not(feature = "tls-native"))]
    {
        Err(NetworkError::Tls("TLS requested but no TLS feature is enabled".to_owned()))
    }
}

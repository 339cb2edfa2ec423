//! SOCKS5 client negotiation (RFC 1928 greeting/CONNECT, RFC 1929 user/pass
//! sub-negotiation), run before TLS wrapping when a proxy is configured.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::error::{NexusError, Result};

const VERSION: u8 = 0x05;
const METHOD_NO_AUTH: u8 = 0x00;
const METHOD_USER_PASS: u8 = 0x02;
const METHOD_NO_ACCEPTABLE: u8 = 0xFF;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Runs the full greeting → (optional auth) → CONNECT handshake against an
/// already-established TCP stream to the proxy. On success the stream is
/// the end-to-end tunnel to `target_host:target_port`.
pub async fn negotiate(
    stream: &mut TcpStream,
    proxy: &ProxyConfig,
    target_host: &str,
    target_port: u16,
) -> Result<()> {
    greet(stream, proxy).await?;
    connect(stream, target_host, target_port).await
}

async fn greet(stream: &mut TcpStream, proxy: &ProxyConfig) -> Result<()> {
    let offer_auth = proxy.username.is_some();
    let methods: &[u8] = if offer_auth {
        &[METHOD_NO_AUTH, METHOD_USER_PASS]
    } else {
        &[METHOD_NO_AUTH]
    };

    let mut request = vec![VERSION, methods.len() as u8];
    request.extend_from_slice(methods);
    stream.write_all(&request).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != VERSION {
        return Err(NexusError::ProxyConnectionFailed("unexpected SOCKS version in method reply".into()));
    }

    match reply[1] {
        METHOD_NO_AUTH => Ok(()),
        METHOD_USER_PASS => authenticate(stream, proxy).await,
        METHOD_NO_ACCEPTABLE => Err(NexusError::ProxyConnectionFailed("no acceptable auth method".into())),
        other => Err(NexusError::ProxyConnectionFailed(format!("unsupported auth method {other:#x}"))),
    }
}

async fn authenticate(stream: &mut TcpStream, proxy: &ProxyConfig) -> Result<()> {
    let username = proxy.username.as_deref().unwrap_or("");
    let password = proxy.password.as_deref().unwrap_or("");
    if username.len() > 255 || password.len() > 255 {
        return Err(NexusError::ProxyAuthFailed);
    }

    let mut request = vec![0x01, username.len() as u8];
    request.extend_from_slice(username.as_bytes());
    request.push(password.len() as u8);
    request.extend_from_slice(password.as_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(NexusError::ProxyAuthFailed);
    }
    Ok(())
}

async fn connect(stream: &mut TcpStream, target_host: &str, target_port: u16) -> Result<()> {
    let mut request = vec![VERSION, CMD_CONNECT, 0x00];

    if let Ok(ip) = target_host.parse::<IpAddr>() {
        match ip {
            IpAddr::V4(addr) => {
                request.push(ATYP_IPV4);
                request.extend_from_slice(&addr.octets());
            }
            IpAddr::V6(addr) => {
                request.push(ATYP_IPV6);
                request.extend_from_slice(&addr.octets());
            }
        }
    } else {
        if target_host.len() > 255 {
            return Err(NexusError::ProxyConnectionFailed("hostname too long for SOCKS5".into()));
        }
        request.push(ATYP_DOMAIN);
        request.push(target_host.len() as u8);
        request.extend_from_slice(target_host.as_bytes());
    }
    request.extend_from_slice(&target_port.to_be_bytes());

    stream.write_all(&request).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != VERSION {
        return Err(NexusError::ProxyConnectionFailed("unexpected SOCKS version in connect reply".into()));
    }
    if header[1] != 0x00 {
        return Err(NexusError::ProxyConnectionFailed(reply_code_description(header[1])));
    }

    // drain the bound address the proxy reports, per the negotiated atyp
    match header[3] {
        ATYP_IPV4 => {
            let mut buf = [0u8; 4 + 2];
            stream.read_exact(&mut buf).await?;
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 16 + 2];
            stream.read_exact(&mut buf).await?;
        }
        ATYP_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let mut buf = vec![0u8; len_buf[0] as usize + 2];
            stream.read_exact(&mut buf).await?;
        }
        other => return Err(NexusError::ProxyConnectionFailed(format!("unknown bound address type {other:#x}"))),
    }

    Ok(())
}

fn reply_code_description(code: u8) -> String {
    let reason = match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS5 reply code",
    };
    format!("{reason} (code {code:#04x})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn proxy_config(username: Option<&str>) -> ProxyConfig {
        ProxyConfig {
            proxy_type: crate::config::ProxyType::Socks5,
            host: "127.0.0.1".to_string(),
            port: 0,
            username: username.map(|s| s.to_string()),
            password: username.map(|_| "secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_no_auth_connect_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 2];
            sock.read_exact(&mut greeting).await.unwrap();
            let mut methods = vec![0u8; greeting[1] as usize];
            sock.read_exact(&mut methods).await.unwrap();
            sock.write_all(&[VERSION, METHOD_NO_AUTH]).await.unwrap();

            let mut req_head = [0u8; 4];
            sock.read_exact(&mut req_head).await.unwrap();
            let mut rest = vec![0u8; 4 + 2];
            sock.read_exact(&mut rest).await.unwrap();
            sock.write_all(&[VERSION, 0x00, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0]).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let proxy = proxy_config(None);
        negotiate(&mut client, &proxy, "127.0.0.1", 8888).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_auth_failure_surface() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 2];
            sock.read_exact(&mut greeting).await.unwrap();
            let mut methods = vec![0u8; greeting[1] as usize];
            sock.read_exact(&mut methods).await.unwrap();
            sock.write_all(&[VERSION, METHOD_USER_PASS]).await.unwrap();

            let mut auth_head = [0u8; 2];
            sock.read_exact(&mut auth_head).await.unwrap();
            let mut user = vec![0u8; auth_head[1] as usize];
            sock.read_exact(&mut user).await.unwrap();
            let mut pass_len = [0u8; 1];
            sock.read_exact(&mut pass_len).await.unwrap();
            let mut pass = vec![0u8; pass_len[0] as usize];
            sock.read_exact(&mut pass).await.unwrap();
            sock.write_all(&[0x01, 0x01]).await.unwrap(); // auth failure
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let proxy = proxy_config(Some("alice"));
        let err = negotiate(&mut client, &proxy, "127.0.0.1", 8888).await.unwrap_err();
        assert!(matches!(err, NexusError::ProxyAuthFailed));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_reply_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 2];
            sock.read_exact(&mut greeting).await.unwrap();
            let mut methods = vec![0u8; greeting[1] as usize];
            sock.read_exact(&mut methods).await.unwrap();
            sock.write_all(&[VERSION, METHOD_NO_AUTH]).await.unwrap();

            let mut req_head = [0u8; 4];
            sock.read_exact(&mut req_head).await.unwrap();
            let mut rest = vec![0u8; 4 + 2];
            sock.read_exact(&mut rest).await.unwrap();
            sock.write_all(&[VERSION, 0x05, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0]).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        let proxy = proxy_config(None);
        let err = negotiate(&mut client, &proxy, "127.0.0.1", 8888).await.unwrap_err();
        assert!(matches!(err, NexusError::ProxyConnectionFailed(_)));
        server.await.unwrap();
    }
}

//! End-to-end bridge scenarios: byte-faithful relays over files, TCP, TLS,
//! and UDP on a loopback address.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use patchcord_core::{pair, Endpoint};
use patchcord_endpoints::from_seed;
use sha2::{Digest, Sha256};

#[ctor::ctor]
fn install_crypto_provider() {
    let _ = tokio_rustls::rustls::crypto::aws_lc_rs::default_provider().install_default();
}

fn digest(path: &Path) -> String {
    let bytes = std::fs::read(path).unwrap();
    hex::encode(Sha256::digest(&bytes))
}

/// Patterned input large enough to exercise chunked copies.
fn write_input(dir: &Path, len: usize) -> PathBuf {
    let path = dir.join("in");
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

async fn wait_for_file(path: &Path, expected_len: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() >= expected_len {
                return;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timeout waiting for {} to fill", path.display());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

async fn wait_until_up(endpoint: &Arc<dyn Endpoint>) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !endpoint.is_up() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timeout waiting for {endpoint} to come up");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_to_file_write() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), 256 * 1024);
    let output = dir.path().join("out");

    let source = from_seed(&format!("file:{}", input.display())).unwrap();
    let sink = from_seed(&format!("file:{},mode=write", output.display())).unwrap();

    pair(Arc::clone(&source), Arc::clone(&sink)).await.unwrap();

    assert_eq!(digest(&input), digest(&output));
    assert!(!source.is_up());
    assert!(!sink.is_up());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_to_file_append_starting_absent() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), 256 * 1024);
    let output = dir.path().join("out");
    assert!(!output.exists());

    let source = from_seed(&format!("file:{}", input.display())).unwrap();
    let sink = from_seed(&format!("file:{},mode=append", output.display())).unwrap();

    pair(Arc::clone(&source), Arc::clone(&sink)).await.unwrap();

    assert_eq!(digest(&input), digest(&output));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_over_forking_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), 256 * 1024);
    let input_len = std::fs::metadata(&input).unwrap().len();
    let output = dir.path().join("out");
    let addr = "127.13.37.1:4441";

    let listener = from_seed(&format!("tcp-l:{addr},fork")).unwrap();
    let sink = from_seed(&format!("file:{},mode=write", output.display())).unwrap();
    let server_side = {
        let (listener, sink) = (Arc::clone(&listener), Arc::clone(&sink));
        tokio::spawn(async move { pair(listener, sink).await })
    };
    wait_until_up(&listener).await;

    let source = from_seed(&format!("file:{}", input.display())).unwrap();
    let client = from_seed(&format!("tcp:{addr}")).unwrap();
    pair(source, client).await.unwrap();

    wait_for_file(&output, input_len).await;
    listener.down().await.unwrap();
    sink.down().await.unwrap();
    server_side.await.unwrap().unwrap();

    assert_eq!(digest(&input), digest(&output));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_over_forking_tls_with_mutual_material() {
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair, PKCS_ECDSA_P256_SHA256};

    let dir = tempfile::tempdir().unwrap();

    // CA, a CA-signed server certificate for the loopback address, and a
    // CA-signed client certificate.
    let ca_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let server_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
    let mut server_params = CertificateParams::default();
    server_params.subject_alt_names = vec![rcgen::SanType::IpAddress(IpAddr::V4(Ipv4Addr::new(
        127, 13, 37, 1,
    )))];
    let server_cert = server_params
        .signed_by(&server_key, &ca_cert, &ca_key)
        .unwrap();

    let client_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
    let client_cert = CertificateParams::default()
        .signed_by(&client_key, &ca_cert, &ca_key)
        .unwrap();

    let ca_path = dir.path().join("ca.pem");
    let server_cert_path = dir.path().join("server.cert.pem");
    let server_key_path = dir.path().join("server.key.pem");
    let client_cert_path = dir.path().join("client.cert.pem");
    let client_key_path = dir.path().join("client.key.pem");
    std::fs::write(&ca_path, ca_cert.pem()).unwrap();
    std::fs::write(&server_cert_path, server_cert.pem()).unwrap();
    std::fs::write(&server_key_path, server_key.serialize_pem()).unwrap();
    std::fs::write(&client_cert_path, client_cert.pem()).unwrap();
    std::fs::write(&client_key_path, client_key.serialize_pem()).unwrap();

    let input = write_input(dir.path(), 256 * 1024);
    let input_len = std::fs::metadata(&input).unwrap().len();
    let output = dir.path().join("out");
    let addr = "127.13.37.1:8443";

    let listener = from_seed(&format!(
        "tls-l:{addr},cert={},key={},fork",
        server_cert_path.display(),
        server_key_path.display()
    ))
    .unwrap();
    let sink = from_seed(&format!("file:{},mode=write", output.display())).unwrap();
    let server_side = {
        let (listener, sink) = (Arc::clone(&listener), Arc::clone(&sink));
        tokio::spawn(async move { pair(listener, sink).await })
    };
    wait_until_up(&listener).await;

    let source = from_seed(&format!("file:{}", input.display())).unwrap();
    let client = from_seed(&format!(
        "tls:{addr},ca={},cert={},key={},verify",
        ca_path.display(),
        client_cert_path.display(),
        client_key_path.display()
    ))
    .unwrap();
    pair(source, client).await.unwrap();

    wait_for_file(&output, input_len).await;
    listener.down().await.unwrap();
    sink.down().await.unwrap();
    server_side.await.unwrap().unwrap();

    assert_eq!(digest(&input), digest(&output));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_over_udp_loopback() {
    let dir = tempfile::tempdir().unwrap();
    // Small enough that the datagram burst stays inside loopback buffers.
    let input = write_input(dir.path(), 60 * 1024);
    let input_len = std::fs::metadata(&input).unwrap().len();
    let output = dir.path().join("out");
    let addr = "127.13.37.1:5353";

    let listener = from_seed(&format!("udp-l:{addr}")).unwrap();
    let sink = from_seed(&format!("file:{},mode=write", output.display())).unwrap();
    let server_side = {
        let (listener, sink) = (Arc::clone(&listener), Arc::clone(&sink));
        tokio::spawn(async move { pair(listener, sink).await })
    };
    wait_until_up(&listener).await;

    let source = from_seed(&format!("file:{}", input.display())).unwrap();
    let client = from_seed(&format!("udp:{addr}")).unwrap();
    pair(source, client).await.unwrap();

    wait_for_file(&output, input_len).await;
    listener.down().await.unwrap();
    sink.down().await.unwrap();
    server_side.await.unwrap().unwrap();

    assert_eq!(digest(&input), digest(&output));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn echoing_tcp_listener_returns_bytes_to_the_client() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out");
    let addr = "127.13.37.1:4444";

    let listener = from_seed(&format!("tcp-l:{addr},echo,fork")).unwrap();
    let sink = from_seed(&format!("file:{},mode=write", output.display())).unwrap();
    let server_side = {
        let (listener, sink) = (Arc::clone(&listener), Arc::clone(&sink));
        tokio::spawn(async move { pair(listener, sink).await })
    };
    wait_until_up(&listener).await;

    let mut socket = TcpStream::connect(addr).await.unwrap();
    socket.write_all(b"ping").await.unwrap();

    let mut buf = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), socket.read_exact(&mut buf))
        .await
        .expect("timeout waiting for echo")
        .unwrap();
    assert_eq!(&buf, b"ping");

    drop(socket);
    listener.down().await.unwrap();
    sink.down().await.unwrap();
    server_side.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_listener_up_is_idempotent_and_down_is_final() {
    let listener = from_seed("tcp-l:127.13.37.1:4442").unwrap();
    listener.up().await.unwrap();
    listener.up().await.unwrap();
    assert!(listener.is_up());
    assert!(listener.keep_alive());

    listener.down().await.unwrap();
    listener.down().await.unwrap();
    assert!(!listener.is_up());

    let mut buf = [0u8; 4];
    assert_eq!(listener.read(&mut buf).await.unwrap(), 0);
    assert_eq!(listener.write(b"x").await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebinding_a_taken_port_fails_up() {
    let first = from_seed("tcp-l:127.13.37.1:4443").unwrap();
    first.up().await.unwrap();

    let second = from_seed("tcp-l:127.13.37.1:4443").unwrap();
    assert!(second.up().await.is_err());
    assert!(!second.is_up());
    second.down().await.unwrap();

    first.down().await.unwrap();
}

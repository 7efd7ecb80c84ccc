//! Internal module for establishing TLS connections to IMAP servers.

use crate::config::TlsConfig;
use crate::error::{Error, Result};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, warn};
use webpki_roots::TLS_SERVER_ROOTS;

/// A TLS stream over TCP, used for IMAP communication.
pub(crate) type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Establishes a TLS connection to an IMAP server.
#[instrument(
    name = "connection::establish_tls",
    skip_all,
    fields(
        imap_host = %imap_host,
        target_addr = %target_addr,
        accept_invalid_certs = tls.accept_invalid_certs
    )
)]
pub(crate) async fn establish_tls_connection(
    imap_host: &str,
    target_addr: &str,
    tls: &TlsConfig,
) -> Result<TlsStream> {
    let connector = create_tls_connector(tls);
    let server_name = parse_server_name(imap_host)?;
    let tcp_stream = connect_tcp(target_addr).await?;

    debug!("Performing TLS handshake");

    connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(|source| Error::TlsConnect {
            target: target_addr.to_string(),
            source,
        })
}

/// Creates a TLS connector, verifying against the webpki roots unless told otherwise.
fn create_tls_connector(tls: &TlsConfig) -> TlsConnector {
    let builder = ClientConfig::builder().with_safe_defaults();

    let tls_config = if tls.accept_invalid_certs {
        warn!("TLS certificate verification disabled");
        builder
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth()
    } else {
        let mut root_cert_store = rustls::RootCertStore::empty();
        root_cert_store.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        builder
            .with_root_certificates(root_cert_store)
            .with_no_client_auth()
    };

    TlsConnector::from(Arc::new(tls_config))
}

/// Certificate verifier for self-signed servers.
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Parses server name for TLS SNI.
fn parse_server_name(host: &str) -> Result<rustls::ServerName> {
    rustls::ServerName::try_from(host).map_err(|source| Error::InvalidDnsName {
        host: host.to_string(),
        source,
    })
}

#[instrument(name = "connection::tcp_connect", skip_all, fields(target_addr = %target_addr))]
async fn connect_tcp(target_addr: &str) -> Result<TcpStream> {
    debug!("Establishing TCP connection");

    TcpStream::connect(target_addr)
        .await
        .map_err(|source| Error::TcpConnect {
            target: target_addr.to_string(),
            source,
        })
}

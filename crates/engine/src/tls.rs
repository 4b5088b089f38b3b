// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS parameters for upgrading a live connection in place.

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use thiserror::Error;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::transport::{AmpTransport, BoxedTransport, Rewind};

#[derive(Debug, Error)]
pub enum TlsSetupError {
    #[error("invalid server name {0:?}")]
    ServerName(String),

    #[error("cannot read {path}: {reason}")]
    Pem { path: String, reason: String },

    #[error(transparent)]
    Rustls(#[from] rustls::Error),

    #[error(transparent)]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// What the calling side of `StartTLS` presents and trusts.
#[derive(Clone)]
pub struct TlsClientOptions {
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
}

impl TlsClientOptions {
    pub fn new(config: Arc<ClientConfig>, server_name: &str) -> Result<Self, TlsSetupError> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsSetupError::ServerName(server_name.to_string()))?;
        Ok(Self { config, server_name })
    }

    /// Trust exactly `roots` and present no client certificate.
    pub fn trusting<I>(roots: I, server_name: &str) -> Result<Self, TlsSetupError>
    where
        I: IntoIterator<Item = CertificateDer<'static>>,
    {
        let mut store = RootCertStore::empty();
        for root in roots {
            store.add(root)?;
        }
        let config = ClientConfig::builder().with_root_certificates(store).with_no_client_auth();
        Self::new(Arc::new(config), server_name)
    }

    pub(crate) fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.config))
    }

    pub(crate) fn server_name(&self) -> ServerName<'static> {
        self.server_name.clone()
    }
}

/// What the answering side of `StartTLS` presents and requires.
#[derive(Clone)]
pub struct TlsServerOptions {
    config: Arc<ServerConfig>,
}

impl TlsServerOptions {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    /// Present `chain` and accept any client.
    pub fn single_cert(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self, TlsSetupError> {
        let config = ServerConfig::builder().with_no_client_auth().with_single_cert(chain, key)?;
        Ok(Self::new(Arc::new(config)))
    }

    /// Present `chain` and require a client certificate issued by `roots`.
    pub fn verifying_clients<I>(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        roots: I,
    ) -> Result<Self, TlsSetupError>
    where
        I: IntoIterator<Item = CertificateDer<'static>>,
    {
        let mut store = RootCertStore::empty();
        for root in roots {
            store.add(root)?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(store)).build()?;
        let config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)?;
        Ok(Self::new(Arc::new(config)))
    }

    /// Load a PEM certificate chain and private key.
    pub fn from_pem_files(cert: &Path, key: &Path) -> Result<Self, TlsSetupError> {
        let pem_error = |path: &Path, e: rustls::pki_types::pem::Error| TlsSetupError::Pem {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let chain = CertificateDer::pem_file_iter(cert)
            .map_err(|e| pem_error(cert, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| pem_error(cert, e))?;
        let key = PrivateKeyDer::from_pem_file(key).map_err(|e| pem_error(key, e))?;
        Self::single_cert(chain, key)
    }

    pub(crate) fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.config))
    }
}

/// A transport after the in-place upgrade.
pub(crate) type UpgradedTransport = tokio_rustls::TlsStream<Rewind<BoxedTransport>>;

impl AmpTransport for UpgradedTransport {
    fn peer_label(&self) -> String {
        self.get_ref().0.get_ref().peer_label()
    }

    fn host_label(&self) -> String {
        self.get_ref().0.get_ref().host_label()
    }
}

/// Certificates the peer presented during the handshake.
pub(crate) fn peer_certificates(stream: &UpgradedTransport) -> Option<Vec<CertificateDer<'static>>> {
    stream.get_ref().1.peer_certificates().map(<[CertificateDer<'static>]>::to_vec)
}

#[cfg(test)]
#[path = "tls_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Certificates and connected endpoint pairs for tests.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::locator::Locator;
use crate::protocol::{Amp, AmpHandle};
use crate::tls::{TlsClientOptions, TlsServerOptions};

pub(crate) struct TestCert {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
    pub cert_pem: String,
    pub key_pem: String,
}

pub(crate) fn self_signed(name: &str) -> TestCert {
    let certified = rcgen::generate_simple_self_signed(vec![name.to_string()]).unwrap();
    TestCert {
        cert: certified.cert.der().clone(),
        key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der())),
        cert_pem: certified.cert.pem(),
        key_pem: certified.key_pair.serialize_pem(),
    }
}

impl TestCert {
    pub fn server_options(&self) -> TlsServerOptions {
        TlsServerOptions::single_cert(vec![self.cert.clone()], self.key.clone_key()).unwrap()
    }

    pub fn client_options(&self, name: &str) -> TlsClientOptions {
        TlsClientOptions::trusting([self.cert.clone()], name).unwrap()
    }
}

/// Two endpoints joined by an in-memory pipe, each running on its own task.
pub(crate) fn connected(left: &Amp, right: &Amp) -> (AmpHandle, AmpHandle) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    (left.spawn(a), right.spawn(b))
}

pub(crate) fn serving(locator: Locator) -> Amp {
    Amp::builder().locator(locator).build()
}

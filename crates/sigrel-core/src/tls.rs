// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Once};

use anyhow::Context;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Build a TLS acceptor from PEM-encoded key and certificate files.
pub fn acceptor_from_pem_files(key_path: &Path, cert_path: &Path) -> anyhow::Result<TlsAcceptor> {
    ensure_rustls_crypto_provider();

    let cert_file = File::open(cert_path)
        .with_context(|| format!("open certificate file {}", cert_path.display()))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .context("parse certificates")?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", cert_path.display());
    }

    let key_file =
        File::open(key_path).with_context(|| format!("open key file {}", key_path.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("parse private key")?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build tls server config")?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

/// Build a TLS connector that trusts exactly the given PEM certificate.
pub fn pinned_connector(cert_pem: &str) -> anyhow::Result<TlsConnector> {
    ensure_rustls_crypto_provider();

    let mut roots = rustls::RootCertStore::empty();
    let mut reader = cert_pem.as_bytes();
    for cert in rustls_pemfile::certs(&mut reader) {
        roots
            .add(cert.context("parse pinned certificate")?)
            .context("add pinned certificate to root store")?;
    }
    if roots.is_empty() {
        anyhow::bail!("no certificates found in pinned pem");
    }

    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Generate a self-signed key/certificate pair for the given hostname.
///
/// Returns (key PEM, certificate PEM). Meant for tests and for bootstrapping
/// a deployment with `gen-cert`.
pub fn generate_self_signed_pem(hostname: &str) -> anyhow::Result<(String, String)> {
    let cert = rcgen::generate_simple_self_signed(vec![hostname.to_string()])
        .context("generate self-signed certificate")?;
    Ok((cert.key_pair.serialize_pem(), cert.cert.pem()))
}

fn ensure_rustls_crypto_provider() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

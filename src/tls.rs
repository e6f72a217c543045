use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::TlsError;

/// Checks that the certificate chain and private key are present and parse,
/// so the server can decide between HTTPS/WSS and plain HTTP/WS before binding.
pub fn check_tls_files(cert_path: &Path, key_path: &Path) -> Result<usize, TlsError> {
    let cert_reader = &mut BufReader::new(open(cert_path)?);
    let certs = rustls_pemfile::certs(cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: cert_path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.display().to_string()));
    }

    let key_reader = &mut BufReader::new(open(key_path)?);
    let key = rustls_pemfile::private_key(key_reader).map_err(|source| TlsError::Io {
        path: key_path.display().to_string(),
        source,
    })?;
    if key.is_none() {
        return Err(TlsError::NoPrivateKey(key_path.display().to_string()));
    }

    Ok(certs.len())
}

fn open(path: &Path) -> Result<File, TlsError> {
    File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })
}

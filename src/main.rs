use std::sync::Arc;

use codesync::tls::check_tls_files;
use codesync::{routes, Config, Server};
use log::{error, info, warn};

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let addr = config.addr;
    let cert_path = config.tls_cert.clone();
    let key_path = config.tls_key.clone();

    let server = Arc::new(Server::new(config));
    let routes = routes(server);

    match check_tls_files(&cert_path, &key_path) {
        Ok(certs) => {
            info!("Starting secure server (HTTPS/WSS) on {} with {} certificate(s)", addr, certs);
            warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .run(addr)
                .await;
        }
        Err(e) => {
            warn!("TLS unavailable ({}), falling back to HTTP/WS on {}", e, addr);
            warp::serve(routes).run(addr).await;
        }
    }
}

use std::sync::Arc;

use warp::Filter;

use crate::server::Server;

/// The socket endpoint plus static files, open to any origin.
pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let static_dir = server.config().static_dir.clone();
    let max_payload = server.config().limits.max_code_len;

    // socket.io-client connects to /socket.io/?EIO=4&transport=websocket
    let ws_route = warp::path("socket.io")
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let server = server.clone();
            ws.max_message_size(max_payload + 1024)
                .on_upgrade(move |socket| async move {
                    server.handle_connection(socket).await;
                })
        });

    let static_files = warp::fs::dir(static_dir);

    ws_route
        .or(static_files)
        .with(warp::cors().allow_any_origin())
}
